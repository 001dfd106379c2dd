//! State shared by an engine and every cursor and snapshot it hands out.
//!
//! The readable state is a [`View`]: the multi-version memtable over an
//! optional table that holds the folded state at the table's sequence.
//! Writers insert into the memtable under the view's write lock and only
//! then publish the new last sequence, so a batch becomes visible all at
//! once. Compaction replaces the whole view in one swap.

use std::collections::BTreeMap;
use std::iter;
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::clock::Clock;
use crate::engine::{WriteBatch, WriteOp, property};
use crate::error::{Error, Result};
use crate::iterator::merge::{MergeIterator, MergedEntry};
use crate::memtable::{MemEntry, MemTable};
use crate::metrics::GaugeValue;
use crate::sstable::{SSTable, SSTableBuilder, SSTableMeta};
use crate::types::{Key, Value, ValueType};
use crate::wal::{WALOp, WALRecord};

/// Memtable over the table it was folded onto.
pub(crate) struct View {
    pub mem: MemTable,
    pub table: Option<Arc<SSTable>>,
}

impl View {
    /// Sequence the table was folded at; 0 without a table.
    pub fn table_sequence(&self) -> u64 {
        self.table.as_ref().map_or(0, |t| t.meta().sequence)
    }
}

fn merged_from_mem(entry: MemEntry<'_>) -> MergedEntry {
    MergedEntry {
        key: entry.key.to_vec(),
        value: match entry.value_type {
            ValueType::Put => Some(entry.value.to_vec()),
            ValueType::Delete => None,
        },
        expires_at: entry.expires_at,
    }
}

pub(crate) struct Shared {
    pub view: RwLock<View>,
    last_sequence: AtomicU64,
    /// Pinned sequence -> number of pins.
    snapshots: Mutex<BTreeMap<u64, usize>>,
    compactions: AtomicU64,
    closed: AtomicBool,
    pub clock: Arc<dyn Clock>,
}

impl Shared {
    pub fn new(view: View, last_sequence: u64, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Shared {
            view: RwLock::new(view),
            last_sequence: AtomicU64::new(last_sequence),
            snapshots: Mutex::new(BTreeMap::new()),
            compactions: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            clock,
        })
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence.load(Ordering::Acquire)
    }

    pub fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::EngineClosed);
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns whether the engine was already closed.
    pub fn mark_closed(&self) -> bool {
        self.closed.swap(true, Ordering::AcqRel)
    }

    /// Newest live value of `key` at `read_seq`, or at the latest state.
    pub fn get(&self, key: &[u8], read_seq: Option<u64>) -> Result<Option<Value>> {
        let now = self.clock.now_millis();
        let table = {
            let view = self.view.read();
            let read_seq = read_seq.unwrap_or_else(|| self.last_sequence());
            if let Some(entry) = view.mem.get(key, read_seq) {
                return Ok(entry.live_value(now).map(<[u8]>::to_vec));
            }
            view.table.clone()
        };
        // Nothing for the key in (table sequence, read_seq], so the table
        // answers even if compaction swaps it out meanwhile.
        let Some(table) = table else {
            return Ok(None);
        };
        Ok(table
            .get(key)?
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value))
    }

    /// First live entry at or after `start` and strictly below `upper`, as of
    /// `read_seq`.
    pub fn seek_visible(
        &self,
        start: Bound<&[u8]>,
        upper: Option<&[u8]>,
        read_seq: u64,
    ) -> Result<Option<(Key, Value)>> {
        let now = self.clock.now_millis();
        let view = self.view.read();
        let mut cursor: Bound<Key> = match start {
            Bound::Included(k) => Bound::Included(k.to_vec()),
            Bound::Excluded(k) => Bound::Excluded(k.to_vec()),
            Bound::Unbounded => Bound::Unbounded,
        };

        loop {
            let bound = match &cursor {
                Bound::Included(k) => Bound::Included(k.as_slice()),
                Bound::Excluded(k) => Bound::Excluded(k.as_slice()),
                Bound::Unbounded => Bound::Unbounded,
            };
            let mem = view.mem.seek_visible(bound, read_seq);
            let table = match &view.table {
                Some(table) => table.seek(bound)?,
                None => None,
            };

            let (key, value) = match (mem, table) {
                (None, None) => return Ok(None),
                (Some(m), Some(t)) if t.key.as_slice() < m.key => {
                    let live = (!t.is_expired(now)).then_some(t.value);
                    (t.key, live)
                }
                (Some(m), _) => (m.key.to_vec(), m.live_value(now).map(<[u8]>::to_vec)),
                (None, Some(t)) => {
                    let live = (!t.is_expired(now)).then_some(t.value);
                    (t.key, live)
                }
            };

            if upper.is_some_and(|upper| key.as_slice() >= upper) {
                return Ok(None);
            }
            match value {
                Some(value) => return Ok(Some((key, value))),
                // Deleted or expired: keep scanning past it.
                None => cursor = Bound::Excluded(key),
            }
        }
    }

    /// Insert `batch` with consecutive sequences starting at `base`, then
    /// publish the last one. The caller serializes writers.
    pub fn apply(&self, base: u64, batch: &WriteBatch, expires_at: Option<u64>) {
        let mut view = self.view.write();
        for (seq, op) in (base..).zip(batch.ops()) {
            match op {
                WriteOp::Put { key, value } => view.mem.put(key, seq, value, expires_at),
                WriteOp::Delete { key } => view.mem.delete(key, seq),
            }
        }
        let last = base + batch.len() as u64 - 1;
        self.last_sequence.store(last, Ordering::Release);
    }

    pub fn install(&self, view: View) {
        *self.view.write() = view;
        self.compactions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pin(self: &Arc<Self>) -> EngineSnapshot {
        // Taken under the snapshot lock so a concurrent compaction computing
        // its fold sequence cannot miss the pin.
        let mut snapshots = self.snapshots.lock();
        let sequence = self.last_sequence();
        *snapshots.entry(sequence).or_insert(0) += 1;
        EngineSnapshot {
            sequence,
            shared: Arc::clone(self),
        }
    }

    /// Another pin at the sequence of an existing snapshot.
    pub fn pin_at(self: &Arc<Self>, snapshot: &EngineSnapshot) -> Result<EngineSnapshot> {
        if !Arc::ptr_eq(self, &snapshot.shared) {
            return Err(Error::InvalidArgument(
                "snapshot belongs to a different engine".into(),
            ));
        }
        *self.snapshots.lock().entry(snapshot.sequence).or_insert(0) += 1;
        Ok(EngineSnapshot {
            sequence: snapshot.sequence,
            shared: Arc::clone(self),
        })
    }

    fn unpin(&self, sequence: u64) {
        let mut snapshots = self.snapshots.lock();
        if let Some(count) = snapshots.get_mut(&sequence) {
            *count -= 1;
            if *count == 0 {
                snapshots.remove(&sequence);
            }
        }
    }

    pub fn pinned_count(&self) -> usize {
        self.snapshots.lock().values().sum()
    }

    /// Newest sequence compaction may fold to without changing what any
    /// pinned reader sees.
    pub fn fold_sequence(&self) -> u64 {
        let snapshots = self.snapshots.lock();
        let last = self.last_sequence();
        snapshots
            .keys()
            .next()
            .map_or(last, |&oldest| oldest.min(last))
    }

    /// The table, if it alone is the state at `read_seq`: the memtable holds
    /// no version at or below `read_seq`.
    pub fn table_if_covers(&self, read_seq: u64) -> Option<Arc<SSTable>> {
        let view = self.view.read();
        let table = view.table.as_ref()?;
        let mem_clear = view.mem.min_sequence().is_none_or(|min| min > read_seq);
        (mem_clear && table.meta().sequence <= read_seq).then(|| Arc::clone(table))
    }

    /// Live entries of the state at `read_seq`, in key order.
    fn for_each_live(
        &self,
        read_seq: u64,
        mut f: impl FnMut(MergedEntry) -> Result<()>,
    ) -> Result<()> {
        let now = self.clock.now_millis();
        // Copy the memtable's view out so long table writes do not hold the
        // lock writers need.
        let (newer, table) = {
            let view = self.view.read();
            let newer: Vec<MergedEntry> =
                view.mem.visible_at(read_seq).map(merged_from_mem).collect();
            (newer, view.table.clone())
        };
        let older: Box<dyn Iterator<Item = Result<MergedEntry>> + '_> = match &table {
            Some(table) => Box::new(table.iter().map(|entry| {
                entry.map(|e| MergedEntry {
                    key: e.key,
                    value: Some(e.value),
                    expires_at: e.expires_at,
                })
            })),
            None => Box::new(iter::empty()),
        };
        for entry in MergeIterator::new(newer.into_iter().map(Ok), older) {
            let entry = entry?;
            if entry.is_live(now) {
                f(entry)?;
            }
        }
        Ok(())
    }

    /// Write the state at `read_seq` as a table at `path`, dropping
    /// tombstones and expired entries.
    pub fn write_table(
        &self,
        path: &Path,
        read_seq: u64,
        block_size: usize,
        bloom_fpr: f64,
    ) -> Result<SSTableMeta> {
        let mut builder = SSTableBuilder::new(path, read_seq, block_size, bloom_fpr)?;
        self.for_each_live(read_seq, |entry| {
            let value = entry.value.as_deref().unwrap_or_default();
            builder.add(&entry.key, value, entry.expires_at)
        })?;
        builder.finish()
    }

    /// The state at `read_seq` as a fresh memtable with every version at
    /// `read_seq`.
    pub fn fold_to_memtable(&self, read_seq: u64) -> Result<MemTable> {
        let mut mem = MemTable::new();
        self.for_each_live(read_seq, |entry| {
            let value = entry.value.as_deref().unwrap_or_default();
            mem.put(&entry.key, read_seq, value, entry.expires_at);
            Ok(())
        })?;
        Ok(mem)
    }

    /// One single-op record per version, oldest first, for rewriting the
    /// log after a fold.
    pub fn wal_records(mem: &MemTable) -> Vec<WALRecord> {
        let mut records: Vec<WALRecord> = mem
            .iter()
            .map(|entry| {
                let op = match entry.value_type {
                    ValueType::Put => {
                        WALOp::put(entry.key.to_vec(), entry.value.to_vec(), entry.expires_at)
                    }
                    ValueType::Delete => WALOp::delete(entry.key.to_vec()),
                };
                WALRecord::new(entry.sequence, vec![op])
            })
            .collect();
        records.sort_by_key(|r| r.sequence);
        records
    }

    /// Properties every engine can answer from the view.
    pub fn common_property(&self, name: &str) -> Option<GaugeValue> {
        let view = self.view.read();
        let value = match name {
            property::ESTIMATE_TABLE_READERS_MEM => {
                view.table.as_ref().map_or(0, |t| t.reader_memory()) as u64
            }
            property::CUR_SIZE_ACTIVE_MEM_TABLE => view.mem.live_bytes() as u64,
            property::SIZE_ALL_MEM_TABLES => view.mem.size() as u64,
            property::SIZE_PINNED_MEM_TABLES => view.mem.shadowed_bytes() as u64,
            property::ESTIMATE_NUM_KEYS => {
                let table_keys = view.table.as_ref().map_or(0, |t| t.meta().entry_count);
                table_keys + view.mem.distinct_keys() as u64
            }
            property::NUM_ENTRIES_ACTIVE_MEM_TABLE => view.mem.len() as u64,
            property::NUM_SNAPSHOTS => self.pinned_count() as u64,
            property::LIVE_SST_FILES_SIZE => {
                view.table.as_ref().map_or(0, |t| t.meta().file_size)
            }
            property::LATEST_SEQUENCE_NUMBER => self.last_sequence(),
            property::NUM_COMPACTIONS => self.compactions.load(Ordering::Relaxed),
            _ => return None,
        };
        Some(GaugeValue::Value(value))
    }
}

/// A pinned read sequence. The engine keeps every version a pinned reader
/// can see until the pin is dropped.
pub struct EngineSnapshot {
    sequence: u64,
    shared: Arc<Shared>,
}

impl EngineSnapshot {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl std::fmt::Debug for EngineSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSnapshot")
            .field("sequence", &self.sequence)
            .finish()
    }
}

impl Drop for EngineSnapshot {
    fn drop(&mut self) {
        self.shared.unpin(self.sequence);
    }
}
