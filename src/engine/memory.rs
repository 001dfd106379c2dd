use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::engine::cursor::EngineCursor;
use crate::engine::disk::TABLE_FILE;
use crate::engine::version::{EngineSnapshot, Shared, View};
use crate::engine::{EngineOptions, StorageEngine, WriteBatch, stage_checkpoint};
use crate::error::Result;
use crate::iterator::StorageIterator;
use crate::memtable::MemTable;
use crate::metrics::GaugeValue;
use crate::types::{KeyRange, Value, ValueType};

/// Memtable-only engine. Nothing survives a drop, but checkpoints are real
/// table directories a [`DiskEngine`](crate::engine::DiskEngine) can open.
pub struct MemoryEngine {
    path: PathBuf,
    options: EngineOptions,
    shared: Arc<Shared>,
    next_sequence: Mutex<u64>,
}

impl StorageEngine for MemoryEngine {
    type Snapshot = EngineSnapshot;

    fn open(path: &Path, options: EngineOptions) -> Result<Self> {
        let view = View {
            mem: MemTable::new(),
            table: None,
        };
        let shared = Shared::new(view, 0, Arc::clone(&options.clock));
        debug!(path = %path.display(), "opened in-memory engine");
        Ok(MemoryEngine {
            path: path.to_path_buf(),
            options,
            shared,
            next_sequence: Mutex::new(1),
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn get(&self, key: &[u8]) -> Result<Option<Value>> {
        self.shared.check_open()?;
        self.shared.get(key, None)
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        self.shared.check_open()?;
        if batch.is_empty() {
            return Ok(());
        }
        let expires_at = self.options.expiry_for_write();
        let mut next = self.next_sequence.lock();
        self.shared.check_open()?;
        self.shared.apply(*next, &batch, expires_at);
        *next += batch.len() as u64;
        Ok(())
    }

    fn new_cursor(
        &self,
        range: &KeyRange,
        snapshot: Option<&EngineSnapshot>,
    ) -> Result<Box<dyn StorageIterator + Send>> {
        Ok(Box::new(EngineCursor::open(&self.shared, range, snapshot)?))
    }

    fn new_snapshot(&self) -> Result<EngineSnapshot> {
        self.shared.check_open()?;
        Ok(self.shared.pin())
    }

    fn checkpoint_export(&self, path: &Path) -> Result<PathBuf> {
        self.shared.check_open()?;
        let pin = self.shared.pin();
        stage_checkpoint(path, |staging| {
            self.shared.write_table(
                &staging.join(TABLE_FILE),
                pin.sequence(),
                self.options.block_size,
                self.options.bloom_false_positive_rate,
            )?;
            Ok(())
        })
    }

    /// Nothing to make durable.
    fn flush(&self, _wal_only: bool) -> Result<()> {
        self.shared.check_open()
    }

    /// Rebuild the memtable with one version per live key at the fold
    /// sequence plus every version newer than it.
    fn compact(&self) -> Result<()> {
        self.shared.check_open()?;
        let _writer = self.next_sequence.lock();
        let fold = self.shared.fold_sequence();
        let mut mem = self.shared.fold_to_memtable(fold)?;
        let retained = self.shared.view.read().mem.retain_newer_than(fold);
        for entry in retained.iter() {
            match entry.value_type {
                ValueType::Put => mem.put(entry.key, entry.sequence, entry.value, entry.expires_at),
                ValueType::Delete => mem.delete(entry.key, entry.sequence),
            }
        }
        self.shared.install(View { mem, table: None });
        Ok(())
    }

    fn property(&self, name: &str) -> GaugeValue {
        if self.shared.is_closed() {
            return GaugeValue::Unavailable;
        }
        self.shared
            .common_property(name)
            .unwrap_or(GaugeValue::Unavailable)
    }

    fn close(&self) -> Result<()> {
        let _writer = self.next_sequence.lock();
        if !self.shared.mark_closed() {
            debug!(path = %self.path.display(), "closed in-memory engine");
        }
        Ok(())
    }
}
