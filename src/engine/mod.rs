//! The engine adapter: a narrow contract over an ordered byte store with
//! atomic batch writes, point-in-time read views and checkpoint export.
//!
//! The state store only talks to [`StorageEngine`], so the durable
//! [`DiskEngine`] can be swapped for the in-memory [`MemoryEngine`] in tests
//! without touching store, cursor or codec logic.

pub mod cursor;
pub mod disk;
pub mod memory;
mod version;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub use cursor::EngineCursor;
pub use disk::DiskEngine;
pub use memory::MemoryEngine;
pub use version::EngineSnapshot;

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::iterator::StorageIterator;
use crate::metrics::GaugeValue;
use crate::types::{Key, KeyRange, Value};
use crate::wal::{SyncPolicy, WALOp, WALRecord};

/// TTLs below this are raised to it.
pub const MIN_TTL: Duration = Duration::from_millis(1000);

/// Engine property names sampled as gauges.
pub mod property {
    pub const ESTIMATE_TABLE_READERS_MEM: &str = "estimate-table-readers-mem";
    pub const CUR_SIZE_ACTIVE_MEM_TABLE: &str = "cur-size-active-mem-table";
    pub const SIZE_ALL_MEM_TABLES: &str = "size-all-mem-tables";
    pub const SIZE_PINNED_MEM_TABLES: &str = "size-pinned-mem-tables";
    pub const ESTIMATE_NUM_KEYS: &str = "estimate-num-keys";

    pub const NUM_ENTRIES_ACTIVE_MEM_TABLE: &str = "num-entries-active-mem-table";
    pub const NUM_SNAPSHOTS: &str = "num-snapshots";
    pub const LIVE_SST_FILES_SIZE: &str = "live-sst-files-size";
    pub const WAL_SIZE_BYTES: &str = "wal-size-bytes";
    pub const LATEST_SEQUENCE_NUMBER: &str = "latest-sequence-number";
    pub const NUM_COMPACTIONS: &str = "num-compactions";

    /// Always sampled, whatever the configuration asks for.
    pub const CORE: [&str; 5] = [
        ESTIMATE_TABLE_READERS_MEM,
        CUR_SIZE_ACTIVE_MEM_TABLE,
        SIZE_ALL_MEM_TABLES,
        SIZE_PINNED_MEM_TABLES,
        ESTIMATE_NUM_KEYS,
    ];
}

/// Tuning and behaviour of an engine instance.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Versions older than this read as absent. `None` keeps forever.
    pub ttl: Option<Duration>,
    /// Log every batch before applying it. When off, unflushed writes are
    /// lost on crash and `flush()` writes the table instead.
    pub wal_enabled: bool,
    pub sync_policy: SyncPolicy,
    /// Compact after a write once the memtable passes
    /// `compaction_trigger_bytes`. When off, the store compacts on close.
    pub auto_compaction: bool,
    pub compaction_trigger_bytes: u64,
    /// Target size of SSTable data blocks.
    pub block_size: usize,
    pub bloom_false_positive_rate: f64,
    pub clock: Arc<dyn Clock>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            ttl: None,
            wal_enabled: true,
            sync_policy: SyncPolicy::default(),
            auto_compaction: true,
            compaction_trigger_bytes: 64 * 1024 * 1024,
            block_size: 4096,
            bloom_false_positive_rate: 0.01,
            clock: Arc::new(SystemClock),
        }
    }
}

impl EngineOptions {
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Absolute expiry for a version written now.
    pub(crate) fn expiry_for_write(&self) -> Option<u64> {
        self.ttl
            .map(|ttl| self.clock.now_millis().saturating_add(ttl.as_millis() as u64))
    }
}

/// One mutation in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put { key: Key, value: Value },
    Delete { key: Key },
}

impl WriteOp {
    pub fn key(&self) -> &[u8] {
        match self {
            WriteOp::Put { key, .. } | WriteOp::Delete { key } => key,
        }
    }

    fn encoded_len(&self) -> usize {
        match self {
            WriteOp::Put { key, value } => key.len() + value.len(),
            WriteOp::Delete { key } => key.len(),
        }
    }
}

/// An ordered list of mutations applied atomically. Later ops on the same
/// key win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<Key>, value: impl Into<Value>) -> &mut Self {
        self.ops.push(WriteOp::Put {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn delete(&mut self, key: impl Into<Key>) -> &mut Self {
        self.ops.push(WriteOp::Delete { key: key.into() });
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Key and value bytes carried by the batch.
    pub fn size_bytes(&self) -> usize {
        self.ops.iter().map(WriteOp::encoded_len).sum()
    }

    pub(crate) fn to_wal_record(&self, sequence: u64, expires_at: Option<u64>) -> WALRecord {
        let ops = self
            .ops
            .iter()
            .map(|op| match op {
                WriteOp::Put { key, value } => WALOp::put(key.clone(), value.clone(), expires_at),
                WriteOp::Delete { key } => WALOp::delete(key.clone()),
            })
            .collect();
        WALRecord::new(sequence, ops)
    }
}

impl FromIterator<WriteOp> for WriteBatch {
    fn from_iter<I: IntoIterator<Item = WriteOp>>(iter: I) -> Self {
        WriteBatch {
            ops: iter.into_iter().collect(),
        }
    }
}

/// The narrow contract the state store needs from a storage engine.
///
/// Implementations must be safe to call from many threads at once. Reads
/// and writes may run concurrently; the engine provides its own internal
/// concurrency control.
pub trait StorageEngine: Send + Sync {
    /// A pinned read view. Dropping it releases the pin.
    type Snapshot: Send + Sync;

    /// Open (creating if absent) the engine rooted at `path`.
    fn open(path: &Path, options: EngineOptions) -> Result<Self>
    where
        Self: Sized;

    /// Directory the engine was opened at.
    fn path(&self) -> &Path;

    fn get(&self, key: &[u8]) -> Result<Option<Value>>;

    /// Batched lookup; results are in the order of `keys`.
    fn multi_get(&self, keys: &[&[u8]]) -> Result<Vec<Option<Value>>> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.write_batch(batch)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write_batch(batch)
    }

    /// Apply every op or none of them.
    fn write_batch(&self, batch: WriteBatch) -> Result<()>;

    /// Cursor over `range`, reading at `snapshot` if given or at the latest
    /// state otherwise.
    fn new_cursor(
        &self,
        range: &KeyRange,
        snapshot: Option<&Self::Snapshot>,
    ) -> Result<Box<dyn StorageIterator + Send>>;

    fn new_snapshot(&self) -> Result<Self::Snapshot>;

    fn release_snapshot(&self, snapshot: Self::Snapshot) {
        drop(snapshot);
    }

    /// Write a self-contained, openable copy of the current state to `path`.
    /// Writes issued after the call starts are not included.
    fn checkpoint_export(&self, path: &Path) -> Result<PathBuf>;

    /// `wal_only`: fsync the log. Otherwise flush the memtable to disk.
    fn flush(&self, wal_only: bool) -> Result<()>;

    /// Fold the memtable into the table, dropping obsolete versions.
    fn compact(&self) -> Result<()>;

    /// Sample a named property. Unknown names and closed engines report
    /// `Unavailable`.
    fn property(&self, name: &str) -> GaugeValue;

    /// Release resources. Idempotent.
    fn close(&self) -> Result<()>;
}

/// Build a checkpoint in `<path>.tmp` via `fill`, then rename it into place
/// so a crash never leaves a half-written checkpoint under `path`.
pub(crate) fn stage_checkpoint(
    path: &Path,
    fill: impl FnOnce(&Path) -> Result<()>,
) -> Result<PathBuf> {
    if path.exists() {
        return Err(Error::CheckpointExists(path.to_path_buf()));
    }
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::InvalidArgument(format!("bad checkpoint path {}", path.display())))?;
    let mut staging_name = file_name.to_os_string();
    staging_name.push(".tmp");
    let staging = path.with_file_name(staging_name);

    if staging.exists() {
        tracing::warn!(path = %staging.display(), "removing stale checkpoint staging directory");
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    if let Err(err) = fill(&staging) {
        let _ = fs::remove_dir_all(&staging);
        return Err(err);
    }
    sync_dir(&staging)?;
    fs::rename(&staging, path)?;
    if let Some(parent) = path.parent() {
        sync_dir(parent)?;
    }
    Ok(path.to_path_buf())
}

/// fsync a directory so renames inside it are durable.
pub(crate) fn sync_dir(dir: &Path) -> Result<()> {
    #[cfg(unix)]
    fs::File::open(dir)?.sync_all()?;
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}
