//! The durable engine.
//!
//! On disk a store directory holds at most two files:
//!
//! ```text
//! <dir>/data.sst   folded state at the table's sequence (meta block)
//! <dir>/wal.log    batches with sequences above the table's
//! ```
//!
//! Opening loads the table and replays the log into a fresh memtable,
//! skipping anything the table already folded in. Compaction writes a new
//! table at the fold sequence, renames it into place, rewrites the log with
//! the versions still newer than the fold, then swaps the in-memory view.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::engine::cursor::EngineCursor;
use crate::engine::version::{EngineSnapshot, Shared, View};
use crate::engine::{
    EngineOptions, StorageEngine, WriteBatch, property, stage_checkpoint, sync_dir,
};
use crate::error::{Error, Result};
use crate::iterator::StorageIterator;
use crate::memtable::MemTable;
use crate::metrics::GaugeValue;
use crate::sstable::SSTable;
use crate::types::{KeyRange, Value};
use crate::wal::reader::WALReader;
use crate::wal::writer::{WALWriter, rewrite as rewrite_wal};
use crate::wal::{RecordType, WALRecord};

pub const TABLE_FILE: &str = "data.sst";
pub const WAL_FILE: &str = "wal.log";
const TABLE_TMP_FILE: &str = "data.sst.tmp";

/// Directories currently opened by an engine in this process.
static OPEN_DIRS: LazyLock<Mutex<HashSet<PathBuf>>> = LazyLock::new(Default::default);

/// Exclusive claim on a directory, released on drop.
struct DirLock {
    path: PathBuf,
}

impl DirLock {
    fn acquire(path: &Path) -> Result<Self> {
        if !OPEN_DIRS.lock().insert(path.to_path_buf()) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::WouldBlock,
                "directory is already opened by another engine",
            )));
        }
        Ok(DirLock {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        OPEN_DIRS.lock().remove(&self.path);
    }
}

struct WriterState {
    wal: Option<WALWriter>,
    next_sequence: u64,
}

/// Table plus write-ahead log engine rooted at one directory.
pub struct DiskEngine {
    dir: PathBuf,
    options: EngineOptions,
    shared: Arc<Shared>,
    /// Serializes writers, compaction and close.
    writer: Mutex<WriterState>,
    dir_lock: Mutex<Option<DirLock>>,
}

impl DiskEngine {
    fn open_inner(path: &Path, options: EngineOptions) -> Result<Self> {
        fs::create_dir_all(path)?;
        let dir = path.canonicalize()?;
        let dir_lock = DirLock::acquire(&dir)?;

        // Leftover from a compaction that crashed before its rename.
        let tmp_table = dir.join(TABLE_TMP_FILE);
        if tmp_table.exists() {
            fs::remove_file(&tmp_table)?;
        }

        let table_path = dir.join(TABLE_FILE);
        let table = if table_path.exists() {
            Some(Arc::new(SSTable::open(&table_path)?))
        } else {
            None
        };
        let mut view = View {
            mem: MemTable::new(),
            table,
        };
        let table_sequence = view.table_sequence();

        let wal_path = dir.join(WAL_FILE);
        let mut last_sequence = table_sequence;
        let mut replayed = 0usize;
        if wal_path.exists() {
            let reader = WALReader::new(&wal_path)?;
            let mut records = reader.iter();
            for record in records.by_ref() {
                for (sequence, op) in (record.sequence..).zip(&record.ops) {
                    if sequence <= table_sequence {
                        continue;
                    }
                    match op.record_type {
                        RecordType::Put => view.mem.put(&op.key, sequence, &op.value, op.expires_at),
                        RecordType::Delete => view.mem.delete(&op.key, sequence),
                    }
                }
                last_sequence = last_sequence.max(record.last_sequence());
                replayed += 1;
            }
            if records.is_damaged() {
                // Cut the torn tail so new appends follow the intact prefix.
                let valid = records.valid_len() as u64;
                warn!(
                    path = %wal_path.display(),
                    valid_bytes = valid,
                    total_bytes = reader.len(),
                    "truncating damaged WAL tail"
                );
                OpenOptions::new()
                    .write(true)
                    .open(&wal_path)?
                    .set_len(valid)?;
            }
        }

        let wal = if options.wal_enabled {
            Some(WALWriter::new(&wal_path, options.sync_policy)?)
        } else {
            None
        };

        info!(
            path = %dir.display(),
            table_sequence,
            last_sequence,
            replayed_batches = replayed,
            wal_enabled = options.wal_enabled,
            "opened storage engine"
        );

        let shared = Shared::new(view, last_sequence, Arc::clone(&options.clock));
        Ok(DiskEngine {
            dir,
            options,
            shared,
            writer: Mutex::new(WriterState {
                wal,
                next_sequence: last_sequence + 1,
            }),
            dir_lock: Mutex::new(Some(dir_lock)),
        })
    }

    fn maybe_compact(&self) -> Result<()> {
        if !self.options.auto_compaction {
            return Ok(());
        }
        let over = |engine: &Self| {
            engine.shared.view.read().mem.size() as u64 >= engine.options.compaction_trigger_bytes
        };
        if !over(self) {
            return Ok(());
        }
        let mut writer = self.writer.lock();
        // Another writer may have compacted while we waited.
        if !over(self) || self.shared.is_closed() {
            return Ok(());
        }
        self.compact_locked(&mut writer)
    }

    fn compact_locked(&self, writer: &mut WriterState) -> Result<()> {
        let started = Instant::now();
        let fold = self.shared.fold_sequence();
        let table_path = self.dir.join(TABLE_FILE);
        let tmp_path = self.dir.join(TABLE_TMP_FILE);

        let meta = self.shared.write_table(
            &tmp_path,
            fold,
            self.options.block_size,
            self.options.bloom_false_positive_rate,
        )?;
        fs::rename(&tmp_path, &table_path)?;
        sync_dir(&self.dir)?;
        let table = Arc::new(SSTable::open(&table_path)?);

        let retained = self.shared.view.read().mem.retain_newer_than(fold);
        let wal_path = self.dir.join(WAL_FILE);
        let records: Vec<WALRecord> = Shared::wal_records(&retained);
        if self.options.wal_enabled {
            writer.wal = Some(rewrite_wal(
                &wal_path,
                &records,
                self.options.sync_policy,
            )?);
        } else if !records.is_empty() {
            // A pin held the fold back. Nothing logs new writes, so the
            // versions above the fold go to disk here; replay on open picks
            // them up.
            rewrite_wal(&wal_path, &records, self.options.sync_policy)?;
            sync_dir(&self.dir)?;
        } else if wal_path.exists() {
            fs::remove_file(&wal_path)?;
        }

        let retained_versions = retained.len();
        self.shared.install(View {
            mem: retained,
            table: Some(table),
        });
        info!(
            path = %self.dir.display(),
            fold_sequence = fold,
            entries = meta.entry_count,
            table_bytes = meta.file_size,
            retained_versions,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "compacted"
        );
        Ok(())
    }

    fn wal_size(&self) -> u64 {
        self.writer.lock().wal.as_ref().map_or(0, WALWriter::offset)
    }
}

impl StorageEngine for DiskEngine {
    type Snapshot = EngineSnapshot;

    /// Every failure here surfaces as [`Error::EngineOpen`]: a locked
    /// directory, a damaged table or unreadable files.
    fn open(path: &Path, options: EngineOptions) -> Result<Self> {
        Self::open_inner(path, options).map_err(|err| Error::EngineOpen {
            path: path.to_path_buf(),
            source: Box::new(err),
        })
    }

    fn path(&self) -> &Path {
        &self.dir
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
        {
            let mut writer = self.writer.lock();
            // Close takes this lock too; re-check under it.
            self.shared.check_open()?;
            let base = writer.next_sequence;
            if let Some(wal) = writer.wal.as_mut() {
                wal.append(&batch.to_wal_record(base, expires_at))?;
            }
            self.shared.apply(base, &batch, expires_at);
            writer.next_sequence += batch.len() as u64;
        }
        self.maybe_compact()
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
        let started = Instant::now();
        let pin = self.shared.pin();
        let mut linked = false;
        let exported = stage_checkpoint(path, |staging| {
            let target = staging.join(TABLE_FILE);
            {
                // Holding the writer lock keeps compaction from renaming a
                // different table over the file while we link it.
                let _writer = self.writer.lock();
                if let Some(table) = self.shared.table_if_covers(pin.sequence()) {
                    if fs::hard_link(table.path(), &target).is_err() {
                        fs::copy(table.path(), &target)?;
                    }
                    linked = true;
                }
            }
            if !linked {
                self.shared.write_table(
                    &target,
                    pin.sequence(),
                    self.options.block_size,
                    self.options.bloom_false_positive_rate,
                )?;
            }
            Ok(())
        })?;
        info!(
            path = %exported.display(),
            sequence = pin.sequence(),
            reused_table = linked,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "exported checkpoint"
        );
        Ok(exported)
    }

    fn flush(&self, wal_only: bool) -> Result<()> {
        self.shared.check_open()?;
        if wal_only && self.options.wal_enabled {
            if let Some(wal) = self.writer.lock().wal.as_mut() {
                wal.sync()?;
            }
            return Ok(());
        }
        self.compact()
    }

    fn compact(&self) -> Result<()> {
        self.shared.check_open()?;
        let mut writer = self.writer.lock();
        self.compact_locked(&mut writer)
    }

    fn property(&self, name: &str) -> GaugeValue {
        if self.shared.is_closed() {
            return GaugeValue::Unavailable;
        }
        if name == property::WAL_SIZE_BYTES {
            return self.wal_size().into();
        }
        self.shared
            .common_property(name)
            .unwrap_or(GaugeValue::Unavailable)
    }

    fn close(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        if self.shared.mark_closed() {
            return Ok(());
        }
        let result = if let Some(wal) = writer.wal.as_mut() {
            wal.sync()
        } else if !self.shared.view.read().mem.is_empty() {
            // Without a log the memtable would be lost.
            self.compact_locked(&mut writer)
        } else {
            Ok(())
        };
        writer.wal = None;
        self.dir_lock.lock().take();
        match &result {
            Ok(()) => info!(path = %self.dir.display(), "closed storage engine"),
            Err(err) => warn!(path = %self.dir.display(), error = %err, "storage engine closed with error"),
        }
        result
    }
}

impl Drop for DiskEngine {
    fn drop(&mut self) {
        if !self.shared.is_closed() {
            debug!(path = %self.dir.display(), "closing storage engine on drop");
            if let Err(err) = self.close() {
                warn!(path = %self.dir.display(), error = %err, "failed to close storage engine on drop");
            }
        }
    }
}
