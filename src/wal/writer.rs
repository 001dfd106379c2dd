use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{error, warn};

use crate::error::Result;
use crate::wal::SyncPolicy;
use crate::wal::record::WALRecord;

/// Writes WAL records to a file on disk.
///
/// Two layers of buffering:
///   BufWriter.flush()  → Rust buffer → OS page cache
///   file.sync_all()    → OS page cache → physical disk
///
/// Every append reaches the page cache before it returns; when it reaches
/// the disk is up to the [`SyncPolicy`].
pub struct WALWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    offset: u64,
    sync_policy: SyncPolicy,
    writes_since_sync: usize,
    last_sync: Instant,
    /// Set when a failed append could not be cut back off the file. The
    /// log's tail is unknown, so every later append is refused.
    poisoned: bool,
    #[cfg(test)]
    fail_next_sync: bool,
}

impl WALWriter {
    /// Open the WAL at the given path for appending, creating it if needed.
    pub fn new(path: &Path, sync_policy: SyncPolicy) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let offset = file.metadata()?.len();

        Ok(WALWriter {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            offset,
            sync_policy,
            writes_since_sync: 0,
            last_sync: Instant::now(),
            poisoned: false,
            #[cfg(test)]
            fail_next_sync: false,
        })
    }

    /// Append a record to the WAL.
    /// Depending on SyncPolicy, may fsync after this write.
    ///
    /// On error the file is cut back to where it stood before the call, so
    /// a batch reported as failed is never replayed.
    pub fn append(&mut self, record: &WALRecord) -> Result<()> {
        if self.poisoned {
            return Err(io::Error::other(format!(
                "WAL {} is unusable after a failed append",
                self.path.display()
            ))
            .into());
        }
        let encoded = record.encode();
        match self.write_encoded(&encoded) {
            Ok(()) => {
                self.offset += encoded.len() as u64;
                Ok(())
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "WAL append failed, rolling back");
                if let Err(rollback) = self.truncate_to_offset() {
                    error!(
                        path = %self.path.display(),
                        error = %rollback,
                        "could not roll back failed WAL append"
                    );
                    self.poisoned = true;
                }
                Err(err)
            }
        }
    }

    fn write_encoded(&mut self, encoded: &[u8]) -> Result<()> {
        self.writer.write_all(encoded)?;
        self.writer.flush()?;
        self.writes_since_sync += 1;

        let due = match self.sync_policy {
            SyncPolicy::EveryWrite => true,
            SyncPolicy::EveryNWrites(n) => self.writes_since_sync >= n,
            SyncPolicy::EveryNMillis(ms) => self.last_sync.elapsed() >= Duration::from_millis(ms),
        };
        if due {
            self.sync()?;
        }
        Ok(())
    }

    /// Drop whatever is buffered and cut the file back to `offset`.
    fn truncate_to_offset(&mut self) -> Result<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        file.set_len(self.offset)?;
        file.sync_all()?;
        // into_parts hands back the buffer without flushing it.
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
        let (_file, _unwritten) = stale.into_parts();
        Ok(())
    }

    /// Force fsync to disk. Ensures all buffered writes are durable.
    pub fn sync(&mut self) -> Result<()> {
        #[cfg(test)]
        if std::mem::take(&mut self.fail_next_sync) {
            return Err(io::Error::other("injected fsync failure").into());
        }
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.writes_since_sync = 0;
        self.last_sync = Instant::now();
        Ok(())
    }

    /// Make the next `sync` fail.
    #[cfg(test)]
    pub(crate) fn fail_next_sync(&mut self) {
        self.fail_next_sync = true;
    }

    /// Current file length (bytes written so far, including prior sessions).
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sync_policy(&self) -> SyncPolicy {
        self.sync_policy
    }

    /// Appends not yet fsync'd.
    pub fn writes_since_sync(&self) -> usize {
        self.writes_since_sync
    }
}

/// Replace the WAL at `path` with one containing exactly `records`.
///
/// The new log is written and fsync'd under a temporary name, then renamed
/// over the old one, so a crash leaves either the old or the new log intact.
/// Returns a writer positioned at the end of the new log.
pub fn rewrite<'a>(
    path: &Path,
    records: impl IntoIterator<Item = &'a WALRecord>,
    sync_policy: SyncPolicy,
) -> Result<WALWriter> {
    let tmp = path.with_extension("log.tmp");
    {
        let file = File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        for record in records {
            writer.write_all(&record.encode())?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    fs::rename(&tmp, path)?;
    WALWriter::new(path, sync_policy)
}
