use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::wal::record::WALRecord;

/// Reads WAL records from a file for crash recovery.
///
/// Loads the entire file into memory, then iterates record by record.
/// On open the engine replays each batch into a fresh memtable; if CRC
/// fails on a record, replay stops. It was a partial write from a crash and
/// all preceding records are valid.
pub struct WALReader {
    data: Vec<u8>,
}

impl WALReader {
    /// Open a WAL file for reading.
    pub fn new(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        Ok(WALReader { data })
    }

    /// Create an iterator over all valid records in the WAL.
    pub fn iter(&self) -> WALIterator<'_> {
        WALIterator {
            data: &self.data,
            offset: 0,
            damaged: false,
        }
    }

    /// Total bytes in the file.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Iterator over WAL records. Yields records until EOF or corruption.
///
/// A corrupted record means the crash happened here, and nothing valid can
/// follow. `valid_len()` reports where the intact prefix ends.
pub struct WALIterator<'a> {
    data: &'a [u8],
    offset: usize,
    damaged: bool,
}

impl WALIterator<'_> {
    /// Bytes consumed by the records yielded so far.
    pub fn valid_len(&self) -> usize {
        self.offset
    }

    /// Whether iteration stopped at a damaged record rather than at EOF.
    pub fn is_damaged(&self) -> bool {
        self.damaged
    }
}

impl Iterator for WALIterator<'_> {
    type Item = WALRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.damaged || self.offset >= self.data.len() {
            return None;
        }

        match WALRecord::decode(&self.data[self.offset..]) {
            Ok(record) => {
                self.offset += record.encoded_size();
                Some(record)
            }
            Err(err) => {
                tracing::warn!(
                    offset = self.offset,
                    error = %err,
                    "stopping WAL replay at damaged record"
                );
                self.damaged = true;
                None
            }
        }
    }
}
