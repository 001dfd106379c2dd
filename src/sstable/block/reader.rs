use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::sstable::TableEntry;
use crate::sstable::block::builder::ENTRY_HEADER_SIZE;

/// A decoded data block. Entries are parsed lazily through the offset
/// array, so a binary search touches only O(log n) entries.
pub struct Block {
    data: Vec<u8>,
    offsets: Vec<u32>,
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

impl Block {
    /// Parse the trailer (count + offset array) and validate every entry
    /// header against the data region.
    pub fn decode(mut data: Vec<u8>) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::Corruption("block too short".into()));
        }
        let count = read_u32(&data, data.len() - 4) as usize;
        let trailer = count
            .checked_mul(4)
            .and_then(|n| n.checked_add(4))
            .filter(|n| *n <= data.len())
            .ok_or_else(|| Error::Corruption("block offset array exceeds block".into()))?;
        let data_end = data.len() - trailer;

        let offsets: Vec<u32> = (0..count)
            .map(|i| read_u32(&data, data_end + i * 4))
            .collect();

        for &offset in &offsets {
            let start = offset as usize;
            if start + ENTRY_HEADER_SIZE > data_end {
                return Err(Error::Corruption("block entry header out of bounds".into()));
            }
            let key_len = read_u32(&data, start) as usize;
            let val_len = read_u32(&data, start + 4) as usize;
            if start + ENTRY_HEADER_SIZE + key_len + val_len > data_end {
                return Err(Error::Corruption("block entry out of bounds".into()));
            }
        }

        data.truncate(data_end);
        Ok(Block { data, offsets })
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    fn key_at(&self, idx: usize) -> &[u8] {
        let start = self.offsets[idx] as usize;
        let key_len = read_u32(&self.data, start) as usize;
        let key_start = start + ENTRY_HEADER_SIZE;
        &self.data[key_start..key_start + key_len]
    }

    /// Materialize the entry at `idx`.
    pub fn entry(&self, idx: usize) -> TableEntry {
        let start = self.offsets[idx] as usize;
        let key_len = read_u32(&self.data, start) as usize;
        let val_len = read_u32(&self.data, start + 4) as usize;
        let mut expires = [0u8; 8];
        expires.copy_from_slice(&self.data[start + 8..start + 16]);
        let key_start = start + ENTRY_HEADER_SIZE;
        let val_start = key_start + key_len;
        TableEntry {
            key: self.data[key_start..val_start].to_vec(),
            value: self.data[val_start..val_start + val_len].to_vec(),
            expires_at: match u64::from_le_bytes(expires) {
                0 => None,
                at => Some(at),
            },
        }
    }

    /// Index of the first entry with key >= `key` (or > `key` when
    /// `inclusive` is false). Equals `len()` if there is none.
    pub fn seek(&self, key: &[u8], inclusive: bool) -> usize {
        let (mut lo, mut hi) = (0, self.offsets.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let before = match self.key_at(mid).cmp(key) {
                Ordering::Less => true,
                Ordering::Equal => !inclusive,
                Ordering::Greater => false,
            };
            if before {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Point lookup by binary search.
    pub fn get(&self, key: &[u8]) -> Option<TableEntry> {
        let idx = self.seek(key, true);
        (idx < self.len() && self.key_at(idx) == key).then(|| self.entry(idx))
    }
}
