use crate::error::{Error, Result};

/// Magic number to identify table files ("TSTATE\0\x01").
pub const SSTABLE_MAGIC: u64 = 0x5453_5441_5445_0001;

fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| Error::Corruption("unexpected end of table metadata".into()))
}

fn read_u64(data: &[u8], offset: usize) -> Result<u64> {
    data.get(offset..offset + 8)
        .map(|b| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(b);
            u64::from_le_bytes(buf)
        })
        .ok_or_else(|| Error::Corruption("unexpected end of table metadata".into()))
}

fn read_bytes(data: &[u8], offset: usize) -> Result<(Vec<u8>, usize)> {
    let len = read_u32(data, offset)? as usize;
    let bytes = data
        .get(offset + 4..offset + 4 + len)
        .ok_or_else(|| Error::Corruption("length-prefixed field exceeds table metadata".into()))?;
    Ok((bytes.to_vec(), 4 + len))
}

/// Metadata about a table file, stored in its meta block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SSTableMeta {
    /// Every version with sequence <= this is folded into the table.
    pub sequence: u64,
    /// Smallest key in the table.
    pub min_key: Vec<u8>,
    /// Largest key in the table.
    pub max_key: Vec<u8>,
    /// File size in bytes (not stored; filled in on open).
    pub file_size: u64,
    /// Number of entries. Tables never hold tombstones.
    pub entry_count: u64,
}

impl SSTableMeta {
    /// Encode the meta block, followed by the serialized bloom filter.
    ///
    /// Format: [sequence(8B)][entry_count(8B)][min_len(4B)][min_key]
    ///         [max_len(4B)][max_key][bloom_len(4B)][bloom]
    pub fn encode(&self, bloom: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32 + self.min_key.len() + self.max_key.len() + bloom.len());
        buf.extend_from_slice(&self.sequence.to_le_bytes());
        buf.extend_from_slice(&self.entry_count.to_le_bytes());
        for field in [self.min_key.as_slice(), self.max_key.as_slice(), bloom] {
            buf.extend_from_slice(&(field.len() as u32).to_le_bytes());
            buf.extend_from_slice(field);
        }
        buf
    }

    /// Decode the meta block, returning the metadata and the raw bloom bytes.
    pub fn decode(data: &[u8], file_size: u64) -> Result<(Self, Vec<u8>)> {
        let sequence = read_u64(data, 0)?;
        let entry_count = read_u64(data, 8)?;
        let mut offset = 16;
        let (min_key, used) = read_bytes(data, offset)?;
        offset += used;
        let (max_key, used) = read_bytes(data, offset)?;
        offset += used;
        let (bloom, _) = read_bytes(data, offset)?;
        Ok((
            SSTableMeta {
                sequence,
                min_key,
                max_key,
                file_size,
                entry_count,
            },
            bloom,
        ))
    }
}

/// An entry in the table's index block.
/// Maps a block's last key to its location in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Last (largest) key in the block.
    pub last_key: Vec<u8>,
    /// Byte offset of the block in the file.
    pub offset: u64,
    /// Size of the block in bytes.
    pub size: u64,
}

impl IndexEntry {
    /// Encode this index entry to bytes.
    /// Format: [key_len(4B)][key][offset(8B)][size(8B)]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.last_key.len() + 16);
        buf.extend_from_slice(&(self.last_key.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.last_key);
        buf.extend_from_slice(&self.offset.to_le_bytes());
        buf.extend_from_slice(&self.size.to_le_bytes());
        buf
    }

    /// Decode an index entry from bytes, returning (entry, bytes_consumed).
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        let (last_key, used) = read_bytes(data, 0)?;
        let offset = read_u64(data, used)?;
        let size = read_u64(data, used + 8)?;
        Ok((
            IndexEntry {
                last_key,
                offset,
                size,
            },
            used + 16,
        ))
    }
}

/// The footer sits at the end of the table file.
/// It tells the reader where to find the index block and meta block.
///
/// ```text
/// ┌──────────────────────────────────────┐
/// │ Index block offset (8B)              │
/// │ Index block size (8B)                │
/// │ Meta block offset (8B)               │
/// │ Meta block size (8B)                 │
/// │ Magic number (8B)                    │
/// └──────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footer {
    pub index_block_offset: u64,
    pub index_block_size: u64,
    pub meta_block_offset: u64,
    pub meta_block_size: u64,
}

impl Footer {
    /// Size of the footer in bytes (fixed).
    pub const SIZE: usize = 8 * 5;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&self.index_block_offset.to_le_bytes());
        buf.extend_from_slice(&self.index_block_size.to_le_bytes());
        buf.extend_from_slice(&self.meta_block_offset.to_le_bytes());
        buf.extend_from_slice(&self.meta_block_size.to_le_bytes());
        buf.extend_from_slice(&SSTABLE_MAGIC.to_le_bytes());
        buf
    }

    /// Decode and check the magic number.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::Corruption("footer too short".into()));
        }
        let magic = read_u64(data, 32)?;
        if magic != SSTABLE_MAGIC {
            return Err(Error::Corruption(format!(
                "bad magic: expected {SSTABLE_MAGIC:#x}, got {magic:#x}"
            )));
        }
        Ok(Footer {
            index_block_offset: read_u64(data, 0)?,
            index_block_size: read_u64(data, 8)?,
            meta_block_offset: read_u64(data, 16)?,
            meta_block_size: read_u64(data, 24)?,
        })
    }
}
