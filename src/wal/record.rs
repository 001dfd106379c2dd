use crate::error::{Error, Result};
use crate::types::ValueType;

/// Record type stored in the WAL.
pub type RecordType = ValueType;

/// One operation inside a batch record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WALOp {
    pub record_type: RecordType,
    pub key: Vec<u8>,
    /// Empty for deletes.
    pub value: Vec<u8>,
    pub expires_at: Option<u64>,
}

impl WALOp {
    pub fn put(key: Vec<u8>, value: Vec<u8>, expires_at: Option<u64>) -> Self {
        WALOp {
            record_type: RecordType::Put,
            key,
            value,
            expires_at,
        }
    }

    pub fn delete(key: Vec<u8>) -> Self {
        WALOp {
            record_type: RecordType::Delete,
            key,
            value: Vec::new(),
            expires_at: None,
        }
    }

    fn encoded_size(&self) -> usize {
        OP_HEADER_SIZE + self.key.len() + self.value.len()
    }
}

/// A single record in the WAL: one atomically-applied write batch.
///
/// On-disk format:
/// ```text
/// ┌──────────┬─────────┬──────────┬──────────┬─────────┬─────┬─────────┐
/// │ CRC (4B) │ Len(4B) │ Seq (8B) │ Count(4B)│  Op 0   │ ... │ Op N-1  │
/// └──────────┴─────────┴──────────┴──────────┴─────────┴─────┴─────────┘
/// Op: │ Type(1B) │ Expires(8B) │ Key Len(4B) │ Val Len(4B) │ Key │ Value │
/// ```
///
/// Op `i` carries sequence `Seq + i`. Expires 0 means no expiry.
/// CRC covers everything after the CRC field itself. A batch is replayed
/// whole or not at all, which is what makes `put_all` atomic across a crash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WALRecord {
    pub sequence: u64,
    pub ops: Vec<WALOp>,
}

// Header sizes
const CRC_SIZE: usize = 4;
const LEN_SIZE: usize = 4;
const SEQ_SIZE: usize = 8;
const COUNT_SIZE: usize = 4;
const HEADER_SIZE: usize = CRC_SIZE + LEN_SIZE + SEQ_SIZE + COUNT_SIZE;
const OP_HEADER_SIZE: usize = 1 + 8 + 4 + 4;

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

impl WALRecord {
    pub fn new(sequence: u64, ops: Vec<WALOp>) -> Self {
        WALRecord { sequence, ops }
    }

    /// Sequence of the last op in the batch.
    pub fn last_sequence(&self) -> u64 {
        self.sequence + self.ops.len().saturating_sub(1) as u64
    }

    /// Serialize this record to bytes (including CRC header).
    pub fn encode(&self) -> Vec<u8> {
        let total_len = self.encoded_size();
        let payload_len = total_len - CRC_SIZE - LEN_SIZE;

        let mut buf = Vec::with_capacity(total_len);

        // Reserve space for CRC (we'll fill it at the end)
        buf.extend_from_slice(&[0u8; CRC_SIZE]);
        buf.extend_from_slice(&(payload_len as u32).to_le_bytes());
        buf.extend_from_slice(&self.sequence.to_le_bytes());
        buf.extend_from_slice(&(self.ops.len() as u32).to_le_bytes());

        for op in &self.ops {
            buf.push(op.record_type as u8);
            buf.extend_from_slice(&op.expires_at.unwrap_or(0).to_le_bytes());
            buf.extend_from_slice(&(op.key.len() as u32).to_le_bytes());
            buf.extend_from_slice(&(op.value.len() as u32).to_le_bytes());
            buf.extend_from_slice(&op.key);
            buf.extend_from_slice(&op.value);
        }

        // Compute CRC over everything after CRC field
        let crc = crc32fast::hash(&buf[CRC_SIZE..]);
        buf[0..CRC_SIZE].copy_from_slice(&crc.to_le_bytes());

        buf
    }

    /// Deserialize a record from bytes. Returns error if CRC doesn't match.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::Corruption("record too short".into()));
        }

        let stored_crc = read_u32(data, 0);
        let payload_len = read_u32(data, CRC_SIZE) as usize;

        let total_len = CRC_SIZE + LEN_SIZE + payload_len;
        if payload_len < SEQ_SIZE + COUNT_SIZE || data.len() < total_len {
            return Err(Error::Corruption("record truncated".into()));
        }

        let computed_crc = crc32fast::hash(&data[CRC_SIZE..total_len]);
        if stored_crc != computed_crc {
            return Err(Error::Corruption("CRC mismatch".into()));
        }

        let mut offset = CRC_SIZE + LEN_SIZE;
        let sequence = read_u64(data, offset);
        offset += SEQ_SIZE;
        let count = read_u32(data, offset) as usize;
        offset += COUNT_SIZE;

        let mut ops = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            if offset + OP_HEADER_SIZE > total_len {
                return Err(Error::Corruption("op header exceeds record".into()));
            }
            let record_type = RecordType::from_u8(data[offset]).ok_or_else(|| {
                Error::Corruption(format!("invalid record type: {}", data[offset]))
            })?;
            let expires_at = match read_u64(data, offset + 1) {
                0 => None,
                at => Some(at),
            };
            let key_len = read_u32(data, offset + 9) as usize;
            let val_len = read_u32(data, offset + 13) as usize;
            offset += OP_HEADER_SIZE;

            if offset + key_len + val_len > total_len {
                return Err(Error::Corruption("op length exceeds record".into()));
            }
            let key = data[offset..offset + key_len].to_vec();
            offset += key_len;
            let value = data[offset..offset + val_len].to_vec();
            offset += val_len;

            ops.push(WALOp {
                record_type,
                key,
                value,
                expires_at,
            });
        }

        if offset != total_len {
            return Err(Error::Corruption("trailing bytes in record".into()));
        }

        Ok(WALRecord { sequence, ops })
    }

    /// Size of this record when serialized on disk.
    pub fn encoded_size(&self) -> usize {
        HEADER_SIZE + self.ops.iter().map(WALOp::encoded_size).sum::<usize>()
    }
}
