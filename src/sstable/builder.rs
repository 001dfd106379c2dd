use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::bloom::builder::BloomFilterBuilder;
use crate::error::{Error, Result};
use crate::sstable::block::BlockBuilder;
use crate::sstable::footer::{Footer, IndexEntry, SSTableMeta};

/// Builds a table file from a sorted stream of live entries.
///
/// Used during:
/// - Compaction (memtable versions folded into the previous table)
/// - Checkpoint export (the view at the pinned sequence)
///
/// Build process:
/// 1. Add entries one by one (strictly increasing keys, no tombstones)
/// 2. Entries fill up blocks; when a block is full it's written out
/// 3. finish() flushes the last block, writes index, meta, footer, fsync
pub struct SSTableBuilder {
    block_builder: BlockBuilder,
    /// One per flushed data block.
    index_entries: Vec<IndexEntry>,
    /// Current write position in the file.
    data_offset: u64,
    writer: BufWriter<File>,
    /// Fold sequence recorded in the meta block.
    sequence: u64,
    block_size: usize,
    bloom: BloomFilterBuilder,
    min_key: Option<Vec<u8>>,
    /// Largest key added; also the last key of the current block.
    max_key: Option<Vec<u8>>,
    entry_count: u64,
}

impl SSTableBuilder {
    /// Create a new table builder that writes to the given path.
    pub fn new(
        path: &Path,
        sequence: u64,
        block_size: usize,
        bloom_false_positive_rate: f64,
    ) -> Result<Self> {
        let file = File::create(path)?;
        Ok(SSTableBuilder {
            block_builder: BlockBuilder::new(block_size),
            index_entries: Vec::new(),
            data_offset: 0,
            writer: BufWriter::new(file),
            sequence,
            block_size,
            bloom: BloomFilterBuilder::new(1024, bloom_false_positive_rate),
            min_key: None,
            max_key: None,
            entry_count: 0,
        })
    }

    /// Add an entry. Keys MUST arrive in strictly increasing order.
    pub fn add(&mut self, key: &[u8], value: &[u8], expires_at: Option<u64>) -> Result<()> {
        if let Some(last) = &self.max_key {
            if key <= last.as_slice() {
                return Err(Error::Corruption(
                    "table keys must be added in strictly increasing order".into(),
                ));
            }
        }

        if !self.block_builder.add(key, value, expires_at) {
            // Block is full: flush it, then add to a fresh block (the first
            // entry of a block is always accepted).
            self.flush_block()?;
            let accepted = self.block_builder.add(key, value, expires_at);
            debug_assert!(accepted);
        }

        if self.min_key.is_none() {
            self.min_key = Some(key.to_vec());
        }
        self.max_key = Some(key.to_vec());
        self.bloom.add_key(key);
        self.entry_count += 1;
        Ok(())
    }

    /// Flush the current block to disk and record an index entry.
    fn flush_block(&mut self) -> Result<()> {
        if self.block_builder.is_empty() {
            return Ok(());
        }
        let Some(last_key) = self.max_key.clone() else {
            return Ok(());
        };

        let old_builder =
            std::mem::replace(&mut self.block_builder, BlockBuilder::new(self.block_size));
        let block_data = old_builder.build();
        let block_size = block_data.len() as u64;

        self.writer.write_all(&block_data)?;
        self.index_entries.push(IndexEntry {
            last_key,
            offset: self.data_offset,
            size: block_size,
        });
        self.data_offset += block_size;
        Ok(())
    }

    /// Finalize the table: flush last block, write index, meta, footer, fsync.
    pub fn finish(mut self) -> Result<SSTableMeta> {
        self.flush_block()?;

        let index_block_offset = self.data_offset;
        let index_data: Vec<u8> = self
            .index_entries
            .iter()
            .flat_map(IndexEntry::encode)
            .collect();
        let index_block_size = index_data.len() as u64;
        self.writer.write_all(&index_data)?;

        let mut meta = SSTableMeta {
            sequence: self.sequence,
            min_key: self.min_key.unwrap_or_default(),
            max_key: self.max_key.unwrap_or_default(),
            file_size: 0,
            entry_count: self.entry_count,
        };
        let meta_block_offset = index_block_offset + index_block_size;
        let meta_data = meta.encode(&self.bloom.build().serialize());
        let meta_block_size = meta_data.len() as u64;
        self.writer.write_all(&meta_data)?;

        let footer = Footer {
            index_block_offset,
            index_block_size,
            meta_block_offset,
            meta_block_size,
        };
        self.writer.write_all(&footer.encode())?;

        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;

        meta.file_size = meta_block_offset + meta_block_size + Footer::SIZE as u64;
        Ok(meta)
    }
}
