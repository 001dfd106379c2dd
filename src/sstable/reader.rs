use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bloom::BloomFilter;
use crate::error::{Error, Result};
use crate::sstable::TableEntry;
use crate::sstable::block::Block;
use crate::sstable::footer::{Footer, IndexEntry, SSTableMeta};

/// An opened table file. Supports point lookups, seeks and full scans.
///
/// On open:
/// 1. Read footer (last N bytes) → find index and meta block positions
/// 2. Read and parse index block → Vec<IndexEntry>
/// 3. Read meta block and deserialize the bloom filter
/// 4. Ready for queries (data blocks read on demand)
///
/// Shared across threads: the file handle sits behind a mutex, and the most
/// recently read block is cached because cursors re-seek into the same block
/// on every step.
pub struct SSTable {
    path: PathBuf,
    file: Mutex<File>,
    index: Vec<IndexEntry>,
    meta: SSTableMeta,
    bloom: BloomFilter,
    last_block: Mutex<Option<(usize, Arc<Block>)>>,
}

impl SSTable {
    /// Open a table file.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;

        let file_size = file.metadata()?.len();
        if file_size < Footer::SIZE as u64 {
            return Err(Error::Corruption(format!(
                "{} is too short to contain a footer",
                path.display()
            )));
        }

        file.seek(SeekFrom::Start(file_size - Footer::SIZE as u64))?;
        let mut footer_buf = vec![0u8; Footer::SIZE];
        file.read_exact(&mut footer_buf)?;
        let footer = Footer::decode(&footer_buf)?;

        let index_end = footer.index_block_offset.checked_add(footer.index_block_size);
        let meta_end = footer.meta_block_offset.checked_add(footer.meta_block_size);
        let body = file_size - Footer::SIZE as u64;
        if index_end.is_none_or(|end| end > body) || meta_end.is_none_or(|end| end > body) {
            return Err(Error::Corruption("footer points outside the file".into()));
        }

        file.seek(SeekFrom::Start(footer.index_block_offset))?;
        let mut index_buf = vec![0u8; footer.index_block_size as usize];
        file.read_exact(&mut index_buf)?;

        let mut index = Vec::new();
        let mut offset = 0usize;
        while offset < index_buf.len() {
            let (entry, consumed) = IndexEntry::decode(&index_buf[offset..])?;
            index.push(entry);
            offset += consumed;
        }

        file.seek(SeekFrom::Start(footer.meta_block_offset))?;
        let mut meta_buf = vec![0u8; footer.meta_block_size as usize];
        file.read_exact(&mut meta_buf)?;
        let (meta, bloom_bytes) = SSTableMeta::decode(&meta_buf, file_size)?;
        let bloom = BloomFilter::deserialize(&bloom_bytes)?;

        Ok(SSTable {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            index,
            meta,
            bloom,
            last_block: Mutex::new(None),
        })
    }

    fn read_block(&self, block_idx: usize) -> Result<Arc<Block>> {
        if let Some((idx, block)) = self.last_block.lock().as_ref() {
            if *idx == block_idx {
                return Ok(Arc::clone(block));
            }
        }

        let entry = &self.index[block_idx];
        let mut data = vec![0u8; entry.size as usize];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(entry.offset))?;
            file.read_exact(&mut data)?;
        }
        let block = Arc::new(Block::decode(data)?);
        *self.last_block.lock() = Some((block_idx, Arc::clone(&block)));
        Ok(block)
    }

    /// Point lookup.
    ///
    /// 1. Range check against min/max key, then the bloom filter
    /// 2. Binary search index → find the right data block
    /// 3. Binary search within the block
    pub fn get(&self, key: &[u8]) -> Result<Option<TableEntry>> {
        if self.meta.entry_count == 0
            || key < self.meta.min_key.as_slice()
            || key > self.meta.max_key.as_slice()
            || !self.bloom.may_contain(key)
        {
            return Ok(None);
        }

        let block_idx = self.index.partition_point(|e| e.last_key.as_slice() < key);
        if block_idx >= self.index.len() {
            return Ok(None);
        }
        Ok(self.read_block(block_idx)?.get(key))
    }

    /// First entry at or after `start`.
    pub fn seek(&self, start: Bound<&[u8]>) -> Result<Option<TableEntry>> {
        let (mut block_idx, key, inclusive) = match start {
            Bound::Unbounded => (0, &[][..], true),
            Bound::Included(key) => (
                self.index.partition_point(|e| e.last_key.as_slice() < key),
                key,
                true,
            ),
            Bound::Excluded(key) => (
                self.index.partition_point(|e| e.last_key.as_slice() <= key),
                key,
                false,
            ),
        };

        while block_idx < self.index.len() {
            let block = self.read_block(block_idx)?;
            let pos = block.seek(key, inclusive);
            if pos < block.len() {
                return Ok(Some(block.entry(pos)));
            }
            block_idx += 1;
        }
        Ok(None)
    }

    /// Scan every entry in key order.
    pub fn iter(&self) -> SSTableIterator<'_> {
        SSTableIterator {
            table: self,
            block_idx: 0,
            block: None,
            pos: 0,
        }
    }

    pub fn meta(&self) -> &SSTableMeta {
        &self.meta
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Memory pinned by this reader: index entries plus the bloom filter.
    pub fn reader_memory(&self) -> usize {
        let index: usize = self.index.iter().map(|e| e.last_key.len() + 16).sum();
        index + self.bloom.size_bytes()
    }
}

/// Sequential scan over a table, one block at a time.
pub struct SSTableIterator<'a> {
    table: &'a SSTable,
    block_idx: usize,
    block: Option<Arc<Block>>,
    pos: usize,
}

impl Iterator for SSTableIterator<'_> {
    type Item = Result<TableEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(block) = &self.block {
                if self.pos < block.len() {
                    let entry = block.entry(self.pos);
                    self.pos += 1;
                    return Some(Ok(entry));
                }
                self.block = None;
                self.block_idx += 1;
                self.pos = 0;
            }
            if self.block_idx >= self.table.index.len() {
                return None;
            }
            match self.table.read_block(self.block_idx) {
                Ok(block) => self.block = Some(block),
                Err(err) => {
                    self.block_idx = self.table.index.len();
                    return Some(Err(err));
                }
            }
        }
    }
}
