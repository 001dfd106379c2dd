pub mod skiplist;

use std::ops::Bound;

use skiplist::{SkipList, SkipListIterator};

use crate::types::{InternalKey, ValueType};

/// Fixed per-version bookkeeping counted on top of key and value bytes
/// (sequence, type, expiry).
const VERSION_OVERHEAD: usize = 8 + 1 + 8;

/// Payload stored for one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemValue {
    /// Empty for tombstones.
    pub value: Vec<u8>,
    /// Absolute expiry in epoch millis; `None` never expires.
    pub expires_at: Option<u64>,
}

/// A version of a key as seen by a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemEntry<'a> {
    pub key: &'a [u8],
    pub sequence: u64,
    pub value_type: ValueType,
    pub value: &'a [u8],
    pub expires_at: Option<u64>,
}

impl<'a> MemEntry<'a> {
    /// The value if this version is a live put at `now`.
    pub fn live_value(&self, now: u64) -> Option<&'a [u8]> {
        match self.value_type {
            ValueType::Delete => None,
            ValueType::Put if self.expires_at.is_some_and(|at| at <= now) => None,
            ValueType::Put => Some(self.value),
        }
    }
}

fn to_entry<'a>(key: &'a InternalKey, value: &'a MemValue) -> MemEntry<'a> {
    MemEntry {
        key: &key.user_key,
        sequence: key.sequence,
        value_type: key.value_type,
        value: &value.value,
        expires_at: value.expires_at,
    }
}

/// In-memory multi-version sorted buffer. Wraps a SkipList keyed by
/// [`InternalKey`].
///
/// Every write goes here first, each with its own sequence number. Old
/// versions stay until compaction so snapshots pinned at an older sequence
/// keep reading the state they were created against.
///
/// Deletes are handled via tombstones: you can't just remove the key
/// because older versions may exist in the table on disk.
pub struct MemTable {
    data: SkipList<InternalKey, MemValue>,
    /// Bytes of the newest version of each key.
    live_bytes: usize,
    /// Bytes of versions shadowed by a newer one, kept only for readers
    /// pinned at an older sequence.
    shadowed_bytes: usize,
    distinct_keys: usize,
    min_sequence: Option<u64>,
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MemTable {
    /// Create a new empty memtable.
    pub fn new() -> Self {
        MemTable {
            data: SkipList::new(),
            live_bytes: 0,
            shadowed_bytes: 0,
            distinct_keys: 0,
            min_sequence: None,
        }
    }

    /// Insert a put version.
    pub fn put(&mut self, key: &[u8], sequence: u64, value: &[u8], expires_at: Option<u64>) {
        self.insert(
            InternalKey::new(key.to_vec(), sequence, ValueType::Put),
            MemValue {
                value: value.to_vec(),
                expires_at,
            },
        );
    }

    /// Insert a tombstone version.
    pub fn delete(&mut self, key: &[u8], sequence: u64) {
        self.insert(
            InternalKey::new(key.to_vec(), sequence, ValueType::Delete),
            MemValue {
                value: Vec::new(),
                expires_at: None,
            },
        );
    }

    /// Insert an arbitrary version. Versions normally arrive in increasing
    /// sequence order, but recovery and compaction may insert any order.
    pub fn insert(&mut self, key: InternalKey, value: MemValue) {
        let size = key.user_key.len() + value.value.len() + VERSION_OVERHEAD;
        let newest = self
            .data
            .seek(&InternalKey::seek_key(&key.user_key, u64::MAX))
            .peek()
            .filter(|(k, _)| k.user_key == key.user_key)
            .map(|(k, v)| (k.sequence, k.user_key.len() + v.value.len() + VERSION_OVERHEAD));

        match newest {
            None => {
                self.distinct_keys += 1;
                self.live_bytes += size;
            }
            Some((seq, old_size)) if seq < key.sequence => {
                self.live_bytes = self.live_bytes - old_size + size;
                self.shadowed_bytes += old_size;
            }
            // Same (key, sequence) rewritten in place.
            Some((seq, old_size)) if seq == key.sequence => {
                self.live_bytes = self.live_bytes - old_size + size;
            }
            Some(_) => {
                let old_size = self
                    .data
                    .get(&key)
                    .map_or(0, |v| key.user_key.len() + v.value.len() + VERSION_OVERHEAD);
                self.shadowed_bytes = self.shadowed_bytes - old_size + size;
            }
        }
        self.min_sequence = Some(self.min_sequence.map_or(key.sequence, |m| m.min(key.sequence)));
        self.data.insert(key, value);
    }

    /// Newest version of `key` with sequence <= `read_seq`, tombstones
    /// included. `None` means the memtable holds nothing visible for the key
    /// and the caller should fall through to the table.
    pub fn get(&self, key: &[u8], read_seq: u64) -> Option<MemEntry<'_>> {
        let (k, v) = self.data.seek(&InternalKey::seek_key(key, read_seq)).peek()?;
        (k.user_key == key).then(|| to_entry(k, v))
    }

    /// First user key at or after `start` that has a version visible at
    /// `read_seq`, returned as that newest visible version.
    pub fn seek_visible(&self, start: Bound<&[u8]>, read_seq: u64) -> Option<MemEntry<'_>> {
        let mut it = match start {
            Bound::Included(key) => self.data.seek(&InternalKey::seek_key(key, u64::MAX)),
            // Sequence 0 is never assigned, so every version of `key` sorts
            // before this target.
            Bound::Excluded(key) => self.data.seek(&InternalKey::seek_key(key, 0)),
            Bound::Unbounded => self.data.iter(),
        };
        it.find(|(k, _)| {
            k.sequence <= read_seq
                && match start {
                    Bound::Excluded(key) => k.user_key.as_slice() > key,
                    _ => true,
                }
        })
        .map(|(k, v)| to_entry(k, v))
    }

    /// Newest version of every user key as of `read_seq`, in key order.
    pub fn visible_at(&self, read_seq: u64) -> VisibleVersions<'_> {
        VisibleVersions {
            inner: self.data.iter(),
            read_seq,
            last_key: None,
        }
    }

    /// Every version, newest first within a key.
    pub fn iter(&self) -> impl Iterator<Item = MemEntry<'_>> {
        self.data.iter().map(|(k, v)| to_entry(k, v))
    }

    /// Copy of the versions with sequence > `sequence`.
    pub fn retain_newer_than(&self, sequence: u64) -> MemTable {
        let mut retained = MemTable::new();
        for (k, v) in self.data.iter() {
            if k.sequence > sequence {
                retained.insert(k.clone(), v.clone());
            }
        }
        retained
    }

    /// Number of versions held.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Approximate memory usage in bytes.
    pub fn size(&self) -> usize {
        self.live_bytes + self.shadowed_bytes
    }

    pub fn live_bytes(&self) -> usize {
        self.live_bytes
    }

    pub fn shadowed_bytes(&self) -> usize {
        self.shadowed_bytes
    }

    pub fn distinct_keys(&self) -> usize {
        self.distinct_keys
    }

    /// Smallest sequence held, if any.
    pub fn min_sequence(&self) -> Option<u64> {
        self.min_sequence
    }
}

/// Iterator yielding the newest version <= `read_seq` per user key,
/// tombstones included.
pub struct VisibleVersions<'a> {
    inner: SkipListIterator<'a, InternalKey, MemValue>,
    read_seq: u64,
    last_key: Option<&'a [u8]>,
}

impl<'a> Iterator for VisibleVersions<'a> {
    type Item = MemEntry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        for (k, v) in self.inner.by_ref() {
            if k.sequence > self.read_seq || self.last_key == Some(k.user_key.as_slice()) {
                continue;
            }
            self.last_key = Some(&k.user_key);
            return Some(to_entry(k, v));
        }
        None
    }
}
