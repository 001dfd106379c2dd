use std::cmp::Ordering;

/// Raw key bytes.
pub type Key = Vec<u8>;

/// Raw value bytes.
pub type Value = Vec<u8>;

/// Compare two keys in the store's global order.
///
/// Unsigned lexicographic byte comparison: the first differing byte decides
/// (0..=255), and a strict prefix sorts before the longer key. This order is
/// fixed and every component (memtable, SSTable, cursors) relies on it.
pub fn compare_keys(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}

/// Distinguishes puts from deletes in the storage engine.
/// A Delete writes a tombstone: the key isn't removed, it's marked as deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// A normal put operation.
    Put = 0x01,
    /// A delete (tombstone marker).
    Delete = 0x02,
}

impl ValueType {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(ValueType::Put),
            0x02 => Some(ValueType::Delete),
            _ => None,
        }
    }
}

/// Internal key format: user key + sequence number + value type.
///
/// Ordering: (user_key ASC, sequence DESC).
/// The newest version of a key always comes first, so seeking to
/// `(key, s)` lands on the newest version visible at sequence `s`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InternalKey {
    pub user_key: Key,
    pub sequence: u64,
    pub value_type: ValueType,
}

impl InternalKey {
    pub fn new(user_key: Key, sequence: u64, value_type: ValueType) -> Self {
        InternalKey {
            user_key,
            sequence,
            value_type,
        }
    }

    /// Smallest internal key for `user_key` among versions with
    /// sequence <= `sequence`.
    pub fn seek_key(user_key: &[u8], sequence: u64) -> Self {
        InternalKey::new(user_key.to_vec(), sequence, ValueType::Delete)
    }
}

impl Ord for InternalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_keys(&self.user_key, &other.user_key)
            .then_with(|| other.sequence.cmp(&self.sequence))
            .then_with(|| (other.value_type as u8).cmp(&(self.value_type as u8)))
    }
}

impl PartialOrd for InternalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// An ordered `(key, value)` pair as returned by cursors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entry {
    pub key: Key,
    pub value: Value,
}

impl Entry {
    pub fn new(key: impl Into<Key>, value: impl Into<Value>) -> Self {
        Entry {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl<K: Into<Key>, V: Into<Value>> From<(K, V)> for Entry {
    fn from((key, value): (K, V)) -> Self {
        Entry::new(key, value)
    }
}

/// Half-open key range `[from, to)`. A missing bound is unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRange {
    pub from: Option<Key>,
    pub to: Option<Key>,
}

impl KeyRange {
    pub fn new(from: impl Into<Key>, to: impl Into<Key>) -> Self {
        KeyRange {
            from: Some(from.into()),
            to: Some(to.into()),
        }
    }

    /// The whole keyspace.
    pub fn all() -> Self {
        KeyRange::default()
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        let above = self
            .from
            .as_deref()
            .is_none_or(|from| compare_keys(key, from) != Ordering::Less);
        let below = self
            .to
            .as_deref()
            .is_none_or(|to| compare_keys(key, to) == Ordering::Less);
        above && below
    }
}
