use std::cmp::Ordering;
use std::iter::Peekable;

use crate::error::Result;
use crate::types::Key;

/// One resolved version produced while folding sources together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedEntry {
    pub key: Key,
    /// `None` is a tombstone.
    pub value: Option<Vec<u8>>,
    pub expires_at: Option<u64>,
}

impl MergedEntry {
    /// Whether the entry survives into a table written at `now`.
    pub fn is_live(&self, now: u64) -> bool {
        self.value.is_some() && self.expires_at.is_none_or(|at| at > now)
    }
}

/// Merges two sorted sources into a single sorted stream.
///
/// Used by compaction and checkpoint export to fold the memtable's view
/// (`newer`) over the previous table (`older`). When both sources hold the
/// same key, the newer entry wins and the older one is discarded.
/// Tombstones pass through; the caller decides what to drop.
pub struct MergeIterator<N, O>
where
    N: Iterator<Item = Result<MergedEntry>>,
    O: Iterator<Item = Result<MergedEntry>>,
{
    newer: Peekable<N>,
    older: Peekable<O>,
}

impl<N, O> MergeIterator<N, O>
where
    N: Iterator<Item = Result<MergedEntry>>,
    O: Iterator<Item = Result<MergedEntry>>,
{
    pub fn new(newer: N, older: O) -> Self {
        MergeIterator {
            newer: newer.peekable(),
            older: older.peekable(),
        }
    }
}

impl<N, O> Iterator for MergeIterator<N, O>
where
    N: Iterator<Item = Result<MergedEntry>>,
    O: Iterator<Item = Result<MergedEntry>>,
{
    type Item = Result<MergedEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        // Errors surface as soon as they are at the front of either source.
        let order = match (self.newer.peek(), self.older.peek()) {
            (None, None) => return None,
            (Some(Err(_)), _) | (Some(_), None) => Ordering::Less,
            (_, Some(Err(_))) | (None, Some(_)) => Ordering::Greater,
            (Some(Ok(n)), Some(Ok(o))) => n.key.cmp(&o.key),
        };
        match order {
            Ordering::Less => self.newer.next(),
            Ordering::Greater => self.older.next(),
            Ordering::Equal => {
                self.older.next();
                self.newer.next()
            }
        }
    }
}
