pub mod merge;

use crate::error::Result;

/// The central iteration abstraction for the storage engine.
///
/// Engine cursors implement this trait and the state store wraps them in a
/// bounded, look-ahead `StoreCursor`. An alternative engine only has to
/// provide something with these five operations.
pub trait StorageIterator {
    /// Returns the current key. Only valid when is_valid() is true.
    fn key(&self) -> &[u8];

    /// Returns the current value. Only valid when is_valid() is true.
    fn value(&self) -> &[u8];

    /// Returns true if the iterator is positioned at a valid entry.
    fn is_valid(&self) -> bool;

    /// Advances to the next entry. Returns error on IO failure.
    fn next(&mut self) -> Result<()>;

    /// Positions the iterator at the first entry with key >= target.
    fn seek(&mut self, key: &[u8]) -> Result<()>;
}
