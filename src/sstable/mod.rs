//! Immutable sorted table files.
//!
//! ```text
//! ┌────────────┬─────┬────────────┬─────────────┬────────────┬────────┐
//! │ Data blk 0 │ ... │ Data blk N │ Index block │ Meta block │ Footer │
//! └────────────┴─────┴────────────┴─────────────┴────────────┴────────┘
//! ```
//!
//! A store keeps one live table (its compacted base) and every checkpoint
//! is a directory holding one table.

pub mod block;
pub mod builder;
pub mod footer;
pub mod reader;

pub use builder::SSTableBuilder;
pub use footer::SSTableMeta;
pub use reader::{SSTable, SSTableIterator};

use crate::types::{Key, Value};

/// A live entry stored in a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub key: Key,
    pub value: Value,
    pub expires_at: Option<u64>,
}

impl TableEntry {
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}
