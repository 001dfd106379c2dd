pub mod reader;
pub mod record;
pub mod writer;

use std::fmt;
use std::str::FromStr;

pub use record::{RecordType, WALOp, WALRecord};

/// Controls when the WAL is fsync'd to disk.
///
/// Trade-off: durability vs throughput.
///   - EveryWrite: zero data loss, ~10x slower (each fsync waits for disk)
///   - EveryNWrites: batched durability, lose up to N writes on crash
///   - EveryNMillis: bounded loss window, much higher throughput
///
/// `StateStore::flush()` always forces an fsync regardless of policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPolicy {
    /// fsync after every record. Safest, slowest.
    EveryWrite,
    /// fsync every N records. Batched durability.
    EveryNWrites(usize),
    /// fsync on the first append at least N millis after the last sync.
    EveryNMillis(u64),
}

impl Default for SyncPolicy {
    fn default() -> Self {
        SyncPolicy::EveryNMillis(1000)
    }
}

impl fmt::Display for SyncPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPolicy::EveryWrite => write!(f, "every-write"),
            SyncPolicy::EveryNWrites(n) => write!(f, "every-n-writes:{n}"),
            SyncPolicy::EveryNMillis(ms) => write!(f, "every-n-millis:{ms}"),
        }
    }
}

impl FromStr for SyncPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s == "every-write" {
            return Ok(SyncPolicy::EveryWrite);
        }
        let (kind, n) = s
            .split_once(':')
            .ok_or_else(|| format!("unrecognized sync policy `{s}`"))?;
        let n: u64 = n
            .trim()
            .parse()
            .map_err(|_| format!("sync policy count `{n}` is not a number"))?;
        if n == 0 {
            return Err("sync policy count must be positive".to_string());
        }
        match kind {
            "every-n-writes" => Ok(SyncPolicy::EveryNWrites(n as usize)),
            "every-n-millis" => Ok(SyncPolicy::EveryNMillis(n)),
            _ => Err(format!("unrecognized sync policy `{kind}`")),
        }
    }
}
