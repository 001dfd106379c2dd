use std::fmt;
use std::io;
use std::panic::Location;
use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

/// Unified error type for the state store, its engine and the control codec.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error from disk operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Data corruption detected (CRC mismatch, bad format, etc).
    #[error("Corruption: {0}")]
    Corruption(String),

    /// Invalid or unparsable configuration. Store construction aborts.
    #[error("invalid configuration `{key}`: {reason}")]
    FatalConfig { key: String, reason: String },

    /// The storage engine refused to open.
    #[error("failed to open storage engine at {}: {source}", path.display())]
    EngineOpen {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// The engine handle was used after it was closed.
    #[error("storage engine is closed")]
    EngineClosed,

    /// A data operation was attempted after `close()`.
    #[error("store `{store}` is closed (closed at {closed_at})")]
    StoreClosed { store: String, closed_at: CloseContext },

    /// A required argument was missing or malformed. Always a caller error.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A cursor was used after `close()`.
    #[error("iterator is closed")]
    IteratorClosed,

    /// `next()` was called on an exhausted cursor.
    #[error("no more elements in iterator")]
    NoSuchElement,

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    /// An intermediate message carried no message-type byte.
    #[error(
        "error reading the message type from intermediate message: the payload is empty. \
         Streams written before message types were introduced cannot be decoded; reset the \
         checkpoint to the newest offset, drain the old messages, or wait until they age out \
         of retention"
    )]
    LegacyFormat,

    /// Decoded a message-type tag with no known mapping.
    #[error("message type {0} is not supported")]
    UnsupportedMessageType(u8),

    /// Asked for a message type that does not exist.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// The checkpoint export directory already exists.
    #[error("checkpoint directory already exists: {}", .0.display())]
    CheckpointExists(PathBuf),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Where and when a store was closed. Carried by [`Error::StoreClosed`] so a
/// late caller can find the close that beat it.
#[derive(Debug, Clone)]
pub struct CloseContext {
    pub location: &'static Location<'static>,
    pub thread: String,
    pub at: DateTime<Utc>,
}

impl CloseContext {
    pub fn capture(location: &'static Location<'static>) -> Self {
        let current = std::thread::current();
        CloseContext {
            location,
            thread: current.name().unwrap_or("<unnamed>").to_string(),
            at: Utc::now(),
        }
    }
}

impl fmt::Display for CloseContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on thread '{}' at {}",
            self.location,
            self.thread,
            self.at.to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }
}
