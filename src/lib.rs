//! # task-state
//!
//! Durable, ordered key-value state for stream-processing tasks, and the
//! framing that carries control signals next to user records.
//!
//! ## Core idea
//! Each task owns a [`StateStore`]: point lookups, half-open range scans,
//! atomic batches, snapshots and point-in-time checkpoints over a small
//! engine (one multi-version memtable, one sorted table, one write-ahead
//! log). Watermark, end-of-stream and drain messages travel on the same
//! channel as user data through [`IntermediateMessageCodec`]; when a
//! [`SignalTracker`] sees every upstream task report, the task checkpoints.

pub mod bloom;
pub mod clock;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod iterator;
pub mod memtable;
pub mod metrics;
pub mod sstable;
pub mod store;
pub mod types;
pub mod wal;

// Public re-exports for the top-level API
pub use clock::{Clock, SystemClock, TestingClock};
pub use config::StoreConfig;
pub use control::{
    ControlMessage, DrainMessage, EndOfStreamMessage, IntermediateMessageCodec, MessageType,
    Signal, SignalTracker, WatermarkMessage,
};
pub use engine::{DiskEngine, EngineOptions, MemoryEngine, StorageEngine, WriteBatch};
pub use error::{Error, Result};
pub use metrics::{GaugeValue, MetricsSink, NoopSink, RecordingSink};
pub use store::{CheckpointId, StateStore, StoreCursor, StoreSnapshot};
pub use types::{Entry, Key, KeyRange, Value};
