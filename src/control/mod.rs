//! Control messages multiplexed with user records on intermediate streams.
//!
//! Wire format: one tag byte followed by the payload.
//!
//! ```text
//! ┌─────┬──────────────────────────────────────────────┐
//! │ tag │ payload                                      │
//! ├─────┼──────────────────────────────────────────────┤
//! │  0  │ user record, encoded by the injected serde   │
//! │  1  │ watermark, JSON                              │
//! │  2  │ end-of-stream, JSON                          │
//! │  3  │ drain, JSON                                  │
//! └─────┴──────────────────────────────────────────────┘
//! ```
//!
//! Control payloads carry an explicit `version` and the sending task's name
//! and task count, so a downstream task knows when every upstream task has
//! reported a signal.

pub mod aggregate;
pub mod codec;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use aggregate::{Signal, SignalTracker};
pub use codec::{BytesSerde, IntermediateMessageCodec, JsonSerde, Serde, StringSerde};

use crate::error::{Error, Result};

/// Version written into every control payload.
pub const CONTROL_MESSAGE_VERSION: u32 = 1;

fn default_version() -> u32 {
    CONTROL_MESSAGE_VERSION
}

/// No record with an event time below `timestamp` will follow from the
/// sending task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatermarkMessage {
    #[serde(default = "default_version")]
    pub version: u32,
    pub task_name: String,
    pub task_count: u32,
    pub timestamp: i64,
}

impl WatermarkMessage {
    pub fn new(timestamp: i64, task_name: impl Into<String>, task_count: u32) -> Self {
        WatermarkMessage {
            version: CONTROL_MESSAGE_VERSION,
            task_name: task_name.into(),
            task_count,
            timestamp,
        }
    }
}

/// The sending task finished its input for good.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndOfStreamMessage {
    #[serde(default = "default_version")]
    pub version: u32,
    pub task_name: String,
    pub task_count: u32,
}

impl EndOfStreamMessage {
    pub fn new(task_name: impl Into<String>, task_count: u32) -> Self {
        EndOfStreamMessage {
            version: CONTROL_MESSAGE_VERSION,
            task_name: task_name.into(),
            task_count,
        }
    }
}

/// The sending task is being quiesced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainMessage {
    #[serde(default = "default_version")]
    pub version: u32,
    pub task_name: String,
    pub task_count: u32,
    /// Deployment run the drain belongs to, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl DrainMessage {
    pub fn new(task_name: impl Into<String>, task_count: u32) -> Self {
        DrainMessage {
            version: CONTROL_MESSAGE_VERSION,
            task_name: task_name.into(),
            task_count,
            run_id: None,
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }
}

/// Everything that travels on an intermediate stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage<T> {
    User(T),
    Watermark(WatermarkMessage),
    EndOfStream(EndOfStreamMessage),
    Drain(DrainMessage),
}

impl<T> ControlMessage<T> {
    pub fn message_type(&self) -> MessageType {
        MessageType::of(self)
    }

    pub fn is_control(&self) -> bool {
        !matches!(self, ControlMessage::User(_))
    }

    /// Sending task of a control message.
    pub fn task_name(&self) -> Option<&str> {
        match self {
            ControlMessage::User(_) => None,
            ControlMessage::Watermark(m) => Some(&m.task_name),
            ControlMessage::EndOfStream(m) => Some(&m.task_name),
            ControlMessage::Drain(m) => Some(&m.task_name),
        }
    }
}

/// Message kinds and their wire tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    UserMessage = 0,
    Watermark = 1,
    EndOfStream = 2,
    Drain = 3,
}

/// Indexed by tag.
const BY_TAG: [MessageType; 4] = [
    MessageType::UserMessage,
    MessageType::Watermark,
    MessageType::EndOfStream,
    MessageType::Drain,
];

impl MessageType {
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// `None` for tags with no mapping.
    pub fn from_tag(tag: u8) -> Option<Self> {
        BY_TAG.get(usize::from(tag)).copied()
    }

    pub fn of<T>(message: &ControlMessage<T>) -> Self {
        match message {
            ControlMessage::User(_) => MessageType::UserMessage,
            ControlMessage::Watermark(_) => MessageType::Watermark,
            ControlMessage::EndOfStream(_) => MessageType::EndOfStream,
            ControlMessage::Drain(_) => MessageType::Drain,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MessageType::UserMessage => "USER_MESSAGE",
            MessageType::Watermark => "WATERMARK",
            MessageType::EndOfStream => "END_OF_STREAM",
            MessageType::Drain => "DRAIN",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MessageType {
    type Err = Error;

    /// Accepts the canonical names in any case, with `-` or `_`.
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        BY_TAG
            .iter()
            .copied()
            .find(|t| t.name() == normalized)
            .ok_or_else(|| Error::UnknownMessageType(s.to_string()))
    }
}
