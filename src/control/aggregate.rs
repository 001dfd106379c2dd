use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::control::{ControlMessage, DrainMessage, EndOfStreamMessage, WatermarkMessage};

/// A stream-level signal produced once enough upstream tasks reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Every upstream task finished the stream.
    EndOfStream,
    /// Every upstream task drained the stream.
    Drain,
    /// The stream's watermark advanced to this timestamp.
    Watermark(i64),
}

#[derive(Debug, Default)]
struct StreamSignals {
    /// Task count announced by the most recent control message.
    task_count: u32,
    end_of_stream: HashSet<String>,
    drained: HashSet<String>,
    watermarks: HashMap<String, i64>,
    emitted_watermark: Option<i64>,
}

impl StreamSignals {
    fn complete(&self, reported: &HashSet<String>) -> bool {
        self.task_count > 0 && reported.len() >= self.task_count as usize
    }

    /// Minimum over all upstream tasks, once every task reported one.
    fn aggregated_watermark(&self) -> Option<i64> {
        if self.task_count == 0 || self.watermarks.len() < self.task_count as usize {
            return None;
        }
        self.watermarks.values().copied().min()
    }
}

/// Folds control messages from all upstream tasks of each input stream into
/// stream-level signals.
///
/// A downstream task feeds every decoded control message here and reacts to
/// the returned [`Signal`], typically by checkpointing its stores.
#[derive(Debug, Default)]
pub struct SignalTracker {
    streams: HashMap<String, StreamSignals>,
}

impl SignalTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message. Returns the signal it completes, if any; user
    /// records never produce one.
    pub fn observe<T>(&mut self, stream: &str, message: &ControlMessage<T>) -> Option<Signal> {
        match message {
            ControlMessage::User(_) => None,
            ControlMessage::Watermark(m) => self.on_watermark(stream, m).map(Signal::Watermark),
            ControlMessage::EndOfStream(m) => {
                self.on_end_of_stream(stream, m).then_some(Signal::EndOfStream)
            }
            ControlMessage::Drain(m) => self.on_drain(stream, m).then_some(Signal::Drain),
        }
    }

    fn stream(&mut self, stream: &str, task_count: u32) -> &mut StreamSignals {
        let signals = self.streams.entry(stream.to_string()).or_default();
        signals.task_count = task_count;
        signals
    }

    /// True exactly once: when the last missing task reports.
    pub fn on_end_of_stream(&mut self, stream: &str, message: &EndOfStreamMessage) -> bool {
        let signals = self.stream(stream, message.task_count);
        let was_complete = signals.complete(&signals.end_of_stream);
        signals.end_of_stream.insert(message.task_name.clone());
        let now_complete = signals.complete(&signals.end_of_stream);
        if now_complete && !was_complete {
            debug!(stream, tasks = message.task_count, "end of stream reached");
        }
        now_complete && !was_complete
    }

    /// True exactly once: when the last missing task reports.
    pub fn on_drain(&mut self, stream: &str, message: &DrainMessage) -> bool {
        let signals = self.stream(stream, message.task_count);
        let was_complete = signals.complete(&signals.drained);
        signals.drained.insert(message.task_name.clone());
        let now_complete = signals.complete(&signals.drained);
        if now_complete && !was_complete {
            debug!(stream, tasks = message.task_count, run_id = ?message.run_id, "stream drained");
        }
        now_complete && !was_complete
    }

    /// The stream's new watermark if this message advanced it.
    ///
    /// Per task the watermark never moves backwards; stale messages are
    /// ignored.
    pub fn on_watermark(&mut self, stream: &str, message: &WatermarkMessage) -> Option<i64> {
        let signals = self.stream(stream, message.task_count);
        let task = signals
            .watermarks
            .entry(message.task_name.clone())
            .or_insert(message.timestamp);
        *task = (*task).max(message.timestamp);

        let aggregated = signals.aggregated_watermark()?;
        if signals.emitted_watermark.is_some_and(|emitted| emitted >= aggregated) {
            return None;
        }
        signals.emitted_watermark = Some(aggregated);
        debug!(stream, watermark = aggregated, "watermark advanced");
        Some(aggregated)
    }

    pub fn is_end_of_stream(&self, stream: &str) -> bool {
        self.streams
            .get(stream)
            .is_some_and(|s| s.complete(&s.end_of_stream))
    }

    pub fn is_drained(&self, stream: &str) -> bool {
        self.streams
            .get(stream)
            .is_some_and(|s| s.complete(&s.drained))
    }

    /// Last watermark emitted for the stream.
    pub fn watermark(&self, stream: &str) -> Option<i64> {
        self.streams.get(stream).and_then(|s| s.emitted_watermark)
    }

    /// Whether every stream seen so far reached end of stream.
    pub fn all_end_of_stream(&self) -> bool {
        !self.streams.is_empty()
            && self
                .streams
                .values()
                .all(|s| s.complete(&s.end_of_stream))
    }
}
