//! Named counters and gauges pushed to an injected sink.
//!
//! The store never owns a registry; whoever embeds it wires a
//! [`MetricsSink`] to theirs. Names are `<store>-<metric>`.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// A sampled gauge. Engines report `Unavailable` for unknown properties and
/// after close, so a sampler never has to handle an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GaugeValue {
    Value(u64),
    Unavailable,
}

impl GaugeValue {
    pub fn value(&self) -> Option<u64> {
        match self {
            GaugeValue::Value(v) => Some(*v),
            GaugeValue::Unavailable => None,
        }
    }
}

impl From<u64> for GaugeValue {
    fn from(v: u64) -> Self {
        GaugeValue::Value(v)
    }
}

impl From<usize> for GaugeValue {
    fn from(v: usize) -> Self {
        GaugeValue::Value(v as u64)
    }
}

/// Receiver for store metrics.
pub trait MetricsSink: Send + Sync {
    fn incr_counter(&self, name: &str, delta: u64);
    fn set_gauge(&self, name: &str, value: GaugeValue);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn incr_counter(&self, _name: &str, _delta: u64) {}
    fn set_gauge(&self, _name: &str, _value: GaugeValue) {}
}

/// Keeps the latest value of every metric in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    counters: Mutex<BTreeMap<String, u64>>,
    gauges: Mutex<BTreeMap<String, GaugeValue>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }

    pub fn gauge(&self, name: &str) -> Option<GaugeValue> {
        self.gauges.lock().get(name).copied()
    }

    pub fn gauge_names(&self) -> Vec<String> {
        self.gauges.lock().keys().cloned().collect()
    }
}

impl MetricsSink for RecordingSink {
    fn incr_counter(&self, name: &str, delta: u64) {
        *self.counters.lock().entry(name.to_string()).or_insert(0) += delta;
    }

    fn set_gauge(&self, name: &str, value: GaugeValue) {
        self.gauges.lock().insert(name.to_string(), value);
    }
}

pub const GETS: &str = "gets";
pub const GET_ALLS: &str = "getalls";
pub const PUTS: &str = "puts";
pub const PUT_ALLS: &str = "putalls";
pub const DELETES: &str = "deletes";
pub const RANGES: &str = "ranges";
pub const ALLS: &str = "alls";
pub const FLUSHES: &str = "flushes";
pub const CHECKPOINTS: &str = "checkpoints";
pub const BYTES_READ: &str = "bytes-read";
pub const BYTES_WRITTEN: &str = "bytes-written";

/// Per-store view of the sink that prefixes metric names.
#[derive(Clone)]
pub struct StoreMetrics {
    store: String,
    sink: Arc<dyn MetricsSink>,
}

impl StoreMetrics {
    pub fn new(store: &str, sink: Arc<dyn MetricsSink>) -> Self {
        StoreMetrics {
            store: store.to_string(),
            sink,
        }
    }

    pub fn name(&self, metric: &str) -> String {
        format!("{}-{}", self.store, metric)
    }

    pub fn incr(&self, metric: &str) {
        self.add(metric, 1);
    }

    pub fn add(&self, metric: &str, delta: u64) {
        if delta > 0 {
            self.sink.incr_counter(&self.name(metric), delta);
        }
    }

    pub fn gauge(&self, metric: &str, value: GaugeValue) {
        self.sink.set_gauge(&self.name(metric), value);
    }
}
