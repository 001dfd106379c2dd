//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Once};

use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use task_state::{
    DiskEngine, Entry, MemoryEngine, RecordingSink, StateStore, StoreConfig, StoreCursor,
};

static TRACING: Once = Once::new();

/// Route engine logs through the test harness. `RUST_LOG=task_state=debug`
/// shows them for a failing test.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A store directory inside a scratch root, so checkpoints taken next to it
/// are cleaned up too.
pub struct Scratch {
    pub root: TempDir,
}

impl Scratch {
    pub fn new() -> Self {
        init_tracing();
        Scratch {
            root: TempDir::new().unwrap(),
        }
    }

    pub fn store_dir(&self) -> PathBuf {
        self.root.path().join("store")
    }
}

pub fn open_store(scratch: &Scratch, config: StoreConfig) -> (StateStore, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let store = StateStore::open("orders", scratch.store_dir(), config, sink.clone()).unwrap();
    (store, sink)
}

pub fn open_disk_store(scratch: &Scratch) -> StateStore<DiskEngine> {
    open_store(scratch, StoreConfig::default()).0
}

pub fn open_memory_store(scratch: &Scratch) -> StateStore<MemoryEngine> {
    StateStore::open(
        "orders",
        scratch.store_dir(),
        StoreConfig::default(),
        Arc::new(RecordingSink::new()),
    )
    .unwrap()
}

/// Drain a cursor into `(key, value)` string pairs.
pub fn collect(cursor: StoreCursor) -> Vec<(String, String)> {
    cursor
        .map(|entry| {
            let Entry { key, value } = entry.unwrap();
            (
                String::from_utf8(key).unwrap(),
                String::from_utf8(value).unwrap(),
            )
        })
        .collect()
}

pub fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
