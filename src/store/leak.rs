use std::collections::HashMap;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use tracing::warn;

/// Kinds of resources a store hands out and expects back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Cursor,
    Snapshot,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Cursor => f.write_str("cursor"),
            ResourceKind::Snapshot => f.write_str("snapshot"),
        }
    }
}

#[derive(Debug)]
struct OpenResource {
    kind: ResourceKind,
    location: &'static Location<'static>,
    opened_at: DateTime<Utc>,
}

/// Registry of cursors and snapshots that have not been released yet.
///
/// Purely diagnostic: release is driven by ownership, and the tracker only
/// reports what is still open when the store closes.
#[derive(Debug)]
pub struct LeakTracker {
    store: String,
    next_id: AtomicU64,
    open: Mutex<HashMap<u64, OpenResource>>,
}

impl LeakTracker {
    pub fn new(store: &str) -> Arc<Self> {
        Arc::new(LeakTracker {
            store: store.to_string(),
            next_id: AtomicU64::new(0),
            open: Mutex::new(HashMap::new()),
        })
    }

    pub fn register(
        self: &Arc<Self>,
        kind: ResourceKind,
        location: &'static Location<'static>,
    ) -> LeakToken {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.open.lock().insert(
            id,
            OpenResource {
                kind,
                location,
                opened_at: Utc::now(),
            },
        );
        LeakToken {
            id,
            tracker: Arc::clone(self),
        }
    }

    pub fn open_count(&self, kind: ResourceKind) -> usize {
        self.open.lock().values().filter(|r| r.kind == kind).count()
    }

    /// Log every resource still open and return how many there are.
    pub fn report(&self) -> usize {
        let open = self.open.lock();
        for resource in open.values() {
            warn!(
                store = %self.store,
                kind = %resource.kind,
                opened_at = %resource.opened_at.to_rfc3339_opts(SecondsFormat::Millis, true),
                location = %resource.location,
                "leaked {} still open at store close",
                resource.kind
            );
        }
        open.len()
    }

    fn release(&self, id: u64) {
        self.open.lock().remove(&id);
    }
}

/// Registration handle; dropping it marks the resource released.
#[derive(Debug)]
pub struct LeakToken {
    id: u64,
    tracker: Arc<LeakTracker>,
}

impl Drop for LeakToken {
    fn drop(&mut self) {
        self.tracker.release(self.id);
    }
}
