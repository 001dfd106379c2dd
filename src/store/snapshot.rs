use std::panic::Location;
use std::sync::Arc;

use crate::engine::StorageEngine;
use crate::error::Result;
use crate::store::cursor::StoreCursor;
use crate::store::leak::{LeakToken, LeakTracker, ResourceKind};
use crate::types::KeyRange;

/// A fixed read view over `[from, to)` that mints cursors until released.
///
/// Writes made after the snapshot was taken are invisible to its cursors.
/// While it lives the engine keeps every version it can see, so hold it only
/// as long as needed. Release happens exactly once: [`release`](Self::release)
/// consumes the handle and drop releases whatever was not released.
pub struct StoreSnapshot<E: StorageEngine> {
    engine: Arc<E>,
    /// Only an `Option` so `Drop` can hand it back. `release` consumes the
    /// handle, so a reachable snapshot always holds `Some`.
    snapshot: Option<E::Snapshot>,
    range: KeyRange,
    leaks: Option<Arc<LeakTracker>>,
    _token: Option<LeakToken>,
}

impl<E: StorageEngine> StoreSnapshot<E> {
    pub(crate) fn new(
        engine: Arc<E>,
        snapshot: E::Snapshot,
        range: KeyRange,
        leaks: Option<Arc<LeakTracker>>,
        location: &'static Location<'static>,
    ) -> Self {
        let token = leaks
            .as_ref()
            .map(|tracker| tracker.register(ResourceKind::Snapshot, location));
        StoreSnapshot {
            engine,
            snapshot: Some(snapshot),
            range,
            leaks,
            _token: token,
        }
    }

    /// A new cursor over the snapshot's range, reading the snapshot's view.
    #[track_caller]
    pub fn cursor(&self) -> Result<StoreCursor> {
        let location = Location::caller();
        let inner = self.engine.new_cursor(&self.range, self.snapshot.as_ref())?;
        let token = self
            .leaks
            .as_ref()
            .map(|tracker| tracker.register(ResourceKind::Cursor, location));
        Ok(StoreCursor::new(inner, self.range.to.clone(), token))
    }

    pub fn range(&self) -> &KeyRange {
        &self.range
    }

    /// Give the read view back to the engine.
    pub fn release(mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.engine.release_snapshot(snapshot);
        }
    }
}

impl<E: StorageEngine> Drop for StoreSnapshot<E> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.engine.release_snapshot(snapshot);
        }
    }
}
