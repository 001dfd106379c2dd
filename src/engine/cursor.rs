use std::ops::Bound;
use std::sync::Arc;

use crate::engine::version::{EngineSnapshot, Shared};
use crate::error::Result;
use crate::iterator::StorageIterator;
use crate::types::{Key, KeyRange, Value};

/// Cursor over an engine's merged memtable and table state at a pinned
/// sequence.
///
/// Each step re-seeks past the current key instead of holding iterators
/// into the memtable, so the cursor never blocks writers or compaction.
/// The pin keeps every version it can see alive until the cursor drops.
pub struct EngineCursor {
    shared: Arc<Shared>,
    pin: EngineSnapshot,
    lower: Option<Key>,
    upper: Option<Key>,
    current: Option<(Key, Value)>,
}

impl EngineCursor {
    pub(crate) fn open(
        shared: &Arc<Shared>,
        range: &KeyRange,
        snapshot: Option<&EngineSnapshot>,
    ) -> Result<Self> {
        shared.check_open()?;
        let pin = match snapshot {
            Some(snapshot) => shared.pin_at(snapshot)?,
            None => shared.pin(),
        };
        let start = match &range.from {
            Some(from) => Bound::Included(from.as_slice()),
            None => Bound::Unbounded,
        };
        let current = shared.seek_visible(start, range.to.as_deref(), pin.sequence())?;
        Ok(EngineCursor {
            shared: Arc::clone(shared),
            pin,
            lower: range.from.clone(),
            upper: range.to.clone(),
            current,
        })
    }

    /// Sequence the cursor reads at.
    pub fn sequence(&self) -> u64 {
        self.pin.sequence()
    }
}

impl StorageIterator for EngineCursor {
    fn key(&self) -> &[u8] {
        self.current.as_ref().map_or(&[][..], |(k, _)| k.as_slice())
    }

    fn value(&self) -> &[u8] {
        self.current.as_ref().map_or(&[][..], |(_, v)| v.as_slice())
    }

    fn is_valid(&self) -> bool {
        self.current.is_some()
    }

    fn next(&mut self) -> Result<()> {
        self.shared.check_open()?;
        let Some((key, _)) = &self.current else {
            return Ok(());
        };
        // On error the cursor stays on the current entry.
        let next = self.shared.seek_visible(
            Bound::Excluded(key.as_slice()),
            self.upper.as_deref(),
            self.pin.sequence(),
        )?;
        self.current = next;
        Ok(())
    }

    /// Seeks never leave the cursor's range.
    fn seek(&mut self, key: &[u8]) -> Result<()> {
        self.shared.check_open()?;
        let target = match self.lower.as_deref() {
            Some(lower) if lower > key => lower,
            _ => key,
        };
        self.current = self.shared.seek_visible(
            Bound::Included(target),
            self.upper.as_deref(),
            self.pin.sequence(),
        )?;
        Ok(())
    }
}
