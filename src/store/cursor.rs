use tracing::debug;

use crate::error::{Error, Result};
use crate::iterator::StorageIterator;
use crate::store::leak::LeakToken;
use crate::types::{Entry, Key, compare_keys};

/// Look-ahead cursor over `[from, to)`.
///
/// The cursor always sits on the entry the next call to
/// [`next_entry`](Self::next_entry) returns. It owns its engine cursor and
/// the read sequence that cursor pinned; both are released by
/// [`close`](Self::close) or on drop.
pub struct StoreCursor {
    inner: Option<Box<dyn StorageIterator + Send>>,
    to: Option<Key>,
    leak: Option<LeakToken>,
}

impl StoreCursor {
    pub(crate) fn new(
        inner: Box<dyn StorageIterator + Send>,
        to: Option<Key>,
        leak: Option<LeakToken>,
    ) -> Self {
        StoreCursor {
            inner: Some(inner),
            to,
            leak,
        }
    }

    fn inner(&self) -> Result<&(dyn StorageIterator + Send)> {
        self.inner.as_deref().ok_or(Error::IteratorClosed)
    }

    /// Whether another entry remains inside the range.
    pub fn has_next(&self) -> Result<bool> {
        let inner = self.inner()?;
        Ok(inner.is_valid()
            && self
                .to
                .as_deref()
                .is_none_or(|to| compare_keys(inner.key(), to).is_lt()))
    }

    /// Return the current entry and advance. If the advance fails the
    /// cursor keeps its position, so a retry returns the same entry.
    pub fn next_entry(&mut self) -> Result<Entry> {
        if !self.has_next()? {
            return Err(Error::NoSuchElement);
        }
        let inner = self.inner.as_mut().ok_or(Error::IteratorClosed)?;
        let entry = Entry::new(inner.key(), inner.value());
        inner.next()?;
        Ok(entry)
    }

    /// Cursors are read-only.
    pub fn remove(&mut self) -> Result<()> {
        Err(Error::UnsupportedOperation(
            "remove is not supported on store cursors",
        ))
    }

    /// Release the engine cursor. Idempotent.
    pub fn close(&mut self) {
        self.inner = None;
        self.leak = None;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

impl Iterator for StoreCursor {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.has_next() {
            Ok(true) => Some(self.next_entry()),
            Ok(false) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

impl Drop for StoreCursor {
    fn drop(&mut self) {
        if !self.is_closed() {
            debug!("store cursor dropped without close");
        }
    }
}

impl std::fmt::Debug for StoreCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreCursor")
            .field("closed", &self.is_closed())
            .field("to", &self.to)
            .finish()
    }
}
