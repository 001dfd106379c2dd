//! The task-facing state store.
//!
//! A [`StateStore`] wraps one engine behind a lifecycle cell. Data
//! operations share the cell's read lock, so they run concurrently with each
//! other and only exclude `close()`, which takes the write lock and moves
//! the store to `Closed` for good.

pub mod cursor;
pub mod leak;
pub mod snapshot;

use std::fmt;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

pub use cursor::StoreCursor;
pub use leak::{LeakToken, LeakTracker, ResourceKind};
pub use snapshot::StoreSnapshot;

use crate::config::StoreConfig;
use crate::engine::{DiskEngine, StorageEngine, WriteBatch, property};
use crate::error::{CloseContext, Error, Result};
use crate::metrics::{self, GaugeValue, MetricsSink, StoreMetrics};
use crate::types::{Key, KeyRange, Value};

/// Externally assigned checkpoint name. Must be usable as one path
/// component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CheckpointId(String);

impl CheckpointId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty()
            || id == "."
            || id == ".."
            || id.contains(['/', '\\', '\0'])
        {
            return Err(Error::InvalidArgument(format!(
                "checkpoint id `{id}` is not a single path component"
            )));
        }
        Ok(CheckpointId(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CheckpointId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CheckpointId::new(s)
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

enum Lifecycle<E> {
    Open(Arc<E>),
    Closed(CloseContext),
}

/// A named, durable, ordered key-value store owned by one task.
pub struct StateStore<E: StorageEngine = DiskEngine> {
    name: String,
    dir: PathBuf,
    config: StoreConfig,
    state: RwLock<Lifecycle<E>>,
    metrics: StoreMetrics,
    leaks: Option<Arc<LeakTracker>>,
}

impl<E: StorageEngine> StateStore<E> {
    /// Open the store `name` rooted at `dir`, creating it if absent.
    pub fn open(
        name: &str,
        dir: impl AsRef<Path>,
        config: StoreConfig,
        sink: Arc<dyn MetricsSink>,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let engine = E::open(&dir, config.engine.clone())?;
        info!(
            store = %name,
            path = %dir.display(),
            ttl_ms = config.engine.ttl.map(|ttl| ttl.as_millis() as u64),
            wal_enabled = config.engine.wal_enabled,
            auto_compaction = config.engine.auto_compaction,
            "opened state store"
        );
        Ok(StateStore {
            name: name.to_string(),
            leaks: config.leak_detection.then(|| LeakTracker::new(name)),
            metrics: StoreMetrics::new(name, sink),
            state: RwLock::new(Lifecycle::Open(Arc::new(engine))),
            dir,
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.state.read(), Lifecycle::Closed(_))
    }

    /// Run `f` against the engine while holding the lifecycle read lock.
    fn with_engine<T>(&self, f: impl FnOnce(&Arc<E>) -> Result<T>) -> Result<T> {
        let state = self.state.read();
        match &*state {
            Lifecycle::Open(engine) => f(engine),
            Lifecycle::Closed(closed_at) => Err(Error::StoreClosed {
                store: self.name.clone(),
                closed_at: closed_at.clone(),
            }),
        }
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Value>> {
        self.with_engine(|engine| {
            let value = engine.get(key)?;
            self.metrics.incr(metrics::GETS);
            self.metrics
                .add(metrics::BYTES_READ, value.as_ref().map_or(0, |v| v.len() as u64));
            Ok(value)
        })
    }

    /// Look up every key; the result follows the order of `keys` and holds
    /// `None` for missing ones.
    pub fn get_all<K: AsRef<[u8]>>(&self, keys: &[K]) -> Result<Vec<(Key, Option<Value>)>> {
        self.with_engine(|engine| {
            let lookup: Vec<&[u8]> = keys.iter().map(AsRef::as_ref).collect();
            let values = engine.multi_get(&lookup)?;
            self.metrics.incr(metrics::GET_ALLS);
            let read: usize = values.iter().flatten().map(Vec::len).sum();
            self.metrics.add(metrics::BYTES_READ, read as u64);
            Ok(lookup
                .into_iter()
                .map(<[u8]>::to_vec)
                .zip(values)
                .collect())
        })
    }

    /// `None` deletes the key.
    pub fn put(&self, key: &[u8], value: Option<&[u8]>) -> Result<()> {
        let Some(value) = value else {
            return self.delete(key);
        };
        self.with_engine(|engine| {
            engine.put(key, value)?;
            self.metrics.incr(metrics::PUTS);
            self.metrics
                .add(metrics::BYTES_WRITTEN, (key.len() + value.len()) as u64);
            Ok(())
        })
    }

    /// Apply all entries as one atomic batch. `None` values delete; later
    /// entries for the same key win.
    pub fn put_all<I, K, V>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: Into<Key>,
        V: Into<Value>,
    {
        let mut batch = WriteBatch::new();
        for (key, value) in entries {
            match value {
                Some(value) => batch.put(key, value),
                None => batch.delete(key),
            };
        }
        self.with_engine(|engine| {
            let written = batch.size_bytes();
            engine.write_batch(batch)?;
            self.metrics.incr(metrics::PUT_ALLS);
            self.metrics.add(metrics::BYTES_WRITTEN, written as u64);
            Ok(())
        })
    }

    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.with_engine(|engine| {
            engine.delete(key)?;
            self.metrics.incr(metrics::DELETES);
            Ok(())
        })
    }

    fn open_cursor(
        &self,
        range: KeyRange,
        counter: &str,
        location: &'static Location<'static>,
    ) -> Result<StoreCursor> {
        self.with_engine(|engine| {
            let inner = engine.new_cursor(&range, None)?;
            self.metrics.incr(counter);
            let token = self
                .leaks
                .as_ref()
                .map(|tracker| tracker.register(ResourceKind::Cursor, location));
            Ok(StoreCursor::new(inner, range.to, token))
        })
    }

    /// Cursor over `[from, to)`.
    #[track_caller]
    pub fn range(&self, from: &[u8], to: &[u8]) -> Result<StoreCursor> {
        let location = Location::caller();
        let range = checked_range(from, to)?;
        self.open_cursor(range, metrics::RANGES, location)
    }

    /// Cursor over every key.
    #[track_caller]
    pub fn all(&self) -> Result<StoreCursor> {
        let location = Location::caller();
        self.open_cursor(KeyRange::all(), metrics::ALLS, location)
    }

    /// A read view over `[from, to)` fixed now.
    #[track_caller]
    pub fn snapshot(&self, from: &[u8], to: &[u8]) -> Result<StoreSnapshot<E>> {
        let location = Location::caller();
        let range = checked_range(from, to)?;
        self.with_engine(|engine| {
            let snapshot = engine.new_snapshot()?;
            Ok(StoreSnapshot::new(
                Arc::clone(engine),
                snapshot,
                range,
                self.leaks.clone(),
                location,
            ))
        })
    }

    /// Make every write so far durable.
    pub fn flush(&self) -> Result<()> {
        self.with_engine(|engine| {
            engine.flush(self.config.engine.wal_enabled)?;
            self.metrics.incr(metrics::FLUSHES);
            Ok(())
        })
    }

    /// Where the checkpoint `id` lands: the sibling directory
    /// `<store dir>-<id>`.
    pub fn checkpoint_path(&self, id: &CheckpointId) -> Result<PathBuf> {
        let base = self.dir.file_name().ok_or_else(|| {
            Error::InvalidArgument(format!(
                "store directory {} has no final component",
                self.dir.display()
            ))
        })?;
        let mut name = base.to_os_string();
        name.push("-");
        name.push(id.as_str());
        Ok(self.dir.with_file_name(name))
    }

    /// Export the current state under `id`. Writes issued after this call
    /// starts are not part of the export.
    pub fn checkpoint(&self, id: &CheckpointId) -> Result<PathBuf> {
        let path = self.checkpoint_path(id)?;
        self.with_engine(|engine| {
            let exported = engine.checkpoint_export(&path)?;
            self.metrics.incr(metrics::CHECKPOINTS);
            info!(store = %self.name, checkpoint = %id, path = %exported.display(), "checkpoint taken");
            Ok(exported)
        })
    }

    /// Push the core gauges and the configured extra properties to the
    /// sink. After close every gauge reads `Unavailable`.
    pub fn sample_metrics(&self) {
        let state = self.state.read();
        let names = property::CORE
            .iter()
            .copied()
            .chain(self.config.extra_metrics.iter().map(String::as_str));
        for name in names {
            let value = match &*state {
                Lifecycle::Open(engine) => engine.property(name),
                Lifecycle::Closed(_) => GaugeValue::Unavailable,
            };
            self.metrics.gauge(name, value);
        }
    }

    /// Close the store. Waits for in-flight operations, compacts first when
    /// auto-compaction is off, then closes the engine. A second call only
    /// logs where the store was first closed.
    #[track_caller]
    pub fn close(&self) -> Result<()> {
        let location = Location::caller();
        let mut state = self.state.write();
        let engine = match &*state {
            Lifecycle::Closed(first) => {
                warn!(
                    store = %self.name,
                    first_close = %first,
                    second_close = %location,
                    "store already closed, ignoring close"
                );
                return Ok(());
            }
            Lifecycle::Open(engine) => Arc::clone(engine),
        };
        let context = CloseContext::capture(location);
        info!(store = %self.name, closed_at = %context, "closing state store");
        *state = Lifecycle::Closed(context);

        let compacted = if self.config.engine.auto_compaction {
            Ok(())
        } else {
            engine.compact()
        };
        let closed = engine.close();
        if let Some(leaks) = &self.leaks {
            let leaked = leaks.report();
            if leaked > 0 {
                warn!(store = %self.name, leaked, "store closed with unreleased cursors or snapshots");
            }
        }
        compacted.and(closed)
    }
}

impl<E: StorageEngine> Drop for StateStore<E> {
    fn drop(&mut self) {
        if !self.is_closed() {
            if let Err(err) = self.close() {
                warn!(store = %self.name, error = %err, "failed to close store on drop");
            }
        }
    }
}

impl<E: StorageEngine> fmt::Debug for StateStore<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("name", &self.name)
            .field("dir", &self.dir)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn checked_range(from: &[u8], to: &[u8]) -> Result<KeyRange> {
    if from > to {
        return Err(Error::InvalidArgument(
            "range start is after range end".into(),
        ));
    }
    Ok(KeyRange::new(from, to))
}
