//! Store configuration parsed from flat string properties.
//!
//! Unknown keys are ignored so one property map can be shared with other
//! components. A value that does not parse aborts store construction.

use std::str::FromStr;
use std::time::Duration;

use tracing::{debug, warn};

use crate::engine::{EngineOptions, MIN_TTL};
use crate::error::{Error, Result};
use crate::wal::SyncPolicy;

pub const TTL_MS: &str = "ttl.ms";
pub const WAL_ENABLED: &str = "wal.enabled";
pub const WAL_SYNC_POLICY: &str = "wal.sync.policy";
pub const METRICS_LIST: &str = "metrics.list";
pub const COMPACTION_AUTO: &str = "compaction.auto";
pub const COMPACTION_TRIGGER_BYTES: &str = "compaction.trigger.bytes";
pub const BLOCK_SIZE_BYTES: &str = "block.size.bytes";
pub const BLOOM_FALSE_POSITIVE_RATE: &str = "bloom.false.positive.rate";
pub const LEAK_DETECTION: &str = "leak.detection";

/// Everything a store needs at construction.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub engine: EngineOptions,
    /// Engine properties sampled as gauges on top of the core set.
    pub extra_metrics: Vec<String>,
    /// Track open cursors and snapshots and report leftovers at close.
    pub leak_detection: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            engine: EngineOptions::default(),
            extra_metrics: Vec::new(),
            leak_detection: cfg!(debug_assertions),
        }
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|err: T::Err| Error::FatalConfig {
        key: key.to_string(),
        reason: format!("`{value}`: {err}"),
    })
}

/// `<= 0` means unlimited; positive values below [`MIN_TTL`] are raised.
fn parse_ttl(value: &str) -> Result<Option<Duration>> {
    let millis: i64 = parse(TTL_MS, value)?;
    if millis <= 0 {
        return Ok(None);
    }
    let ttl = Duration::from_millis(millis as u64);
    if ttl < MIN_TTL {
        warn!(
            requested_ms = millis,
            applied_ms = MIN_TTL.as_millis() as u64,
            "TTL below minimum, raising it"
        );
        return Ok(Some(MIN_TTL));
    }
    Ok(Some(ttl))
}

impl StoreConfig {
    /// Build a configuration from `(key, value)` pairs on top of the
    /// defaults.
    pub fn from_properties<I, K, V>(properties: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = StoreConfig::default();
        for (key, value) in properties {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                TTL_MS => config.engine.ttl = parse_ttl(value)?,
                WAL_ENABLED => config.engine.wal_enabled = parse(key, value)?,
                WAL_SYNC_POLICY => {
                    config.engine.sync_policy = value.trim().parse::<SyncPolicy>().map_err(
                        |reason| Error::FatalConfig {
                            key: key.to_string(),
                            reason,
                        },
                    )?
                }
                METRICS_LIST => {
                    config.extra_metrics = value
                        .split(',')
                        .map(str::trim)
                        .filter(|name| !name.is_empty())
                        .map(String::from)
                        .collect()
                }
                COMPACTION_AUTO => config.engine.auto_compaction = parse(key, value)?,
                COMPACTION_TRIGGER_BYTES => {
                    config.engine.compaction_trigger_bytes = parse(key, value)?
                }
                BLOCK_SIZE_BYTES => {
                    let size: usize = parse(key, value)?;
                    if size == 0 {
                        return Err(Error::FatalConfig {
                            key: key.to_string(),
                            reason: "block size must be positive".into(),
                        });
                    }
                    config.engine.block_size = size;
                }
                BLOOM_FALSE_POSITIVE_RATE => {
                    let rate: f64 = parse(key, value)?;
                    if !(rate > 0.0 && rate < 1.0) {
                        return Err(Error::FatalConfig {
                            key: key.to_string(),
                            reason: format!("{rate} is outside (0, 1)"),
                        });
                    }
                    config.engine.bloom_false_positive_rate = rate;
                }
                LEAK_DETECTION => config.leak_detection = parse(key, value)?,
                other => debug!(key = other, "ignoring unknown store property"),
            }
        }
        Ok(config)
    }
}
