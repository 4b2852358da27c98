use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::state::store::KeyValueStore;

/// Storage key of the cached exchange rate.
pub const RATE_CACHE_KEY: &str = "usd_rub_rate";

/// Last successfully fetched exchange rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CachedRate {
    pub rate: f64,
    /// Epoch milliseconds of the fetch.
    pub timestamp: i64,
}

impl CachedRate {
    /// Positive finite rate, fetched no later than `now_ms`.
    pub fn is_valid(&self, now_ms: i64) -> bool {
        self.rate.is_finite() && self.rate > 0.0 && self.timestamp <= now_ms
    }
}

/// Time-boxed cache of a single exchange rate on top of a [`KeyValueStore`].
pub struct RateCache {
    store: Box<dyn KeyValueStore>,
    ttl: Duration,
}

impl RateCache {
    pub fn new(store: Box<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Returns the stored rate regardless of age. Unreadable or invalid
    /// entries count as a miss.
    pub fn load(&self, now_ms: i64) -> Option<CachedRate> {
        let raw = match self.store.get(RATE_CACHE_KEY) {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed to read rate cache");
                return None;
            }
        };

        match serde_json::from_str::<CachedRate>(&raw) {
            Ok(cached) if cached.is_valid(now_ms) => Some(cached),
            Ok(cached) => {
                warn!(?cached, "ignoring invalid cached rate");
                None
            }
            Err(err) => {
                warn!(error = %err, "ignoring malformed cached rate");
                None
            }
        }
    }

    pub fn is_fresh(&self, cached: &CachedRate, now_ms: i64) -> bool {
        let age_ms = now_ms.saturating_sub(cached.timestamp);
        u128::try_from(age_ms).is_ok_and(|age| age < self.ttl.as_millis())
    }

    pub fn save(&self, rate: f64, now_ms: i64) -> anyhow::Result<CachedRate> {
        let cached = CachedRate { rate, timestamp: now_ms };
        let encoded = serde_json::to_string(&cached)?;

        self.store
            .set(RATE_CACHE_KEY, &encoded)
            .context("failed to persist exchange rate")?;

        Ok(cached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::store::FileStore;

    const HOUR: Duration = Duration::from_secs(3_600);
    const NOW: i64 = 1_700_000_000_000;

    fn cache_in(dir: &tempfile::TempDir) -> RateCache {
        RateCache::new(Box::new(FileStore::new(dir.path().join("cache.json"))), HOUR)
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);

        cache.save(92.5, NOW).unwrap();

        assert_eq!(cache.load(NOW), Some(CachedRate { rate: 92.5, timestamp: NOW }));
    }

    #[test]
    fn freshness_is_bounded_by_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let minute = 60_000;

        let recent = CachedRate { rate: 90.0, timestamp: NOW - 30 * minute };
        let expired = CachedRate { rate: 90.0, timestamp: NOW - 61 * minute };
        let boundary = CachedRate { rate: 90.0, timestamp: NOW - 60 * minute };

        assert!(cache.is_fresh(&recent, NOW));
        assert!(!cache.is_fresh(&expired, NOW));
        assert!(!cache.is_fresh(&boundary, NOW));
    }

    #[test]
    fn invalid_entries_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("cache.json"));

        store.set(RATE_CACHE_KEY, r#"{"rate":-3,"timestamp":0}"#).unwrap();
        let cache = RateCache::new(Box::new(store), HOUR);
        assert_eq!(cache.load(NOW), None);

        let store = FileStore::new(dir.path().join("future.json"));
        store.set(RATE_CACHE_KEY, &format!(r#"{{"rate":90,"timestamp":{}}}"#, NOW + 1)).unwrap();
        let cache = RateCache::new(Box::new(store), HOUR);
        assert_eq!(cache.load(NOW), None);

        let store = FileStore::new(dir.path().join("garbage.json"));
        store.set(RATE_CACHE_KEY, "rate=90").unwrap();
        let cache = RateCache::new(Box::new(store), HOUR);
        assert_eq!(cache.load(NOW), None);
    }
}
