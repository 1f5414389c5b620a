pub mod blacklist;
pub mod memory;
pub mod redis;
pub mod tokens;
pub mod users;

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

pub use self::{memory::MemoryCache, redis::RedisCache};

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache connection failed: {0}")]
    Connection(String),
    #[error("cache command failed: {0}")]
    Command(String),
    #[error("cache value could not be (de)serialized: {0}")]
    Serialization(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Byte-level operations a cache service must support.
#[async_trait]
pub trait KvCache: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value and TTL.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()>;

    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Remaining time to live. `None` when the key is absent or never expires.
    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>>;

    /// Atomically increments the integer at `key` and returns the new value.
    ///
    /// An absent key starts at zero and gets `ttl`; an existing key keeps the
    /// expiry it already has.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> CacheResult<i64>;

    async fn flush_all(&self) -> CacheResult<()>;

    async fn ping(&self) -> CacheResult<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    Hit,
    Miss,
    Ok,
    Error,
}

/// Counters fed by every [`Cache`] call.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    errors: AtomicU64,
    total_micros: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub errors: u64,
    pub total_micros: u64,
}

impl CacheStats {
    fn record(&self, op: &'static str, key: &str, outcome: Outcome, elapsed: Duration) {
        let counter = match outcome {
            Outcome::Hit => &self.hits,
            Outcome::Miss => &self.misses,
            Outcome::Ok => &self.writes,
            Outcome::Error => &self.errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.total_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        tracing::trace!(op, key, ?outcome, elapsed_us = elapsed.as_micros() as u64, "cache op");
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            total_micros: self.total_micros.load(Ordering::Relaxed),
        }
    }
}

/// JSON-typed cache handle shared by every component.
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn KvCache>,
    stats: Arc<CacheStats>,
}

impl Cache {
    pub fn new(backend: Arc<dyn KvCache>) -> Self {
        Self {
            backend,
            stats: Arc::new(CacheStats::default()),
        }
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        let started = Instant::now();
        let result = match self.backend.get(key).await {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| CacheError::Serialization(e.to_string())),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };
        let outcome = match &result {
            Ok(Some(_)) => Outcome::Hit,
            Ok(None) => Outcome::Miss,
            Err(e) => {
                tracing::error!(key, error = %e, "error retrieving from cache");
                Outcome::Error
            }
        };
        self.stats.record("get", key, outcome, started.elapsed());
        result
    }

    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> CacheResult<()> {
        let started = Instant::now();
        let result = match serde_json::to_vec(value) {
            Ok(bytes) => self.backend.set(key, bytes, ttl).await,
            Err(e) => Err(CacheError::Serialization(e.to_string())),
        };
        self.finish("set", key, &result, started);
        if result.is_ok() {
            tracing::debug!(key, ttl_secs = ttl.as_secs(), "cached value");
        }
        result
    }

    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        let started = Instant::now();
        let result = self.backend.delete(key).await;
        self.finish("delete", key, &result, started);
        result
    }

    pub async fn get_ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        let started = Instant::now();
        let result = self.backend.ttl(key).await;
        self.finish("ttl", key, &result, started);
        result
    }

    pub async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> CacheResult<i64> {
        let started = Instant::now();
        let result = self.backend.incr_with_ttl(key, ttl).await;
        self.finish("incr", key, &result, started);
        result
    }

    pub async fn flush_all(&self) -> CacheResult<()> {
        let started = Instant::now();
        let result = self.backend.flush_all().await;
        self.finish("flush", "*", &result, started);
        if result.is_ok() {
            tracing::info!("flushed entire cache");
        }
        result
    }

    pub async fn ping(&self) -> CacheResult<()> {
        self.backend.ping().await
    }

    fn finish<T>(&self, op: &'static str, key: &str, result: &CacheResult<T>, started: Instant) {
        let outcome = match result {
            Ok(_) => Outcome::Ok,
            Err(e) => {
                tracing::error!(op, key, error = %e, "cache operation failed");
                Outcome::Error
            }
        };
        self.stats.record(op, key, outcome, started.elapsed());
    }
}

/// Shortens a token for log output.
pub(crate) fn token_prefix(token: &str) -> String {
    let cut = token
        .char_indices()
        .nth(10)
        .map_or(token.len(), |(idx, _)| idx);
    format!("{}...", &token[..cut])
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// A cache whose every call fails, for outage tests.
    pub struct FailingCache;

    #[async_trait]
    impl KvCache for FailingCache {
        async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
            Err(CacheError::Connection("connection refused".into()))
        }
        async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> CacheResult<()> {
            Err(CacheError::Connection("connection refused".into()))
        }
        async fn delete(&self, _key: &str) -> CacheResult<()> {
            Err(CacheError::Connection("connection refused".into()))
        }
        async fn ttl(&self, _key: &str) -> CacheResult<Option<Duration>> {
            Err(CacheError::Connection("connection refused".into()))
        }
        async fn incr_with_ttl(&self, _key: &str, _ttl: Duration) -> CacheResult<i64> {
            Err(CacheError::Connection("connection refused".into()))
        }
        async fn flush_all(&self) -> CacheResult<()> {
            Err(CacheError::Connection("connection refused".into()))
        }
        async fn ping(&self) -> CacheResult<()> {
            Err(CacheError::Connection("connection refused".into()))
        }
    }

    pub fn memory_cache() -> Cache {
        Cache::new(Arc::new(MemoryCache::new()))
    }

    pub fn failing_cache() -> Cache {
        Cache::new(Arc::new(FailingCache))
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::{testing::*, *};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        id: String,
        n: i64,
    }

    #[tokio::test]
    async fn missing_key_is_not_an_error() {
        let cache = memory_cache();
        let got: Option<Sample> = cache.get("nope").await.unwrap();
        assert!(got.is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn stores_values_as_json() {
        let cache = memory_cache();
        let value = Sample { id: "a".into(), n: 7 };
        cache.set("sample:a", &value, Duration::from_secs(5)).await.unwrap();

        let got: Option<Sample> = cache.get("sample:a").await.unwrap();
        assert_eq!(got, Some(value));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().writes, 1);
    }

    #[tokio::test]
    async fn type_mismatch_is_a_serialization_error() {
        let cache = memory_cache();
        cache.set("k", "text", Duration::from_secs(5)).await.unwrap();
        let got = cache.get::<i64>("k").await;
        assert!(matches!(got, Err(CacheError::Serialization(_))));
    }

    #[tokio::test]
    async fn transport_failure_is_distinct_from_miss() {
        let cache = failing_cache();
        let got = cache.get::<String>("k").await;
        assert!(matches!(got, Err(CacheError::Connection(_))));
        assert_eq!(cache.stats().errors, 1);
        assert_eq!(cache.stats().misses, 0);
    }

    #[tokio::test]
    async fn counters_are_readable_as_json_integers() {
        let cache = memory_cache();
        cache.incr_with_ttl("c", Duration::from_secs(5)).await.unwrap();
        cache.incr_with_ttl("c", Duration::from_secs(5)).await.unwrap();
        assert_eq!(cache.get::<i64>("c").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn set_replaces_value_and_ttl() {
        let cache = memory_cache();
        cache.set("k", &1, Duration::from_secs(300)).await.unwrap();
        cache.set("k", &2, Duration::from_secs(30)).await.unwrap();
        assert_eq!(cache.get::<i64>("k").await.unwrap(), Some(2));
        let ttl = cache.get_ttl("k").await.unwrap().unwrap();
        assert!(ttl <= Duration::from_secs(30));
        assert!(ttl > Duration::from_secs(25));
    }

    #[test]
    fn token_prefix_truncates() {
        assert_eq!(token_prefix("abcdefghijklmnop"), "abcdefghij...");
        assert_eq!(token_prefix("short"), "short...");
    }
}
