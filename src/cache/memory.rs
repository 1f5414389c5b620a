use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry as MapEntry, DashMap};

use super::{CacheError, CacheResult, KvCache};

#[derive(Clone, Debug)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Vec<u8>, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Some(Instant::now() + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Instant::now())
    }
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvCache for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.entries.remove_if(key, |_, e| e.is_expired());
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        self.entries.insert(key.to_string(), Entry::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .and_then(|e| e.expires_at)
            .and_then(|at| at.checked_duration_since(now))
            .filter(|left| !left.is_zero()))
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> CacheResult<i64> {
        // The shard lock held by `entry` makes read-increment-write atomic.
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) if !occupied.get().is_expired() => {
                let current: i64 = std::str::from_utf8(&occupied.get().value)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| {
                        CacheError::Command(format!("value at {key} is not an integer"))
                    })?;
                let next = current + 1;
                occupied.get_mut().value = next.to_string().into_bytes();
                Ok(next)
            }
            MapEntry::Occupied(mut occupied) => {
                occupied.insert(Entry::new(b"1".to_vec(), ttl));
                Ok(1)
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry::new(b"1".to_vec(), ttl));
                Ok(1)
            }
        }
    }

    async fn flush_all(&self) -> CacheResult<()> {
        self.entries.clear();
        Ok(())
    }

    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }
}
