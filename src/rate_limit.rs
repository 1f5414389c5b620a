use std::time::Duration;

use chrono::Utc;

use crate::{
    cache::{Cache, CacheError},
    config::{FailurePolicy, RateLimitSettings},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LimiterKind {
    Ip,
    User,
    Auth,
}

impl LimiterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LimiterKind::Ip => "ip",
            LimiterKind::User => "user",
            LimiterKind::Auth => "auth",
        }
    }
}

/// Verdict for one call, with what the client should see in headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

/// A decision plus the first cache error hit while making it, if any.
#[derive(Debug)]
pub struct RateLimitOutcome {
    pub decision: Decision,
    pub error: Option<CacheError>,
}

#[derive(Clone)]
pub struct RateLimiter {
    cache: Cache,
    kind: LimiterKind,
    limit: u32,
    window: Duration,
    block: Duration,
    policy: FailurePolicy,
}

impl RateLimiter {
    pub fn new(
        cache: Cache,
        kind: LimiterKind,
        limit: u32,
        window: Duration,
        block: Duration,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            cache,
            kind,
            limit,
            window,
            block,
            policy,
        }
    }

    pub fn ip(cache: Cache, s: &RateLimitSettings) -> Self {
        Self::new(cache, LimiterKind::Ip, s.ip_limit, s.window, s.block, s.policy)
    }

    pub fn user(cache: Cache, s: &RateLimitSettings) -> Self {
        Self::new(cache, LimiterKind::User, s.user_limit, s.window, s.block, s.policy)
    }

    pub fn auth(cache: Cache, s: &RateLimitSettings) -> Self {
        Self::new(cache, LimiterKind::Auth, s.auth_limit, s.window, s.block, s.policy)
    }

    pub fn kind(&self) -> LimiterKind {
        self.kind
    }

    fn counter_key(&self, identifier: &str) -> String {
        format!("ratelimit:{}:{identifier}", self.kind.as_str())
    }

    fn block_key(&self, identifier: &str) -> String {
        format!("ratelimit:{}:{identifier}:blocked", self.kind.as_str())
    }

    fn decision(&self, allowed: bool, remaining: u32, reset_after: Duration) -> Decision {
        Decision {
            allowed,
            limit: self.limit,
            remaining,
            reset_after,
        }
    }

    /// Consumes one unit for `identifier`.
    pub async fn allow(&self, identifier: &str) -> RateLimitOutcome {
        let block_key = self.block_key(identifier);
        let now = Utc::now().timestamp();
        let mut read_error = None;

        match self.cache.get::<i64>(&block_key).await {
            Ok(Some(until)) if until > now => {
                let reset_after = Duration::from_secs((until - now) as u64);
                tracing::debug!(
                    limiter = self.kind.as_str(),
                    identifier,
                    reset_secs = reset_after.as_secs(),
                    "identifier is blocked"
                );
                return RateLimitOutcome {
                    decision: self.decision(false, 0, reset_after),
                    error: None,
                };
            }
            Ok(Some(_)) => {
                if let Err(e) = self.cache.delete(&block_key).await {
                    tracing::warn!(identifier, error = %e, "failed to clear lapsed block record");
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    limiter = self.kind.as_str(),
                    identifier,
                    error = %e,
                    "failed to read block record"
                );
                read_error = Some(e);
            }
        }

        let count = match self
            .cache
            .incr_with_ttl(&self.counter_key(identifier), self.window)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                tracing::error!(
                    limiter = self.kind.as_str(),
                    identifier,
                    policy = ?self.policy,
                    error = %e,
                    "rate limit check failed"
                );
                let decision = match self.policy {
                    FailurePolicy::Open => self.decision(true, self.limit, self.window),
                    FailurePolicy::Closed => self.decision(false, 0, self.window),
                };
                return RateLimitOutcome {
                    decision,
                    error: Some(e),
                };
            }
        };

        if count > i64::from(self.limit) {
            let until = now + self.block.as_secs() as i64;
            if let Err(e) = self.cache.set(&block_key, &until, self.block).await {
                tracing::warn!(identifier, error = %e, "failed to write block record");
            }
            tracing::warn!(
                limiter = self.kind.as_str(),
                identifier,
                count,
                limit = self.limit,
                block_secs = self.block.as_secs(),
                "rate limit exceeded"
            );
            return RateLimitOutcome {
                decision: self.decision(false, 0, self.block),
                error: read_error,
            };
        }

        let reset_after = if count == 1 {
            self.window
        } else {
            match self.cache.get_ttl(&self.counter_key(identifier)).await {
                Ok(Some(ttl)) => ttl,
                _ => self.window,
            }
        };
        let remaining = self.limit.saturating_sub(count as u32);

        RateLimitOutcome {
            decision: self.decision(true, remaining, reset_after),
            error: read_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    use async_trait::async_trait;

    use super::*;
    use crate::cache::{
        testing::{failing_cache, memory_cache},
        CacheResult, KvCache, MemoryCache,
    };

    /// Counters work, but every read fails.
    struct UnreadableCache(MemoryCache);

    #[async_trait]
    impl KvCache for UnreadableCache {
        async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
            Err(CacheError::Command("READONLY".into()))
        }
        async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
            self.0.set(key, value, ttl).await
        }
        async fn delete(&self, key: &str) -> CacheResult<()> {
            self.0.delete(key).await
        }
        async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
            self.0.ttl(key).await
        }
        async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> CacheResult<i64> {
            self.0.incr_with_ttl(key, ttl).await
        }
        async fn flush_all(&self) -> CacheResult<()> {
            self.0.flush_all().await
        }
        async fn ping(&self) -> CacheResult<()> {
            self.0.ping().await
        }
    }

    fn limiter(cache: Cache, limit: u32, window: Duration, block: Duration) -> RateLimiter {
        RateLimiter::new(cache, LimiterKind::Ip, limit, window, block, FailurePolicy::Open)
    }

    #[tokio::test]
    async fn allows_up_to_limit_then_blocks() {
        let rl = limiter(
            memory_cache(),
            3,
            Duration::from_secs(60),
            Duration::from_secs(300),
        );

        for expected_remaining in [2, 1, 0] {
            let out = rl.allow("1.2.3.4").await;
            assert!(out.decision.allowed);
            assert_eq!(out.decision.remaining, expected_remaining);
            assert!(out.error.is_none());
        }

        let out = rl.allow("1.2.3.4").await;
        assert!(!out.decision.allowed);
        assert_eq!(out.decision.reset_after, Duration::from_secs(300));

        // Blocked calls report the time left on the block.
        let out = rl.allow("1.2.3.4").await;
        assert!(!out.decision.allowed);
        assert!(out.decision.reset_after <= Duration::from_secs(300));
        assert!(out.decision.reset_after >= Duration::from_secs(298));
    }

    #[tokio::test]
    async fn identifiers_and_kinds_are_isolated() {
        let cache = memory_cache();
        let settings = RateLimitSettings {
            ip_limit: 1,
            auth_limit: 1,
            ..Default::default()
        };
        let ip = RateLimiter::ip(cache.clone(), &settings);
        let auth = RateLimiter::auth(cache, &settings);

        assert!(ip.allow("a").await.decision.allowed);
        assert!(!ip.allow("a").await.decision.allowed);
        assert!(ip.allow("b").await.decision.allowed);
        assert!(auth.allow("a").await.decision.allowed);
    }

    #[tokio::test]
    async fn later_calls_report_remaining_window() {
        let rl = limiter(
            memory_cache(),
            5,
            Duration::from_secs(60),
            Duration::from_secs(60),
        );
        let first = rl.allow("id").await.decision;
        assert_eq!(first.reset_after, Duration::from_secs(60));

        let second = rl.allow("id").await.decision;
        assert!(second.reset_after <= Duration::from_secs(60));
        assert!(second.reset_after > Duration::from_secs(55));
    }

    #[tokio::test]
    async fn recovers_after_block_elapses() {
        let rl = limiter(
            memory_cache(),
            2,
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        assert!(rl.allow("id").await.decision.allowed);
        assert!(rl.allow("id").await.decision.allowed);
        assert!(!rl.allow("id").await.decision.allowed);

        tokio::time::sleep(Duration::from_millis(1_200)).await;

        let out = rl.allow("id").await.decision;
        assert!(out.allowed);
        assert_eq!(out.remaining, 1);
    }

    #[tokio::test]
    async fn concurrent_calls_stay_close_to_limit() {
        const LIMIT: u32 = 20;
        let rl = Arc::new(limiter(
            memory_cache(),
            LIMIT,
            Duration::from_secs(60),
            Duration::from_secs(60),
        ));
        let allowed = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..LIMIT * 2)
            .map(|_| {
                let rl = rl.clone();
                let allowed = allowed.clone();
                tokio::spawn(async move {
                    if rl.allow("hot").await.decision.allowed {
                        allowed.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }

        let allowed = allowed.load(Ordering::Relaxed);
        assert!(allowed >= LIMIT / 2, "allowed {allowed}");
        assert!(allowed <= LIMIT + LIMIT / 10, "allowed {allowed}");
    }

    #[tokio::test]
    async fn cache_outage_fails_open_by_default() {
        let rl = limiter(
            failing_cache(),
            1,
            Duration::from_secs(60),
            Duration::from_secs(60),
        );
        for _ in 0..3 {
            let out = rl.allow("id").await;
            assert!(out.decision.allowed);
            assert_eq!(out.decision.remaining, 1);
            assert!(matches!(out.error, Some(CacheError::Connection(_))));
        }
    }

    #[tokio::test]
    async fn cache_outage_can_fail_closed() {
        let rl = RateLimiter::new(
            failing_cache(),
            LimiterKind::User,
            10,
            Duration::from_secs(60),
            Duration::from_secs(60),
            FailurePolicy::Closed,
        );
        let out = rl.allow("id").await;
        assert!(!out.decision.allowed);
        assert!(out.error.is_some());
    }

    #[tokio::test]
    async fn unreadable_block_record_is_reported() {
        let rl = limiter(
            Cache::new(Arc::new(UnreadableCache(MemoryCache::new()))),
            1,
            Duration::from_secs(60),
            Duration::from_secs(60),
        );

        let out = rl.allow("id").await;
        assert!(out.decision.allowed);
        assert!(matches!(out.error, Some(CacheError::Command(_))));

        let out = rl.allow("id").await;
        assert!(!out.decision.allowed);
        assert!(out.error.is_some());
    }
}
