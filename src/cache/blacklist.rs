use std::time::Duration;

use chrono::Utc;

use super::{token_prefix, Cache, CacheResult};

pub const BLACKLIST_PREFIX: &str = "blacklist";
pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

#[derive(Clone)]
pub struct TokenBlacklist {
    cache: Cache,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

fn key(kind: TokenKind, token: &str) -> String {
    format!("{BLACKLIST_PREFIX}:{}:{token}", kind.as_str())
}

/// Configured expiry in seconds, or `fallback` when it is not positive.
fn ttl_or(seconds: i64, fallback: Duration) -> Duration {
    if seconds > 0 {
        Duration::from_secs(seconds as u64)
    } else {
        fallback
    }
}

impl TokenBlacklist {
    pub fn new(cache: Cache, access_ttl_seconds: i64, refresh_ttl_seconds: i64) -> Self {
        Self {
            cache,
            access_ttl: ttl_or(access_ttl_seconds, DEFAULT_ACCESS_TTL),
            refresh_ttl: ttl_or(refresh_ttl_seconds, DEFAULT_REFRESH_TTL),
        }
    }

    pub async fn blacklist_token(
        &self,
        kind: TokenKind,
        token: &str,
        ttl: Duration,
    ) -> CacheResult<()> {
        tracing::debug!(
            token_type = kind.as_str(),
            token = %token_prefix(token),
            ttl_secs = ttl.as_secs(),
            "blacklisting token"
        );
        self.cache
            .set(&key(kind, token), &Utc::now().timestamp(), ttl)
            .await
    }

    pub async fn is_token_blacklisted(&self, kind: TokenKind, token: &str) -> CacheResult<bool> {
        match self.cache.get::<serde_json::Value>(&key(kind, token)).await {
            Ok(found) => Ok(found.is_some()),
            Err(e) => {
                tracing::warn!(
                    token_type = kind.as_str(),
                    token = %token_prefix(token),
                    error = %e,
                    "error checking token blacklist"
                );
                Err(e)
            }
        }
    }

    pub async fn blacklist_access_token(&self, token: &str) -> CacheResult<()> {
        self.blacklist_token(TokenKind::Access, token, self.access_ttl)
            .await
    }

    pub async fn blacklist_refresh_token(&self, token: &str) -> CacheResult<()> {
        self.blacklist_token(TokenKind::Refresh, token, self.refresh_ttl)
            .await
    }
}
