use std::time::Duration;

use super::{token_prefix, Cache, CacheResult};

pub const REFRESH_TOKEN_PREFIX: &str = "refresh_token";
/// Upper bound for a cached entry, whatever the token's own expiry.
pub const REFRESH_TOKEN_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone)]
pub struct TokenCache {
    cache: Cache,
}

fn key(token: &str) -> String {
    format!("{REFRESH_TOKEN_PREFIX}:{token}")
}

impl TokenCache {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }

    /// Caches `token` for `user_id`, replacing any previous entry. The entry
    /// lives for `expiry` capped at [`REFRESH_TOKEN_CACHE_TTL`].
    pub async fn cache_refresh_token(
        &self,
        token: &str,
        user_id: &str,
        expiry: Duration,
    ) -> CacheResult<()> {
        let ttl = expiry.min(REFRESH_TOKEN_CACHE_TTL);
        self.cache.set(&key(token), user_id, ttl).await?;
        tracing::debug!(
            token = %token_prefix(token),
            user_id,
            ttl_secs = ttl.as_secs(),
            "refresh token cached"
        );
        Ok(())
    }

    pub async fn get_cached_refresh_token(&self, token: &str) -> CacheResult<Option<String>> {
        let user_id = self
            .cache
            .get::<String>(&key(token))
            .await?
            .filter(|id| !id.is_empty());
        if let Some(id) = &user_id {
            tracing::debug!(token = %token_prefix(token), user_id = %id, "refresh token found in cache");
        }
        Ok(user_id)
    }

    pub async fn invalidate_refresh_token_cache(&self, token: &str) -> CacheResult<()> {
        self.cache.delete(&key(token)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testing::memory_cache;

    #[tokio::test]
    async fn round_trips_user_id() {
        let cache = memory_cache();
        let tokens = TokenCache::new(cache.clone());
        tokens
            .cache_refresh_token("tok-abcdefghijkl", "user-1", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(
            tokens.get_cached_refresh_token("tok-abcdefghijkl").await.unwrap(),
            Some("user-1".to_string())
        );
    }

    #[tokio::test]
    async fn ttl_is_capped_at_a_day() {
        let cache = memory_cache();
        let tokens = TokenCache::new(cache.clone());
        tokens
            .cache_refresh_token("tok", "user-1", Duration::from_secs(7 * 24 * 60 * 60))
            .await
            .unwrap();

        let ttl = cache.get_ttl("refresh_token:tok").await.unwrap().unwrap();
        assert!(ttl <= REFRESH_TOKEN_CACHE_TTL);
        assert!(ttl > REFRESH_TOKEN_CACHE_TTL - Duration::from_secs(5));
    }

    #[tokio::test]
    async fn second_write_wins() {
        let cache = memory_cache();
        let tokens = TokenCache::new(cache.clone());
        tokens
            .cache_refresh_token("tok", "user-1", Duration::from_secs(3600))
            .await
            .unwrap();
        tokens
            .cache_refresh_token("tok", "user-2", Duration::from_secs(30))
            .await
            .unwrap();

        assert_eq!(
            tokens.get_cached_refresh_token("tok").await.unwrap(),
            Some("user-2".to_string())
        );
        let ttl = cache.get_ttl("refresh_token:tok").await.unwrap().unwrap();
        assert!(ttl <= Duration::from_secs(30));
    }

    #[tokio::test]
    async fn invalidate_removes_entry() {
        let tokens = TokenCache::new(memory_cache());
        tokens
            .cache_refresh_token("tok", "user-1", Duration::from_secs(60))
            .await
            .unwrap();
        tokens.invalidate_refresh_token_cache("tok").await.unwrap();
        assert_eq!(tokens.get_cached_refresh_token("tok").await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_user_id_counts_as_miss() {
        let cache = memory_cache();
        cache
            .set("refresh_token:tok", "", Duration::from_secs(60))
            .await
            .unwrap();
        let tokens = TokenCache::new(cache);
        assert_eq!(tokens.get_cached_refresh_token("tok").await.unwrap(), None);
    }
}
