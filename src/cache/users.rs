use std::time::Duration;

use super::{Cache, CacheResult};
use crate::models::user::UserPublic;

pub const USER_PREFIX: &str = "user";
pub const USER_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Clone)]
pub struct UserCache {
    cache: Cache,
}

fn key(user_id: &str) -> String {
    format!("{USER_PREFIX}:{user_id}")
}

impl UserCache {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }

    pub async fn cache_user(&self, user: &UserPublic) -> CacheResult<()> {
        self.cache.set(&key(&user.id), user, USER_CACHE_TTL).await
    }

    pub async fn get_cached_user(&self, user_id: &str) -> CacheResult<Option<UserPublic>> {
        self.cache.get(&key(user_id)).await.inspect_err(|e| {
            tracing::warn!(user_id, error = %e, "error retrieving user from cache");
        })
    }

    pub async fn invalidate_user(&self, user_id: &str) -> CacheResult<()> {
        self.cache.delete(&key(user_id)).await
    }
}
