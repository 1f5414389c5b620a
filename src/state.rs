use std::sync::Arc;

use crate::{
    auth::{jwt::JwtKeys, tokens::TokenService},
    cache::{
        blacklist::TokenBlacklist, tokens::TokenCache, users::UserCache, Cache, KvCache,
        RedisCache,
    },
    config::Config,
    errors::AppError,
    middleware::auth::Authenticator,
    rate_limit::RateLimiter,
    store::{MongoStore, Stores},
};

/// Every collaborator a request may need, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub cache: Cache,
    pub stores: Stores,
    pub user_cache: UserCache,
    pub tokens: TokenService,
    pub authenticator: Authenticator,
    pub ip_limiter: RateLimiter,
    pub user_limiter: RateLimiter,
    pub auth_limiter: RateLimiter,
}

impl AppState {
    /// Connects to MongoDB and Redis as configured.
    pub async fn connect(cfg: Config) -> Result<Self, AppError> {
        let mongo = MongoStore::connect(&cfg.mongodb_uri, &cfg.db_name).await?;
        let redis = RedisCache::connect(&cfg.redis_url).await?;
        Ok(Self::from_parts(cfg, Arc::new(redis), Stores::mongo(mongo)))
    }

    pub fn from_parts(cfg: Config, backend: Arc<dyn KvCache>, stores: Stores) -> Self {
        let cache = Cache::new(backend);
        let keys = JwtKeys::from_config(&cfg);
        let user_cache = UserCache::new(cache.clone());
        let blacklist = TokenBlacklist::new(
            cache.clone(),
            cfg.jwt_access_ttl_seconds,
            cfg.jwt_refresh_ttl_seconds,
        );

        let tokens = TokenService::new(
            keys.clone(),
            stores.refresh_tokens.clone(),
            stores.users.clone(),
            TokenCache::new(cache.clone()),
            user_cache.clone(),
            blacklist.clone(),
            cfg.blacklist_read_policy,
        );
        let authenticator =
            Authenticator::new(keys, blacklist, user_cache.clone(), cfg.blacklist_read_policy);

        Self {
            ip_limiter: RateLimiter::ip(cache.clone(), &cfg.rate_limit),
            user_limiter: RateLimiter::user(cache.clone(), &cfg.rate_limit),
            auth_limiter: RateLimiter::auth(cache.clone(), &cfg.rate_limit),
            cfg: Arc::new(cfg),
            cache,
            stores,
            user_cache,
            tokens,
            authenticator,
        }
    }
}
