use std::time::Duration;

use thiserror::Error;

/// What a call site does when the cache cannot answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Treat the failed lookup as "nothing found" and let the request through.
    Open,
    /// Reject the request.
    Closed,
}

impl FailurePolicy {
    fn from_fail_open(fail_open: bool) -> Self {
        if fail_open { Self::Open } else { Self::Closed }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ")]
    SharedSecret,
}

#[derive(Clone, Copy, Debug)]
pub struct RateLimitSettings {
    pub ip_limit: u32,
    pub user_limit: u32,
    pub auth_limit: u32,
    pub window: Duration,
    pub block: Duration,
    pub policy: FailurePolicy,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            ip_limit: 60,
            user_limit: 300,
            auth_limit: 10,
            window: Duration::from_secs(60),
            block: Duration::from_secs(300),
            policy: FailurePolicy::Open,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: String,

    pub mongodb_uri: String,
    pub db_name: String,

    pub redis_url: String,

    pub jwt_access_secret: String,
    pub jwt_refresh_secret: String,
    pub jwt_access_ttl_seconds: i64,
    pub jwt_refresh_ttl_seconds: i64,

    pub rate_limit: RateLimitSettings,
    pub blacklist_read_policy: FailurePolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mongodb_uri = required("MONGODB_URI")?;
        let db_name = std::env::var("DB_NAME").unwrap_or_else(|_| "starter_api".to_string());
        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into());

        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/0".into());

        let jwt_access_secret = required("JWT_ACCESS_SECRET")?;
        let jwt_refresh_secret = required("JWT_REFRESH_SECRET")?;
        if jwt_access_secret == jwt_refresh_secret {
            return Err(ConfigError::SharedSecret);
        }

        let defaults = RateLimitSettings::default();
        let rate_limit = RateLimitSettings {
            ip_limit: env_or("RATE_LIMIT_IP", defaults.ip_limit),
            user_limit: env_or("RATE_LIMIT_USER", defaults.user_limit),
            auth_limit: env_or("RATE_LIMIT_AUTH", defaults.auth_limit),
            window: Duration::from_secs(env_or("RATE_LIMIT_WINDOW", 60)),
            block: Duration::from_secs(env_or("RATE_LIMIT_BLOCK", 300)),
            policy: FailurePolicy::from_fail_open(!env_or("RATE_LIMIT_FAIL_CLOSED", false)),
        };

        Ok(Self {
            bind_addr,
            mongodb_uri,
            db_name,
            redis_url,
            jwt_access_secret,
            jwt_refresh_secret,
            jwt_access_ttl_seconds: env_or("JWT_ACCESS_EXPIRY", 15 * 60),
            jwt_refresh_ttl_seconds: env_or("JWT_REFRESH_EXPIRY", 7 * 24 * 60 * 60),
            rate_limit,
            blacklist_read_policy: FailurePolicy::from_fail_open(env_or(
                "BLACKLIST_FAIL_OPEN",
                false,
            )),
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Debug,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, ?default, "unparseable value, using default");
            default
        }),
        Err(_) => default,
    }
}
