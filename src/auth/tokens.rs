use std::{sync::Arc, time::Duration};

use chrono::Utc;
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};

use crate::{
    auth::jwt::{sha256_hex, JwtKeys},
    cache::{
        blacklist::{TokenBlacklist, TokenKind},
        token_prefix,
        tokens::TokenCache,
        users::UserCache,
    },
    config::FailurePolicy,
    dto::auth::TokenResponse,
    errors::AppError,
    models::{jwt::REFRESH_TOKEN_TYPE, refresh_token::RefreshTokenDoc, user::UserPublic},
    store::{RefreshTokenStore, UserStore},
};

#[derive(Clone)]
pub struct TokenService {
    keys: JwtKeys,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    users: Arc<dyn UserStore>,
    token_cache: TokenCache,
    user_cache: UserCache,
    blacklist: TokenBlacklist,
    blacklist_policy: FailurePolicy,
}

fn remaining(expires_at: BsonDateTime) -> Option<Duration> {
    let ms = expires_at.timestamp_millis() - BsonDateTime::now().timestamp_millis();
    (ms > 0).then(|| Duration::from_millis(ms as u64))
}

impl TokenService {
    pub fn new(
        keys: JwtKeys,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        users: Arc<dyn UserStore>,
        token_cache: TokenCache,
        user_cache: UserCache,
        blacklist: TokenBlacklist,
        blacklist_policy: FailurePolicy,
    ) -> Self {
        Self {
            keys,
            refresh_tokens,
            users,
            token_cache,
            user_cache,
            blacklist,
            blacklist_policy,
        }
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    /// Signs an access/refresh pair for `user` and persists the refresh token.
    ///
    /// Nothing is returned unless the row insert succeeded.
    pub async fn generate_token_pair(&self, user: &UserPublic) -> Result<TokenResponse, AppError> {
        let user_id = ObjectId::parse_str(&user.id)
            .map_err(|e| AppError::Internal(format!("bad user id {}: {e}", user.id)))?;

        let access_claims = self.keys.new_access_claims(user);
        let access_token = self.keys.make_access_token(&access_claims)?;

        let refresh_claims = self.keys.new_refresh_claims(&user.id);
        let refresh_token = self.keys.make_refresh_token(&refresh_claims)?;

        let row = RefreshTokenDoc {
            id: ObjectId::new(),
            user_id,
            jti: refresh_claims.jti,
            token_hash: sha256_hex(&refresh_token),
            created_at: BsonDateTime::now(),
            expires_at: BsonDateTime::from_millis(refresh_claims.exp * 1000),
            deleted_at: None,
        };
        self.refresh_tokens.insert(&row).await?;

        tracing::debug!(user_id = %user.id, "issued token pair");
        Ok(TokenResponse {
            access_token,
            refresh_token,
            expires_in: self.keys.access_ttl_seconds(),
        })
    }

    /// Resolves the owner of a usable refresh token.
    pub async fn validate_refresh_token(&self, token: &str) -> Result<UserPublic, AppError> {
        match self
            .blacklist
            .is_token_blacklisted(TokenKind::Refresh, token)
            .await
        {
            Ok(true) => {
                tracing::info!(token = %token_prefix(token), "refresh token is blacklisted");
                return Err(AppError::TokenRevoked);
            }
            Ok(false) => {}
            Err(e) => match self.blacklist_policy {
                FailurePolicy::Closed => return Err(e.into()),
                FailurePolicy::Open => {
                    tracing::warn!(error = %e, "blacklist unavailable, continuing");
                }
            },
        }

        match self.token_cache.get_cached_refresh_token(token).await {
            Ok(Some(user_id)) => return self.resolve_user(&user_id).await,
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "token cache unavailable, using database"),
        }

        let row = self
            .refresh_tokens
            .find_active(&sha256_hex(token), BsonDateTime::now())
            .await?
            .ok_or_else(|| {
                tracing::debug!(token = %token_prefix(token), "refresh token not found or expired");
                AppError::InvalidRefreshToken
            })?;

        let claims = self.keys.decode_refresh_token(token).map_err(|e| {
            tracing::warn!(token = %token_prefix(token), error = %e, "refresh token signature rejected");
            AppError::InvalidRefreshToken
        })?;
        let user_id = row.user_id.to_hex();
        if claims.typ != REFRESH_TOKEN_TYPE || claims.user_id != user_id {
            tracing::warn!(token = %token_prefix(token), "refresh token claims do not match row");
            return Err(AppError::InvalidRefreshToken);
        }

        if let Some(ttl) = remaining(row.expires_at) {
            if let Err(e) = self.token_cache.cache_refresh_token(token, &user_id, ttl).await {
                tracing::warn!(error = %e, "failed to back-fill token cache");
            }
        }

        self.resolve_user(&user_id).await
    }

    /// Cache-first user lookup, falling back to the store and caching the
    /// result.
    pub async fn resolve_user(&self, user_id: &str) -> Result<UserPublic, AppError> {
        if let Ok(Some(user)) = self.user_cache.get_cached_user(user_id).await {
            return Ok(user);
        }

        let oid = ObjectId::parse_str(user_id).map_err(|_| AppError::UserNotFound)?;
        let user: UserPublic = self
            .users
            .find_by_id(&oid)
            .await?
            .ok_or_else(|| {
                tracing::error!(user_id, "token belongs to a user that no longer exists");
                AppError::UserNotFound
            })?
            .into();

        if let Err(e) = self.user_cache.cache_user(&user).await {
            tracing::warn!(user_id, error = %e, "failed to cache user");
        }
        Ok(user)
    }

    /// Revokes a refresh token everywhere it is known. Returns whether a live
    /// row was found. Cache writes are best-effort.
    pub async fn revoke_refresh_token(&self, token: &str) -> Result<bool, AppError> {
        let row = self.refresh_tokens.find_by_hash(&sha256_hex(token)).await?;
        let revoked = match &row {
            Some(row) => self.refresh_tokens.soft_delete(&row.id).await?,
            None => false,
        };

        let blacklisted = match row.and_then(|r| remaining(r.expires_at)) {
            Some(ttl) => {
                self.blacklist
                    .blacklist_token(TokenKind::Refresh, token, ttl)
                    .await
            }
            None => self.blacklist.blacklist_refresh_token(token).await,
        };
        if let Err(e) = blacklisted {
            tracing::warn!(token = %token_prefix(token), error = %e, "failed to blacklist refresh token");
        }
        if let Err(e) = self.token_cache.invalidate_refresh_token_cache(token).await {
            tracing::warn!(token = %token_prefix(token), error = %e, "failed to invalidate token cache");
        }
        Ok(revoked)
    }

    /// Trades a refresh token for a new pair, revoking the old one.
    ///
    /// The old row is claimed first, so two concurrent rotations of the same
    /// token cannot both succeed.
    pub async fn rotate(&self, token: &str) -> Result<TokenResponse, AppError> {
        let user = self.validate_refresh_token(token).await?;

        if !self.revoke_refresh_token(token).await? {
            tracing::warn!(user_id = %user.id, "refresh token was already rotated");
            return Err(AppError::InvalidRefreshToken);
        }

        let pair = self.generate_token_pair(&user).await?;
        tracing::info!(user_id = %user.id, "refresh token rotated");
        Ok(pair)
    }

    /// Blacklists an access token for whatever is left of its lifetime.
    pub async fn blacklist_access_token(&self, token: &str, exp: i64) {
        let left = exp - Utc::now().timestamp();
        let result = if left > 0 {
            self.blacklist
                .blacklist_token(TokenKind::Access, token, Duration::from_secs(left as u64))
                .await
        } else {
            self.blacklist.blacklist_access_token(token).await
        };
        if let Err(e) = result {
            tracing::warn!(token = %token_prefix(token), error = %e, "failed to blacklist access token");
        }
    }
}
