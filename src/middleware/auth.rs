use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};

use crate::{
    auth::jwt::{AccessTokenError, JwtKeys},
    cache::{
        blacklist::{TokenBlacklist, TokenKind},
        token_prefix,
        users::UserCache,
    },
    config::FailurePolicy,
    errors::AppError,
    models::user::UserPublic,
    state::AppState,
};

/// Who made the request, as established by [`Authenticator::authenticate`].
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
    pub access_token: String,
    /// Access token expiry, Unix seconds.
    pub expires_at: i64,
    /// Cached user record, when the cache had one.
    pub user: Option<UserPublic>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    MissingHeader,
    BadFormat,
    Blacklisted,
    BlacklistUnavailable,
    InvalidSignature,
    BadClaims,
}

impl AuthRejection {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthRejection::MissingHeader => "missing authorization header",
            AuthRejection::BadFormat => "malformed authorization header",
            AuthRejection::Blacklisted => "token is blacklisted",
            AuthRejection::BlacklistUnavailable => "blacklist unavailable",
            AuthRejection::InvalidSignature => "invalid or expired token",
            AuthRejection::BadClaims => "invalid token claims",
        }
    }
}

#[derive(Clone)]
pub struct Authenticator {
    keys: JwtKeys,
    blacklist: TokenBlacklist,
    user_cache: UserCache,
    blacklist_policy: FailurePolicy,
}

impl Authenticator {
    pub fn new(
        keys: JwtKeys,
        blacklist: TokenBlacklist,
        user_cache: UserCache,
        blacklist_policy: FailurePolicy,
    ) -> Self {
        Self {
            keys,
            blacklist,
            user_cache,
            blacklist_policy,
        }
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, AuthRejection> {
        let bearer = match headers.typed_try_get::<Authorization<Bearer>>() {
            Ok(Some(Authorization(bearer))) => bearer,
            Ok(None) => return Err(AuthRejection::MissingHeader),
            Err(_) => return Err(AuthRejection::BadFormat),
        };
        let token = bearer.token();

        match self
            .blacklist
            .is_token_blacklisted(TokenKind::Access, token)
            .await
        {
            Ok(true) => return Err(AuthRejection::Blacklisted),
            Ok(false) => {}
            Err(_) if self.blacklist_policy == FailurePolicy::Closed => {
                return Err(AuthRejection::BlacklistUnavailable)
            }
            Err(_) => {}
        }

        let claims = self.keys.decode_access_token(token).map_err(|e| match e {
            AccessTokenError::Invalid => AuthRejection::InvalidSignature,
            AccessTokenError::BadClaims => AuthRejection::BadClaims,
        })?;

        let user = self
            .user_cache
            .get_cached_user(&claims.user_id)
            .await
            .ok()
            .flatten();

        Ok(Identity {
            user_id: claims.user_id,
            username: claims.username,
            access_token: token.to_string(),
            expires_at: claims.exp,
            user,
        })
    }
}

pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    match state.authenticator.authenticate(req.headers()).await {
        Ok(identity) => {
            tracing::debug!(user_id = %identity.user_id, "request authenticated");
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Err(rejection) => {
            let token = req
                .headers()
                .typed_get::<Authorization<Bearer>>()
                .map(|Authorization(b)| token_prefix(b.token()));
            tracing::info!(
                path = %req.uri().path(),
                reason = rejection.as_str(),
                token = token.as_deref().unwrap_or("-"),
                "authentication rejected"
            );
            AppError::Unauthorized.into_response()
        }
    }
}
