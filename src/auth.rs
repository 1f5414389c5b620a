pub mod jwt;
pub mod tokens;

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{errors::AppError, middleware::auth::Identity};

/// The identity `require_auth` attached to the request.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(Self)
            .ok_or(AppError::Unauthorized)
    }
}
