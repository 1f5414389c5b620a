use validator::Validate;

use crate::{
    dto::auth::{
        RefreshRequest, SigninRequest, SigninResponse, SignupRequest, SignupResponse,
        TokenResponse,
    },
    errors::AppError,
    middleware::auth::Identity,
    models::user::{UserDoc, UserPublic},
    password::{hash_password, verify_password},
    state::AppState,
};

pub async fn signup(state: &AppState, req: SignupRequest) -> Result<SignupResponse, AppError> {
    req.validate()?;
    let email = req.email.trim().to_lowercase();
    let username = req.username.trim().to_string();

    if state.stores.users.find_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict("email already registered".into()));
    }
    if state
        .stores
        .users
        .find_by_username(&username)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict("username already taken".into()));
    }

    let password_hash = hash_password(&req.password).await?;
    let user = UserDoc::new(username, email, password_hash);
    state.stores.users.insert(&user).await?;

    tracing::info!(user_id = %user.id, username = %user.username, "user signed up");
    Ok(SignupResponse {
        id: user.id.to_hex(),
        username: user.username,
        email: user.email,
    })
}

pub async fn signin(state: &AppState, req: SigninRequest) -> Result<SigninResponse, AppError> {
    req.validate()?;
    let email = req.email.trim().to_lowercase();

    let user = state
        .stores
        .users
        .find_by_email(&email)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !verify_password(&req.password, &user.password_hash).await? {
        tracing::info!(user_id = %user.id, "signin with wrong password");
        return Err(AppError::InvalidCredentials);
    }

    let user = UserPublic::from(user);
    if let Err(e) = state.user_cache.cache_user(&user).await {
        tracing::warn!(user_id = %user.id, error = %e, "failed to cache user at signin");
    }

    let tokens = state.tokens.generate_token_pair(&user).await?;
    tracing::info!(user_id = %user.id, "user signed in");
    Ok(SigninResponse { user, tokens })
}

pub async fn refresh(state: &AppState, req: RefreshRequest) -> Result<TokenResponse, AppError> {
    req.validate()?;
    state.tokens.rotate(&req.refresh_token).await
}

/// Revokes the presented access token, then the refresh token in the body.
/// The access token is revoked even when the body is rejected. Cache failures
/// are logged; an unknown refresh token is not an error.
pub async fn logout(
    state: &AppState,
    identity: &Identity,
    req: RefreshRequest,
) -> Result<(), AppError> {
    state
        .tokens
        .blacklist_access_token(&identity.access_token, identity.expires_at)
        .await;

    if let Err(e) = state.user_cache.invalidate_user(&identity.user_id).await {
        tracing::warn!(user_id = %identity.user_id, error = %e, "failed to invalidate user cache");
    }

    req.validate()?;

    if !state.tokens.revoke_refresh_token(&req.refresh_token).await? {
        tracing::debug!(user_id = %identity.user_id, "logout with unknown refresh token");
    }

    tracing::info!(user_id = %identity.user_id, "user logged out");
    Ok(())
}

pub async fn profile(state: &AppState, identity: &Identity) -> Result<UserPublic, AppError> {
    if let Some(user) = &identity.user {
        return Ok(user.clone());
    }
    state.tokens.resolve_user(&identity.user_id).await
}
