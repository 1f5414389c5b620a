use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::{
    auth::AuthUser,
    dto::auth::{
        RefreshRequest, SigninRequest, SigninResponse, SignupRequest, SignupResponse,
        TokenResponse,
    },
    errors::AppError,
    services::auth_service,
    state::AppState,
};

pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, Json<SignupResponse>), AppError> {
    let out = auth_service::signup(&state, req).await?;
    Ok((StatusCode::CREATED, Json(out)))
}

pub async fn signin(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SigninRequest>,
) -> Result<Json<SigninResponse>, AppError> {
    Ok(Json(auth_service::signin(&state, req).await?))
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    Ok(Json(auth_service::refresh(&state, req).await?))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<Value>, AppError> {
    auth_service::logout(&state, &identity, req).await?;
    Ok(Json(json!({ "message": "logged out" })))
}
