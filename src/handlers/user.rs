use std::sync::Arc;

use axum::{extract::State, Json};

use crate::{
    auth::AuthUser, errors::AppError, models::user::UserPublic, services::auth_service,
    state::AppState,
};

pub async fn profile(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
) -> Result<Json<UserPublic>, AppError> {
    Ok(Json(auth_service::profile(&state, &identity).await?))
}
