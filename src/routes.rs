use std::sync::Arc;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};

use crate::{
    handlers::{auth, health, products, user},
    middleware::{
        auth::require_auth,
        correlation::correlation,
        rate_limit::{limit_auth, limit_by_ip, limit_by_user},
    },
    state::AppState,
};

pub fn app_router(state: Arc<AppState>) -> Router {
    let credentials = Router::new()
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/signin", post(auth::signin))
        .route("/api/auth/refresh", post(auth::refresh))
        .route_layer(from_fn_with_state(state.clone(), limit_auth));

    // Layers run bottom-up: authenticate first, then count per user.
    let protected = Router::new()
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/user/profile", get(user::profile))
        .route("/api/products", get(products::list).post(products::create))
        .route(
            "/api/products/{id}",
            get(products::get)
                .put(products::update)
                .delete(products::delete),
        )
        .route_layer(from_fn_with_state(state.clone(), limit_by_user))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health::health))
        .merge(credentials)
        .merge(protected)
        .layer(from_fn_with_state(state.clone(), limit_by_ip))
        .layer(from_fn(correlation))
        .with_state(state)
}
