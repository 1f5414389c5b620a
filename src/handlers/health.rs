use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// Up while the database answers. A cache outage only shows in the body,
/// since every cache path falls back or degrades on its own.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let database = state.stores.users.ping().await;
    let cache = state.cache.ping().await;

    if let Err(e) = &database {
        tracing::error!(error = %e, "database ping failed");
    }
    if let Err(e) = &cache {
        tracing::warn!(error = %e, "cache ping failed");
    }

    let status = if database.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let up = |ok: bool| if ok { "UP" } else { "DOWN" };

    (
        status,
        Json(json!({
            "status": up(database.is_ok()),
            "database": up(database.is_ok()),
            "cache": up(cache.is_ok()),
            "cache_stats": state.cache.stats(),
        })),
    )
}
