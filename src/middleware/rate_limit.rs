use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    errors::AppError,
    middleware::auth::Identity,
    rate_limit::{Decision, RateLimiter},
    state::AppState,
};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");

/// First `X-Forwarded-For` entry, then `X-Real-IP`, then the socket peer.
pub fn client_ip(req: &Request) -> String {
    let headers = req.headers();
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get(X_REAL_IP)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Writes the limit headers unless an inner limiter already did.
fn apply_headers(headers: &mut HeaderMap, d: &Decision) {
    let values = [
        (X_RATELIMIT_LIMIT, u64::from(d.limit)),
        (X_RATELIMIT_REMAINING, u64::from(d.remaining)),
        (X_RATELIMIT_RESET, d.reset_after.as_secs()),
    ];
    for (name, value) in values {
        if !headers.contains_key(&name) {
            headers.insert(name, HeaderValue::from(value));
        }
    }
}

async fn enforce(limiter: &RateLimiter, identifier: &str, req: Request, next: Next) -> Response {
    let outcome = limiter.allow(identifier).await;
    if let Some(e) = &outcome.error {
        tracing::warn!(
            limiter = limiter.kind().as_str(),
            identifier,
            error = %e,
            allowed = outcome.decision.allowed,
            "rate limiter degraded"
        );
    }

    let decision = outcome.decision;
    if !decision.allowed {
        let mut resp = AppError::TooManyRequests.into_response();
        apply_headers(resp.headers_mut(), &decision);
        resp.headers_mut().insert(
            axum::http::header::RETRY_AFTER,
            HeaderValue::from(decision.reset_after.as_secs()),
        );
        return resp;
    }

    let mut resp = next.run(req).await;
    apply_headers(resp.headers_mut(), &decision);
    resp
}

pub async fn limit_by_ip(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&req);
    enforce(&state.ip_limiter, &ip, req, next).await
}

/// Tighter IP-keyed limit for credential endpoints.
pub async fn limit_auth(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&req);
    enforce(&state.auth_limiter, &ip, req, next).await
}

/// Per-user limit. Must run after `require_auth`; unauthenticated requests
/// pass through untouched.
pub async fn limit_by_user(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(user_id) = req.extensions().get::<Identity>().map(|i| i.user_id.clone()) else {
        return next.run(req).await;
    };
    enforce(&state.user_limiter, &user_id, req, next).await
}
