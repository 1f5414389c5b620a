#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use starter_api::{
    cache::MemoryCache,
    config::{Config, FailurePolicy, RateLimitSettings},
    routes::app_router,
    state::AppState,
    store::{MemoryStore, Stores},
};
use tower::ServiceExt;

/// Configuration for in-process runs; tests override what they need.
pub fn test_config() -> Config {
    Config {
        bind_addr: "127.0.0.1:0".into(),
        mongodb_uri: String::new(),
        db_name: "starter_api_test".into(),
        redis_url: String::new(),
        jwt_access_secret: "test-access-secret".into(),
        jwt_refresh_secret: "test-refresh-secret".into(),
        jwt_access_ttl_seconds: 900,
        jwt_refresh_ttl_seconds: 7 * 24 * 60 * 60,
        rate_limit: RateLimitSettings::default(),
        blacklist_read_policy: FailurePolicy::Closed,
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(cfg: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let state = Arc::new(AppState::from_parts(
            cfg,
            Arc::new(MemoryCache::new()),
            Stores::memory(store.clone()),
        ));
        Self {
            router: app_router(state.clone()),
            state,
            store,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, token, None).await
    }

    /// Signs up `username` and signs in, returning the signin body.
    pub async fn sign_up_and_in(&self, username: &str) -> Value {
        let email = format!("{username}@example.com");
        let resp = self
            .post(
                "/api/auth/signup",
                None,
                json!({ "username": username, "email": email, "password": "secret123" }),
            )
            .await;
        assert_eq!(resp.status, StatusCode::CREATED, "{:?}", resp.body);

        let resp = self
            .post(
                "/api/auth/signin",
                None,
                json!({ "email": email, "password": "secret123" }),
            )
            .await;
        assert_eq!(resp.status, StatusCode::OK, "{:?}", resp.body);
        resp.body
    }
}

pub fn access_token(signin: &Value) -> String {
    signin["tokens"]["access_token"].as_str().unwrap().to_string()
}

pub fn refresh_token(signin: &Value) -> String {
    signin["tokens"]["refresh_token"].as_str().unwrap().to_string()
}
