#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use festive_backend::{
    AppState,
    config::Config,
    festival::FestivalCalendar,
    middleware::{SIGNATURE_HEADER, SignatureVerifier, TIMESTAMP_HEADER, canonical_payload},
    router::create_router,
    utils::generate_token,
};
use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

pub fn config() -> Config {
    Config {
        database_url: "postgres://nobody@127.0.0.1:1/none".into(),
        redis_url: "redis://127.0.0.1:1/".into(),
        jwt_secret: "integration-secret".into(),
        jwt_expiration_secs: 3600,
        hmac_secret: "integration-hmac".into(),
        signature_max_age_secs: 120,
        signature_max_skew_secs: 5,
        rate_limit_window_secs: 60,
        rate_limit_requests: 100,
        auth_rate_limit_window_secs: 3600,
        auth_rate_limit_requests: 5,
        server_host: "127.0.0.1".into(),
        server_port: 0,
        api_base_uri: "/api".into(),
        allow_unlock_override: false,
        spring_festival_dates: Vec::new(),
        onboarding_bot_user_id: None,
        onboarding_bot_nickname: None,
        notification_retention_days: 90,
        notification_purge_interval_secs: 3600,
    }
}

/// Router over `pool` with a Redis nobody listens on; rate limiting is
/// best effort so requests still go through.
pub fn router_with(pool: PgPool, config: Config) -> Router {
    let redis = redis::Client::open(config.redis_url.clone()).unwrap();
    create_router(AppState {
        pool,
        config,
        redis: Arc::new(redis),
        calendar: Arc::new(FestivalCalendar::default()),
    })
}

/// Router over a pool that never connects. Only paths that fail before
/// touching storage give meaningful results.
pub fn app() -> (Router, Config) {
    let config = config();
    let pool = PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(200))
        .connect_lazy(&config.database_url)
        .unwrap();
    (router_with(pool, config.clone()), config)
}

pub fn signed(config: &Config, method: &str, uri: &str, user: Uuid, body: Option<Value>) -> Request<Body> {
    let token = generate_token(user, config).unwrap();
    let raw = body.map(|b| b.to_string()).unwrap_or_default();
    let now = chrono::Utc::now().timestamp_millis();
    let verifier = SignatureVerifier::new(config);
    let signature = verifier
        .sign(&canonical_payload(raw.as_bytes()).unwrap(), now)
        .unwrap();

    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .header(TIMESTAMP_HEADER, now.to_string())
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(raw))
        .unwrap()
}

pub async fn read(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}
