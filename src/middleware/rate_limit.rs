use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use redis::AsyncCommands;

use crate::error::AppError;

/// Fixed-window request counter per client IP, shared through Redis.
/// Counting is best effort: when Redis is unavailable requests pass.
#[derive(Clone)]
pub struct RateLimiter {
    redis: Arc<redis::Client>,
    scope: &'static str,
    window: Duration,
    max_requests: u32,
}

impl RateLimiter {
    pub fn new(
        redis: Arc<redis::Client>,
        scope: &'static str,
        window: Duration,
        max_requests: u32,
    ) -> Self {
        Self {
            redis,
            scope,
            window,
            max_requests,
        }
    }

    fn key(&self, ip: &str) -> String {
        format!("rate_limit:{}:{}", self.scope, ip)
    }

    async fn hit(&self, ip: &str) -> Result<u32, redis::RedisError> {
        let key = self.key(ip);
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let count: u32 = conn.incr(&key, 1).await?;
        if count == 1 {
            let _: () = conn.expire(&key, self.window.as_secs() as i64).await?;
        }
        Ok(count)
    }

    pub async fn check_rate_limit(&self, req: Request<Body>, next: Next) -> Result<Response, AppError> {
        let remote_ip = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string());
        let ip = client_ip(req.headers(), remote_ip.as_deref());

        match self.hit(&ip).await {
            Ok(count) if count > self.max_requests => {
                tracing::info!("Rate limit exceeded for {} in scope {}", ip, self.scope);
                return Err(AppError::RateLimited(self.window.as_secs()));
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Rate limiter unavailable, allowing request: {}", e),
        }

        Ok(next.run(req).await)
    }
}

/// `x-real-ip`, then the first `x-forwarded-for` entry, then the socket peer.
pub fn client_ip(headers: &HeaderMap, remote_ip: Option<&str>) -> String {
    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .filter(|ip| !ip.trim().is_empty())
        .or_else(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').find(|ip| !ip.trim().is_empty()))
        })
        .or(remote_ip)
        .unwrap_or("unknown")
        .trim()
        .to_string()
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    limiter.check_rate_limit(req, next).await
}
