use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, Method},
    middleware::Next,
    response::Response,
};
use moka::future::Cache;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};
use std::time::Duration;

use crate::AppError;

/// Fixed-window request counter keyed by client identity.
///
/// A window opens on the first request from an identity and lasts `window`;
/// the entry's TTL closes it.
pub struct RateLimiter {
    scope: &'static str,
    limit: u32,
    writes_only: bool,
    trust_forwarded: bool,
    windows: Cache<String, Arc<AtomicU32>>,
}

impl RateLimiter {
    pub fn new(scope: &'static str, limit: u32, window: Duration) -> Self {
        Self {
            scope,
            limit,
            writes_only: false,
            trust_forwarded: false,
            windows: Cache::builder()
                .time_to_live(window)
                .max_capacity(100_000)
                .build(),
        }
    }

    /// Per-minute limiter.
    pub fn per_minute(scope: &'static str, limit: u32) -> Self {
        Self::new(scope, limit, Duration::from_secs(60))
    }

    /// Only count requests that modify state.
    pub fn writes_only(mut self) -> Self {
        self.writes_only = true;
        self
    }

    /// Key on `X-Forwarded-For` instead of the peer. Only safe behind a proxy
    /// that overwrites the header.
    pub fn trust_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded = trust;
        self
    }

    fn applies_to(&self, method: &Method) -> bool {
        !self.writes_only || !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
    }

    /// Count a request; false once the identity is over its limit.
    pub async fn check(&self, ident: &str) -> bool {
        let key = format!("{}:{}", self.scope, ident);
        let counter = self
            .windows
            .get_with(key, async { Arc::new(AtomicU32::new(0)) })
            .await;
        counter.fetch_add(1, Ordering::Relaxed) < self.limit
    }
}

/// The peer address. With `trust_forwarded`, the first forwarded address wins.
pub fn client_ident(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded: bool) -> String {
    let forwarded = trust_forwarded
        .then(|| headers.get("X-Forwarded-For"))
        .flatten()
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    forwarded
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !limiter.applies_to(request.method()) {
        return Ok(next.run(request).await);
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ident = client_ident(request.headers(), peer, limiter.trust_forwarded);

    if !limiter.check(&ident).await {
        tracing::warn!(scope = limiter.scope, ident = %ident, "Rate limit exceeded");
        metrics::counter!("rate_limited_requests_total", "scope" => limiter.scope).increment(1);
        return Err(AppError::TooManyRequests(
            "Request was throttled. Try again later.".to_string(),
        ));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn test_rejects_after_limit() {
        let limiter = RateLimiter::per_minute("auth", 3);
        for _ in 0..3 {
            assert!(limiter.check("10.0.0.1").await);
        }
        assert!(!limiter.check("10.0.0.1").await);
        assert!(limiter.check("10.0.0.2").await);
    }

    #[tokio::test]
    async fn test_window_expires() {
        let limiter = RateLimiter::new("auth", 1, Duration::from_millis(50));
        assert!(limiter.check("ip").await);
        assert!(!limiter.check("ip").await);
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(limiter.check("ip").await);
    }

    #[test]
    fn test_writes_only_skips_reads() {
        let limiter = RateLimiter::per_minute("admin", 1).writes_only();
        assert!(!limiter.applies_to(&Method::GET));
        assert!(limiter.applies_to(&Method::POST));
        assert!(limiter.applies_to(&Method::DELETE));
    }

    #[test]
    fn test_client_ident_ignores_forwarded_header_by_default() {
        let mut headers = HeaderMap::new();
        let peer: SocketAddr = "192.168.1.9:5000".parse().unwrap();
        headers.insert("X-Forwarded-For", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));

        assert_eq!(client_ident(&headers, Some(peer), false), "192.168.1.9");
        assert_eq!(client_ident(&headers, None, false), "unknown");
    }

    #[test]
    fn test_client_ident_behind_trusted_proxy() {
        let mut headers = HeaderMap::new();
        let peer: SocketAddr = "10.0.0.1:5000".parse().unwrap();
        assert_eq!(client_ident(&headers, Some(peer), true), "10.0.0.1");

        headers.insert("X-Forwarded-For", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(client_ident(&headers, Some(peer), true), "203.0.113.7");
        assert_eq!(client_ident(&HeaderMap::new(), None, true), "unknown");
    }

    fn limited_app(limiter: RateLimiter) -> axum::Router {
        use axum::routing::post;

        axum::Router::new()
            .route("/verify-otp/", post(|| async { "ok" }))
            .route_layer(axum::middleware::from_fn_with_state(
                Arc::new(limiter),
                rate_limit_middleware,
            ))
    }

    fn post_from(peer: &str, forwarded_for: &str) -> Request {
        let peer: SocketAddr = peer.parse().unwrap();
        Request::builder()
            .method(Method::POST)
            .uri("/verify-otp/")
            .header("X-Forwarded-For", forwarded_for)
            .extension(ConnectInfo(peer))
            .body(axum::body::Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_middleware_returns_429_over_limit() {
        use axum::http::StatusCode;
        use tower::ServiceExt;

        let app = limited_app(RateLimiter::per_minute("auth", 1));

        let first = app.clone().oneshot(post_from("198.51.100.4:4000", "1.1.1.1")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(post_from("198.51.100.4:4000", "1.1.1.1")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_rotating_forwarded_header_does_not_reset_limit() {
        use axum::http::StatusCode;
        use tower::ServiceExt;

        let app = limited_app(RateLimiter::per_minute("auth", 1));

        let mut accepted = 0;
        for i in 0..20 {
            let response = app
                .clone()
                .oneshot(post_from("198.51.100.4:4000", &format!("203.0.113.{}", i)))
                .await
                .unwrap();
            if response.status() == StatusCode::OK {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
    }

    #[tokio::test]
    async fn test_trusted_proxy_limits_per_forwarded_client() {
        use axum::http::StatusCode;
        use tower::ServiceExt;

        let app = limited_app(RateLimiter::per_minute("auth", 1).trust_forwarded_for(true));

        let a = app.clone().oneshot(post_from("10.0.0.1:80", "203.0.113.1")).await.unwrap();
        let b = app.clone().oneshot(post_from("10.0.0.1:80", "203.0.113.2")).await.unwrap();
        let a_again = app.oneshot(post_from("10.0.0.1:80", "203.0.113.1")).await.unwrap();

        assert_eq!(a.status(), StatusCode::OK);
        assert_eq!(b.status(), StatusCode::OK);
        assert_eq!(a_again.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
