//! Per-client request limiter.
//!
//! Each client (keyed by forwarded address, falling back to the socket peer)
//! gets a fixed window of `requests_per_window` requests. Visitors are kept
//! in process memory and forgotten by [`start_cleanup_task`] once idle for a
//! full window.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use metrics::counter;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::errors::ServiceError;

/// Routes never throttled: health checks, and gateway callbacks the gateway would
/// otherwise keep retrying.
const EXEMPT_SUFFIXES: [&str; 2] = ["/health", "/payments/webhook"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Zero disables limiting.
    pub requests_per_window: u32,
    pub window: Duration,
}

impl RateLimitConfig {
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        Self {
            requests_per_window: cfg.rate_limit_requests,
            window: Duration::from_secs(cfg.rate_limit_window_secs.max(1)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.requests_per_window > 0
    }
}

#[derive(Clone, Debug)]
struct Visitor {
    count: u32,
    window_start: Instant,
    last_seen: Instant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

#[derive(Clone)]
pub struct RateLimiter {
    visitors: Arc<DashMap<String, Visitor>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            visitors: Arc::new(DashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Counts one request for `key` and says whether it may proceed.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let limit = self.config.requests_per_window;
        let mut visitor = self.visitors.entry(key.to_string()).or_insert_with(|| Visitor {
            count: 0,
            window_start: now,
            last_seen: now,
        });

        if now.duration_since(visitor.window_start) >= self.config.window {
            visitor.count = 0;
            visitor.window_start = now;
        }
        visitor.last_seen = now;
        let reset_after = self
            .config
            .window
            .saturating_sub(now.duration_since(visitor.window_start));

        if visitor.count >= limit {
            return RateLimitDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_after,
            };
        }

        visitor.count += 1;
        RateLimitDecision {
            allowed: true,
            limit,
            remaining: limit - visitor.count,
            reset_after,
        }
    }

    pub fn tracked_clients(&self) -> usize {
        self.visitors.len()
    }

    /// Forgets clients idle for longer than one window. Returns how many.
    pub fn cleanup_expired(&self) -> usize {
        self.cleanup_at(Instant::now())
    }

    fn cleanup_at(&self, now: Instant) -> usize {
        let before = self.visitors.len();
        let window = self.config.window;
        self.visitors
            .retain(|_, visitor| now.duration_since(visitor.last_seen) < window);
        before.saturating_sub(self.visitors.len())
    }
}

/// Client identity: first `X-Forwarded-For` hop, then `X-Real-IP`, then the
/// socket peer.
pub fn client_key(request: &Request) -> String {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = forwarded {
        return format!("ip:{}", ip);
    }

    let real_ip = request
        .headers()
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = real_ip {
        return format!("ip:{}", ip);
    }

    match request.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => format!("ip:{}", addr.ip()),
        None => "ip:unknown".to_string(),
    }
}

fn apply_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert(
        "x-ratelimit-reset",
        HeaderValue::from(decision.reset_after.as_secs()),
    );
}

pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if !limiter.config().is_enabled() || EXEMPT_SUFFIXES.iter().any(|suffix| path.ends_with(suffix)) {
        return next.run(request).await;
    }

    let key = client_key(&request);
    let decision = limiter.check(&key);
    if !decision.allowed {
        warn!(%key, %path, "Rate limit exceeded");
        counter!("table_order.rate_limit_denied", 1);
        let retry_after = decision.reset_after.as_secs().max(1);
        let mut response = ServiceError::RateLimitExceeded(retry_after).into_response();
        apply_headers(response.headers_mut(), &decision);
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        return response;
    }

    let mut response = next.run(request).await;
    apply_headers(response.headers_mut(), &decision);
    response
}

pub async fn start_cleanup_task(limiter: RateLimiter, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let forgotten = limiter.cleanup_expired();
        if forgotten > 0 {
            debug!(forgotten, remaining = limiter.tracked_clients(), "Rate limiter cleanup completed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn limiter(requests_per_window: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            requests_per_window,
            window: Duration::from_secs(60),
        })
    }

    #[test]
    fn window_allows_up_to_the_limit() {
        let limiter = limiter(3);
        let start = Instant::now();

        let remaining: Vec<u32> = (0..3)
            .map(|_| limiter.check_at("ip:10.0.0.1", start))
            .map(|decision| {
                assert!(decision.allowed);
                decision.remaining
            })
            .collect();
        assert_eq!(remaining, vec![2, 1, 0]);

        let denied = limiter.check_at("ip:10.0.0.1", start + Duration::from_secs(10));
        assert!(!denied.allowed);
        assert_eq!(denied.reset_after, Duration::from_secs(50));
    }

    #[test]
    fn clients_are_counted_separately() {
        let limiter = limiter(1);
        let now = Instant::now();
        assert!(limiter.check_at("ip:10.0.0.1", now).allowed);
        assert!(!limiter.check_at("ip:10.0.0.1", now).allowed);
        assert!(limiter.check_at("ip:10.0.0.2", now).allowed);
    }

    #[test]
    fn new_window_resets_the_count() {
        let limiter = limiter(1);
        let start = Instant::now();
        assert!(limiter.check_at("ip:10.0.0.1", start).allowed);
        assert!(!limiter.check_at("ip:10.0.0.1", start + Duration::from_secs(59)).allowed);
        assert!(limiter.check_at("ip:10.0.0.1", start + Duration::from_secs(60)).allowed);
    }

    #[test]
    fn cleanup_forgets_idle_clients() {
        let limiter = limiter(5);
        let start = Instant::now();
        limiter.check_at("ip:10.0.0.1", start);
        limiter.check_at("ip:10.0.0.2", start + Duration::from_secs(30));

        assert_eq!(limiter.cleanup_at(start + Duration::from_secs(61)), 1);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn client_key_prefers_forwarded_address() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header("x-real-ip", "10.0.0.9")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_key(&request), "ip:203.0.113.7");

        let mut request = Request::builder().body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 20], 51000))));
        assert_eq!(client_key(&request), "ip:192.168.1.20");

        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_key(&request), "ip:unknown");
    }
}
