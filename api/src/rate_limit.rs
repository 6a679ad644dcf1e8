//! In-memory per-IP rate limiter.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tokio::sync::RwLock;

use crate::error::ApiError;
use crate::state::AppState;

/// Sliding-window request counter keyed by client IP.
pub struct RateLimiter {
    history: Arc<RwLock<HashMap<String, Vec<Instant>>>>,
    max_requests: u32,
    window: Duration
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_seconds: u64) -> Self {
        Self {
            history: Arc::new(RwLock::new(HashMap::new())),
            max_requests,
            window: Duration::from_secs(window_seconds)
        }
    }

    /// Records one request for `key`, or returns the seconds until the
    /// oldest in-window request expires when the budget is spent.
    pub async fn check(&self, key: &str) -> Result<(), f64> {
        let mut history = self.history.write().await;
        let now = Instant::now();

        let requests = history.entry(key.to_string()).or_default();
        requests.retain(|&t| now.duration_since(t) < self.window);

        if requests.len() >= self.max_requests as usize {
            // A zero budget rejects before anything is recorded, so the
            // window may be empty here; report the full window then.
            let wait = requests
                .first()
                .map(|&earliest| {
                    self.window.as_secs_f64() - now.duration_since(earliest).as_secs_f64()
                })
                .unwrap_or_else(|| self.window.as_secs_f64());
            return Err(wait.max(0.0));
        }

        requests.push(now);
        Ok(())
    }

    /// Remaining budget for `key` in the current window.
    pub async fn remaining(&self, key: &str) -> u32 {
        let history = self.history.read().await;
        let now = Instant::now();
        let used = history
            .get(key)
            .map(|requests| {
                requests
                    .iter()
                    .filter(|&&t| now.duration_since(t) < self.window)
                    .count()
            })
            .unwrap_or(0);
        self.max_requests.saturating_sub(used as u32)
    }
}

/// Middleware enforcing the per-IP limit on mutating endpoints.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next
) -> Result<Response, ApiError> {
    let key = client_ip(&request);

    match state.limiter.check(&key).await {
        Ok(()) => {
            tracing::debug!(client_ip = %key, "Within rate limits");
            Ok(next.run(request).await)
        }
        Err(retry_in_secs) => {
            tracing::warn!(client_ip = %key, retry_in_secs, "Rate limit exceeded");
            Err(ApiError::RateLimitExceeded { retry_in_secs })
        }
    }
}

/// Client IP: `X-Forwarded-For` first (proxy deployments), then the socket
/// peer address.
fn client_ip(request: &Request) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allows_up_to_max_requests() {
        let limiter = RateLimiter::new(3, 60);
        assert!(limiter.check("1.2.3.4").await.is_ok());
        assert!(limiter.check("1.2.3.4").await.is_ok());
        assert!(limiter.check("1.2.3.4").await.is_ok());
        assert!(limiter.check("1.2.3.4").await.is_err());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = RateLimiter::new(1, 60);
        assert!(limiter.check("1.1.1.1").await.is_ok());
        assert!(limiter.check("2.2.2.2").await.is_ok());
        assert!(limiter.check("1.1.1.1").await.is_err());
    }

    #[tokio::test]
    async fn test_window_prunes_old_requests() {
        let limiter = RateLimiter::new(1, 0);
        assert!(limiter.check("1.2.3.4").await.is_ok());
        tokio::time::sleep(Duration::from_millis(5)).await;
        // Zero-length window: the previous request has already expired.
        assert!(limiter.check("1.2.3.4").await.is_ok());
    }

    #[tokio::test]
    async fn test_zero_budget_rejects_without_panicking() {
        let limiter = RateLimiter::new(0, 60);
        let wait = limiter.check("1.2.3.4").await.unwrap_err();
        assert!((wait - 60.0).abs() < 0.5);
        // Still rejects on repeat, never records a request.
        assert!(limiter.check("1.2.3.4").await.is_err());
    }

    #[tokio::test]
    async fn test_rejection_reports_wait_time() {
        let limiter = RateLimiter::new(1, 60);
        limiter.check("k").await.unwrap();
        let wait = limiter.check("k").await.unwrap_err();
        assert!(wait > 0.0 && wait <= 60.0);
    }

    #[tokio::test]
    async fn test_remaining_counts_down() {
        let limiter = RateLimiter::new(2, 60);
        assert_eq!(limiter.remaining("k").await, 2);
        limiter.check("k").await.unwrap();
        assert_eq!(limiter.remaining("k").await, 1);
    }
}
