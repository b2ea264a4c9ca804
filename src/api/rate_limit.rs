//! Rate limiting for the authentication endpoints.
//!
//! Login and registration take a fixed per-IP budget per minute so
//! credential stuffing cannot run at line rate. A fixed window is enough
//! here; the window resets a minute after the first request in it.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::audit::extract_client_ip;
use super::error::ApiError;
use crate::config::RateLimitConfig;
use crate::AppState;

#[derive(Debug, Clone)]
struct WindowEntry {
    count: u32,
    window_start: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    entries: DashMap<String, WindowEntry>,
    config: RateLimitConfig,
}

const WINDOW: Duration = Duration::from_secs(60);

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
        }
    }

    /// Record a request from `client` and report whether it is allowed.
    pub fn check(&self, client: &str) -> bool {
        if !self.config.enabled {
            return true;
        }

        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(client.to_string())
            .or_insert_with(|| WindowEntry {
                count: 0,
                window_start: now,
            });

        if now.duration_since(entry.window_start) >= WINDOW {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;
        entry.count <= self.config.auth_requests_per_minute
    }

    /// Drop windows that have fully elapsed. Called opportunistically.
    pub fn prune(&self) {
        let now = Instant::now();
        self.entries
            .retain(|_, entry| now.duration_since(entry.window_start) < WINDOW);
    }
}

/// Middleware applied to login/register routes.
pub async fn auth_rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let client = extract_client_ip(request.headers(), None).unwrap_or_else(|| "unknown".to_string());

    if !state.rate_limiter.check(&client) {
        tracing::warn!(client = %client, "Rate limit exceeded on auth endpoint");
        return Err(ApiError::rate_limited(
            "Too many attempts. Please try again later.",
        ));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(per_minute: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            enabled: true,
            auth_requests_per_minute: per_minute,
        })
    }

    #[test]
    fn test_allows_up_to_limit() {
        let limiter = limiter(3);
        assert!(limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.1"));
        assert!(!limiter.check("10.0.0.1"));
    }

    #[test]
    fn test_clients_are_independent() {
        let limiter = limiter(1);
        assert!(limiter.check("10.0.0.1"));
        assert!(!limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.2"));
    }

    #[test]
    fn test_disabled_limiter_always_allows() {
        let limiter = RateLimiter::new(RateLimitConfig {
            enabled: false,
            auth_requests_per_minute: 1,
        });
        for _ in 0..10 {
            assert!(limiter.check("10.0.0.1"));
        }
    }
}
