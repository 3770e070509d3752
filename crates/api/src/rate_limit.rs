//! Per-client sliding-window rate limit at the ingress layer (spec.md §4.K:
//! "10 requests per minute per client identity"). Grounded on the teacher's
//! `host_last_seen: DashMap<String, Instant>` politeness tracker
//! (`crates/frontier/src/lib.rs`), generalized from a single timestamp to a
//! bounded window of recent hit timestamps.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use dashmap::DashMap;

const WINDOW: Duration = Duration::from_secs(60);
const LIMIT: usize = 10;

#[derive(Default)]
pub struct RateLimiter {
    hits: DashMap<String, Vec<Instant>>,
}

impl RateLimiter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn check(&self, client: &str) -> bool {
        let now = Instant::now();
        let mut entry = self.hits.entry(client.to_string()).or_default();
        entry.retain(|t| now.duration_since(*t) < WINDOW);
        if entry.len() >= LIMIT {
            return false;
        }
        entry.push(now);
        true
    }
}

/// `axum::middleware::from_fn_with_state` layer; identifies the client by the
/// connecting socket's IP (no auth layer exists ahead of this service).
pub async fn enforce(
    State(limiter): State<Arc<RateLimiter>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: axum::extract::Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if limiter.check(&addr.ip().to_string()) {
        Ok(next.run(request).await)
    } else {
        Err(StatusCode::TOO_MANY_REQUESTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit_then_blocks() {
        let limiter = RateLimiter::default();
        for _ in 0..LIMIT {
            assert!(limiter.check("1.2.3.4"));
        }
        assert!(!limiter.check("1.2.3.4"));
    }

    #[test]
    fn tracks_clients_independently() {
        let limiter = RateLimiter::default();
        for _ in 0..LIMIT {
            assert!(limiter.check("1.1.1.1"));
        }
        assert!(limiter.check("2.2.2.2"));
    }
}
