//! Poll API + Health/Metrics + submission ingress (components J/K). Grounded on
//! `adamtc007-ob-poc/rust/src/api/client_routes.rs`'s axum composition
//! (`Router::new().route(...).with_state(state)`, `(StatusCode, Json<_>)` handlers).

mod error;
mod handlers;
pub mod rate_limit;

use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;
use pa_dedup::DedupCoordinator;
use pa_queue::WorkQueue;
use pa_store::Store;
use pa_worker::Metrics;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    store: Arc<Store>,
    dedup: Arc<DedupCoordinator>,
    queue: Arc<WorkQueue>,
    metrics: Arc<Metrics>,
    started_at: Arc<Instant>,
}

impl AppState {
    pub fn new(
        store: Arc<Store>,
        dedup: Arc<DedupCoordinator>,
        queue: Arc<WorkQueue>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { store, dedup, queue, metrics, started_at: Arc::new(Instant::now()) }
    }
}

/// Build the full HTTP surface: submission ingress, Poll API, health/metrics, fronted
/// by a per-client rate limit and a permissive CORS layer (spec.md §6/§4.J/§4.K).
pub fn router(state: AppState, cors_origin: &str) -> Router {
    let limiter = rate_limit::RateLimiter::new();

    let cors = match cors_origin {
        "*" => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
        origin => CorsLayer::new()
            .allow_origin(origin.parse::<axum::http::HeaderValue>().unwrap())
            .allow_methods(Any)
            .allow_headers(Any),
    };

    Router::new()
        .route("/analyze", post(handlers::analyze))
        .route("/scan/:id", get(handlers::get_scan).delete(handlers::delete_scan))
        .route("/scans", get(handlers::list_scans))
        .layer(axum::middleware::from_fn_with_state(Arc::clone(&limiter), rate_limit::enforce))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
