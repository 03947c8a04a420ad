//! HTTP API routes.

pub mod dead_letters;
pub mod deliveries;
pub mod events;
pub mod health;
pub mod subscribers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

use hookrelay_delivery::{CircuitBreaker, FanoutEngine};

/// Shared state for all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub fanout: Arc<FanoutEngine>,
    pub breaker: CircuitBreaker,
    pub worker_count: usize,
}

/// Build the versioned API router.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health::health))
        .route("/api/v1/stats", get(health::stats))
        .route(
            "/api/v1/subscribers",
            post(subscribers::create).get(subscribers::list),
        )
        .route(
            "/api/v1/subscribers/:id",
            get(subscribers::get).patch(subscribers::update),
        )
        .route(
            "/api/v1/subscribers/:id/health",
            get(subscribers::health),
        )
        .route("/api/v1/events", post(events::publish).get(events::list))
        .route("/api/v1/events/:id", get(events::get))
        .route("/api/v1/deliveries", get(deliveries::list))
        .route("/api/v1/deliveries/:id", get(deliveries::get))
        .route("/api/v1/dead-letters", get(dead_letters::list))
        .route("/api/v1/dead-letters/:id", get(dead_letters::get))
        .route(
            "/api/v1/dead-letters/:id/resolve",
            post(dead_letters::resolve),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
