use std::time::Duration;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::idle::track_activity;
use crate::worker::Worker;

pub(crate) mod complete;
pub(crate) mod health;

pub(crate) fn router(worker: Worker, request_timeout: Duration) -> Router {
    // Health probes must not count as traffic or the worker never goes idle
    let completion_router = Router::new()
        .route("/complete", post(complete::handle_complete))
        .route_layer(middleware::from_fn_with_state(
            worker.idle.clone(),
            track_activity,
        ));

    Router::new()
        .merge(completion_router)
        .route("/health", get(health::handle_health))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(worker)
}
