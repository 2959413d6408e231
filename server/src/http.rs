//! Inbound HTTP boundary.

use axum::Router;
use axum::routing::{get, post};

use crate::job::JobRunner;

mod routes;

#[derive(Clone)]
pub struct AppState {
    pub jobs: JobRunner,
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/api/host-discovery-scan", post(routes::start_discovery))
        .route("/health", get(routes::health))
        .with_state(state)
}
