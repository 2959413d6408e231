use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use scanbox_common::sink::DiscoveryRequest;
use serde::Serialize;
use tracing::{info, warn};

use super::AppState;

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum DiscoveryResponse {
    Accepted { status: &'static str },
    Rejected { error: &'static str },
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_jobs: usize,
}

/// Starts a discovery job in the background and acknowledges immediately.
pub async fn start_discovery(
    State(state): State<AppState>,
    payload: Result<Json<DiscoveryRequest>, JsonRejection>,
) -> (StatusCode, Json<DiscoveryResponse>) {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!("Rejected discovery request: {}", rejection.body_text());
            return (
                StatusCode::BAD_REQUEST,
                Json(DiscoveryResponse::Rejected {
                    error: "Invalid request payload",
                }),
            );
        }
    };

    info!(
        asset_id = %request.asset_id,
        targets = request.targets.len(),
        "Discovery requested"
    );
    state.jobs.spawn(request);

    (
        StatusCode::OK,
        Json(DiscoveryResponse::Accepted {
            status: "Scan initiated",
        }),
    )
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        active_jobs: state.jobs.active_jobs(),
    })
}
