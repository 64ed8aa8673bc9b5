//! Pipeline control endpoints
//!
//! - `POST /pipeline/start`: reset error counters and launch a run
//! - `POST /pipeline/stop`: cancel the run and wait for it to wind down
//! - `GET /pipeline/status`: running and stopping flags, last outcome,
//!   queue size and error counters

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::request_control;
use crate::error::{ApiError, ApiResult};
use crate::monitor::ErrorCounters;
use crate::pipeline::PipelineOutcome;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub started: bool,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub stopped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<PipelineOutcome>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub running: bool,
    pub stopping: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<PipelineOutcome>,
    pub queue_size: u32,
    pub error_counters: ErrorCounters,
}

/// POST /pipeline/start
pub async fn start_pipeline(State(state): State<AppState>) -> ApiResult<Json<StartResponse>> {
    if !state.pipeline.start().await? {
        return Err(ApiError::Conflict("Pipeline is already running".to_string()));
    }

    info!("Pipeline started via API");
    Ok(Json(StartResponse { started: true }))
}

/// POST /pipeline/stop
pub async fn stop_pipeline(State(state): State<AppState>) -> Json<StopResponse> {
    let outcome = state.pipeline.stop().await;
    if let Some(outcome) = outcome {
        info!(?outcome, "Pipeline stopped via API");
    }

    Json(StopResponse {
        stopped: outcome.is_some(),
        outcome,
    })
}

/// GET /pipeline/status
pub async fn pipeline_status(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    let status = state.pipeline.status().await;

    if status.last_outcome == Some(PipelineOutcome::TooManyErrors) {
        *state.last_error.write().await =
            Some("Pipeline stopped: too many errors".to_string());
    }

    let queue_size = state.catalog.queue_size(&request_control()).await?;
    let error_counters = state.catalog.monitor().snapshot().await?;

    Ok(Json(StatusResponse {
        running: status.running,
        stopping: status.stopping,
        started_at: status.started_at,
        last_outcome: status.last_outcome,
        queue_size,
        error_counters,
    }))
}

pub fn pipeline_routes() -> Router<AppState> {
    Router::new()
        .route("/pipeline/start", post(start_pipeline))
        .route("/pipeline/stop", post(stop_pipeline))
        .route("/pipeline/status", get(pipeline_status))
}
