//! devrec-collector library interface
//!
//! Exposes the pipeline, persistence and HTTP surface for the binary and
//! for integration tests.

pub mod api;
pub mod config;
pub mod control;
pub mod db;
pub mod error;
pub mod estimator;
pub mod models;
pub mod monitor;
pub mod pipeline;
pub mod scoring;
pub mod sources;

pub use crate::error::{ApiError, ApiResult, CollectorError, CollectorResult};

use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::db::CatalogDb;
use crate::pipeline::PipelineManager;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogDb,
    pub pipeline: Arc<PipelineManager>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(pipeline: PipelineManager) -> Self {
        Self {
            catalog: pipeline.db().clone(),
            pipeline: Arc::new(pipeline),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::pipeline_routes())
        .merge(api::catalog_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
