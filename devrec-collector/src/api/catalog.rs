//! Catalog endpoints
//!
//! - `POST /catalog/reset`: wipe catalog, queue, bounds and counters
//! - `POST /devices/top`: best validated devices matching a filter

use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;
use tracing::info;

use super::request_control;
use crate::error::{ApiError, ApiResult};
use crate::models::{Device, DeviceFilters};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub reset: bool,
}

#[derive(Debug, Serialize)]
pub struct TopDevicesResponse {
    pub devices: Vec<Device>,
}

/// POST /catalog/reset
///
/// Refused while the pipeline runs.
pub async fn reset_catalog(State(state): State<AppState>) -> ApiResult<Json<ResetResponse>> {
    if !state.pipeline.reset_catalog(&request_control()).await? {
        return Err(ApiError::Conflict(
            "Stop the pipeline before resetting the catalog".to_string(),
        ));
    }

    info!("Catalog and error counters reset via API");
    Ok(Json(ResetResponse { reset: true }))
}

/// POST /devices/top
pub async fn top_devices(
    State(state): State<AppState>,
    Json(filters): Json<DeviceFilters>,
) -> ApiResult<Json<TopDevicesResponse>> {
    if filters.price.min > filters.price.max
        || filters.display_size.min > filters.display_size.max
        || filters.refresh_rate.min > filters.refresh_rate.max
    {
        return Err(ApiError::BadRequest(
            "Filter ranges must have min <= max".to_string(),
        ));
    }

    let devices = state.catalog.top_n(&filters, &request_control()).await?;
    Ok(Json(TopDevicesResponse { devices }))
}

pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/catalog/reset", post(reset_catalog))
        .route("/devices/top", post(top_devices))
}
