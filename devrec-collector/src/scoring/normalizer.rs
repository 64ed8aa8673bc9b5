//! Min-max normalizer
//!
//! Re-scores every catalog device against a new bounding box. Expanding
//! any bound moves the normalized position of every device, so a changed
//! box always means a full pass.

use std::time::Duration;

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::control::FlowControl;
use crate::db::devices;
use crate::error::CollectorResult;
use crate::models::MinMaxValues;
use crate::monitor::ErrorCategory;
use crate::scoring::apply_unvalidated;

/// Recompute and store every device's unvalidated scores against `bounds`
///
/// Idempotent: the stored values depend only on device fields and `bounds`.
/// Returns the number of devices rewritten.
pub async fn recompute_all(
    pool: &SqlitePool,
    bounds: &MinMaxValues,
    ctrl: &FlowControl,
    db_timeout: Duration,
) -> CollectorResult<usize> {
    let ids = ctrl
        .bounded(
            "list device ids",
            db_timeout,
            ErrorCategory::DatabaseNetwork,
            devices::list_device_ids(pool),
        )
        .await?;

    for id in &ids {
        let mut device = ctrl
            .bounded(
                "load device",
                db_timeout,
                ErrorCategory::DatabaseNetwork,
                devices::load_device(pool, *id),
            )
            .await?;

        apply_unvalidated(bounds, &mut device);

        ctrl.bounded(
            "update unvalidated scores",
            db_timeout,
            ErrorCategory::DatabaseNetwork,
            devices::update_unvalidated_scores(
                pool,
                device.id,
                device.review.unvalidated_score,
                device.unvalidated_final_score,
            ),
        )
        .await?;

        debug!(device = %device.name, score = device.unvalidated_final_score, "Renormalized device");
    }

    info!(devices = ids.len(), "Recomputed unvalidated scores");
    Ok(ids.len())
}
