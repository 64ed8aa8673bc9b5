//! Score validator: two-phase promotion of unvalidated scores
//!
//! Phase state lives beside the boxes in `score_bounds`:
//! `idle -> promoting -> idle`. A row left in `promoting` means the last
//! promotion never confirmed, and `recover` replays it with the stored
//! unvalidated box. Promotion is a straight copy, so replaying it is safe.

use std::time::Duration;

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::control::FlowControl;
use crate::db::{bounds, devices};
use crate::error::{CollectorError, CollectorResult};
use crate::models::{MinMaxValues, ValidationPhase};
use crate::monitor::{ErrorCategory, ErrorMonitor};

/// Mark a promotion as started and store `new_box` as the validated box
pub async fn begin_promotion(
    pool: &SqlitePool,
    new_box: &MinMaxValues,
    ctrl: &FlowControl,
    db_timeout: Duration,
) -> CollectorResult<()> {
    ctrl.bounded(
        "mark validation in progress",
        db_timeout,
        ErrorCategory::DatabaseNetwork,
        bounds::set_phase(pool, ValidationPhase::Promoting),
    )
    .await?;

    ctrl.bounded(
        "store validated bounds",
        db_timeout,
        ErrorCategory::DatabaseNetwork,
        bounds::store_validated(pool, new_box),
    )
    .await
}

/// Copy unvalidated scores into the validated slots of every device
pub async fn promote_all(
    pool: &SqlitePool,
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
        ctrl.bounded(
            "promote device scores",
            db_timeout,
            ErrorCategory::DatabaseNetwork,
            devices::promote_scores(pool, *id),
        )
        .await?;
    }

    Ok(ids.len())
}

pub async fn finish_promotion(
    pool: &SqlitePool,
    ctrl: &FlowControl,
    db_timeout: Duration,
) -> CollectorResult<()> {
    ctrl.bounded(
        "clear validation marker",
        db_timeout,
        ErrorCategory::DatabaseNetwork,
        bounds::set_phase(pool, ValidationPhase::Idle),
    )
    .await
}

/// Promote `new_box` and every device's unvalidated scores to validated
///
/// A device count that disagrees with `new_box` is recorded as a missing
/// document but does not stop the promotion.
pub async fn validate(
    pool: &SqlitePool,
    monitor: &ErrorMonitor,
    new_box: &MinMaxValues,
    ctrl: &FlowControl,
    db_timeout: Duration,
) -> CollectorResult<()> {
    begin_promotion(pool, new_box, ctrl, db_timeout).await?;

    let promoted = promote_all(pool, ctrl, db_timeout).await?;

    if promoted as u64 != new_box.device_count {
        warn!(
            expected = new_box.device_count,
            actual = promoted,
            "Catalog device count does not match bounds"
        );
        let mismatch = CollectorError::MissingDocument(format!(
            "Expected {} devices, found {}",
            new_box.device_count, promoted
        ));
        monitor.report(&mismatch, "validate", ctrl).await;
    }

    finish_promotion(pool, ctrl, db_timeout).await?;

    info!(devices = promoted, "Validated scores");
    Ok(())
}

pub async fn is_interrupted(
    pool: &SqlitePool,
    ctrl: &FlowControl,
    db_timeout: Duration,
) -> CollectorResult<bool> {
    let phase = ctrl
        .bounded(
            "read validation phase",
            db_timeout,
            ErrorCategory::DatabaseNetwork,
            bounds::phase(pool),
        )
        .await?;
    Ok(phase == ValidationPhase::Promoting)
}

/// Replay an unconfirmed promotion; returns whether one was found
pub async fn recover(
    pool: &SqlitePool,
    monitor: &ErrorMonitor,
    ctrl: &FlowControl,
    db_timeout: Duration,
) -> CollectorResult<bool> {
    if !is_interrupted(pool, ctrl, db_timeout).await? {
        return Ok(false);
    }

    warn!("Found interrupted validation, replaying it");
    let stored = ctrl
        .bounded(
            "load bounds",
            db_timeout,
            ErrorCategory::DatabaseNetwork,
            bounds::load(pool),
        )
        .await?;

    validate(pool, monitor, &stored.unvalidated, ctrl, db_timeout).await?;
    Ok(true)
}
