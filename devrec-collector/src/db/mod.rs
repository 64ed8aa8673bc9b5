//! Persistence layer for the device catalog
//!
//! SQLite tables:
//! - `devices`, `release_years`, `release_months`: the catalog and its
//!   chronological grouping
//! - `device_queue`, `queue_size`: the bounded work queue and its counter
//! - `score_bounds`: validated and unvalidated boxes plus validation phase
//! - `error_counters`: per-category failure counts
//!
//! `CatalogDb` is the facade the pipeline and HTTP surface call. Every
//! operation checks the flow control first and runs under a bounded
//! timeout.

pub mod bounds;
pub mod calendar;
pub mod devices;
pub mod queue;
pub mod retry;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use devrec_common::db::{init_database_pool, PoolSettings};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::control::FlowControl;
use crate::error::CollectorResult;
use crate::estimator::BenchmarkEstimator;
use crate::models::{BenchmarkScores, Device, DeviceFilters, MinMaxValues, QueueEntry, ScoreBounds};
use crate::monitor::{ErrorCategory, ErrorMonitor};
use crate::scoring::{normalizer, validator};

pub use retry::retry_on_lock;

/// Create every table if missing and seed the singleton rows
pub async fn init_schema(pool: &SqlitePool) -> CollectorResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS release_years (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            year_number INTEGER NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS release_months (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            year_id INTEGER NOT NULL REFERENCES release_years(id) ON DELETE CASCADE,
            month_number INTEGER NOT NULL CHECK (month_number BETWEEN 1 AND 12),
            UNIQUE (year_id, month_number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS devices (
            catalog_seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            year_id INTEGER NOT NULL REFERENCES release_years(id),
            month_id INTEGER NOT NULL REFERENCES release_months(id),
            brand TEXT NOT NULL,
            name TEXT NOT NULL UNIQUE,
            release_date TEXT NOT NULL,
            battery_capacity REAL NOT NULL,
            display_size REAL NOT NULL,
            display_resolution TEXT NOT NULL,
            main_cameras_setup TEXT NOT NULL,
            selfie_cameras_setup TEXT NOT NULL,
            pixel_density REAL NOT NULL,
            refresh_rate INTEGER NOT NULL,
            nits INTEGER NOT NULL,
            benchmark_estimated INTEGER NOT NULL DEFAULT 0,
            single_core REAL NOT NULL,
            multi_core REAL NOT NULL,
            review_sentiment REAL NOT NULL,
            review_magnitude REAL NOT NULL,
            validated_review_score REAL NOT NULL DEFAULT 0,
            unvalidated_review_score REAL NOT NULL DEFAULT 0,
            validated_final_score REAL NOT NULL DEFAULT 0,
            unvalidated_final_score REAL NOT NULL DEFAULT 0,
            real_price INTEGER NOT NULL,
            price_category INTEGER NOT NULL CHECK (price_category BETWEEN 0 AND 3),
            image TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_devices_validated_score ON devices(validated_final_score DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS device_queue (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            detail TEXT NOT NULL,
            image TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS queue_size (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            size INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("INSERT OR IGNORE INTO queue_size (id, size) VALUES (1, 0)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS score_bounds (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            validated TEXT NOT NULL,
            unvalidated TEXT NOT NULL,
            validation_phase TEXT NOT NULL DEFAULT 'idle'
        )
        "#,
    )
    .execute(pool)
    .await?;

    bounds::seed(pool).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS error_counters (
            category TEXT PRIMARY KEY,
            count INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    for category in ErrorCategory::ALL {
        sqlx::query("INSERT OR IGNORE INTO error_counters (category, count) VALUES (?, 0)")
            .bind(category.as_str())
            .execute(pool)
            .await?;
    }

    Ok(())
}

/// Timeouts and capacity used by the facade
#[derive(Debug, Clone)]
pub struct DbSettings {
    pub queue_capacity: u32,
    pub db_timeout: Duration,
    pub dequeue_timeout: Duration,
    /// How long queue writes keep retrying a locked database
    pub lock_wait: Duration,
}

impl From<&PipelineConfig> for DbSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            queue_capacity: config.queue_capacity,
            db_timeout: config.db_timeout(),
            dequeue_timeout: config.dequeue_timeout(),
            lock_wait: Duration::from_secs(5),
        }
    }
}

/// Catalog persistence facade
#[derive(Clone)]
pub struct CatalogDb {
    pool: SqlitePool,
    monitor: Arc<ErrorMonitor>,
    estimator: Arc<BenchmarkEstimator>,
    settings: DbSettings,
}

impl CatalogDb {
    /// Open the database at `db_path`, creating the schema if needed
    pub async fn connect(
        db_path: &Path,
        pool_settings: &PoolSettings,
        settings: DbSettings,
        monitor: impl FnOnce(SqlitePool) -> ErrorMonitor,
    ) -> CollectorResult<Self> {
        let pool = init_database_pool(db_path, pool_settings).await?;
        init_schema(&pool).await?;
        let monitor = Arc::new(monitor(pool.clone()));
        Ok(Self::from_pool(pool, monitor, settings))
    }

    pub fn from_pool(pool: SqlitePool, monitor: Arc<ErrorMonitor>, settings: DbSettings) -> Self {
        let estimator = Arc::new(BenchmarkEstimator::new(pool.clone(), settings.db_timeout));
        Self {
            pool,
            monitor,
            estimator,
            settings,
        }
    }

    pub async fn disconnect(&self) {
        self.pool.close().await;
        info!("Database connection closed");
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn monitor(&self) -> &Arc<ErrorMonitor> {
        &self.monitor
    }

    pub fn settings(&self) -> &DbSettings {
        &self.settings
    }

    /// Cheap liveness probe
    pub async fn is_up(&self, ctrl: &FlowControl) -> bool {
        let probe = ctrl
            .bounded(
                "ping database",
                self.settings.db_timeout,
                ErrorCategory::DatabaseNetwork,
                async {
                    sqlx::query("SELECT 1").execute(&self.pool).await?;
                    Ok(())
                },
            )
            .await;

        match probe {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Database is not reachable");
                false
            }
        }
    }

    /// Commit a fully scored device and fold it into the unvalidated box
    ///
    /// `new_box` must already contain the device's bounds. Returns the box
    /// as stored, with the device counted.
    pub async fn upload_device(
        &self,
        device: &Device,
        new_box: &MinMaxValues,
        ctrl: &FlowControl,
    ) -> CollectorResult<MinMaxValues> {
        let committed = ctrl
            .bounded(
                "upload device",
                self.settings.db_timeout,
                ErrorCategory::DatabaseNetwork,
                async {
                    let mut tx = self.pool.begin().await?;
                    let (year_id, month_id) = calendar::ensure_year_month(
                        &mut *tx,
                        device.release_year(),
                        device.release_month(),
                    )
                    .await?;
                    devices::insert_device(&mut *tx, device, year_id, month_id).await?;

                    let stored = bounds::load_unvalidated(&mut *tx).await?;
                    let committed = new_box.with_device_count(stored.device_count + 1);
                    bounds::store_unvalidated(&mut *tx, &committed).await?;

                    tx.commit().await?;
                    Ok(committed)
                },
            )
            .await?;

        info!(
            device = %device.name,
            score = device.unvalidated_final_score,
            estimated = device.benchmark.is_estimated,
            devices = committed.device_count,
            "Uploaded device"
        );
        Ok(committed)
    }

    pub async fn get_min_max(&self, ctrl: &FlowControl) -> CollectorResult<ScoreBounds> {
        ctrl.bounded(
            "load bounds",
            self.settings.db_timeout,
            ErrorCategory::DatabaseNetwork,
            bounds::load(&self.pool),
        )
        .await
    }

    /// Re-score the whole catalog against `new_box` and store its bounds as
    /// the unvalidated box (device count unchanged)
    pub async fn normalize_unvalidated(
        &self,
        new_box: &MinMaxValues,
        ctrl: &FlowControl,
    ) -> CollectorResult<()> {
        normalizer::recompute_all(&self.pool, new_box, ctrl, self.settings.db_timeout).await?;

        ctrl.bounded(
            "store unvalidated bounds",
            self.settings.db_timeout,
            ErrorCategory::DatabaseNetwork,
            async {
                let mut tx = self.pool.begin().await?;
                bounds::lock_row(&mut *tx).await?;
                let stored = bounds::load_unvalidated(&mut *tx).await?;
                let updated = new_box.with_device_count(stored.device_count);
                bounds::store_unvalidated(&mut *tx, &updated).await?;
                tx.commit().await?;
                Ok(())
            },
        )
        .await
    }

    pub async fn validate(&self, new_box: &MinMaxValues, ctrl: &FlowControl) -> CollectorResult<()> {
        validator::validate(
            &self.pool,
            &self.monitor,
            new_box,
            ctrl,
            self.settings.db_timeout,
        )
        .await
    }

    pub async fn is_interrupted_validation(&self, ctrl: &FlowControl) -> CollectorResult<bool> {
        validator::is_interrupted(&self.pool, ctrl, self.settings.db_timeout).await
    }

    /// Replay an interrupted validation; returns whether one was found
    pub async fn recover_validation(&self, ctrl: &FlowControl) -> CollectorResult<bool> {
        validator::recover(&self.pool, &self.monitor, ctrl, self.settings.db_timeout).await
    }

    pub async fn enqueue_batch(
        &self,
        candidates: &[QueueEntry],
        ctrl: &FlowControl,
    ) -> CollectorResult<usize> {
        let capacity = self.settings.queue_capacity;
        ctrl.bounded(
            "enqueue batch",
            self.settings.db_timeout,
            ErrorCategory::DatabaseNetwork,
            retry_on_lock("enqueue batch", self.settings.lock_wait, || {
                queue::enqueue_batch(&self.pool, candidates, capacity)
            }),
        )
        .await
    }

    pub async fn dequeue(&self, ctrl: &FlowControl) -> CollectorResult<QueueEntry> {
        ctrl.bounded(
            "dequeue",
            self.settings.dequeue_timeout,
            ErrorCategory::DatabaseNetwork,
            retry_on_lock("dequeue", self.settings.lock_wait, || queue::dequeue(&self.pool)),
        )
        .await
    }

    pub async fn queue_size(&self, ctrl: &FlowControl) -> CollectorResult<u32> {
        ctrl.bounded(
            "queue size",
            self.settings.db_timeout,
            ErrorCategory::DatabaseNetwork,
            queue::queue_size(&self.pool),
        )
        .await
    }

    /// Re-estimate every estimated benchmark, then bring the scores in line
    ///
    /// The box is rebuilt from every stored estimate, not only the ones that
    /// changed, so a pass cut short earlier is repaired here. The catalog is
    /// re-scored against it and the result validated. Returns the number of
    /// devices whose benchmark changed.
    pub async fn reestimate_benchmarks(&self, ctrl: &FlowControl) -> CollectorResult<usize> {
        let updated = self.estimator.reestimate_all(ctrl).await?;

        let stored = self.get_min_max(ctrl).await?;
        let estimated = ctrl
            .bounded(
                "load estimated devices",
                self.settings.db_timeout,
                ErrorCategory::DatabaseNetwork,
                devices::estimated_devices(&self.pool),
            )
            .await?;
        let new_box = estimated
            .iter()
            .fold(stored.unvalidated, |acc, device| acc.folded(device));

        if updated.is_empty() && new_box.same_bounds(&stored.validated) {
            return Ok(0);
        }

        self.normalize_unvalidated(&new_box, ctrl).await?;
        let committed = self.get_min_max(ctrl).await?.unvalidated;
        self.validate(&committed, ctrl).await?;
        Ok(updated.len())
    }

    pub async fn last_year_equivalent(
        &self,
        device: &Device,
        ctrl: &FlowControl,
    ) -> CollectorResult<BenchmarkScores> {
        self.estimator.last_year_equivalent(device, ctrl).await
    }

    /// Clear catalog, grouping, queue, bounds and validation phase
    pub async fn reset_all(&self, ctrl: &FlowControl) -> CollectorResult<()> {
        ctrl.bounded(
            "reset catalog",
            self.settings.db_timeout,
            ErrorCategory::DatabaseNetwork,
            async {
                let mut tx = self.pool.begin().await?;
                sqlx::query("DELETE FROM devices").execute(&mut *tx).await?;
                sqlx::query("DELETE FROM release_months").execute(&mut *tx).await?;
                sqlx::query("DELETE FROM release_years").execute(&mut *tx).await?;
                sqlx::query("DELETE FROM device_queue").execute(&mut *tx).await?;
                sqlx::query("UPDATE queue_size SET size = 0 WHERE id = 1")
                    .execute(&mut *tx)
                    .await?;
                bounds::reset(&mut *tx).await?;
                tx.commit().await?;
                Ok(())
            },
        )
        .await?;

        info!("Catalog reset");
        Ok(())
    }

    /// Up to three validated devices matching `filters`, best first
    pub async fn top_n(
        &self,
        filters: &DeviceFilters,
        ctrl: &FlowControl,
    ) -> CollectorResult<Vec<Device>> {
        ctrl.bounded(
            "top devices",
            self.settings.db_timeout,
            ErrorCategory::DatabaseNetwork,
            devices::top_devices(&self.pool, filters),
        )
        .await
    }
}
