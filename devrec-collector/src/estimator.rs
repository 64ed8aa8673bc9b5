//! Benchmark estimator
//!
//! Supplies a substitute benchmark for devices the benchmark source does
//! not know, derived from a predecessor released the year before:
//! 1. Same name with the model number decremented, plus 10% uplift
//! 2. Otherwise the closest-named device from last year inside a price
//!    category window (any category for Apple, one step either way for
//!    other brands), damped by 25% per category step for non-Apple brands

use std::collections::HashSet;
use std::time::Duration;

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::control::FlowControl;
use crate::db::{bounds, calendar, devices};
use crate::error::{CollectorError, CollectorResult};
use crate::models::{BenchmarkScores, Device, PriceCategory};
use crate::monitor::ErrorCategory;

const YEAR_OVER_YEAR_INCREASE: f64 = 0.10;
const DAMPING_PER_CATEGORY: f64 = 0.25;

/// `name` with its first number decremented, e.g. "Galaxy S24" -> "Galaxy S23"
///
/// Returns `None` when the name carries no number or the number is 0.
pub fn decrement_model_number(name: &str) -> Option<String> {
    let start = name.find(|c: char| c.is_ascii_digit())?;
    let end = name[start..]
        .find(|c: char| !c.is_ascii_digit())
        .map(|offset| start + offset)
        .unwrap_or(name.len());

    let number: u64 = name[start..end].parse().ok()?;
    let previous = number.checked_sub(1)?;

    Some(format!("{}{}{}", &name[..start], previous, &name[end..]))
}

fn tokens(name: &str) -> HashSet<String> {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Similarity of two device names in `[0, 1.1]`; 0 when no token is shared
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let left = tokens(a);
    let right = tokens(b);
    let shared = left.intersection(&right).count();
    if shared == 0 {
        return 0.0;
    }

    let overlap = shared as f64 / left.len().max(right.len()) as f64;
    overlap + 0.1 * strsim::normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase())
}

fn is_apple(device: &Device) -> bool {
    device.brand.eq_ignore_ascii_case("apple")
}

fn category_window(device: &Device) -> (PriceCategory, PriceCategory) {
    if is_apple(device) {
        return (PriceCategory::LowEnd, PriceCategory::HighEnd);
    }
    let ordinal = device.price_category.ordinal();
    let low = PriceCategory::from_ordinal((ordinal - 1).max(0)).unwrap_or(PriceCategory::LowEnd);
    let high = PriceCategory::from_ordinal((ordinal + 1).min(3)).unwrap_or(PriceCategory::HighEnd);
    (low, high)
}

fn has_real_scores(device: &Device) -> bool {
    device.benchmark.single_core > 0.0 || device.benchmark.multi_core > 0.0
}

pub struct BenchmarkEstimator {
    pool: SqlitePool,
    db_timeout: Duration,
}

impl BenchmarkEstimator {
    pub fn new(pool: SqlitePool, db_timeout: Duration) -> Self {
        Self { pool, db_timeout }
    }

    /// Estimated benchmark for `device` from last year's equivalent
    pub async fn last_year_equivalent(
        &self,
        device: &Device,
        ctrl: &FlowControl,
    ) -> CollectorResult<BenchmarkScores> {
        ctrl.check("last year equivalent")?;

        if let Some(previous_name) = decrement_model_number(&device.name) {
            let predecessor = ctrl
                .bounded(
                    "find predecessor by name",
                    self.db_timeout,
                    ErrorCategory::DatabaseNetwork,
                    devices::find_by_name(&self.pool, &previous_name),
                )
                .await?;

            if let Some(predecessor) = predecessor.filter(has_real_scores) {
                debug!(device = %device.name, predecessor = %predecessor.name, "Estimating from predecessor");
                return Ok(BenchmarkScores {
                    is_estimated: true,
                    single_core: predecessor.benchmark.single_core * (1.0 + YEAR_OVER_YEAR_INCREASE),
                    multi_core: predecessor.benchmark.multi_core * (1.0 + YEAR_OVER_YEAR_INCREASE),
                });
            }
        }

        self.closest_last_year_device(device, ctrl).await
    }

    async fn closest_last_year_device(
        &self,
        device: &Device,
        ctrl: &FlowControl,
    ) -> CollectorResult<BenchmarkScores> {
        let last_year = device.release_year() - 1;
        let no_equivalent = || CollectorError::NoLastYearEquivalent(device.name.clone());

        let year_id = ctrl
            .bounded(
                "find last year",
                self.db_timeout,
                ErrorCategory::DatabaseNetwork,
                async {
                    let mut conn = self.pool.acquire().await?;
                    calendar::find_year(&mut *conn, last_year).await
                },
            )
            .await?
            .ok_or_else(no_equivalent)?;

        let (low, high) = category_window(device);
        let candidates = ctrl
            .bounded(
                "load last year devices",
                self.db_timeout,
                ErrorCategory::DatabaseNetwork,
                devices::devices_in_year(&self.pool, year_id, low, high),
            )
            .await?;

        let best = candidates
            .into_iter()
            .filter(|c| c.id != device.id && has_real_scores(c))
            .map(|c| (name_similarity(&device.name, &c.name), c))
            .filter(|(score, _)| *score > 0.0)
            .max_by(|(a, _), (b, _)| a.total_cmp(b))
            .map(|(_, c)| c)
            .ok_or_else(no_equivalent)?;

        let damping = if is_apple(device) {
            1.0
        } else {
            let distance = best.price_category.distance(device.price_category) as f64;
            (1.0 - distance * DAMPING_PER_CATEGORY).max(0.0)
        };

        debug!(device = %device.name, equivalent = %best.name, damping, "Estimating from last year's device");
        Ok(BenchmarkScores {
            is_estimated: true,
            single_core: best.benchmark.single_core * damping,
            multi_core: best.benchmark.multi_core * damping,
        })
    }

    /// Write a re-estimated benchmark and widen the unvalidated box to hold
    /// it in the same transaction
    async fn store_benchmark(&self, device: &Device) -> CollectorResult<()> {
        let mut tx = self.pool.begin().await?;
        devices::update_benchmark(&mut *tx, device.id, &device.benchmark).await?;
        let stored = bounds::load_unvalidated(&mut *tx).await?;
        let widened = stored.folded(device);
        bounds::store_unvalidated(&mut *tx, &widened).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Re-estimate every estimated device, oldest release first
    ///
    /// Devices still lacking an equivalent keep their current values. Each
    /// new benchmark lands together with the widened unvalidated box; the
    /// caller re-scores the catalog. Returns the devices whose benchmark
    /// changed.
    pub async fn reestimate_all(&self, ctrl: &FlowControl) -> CollectorResult<Vec<Device>> {
        let estimated = ctrl
            .bounded(
                "load estimated devices",
                self.db_timeout,
                ErrorCategory::DatabaseNetwork,
                devices::estimated_devices(&self.pool),
            )
            .await?;

        let mut updated = Vec::new();
        for mut device in estimated {
            let benchmark = match self.last_year_equivalent(&device, ctrl).await {
                Ok(benchmark) => benchmark,
                Err(CollectorError::NoLastYearEquivalent(_)) => continue,
                Err(e) => return Err(e),
            };

            if benchmark == device.benchmark {
                continue;
            }

            device.benchmark = benchmark;
            ctrl.bounded(
                "update benchmark",
                self.db_timeout,
                ErrorCategory::DatabaseNetwork,
                self.store_benchmark(&device),
            )
            .await?;

            updated.push(device);
        }

        info!(updated = updated.len(), "Re-estimated benchmarks");
        Ok(updated)
    }
}
