//! Enqueuer: discovery loop that keeps the work queue topped up
//!
//! Discovery failures are only backed off, never counted. Queue write
//! failures are counted like any other persistence failure.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::control::FlowControl;
use crate::db::CatalogDb;
use crate::error::CollectorResult;
use crate::monitor::ErrorCategory;
use crate::sources::CatalogDiscovery;

/// Result of one discovery pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueuePass {
    /// Discovery found candidates; `inserted` of them were queued
    Enqueued { discovered: usize, inserted: usize },
    /// Discovery returned nothing
    NothingDiscovered,
    /// Discovery itself failed; backed off without counting an error
    DiscoveryFailed(String),
}

pub struct Enqueuer {
    db: CatalogDb,
    discovery: Arc<dyn CatalogDiscovery>,
    config: PipelineConfig,
}

impl Enqueuer {
    pub fn new(db: CatalogDb, discovery: Arc<dyn CatalogDiscovery>, config: PipelineConfig) -> Self {
        Self {
            db,
            discovery,
            config,
        }
    }

    /// Discover candidates and enqueue what fits
    ///
    /// Only queue writes and cancellation surface as errors.
    pub async fn run_pass(&self, ctrl: &FlowControl) -> CollectorResult<EnqueuePass> {
        let discovered = ctrl
            .bounded(
                "discover devices",
                self.config.source_timeout(),
                ErrorCategory::GettingUrl,
                self.discovery.discover_all(ctrl),
            )
            .await;

        let candidates = match discovered {
            Ok(candidates) => candidates,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Discovery failed, backing off");
                return Ok(EnqueuePass::DiscoveryFailed(e.to_string()));
            }
        };
        if candidates.is_empty() {
            debug!("Discovery returned no devices");
            return Ok(EnqueuePass::NothingDiscovered);
        }

        let inserted = self.db.enqueue_batch(&candidates, ctrl).await?;
        info!(discovered = candidates.len(), inserted, "Enqueued discovered devices");
        Ok(EnqueuePass::Enqueued {
            discovered: candidates.len(),
            inserted,
        })
    }

    /// Run until the flow control is cancelled
    pub async fn run(self, ctrl: FlowControl) {
        info!("Enqueuer started");

        while !ctrl.is_cancelled() {
            let wait = self.step(&ctrl).await;
            if ctrl.sleep(wait).await.is_err() {
                break;
            }
        }

        info!("Enqueuer stopped");
    }

    /// One pass of the loop; returns how long to wait before the next
    pub async fn step(&self, ctrl: &FlowControl) -> Duration {
        match self.run_pass(ctrl).await {
            Ok(EnqueuePass::Enqueued { .. }) => Duration::from_secs(self.config.enqueuer_interval_secs),
            Ok(EnqueuePass::NothingDiscovered) => Duration::from_secs(self.config.enqueuer_idle_secs),
            Ok(EnqueuePass::DiscoveryFailed(_)) => self.retry_backoff(),
            Err(e) if e.is_cancelled() => Duration::ZERO,
            Err(e) => {
                self.db.monitor().report(&e, "enqueue batch", ctrl).await;
                self.retry_backoff()
            }
        }
    }

    fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.config.enqueuer_retry_secs)
    }
}
