//! Uploader: dequeues one candidate at a time, enriches and scores it, and
//! commits it while keeping every catalog score normalized against a
//! single bounding box
//!
//! Per device:
//! 1. Dequeue (an empty queue only backs off)
//! 2. Specs, then price, then benchmark; a missing benchmark is estimated
//! 3. Reviews
//! 4. Replay any interrupted validation
//! 5. Fold the device into the unvalidated box and score it
//! 6. Re-normalize the catalog if the box grew past the validated box
//! 7. Commit, then validate the committed box
//! 8. Re-estimate estimated benchmarks once enough estimates accumulated

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::control::FlowControl;
use crate::db::CatalogDb;
use crate::error::{CollectorError, CollectorResult};
use crate::models::{BenchmarkScores, Device, QueueEntry};
use crate::monitor::ErrorCategory;
use crate::scoring;
use crate::sources::Collaborators;

/// Result of one uploader iteration
#[derive(Debug, Clone, PartialEq)]
pub enum UploadStep {
    Uploaded(Box<Device>),
    /// Rejected device, dropped without counting an error
    Skipped(String),
    QueueEmpty,
}

pub struct Uploader {
    db: CatalogDb,
    collaborators: Collaborators,
    config: PipelineConfig,
    estimated_since_reestimate: u32,
}

impl Uploader {
    pub fn new(db: CatalogDb, collaborators: Collaborators, config: PipelineConfig) -> Self {
        Self {
            db,
            collaborators,
            config,
            estimated_since_reestimate: 0,
        }
    }

    /// Estimated devices uploaded since the last re-estimation
    pub fn pending_estimates(&self) -> u32 {
        self.estimated_since_reestimate
    }

    /// Run until the flow control is cancelled
    pub async fn run(mut self, ctrl: FlowControl) {
        info!("Uploader started");

        while !ctrl.is_cancelled() {
            let wait = match self.process_next(&ctrl).await {
                Ok(UploadStep::Uploaded(_)) | Ok(UploadStep::Skipped(_)) => self.pacing(),
                Ok(UploadStep::QueueEmpty) => {
                    debug!("Queue empty");
                    self.retry_backoff()
                }
                Err(e) if e.is_cancelled() => break,
                Err(e) => {
                    self.db.monitor().report(&e, "upload", &ctrl).await;
                    self.retry_backoff()
                }
            };

            if ctrl.sleep(wait).await.is_err() {
                break;
            }
        }

        info!("Uploader stopped");
    }

    /// Process one queue entry end to end
    pub async fn process_next(&mut self, ctrl: &FlowControl) -> CollectorResult<UploadStep> {
        let entry = match self.db.dequeue(ctrl).await {
            Ok(entry) => entry,
            Err(CollectorError::EmptyQueue) => return Ok(UploadStep::QueueEmpty),
            Err(e) => return Err(e),
        };
        debug!(device = %entry.name, "Dequeued");

        let mut device = match self.build_device(&entry, ctrl).await {
            Ok(device) => device,
            Err(CollectorError::InvalidDevice(reason)) => {
                info!(device = %entry.name, reason = %reason, "Skipping device");
                return Ok(UploadStep::Skipped(entry.name));
            }
            Err(e) => return Err(e),
        };

        self.commit(&mut device, ctrl).await?;

        if device.benchmark.is_estimated {
            self.estimated_since_reestimate += 1;
            if self.estimated_since_reestimate > self.config.estimation_cycle_limit {
                let updated = self.db.reestimate_benchmarks(ctrl).await?;
                info!(updated, "Estimation cycle complete");
                self.estimated_since_reestimate = 0;
            }
        }

        Ok(UploadStep::Uploaded(Box::new(device)))
    }

    async fn build_device(&self, entry: &QueueEntry, ctrl: &FlowControl) -> CollectorResult<Device> {
        let timeout = self.config.source_timeout();
        let mut device = Device::from_entry(entry);

        ctrl.bounded(
            "fetch specifications",
            timeout,
            ErrorCategory::GettingDocument,
            self.collaborators.specs.enrich(&mut device, entry, ctrl),
        )
        .await?;
        device.ensure_acceptable()?;

        ctrl.bounded(
            "fetch price",
            timeout,
            ErrorCategory::GettingDocument,
            self.collaborators.price.enrich(&mut device, entry, ctrl),
        )
        .await?;

        let benchmark = ctrl
            .bounded(
                "fetch benchmark",
                timeout,
                ErrorCategory::GettingDocument,
                self.collaborators.benchmark.enrich(&mut device, entry, ctrl),
            )
            .await;
        match benchmark {
            Ok(()) => {}
            Err(CollectorError::NoSuchBenchmark(_)) => {
                device.benchmark = self.estimate_benchmark(&device, ctrl).await?;
            }
            Err(e) => return Err(e),
        }

        ctrl.bounded(
            "collect reviews",
            timeout,
            ErrorCategory::SentimentAnalysis,
            self.collaborators.reviewer.enrich(&mut device, ctrl),
        )
        .await?;

        Ok(device)
    }

    async fn estimate_benchmark(
        &self,
        device: &Device,
        ctrl: &FlowControl,
    ) -> CollectorResult<BenchmarkScores> {
        match self.db.last_year_equivalent(device, ctrl).await {
            Ok(benchmark) => {
                info!(
                    device = %device.name,
                    single_core = benchmark.single_core,
                    multi_core = benchmark.multi_core,
                    "Estimated benchmark"
                );
                Ok(benchmark)
            }
            Err(CollectorError::NoLastYearEquivalent(_)) => {
                warn!(device = %device.name, "No last year equivalent, keeping placeholder benchmark");
                Ok(BenchmarkScores {
                    is_estimated: true,
                    single_core: 0.0,
                    multi_core: 0.0,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Score `device`, bring the catalog in line with its box, persist it and
    /// validate
    async fn commit(&self, device: &mut Device, ctrl: &FlowControl) -> CollectorResult<()> {
        if self.db.is_interrupted_validation(ctrl).await? {
            self.db.recover_validation(ctrl).await?;
        }

        let bounds = self.db.get_min_max(ctrl).await?;
        let new_box = bounds.unvalidated.folded(device);
        scoring::apply_unvalidated(&new_box, device);

        if !new_box.same_bounds(&bounds.validated) {
            debug!(device = %device.name, "Bounds grew, re-normalizing catalog");
            self.db.normalize_unvalidated(&new_box, ctrl).await?;
        }

        let committed = self.db.upload_device(device, &new_box, ctrl).await?;
        self.db.validate(&committed, ctrl).await?;

        // Validation promoted the stored row; keep the returned copy in step
        device.review.validated_score = device.review.unvalidated_score;
        device.validated_final_score = device.unvalidated_final_score;
        Ok(())
    }

    fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.config.uploader_retry_secs)
    }

    fn pacing(&self) -> Duration {
        Duration::from_secs(self.config.uploader_interval_secs)
    }
}
