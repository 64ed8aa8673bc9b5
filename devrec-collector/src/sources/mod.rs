//! Enrichment collaborators
//!
//! The pipeline only sees these traits. Each enrichment source mutates the
//! section of the device it owns; review sources instead return a sample
//! that the `Reviewer` blends into the device's raw review data.

pub mod http;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::control::FlowControl;
use crate::error::{CollectorError, CollectorResult};
use crate::models::{Device, QueueEntry};

/// Lists every device the external catalog currently knows about
#[async_trait]
pub trait CatalogDiscovery: Send + Sync {
    async fn discover_all(&self, ctrl: &FlowControl) -> CollectorResult<Vec<QueueEntry>>;
}

/// Fills brand and specifications
#[async_trait]
pub trait SpecSource: Send + Sync {
    async fn enrich(
        &self,
        device: &mut Device,
        entry: &QueueEntry,
        ctrl: &FlowControl,
    ) -> CollectorResult<()>;
}

/// Fills real price and price category
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn enrich(
        &self,
        device: &mut Device,
        entry: &QueueEntry,
        ctrl: &FlowControl,
    ) -> CollectorResult<()>;
}

/// Fills single/multi core scores
///
/// Fails with `NoSuchBenchmark` when the source has no entry for the
/// device, which the pipeline answers with an estimate.
#[async_trait]
pub trait BenchmarkSource: Send + Sync {
    async fn enrich(
        &self,
        device: &mut Device,
        entry: &QueueEntry,
        ctrl: &FlowControl,
    ) -> CollectorResult<()>;
}

/// One review's analysed tone
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReviewSample {
    pub sentiment: f64,
    pub magnitude: f64,
    /// Star rating out of 5, when the source publishes one
    #[serde(default)]
    pub stars: Option<f64>,
}

impl ReviewSample {
    /// Reject readings outside the analyser's ranges
    ///
    /// Sentiment lies in [-1, 1], magnitude is non-negative and stars lie
    /// in [0, 5].
    pub fn check(&self, source: &str) -> CollectorResult<()> {
        let sentiment_ok = self.sentiment.is_finite() && (-1.0..=1.0).contains(&self.sentiment);
        let magnitude_ok = self.magnitude.is_finite() && self.magnitude >= 0.0;
        let stars_ok = self.stars.map_or(true, |s| (0.0..=5.0).contains(&s));
        if sentiment_ok && magnitude_ok && stars_ok {
            return Ok(());
        }
        Err(CollectorError::SentimentAnalysis(format!(
            "{} returned sentiment {}, magnitude {}, stars {:?}",
            source, self.sentiment, self.magnitude, self.stars
        )))
    }

    /// Sentiment blended with the star rating, if any
    pub fn blended_sentiment(&self) -> f64 {
        match self.stars {
            Some(stars) => 0.6 * self.sentiment + 0.4 * (stars - 3.0) / 2.0,
            None => self.sentiment,
        }
    }
}

/// A named review source
#[async_trait]
pub trait ReviewSource: Send + Sync {
    fn name(&self) -> &str;

    async fn review(&self, device: &Device, ctrl: &FlowControl) -> CollectorResult<ReviewSample>;
}

/// Averages every configured review source into the device's raw review
#[derive(Clone)]
pub struct Reviewer {
    sources: Vec<Arc<dyn ReviewSource>>,
}

impl Reviewer {
    pub fn new(sources: Vec<Arc<dyn ReviewSource>>) -> Self {
        Self { sources }
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// Set raw sentiment and magnitude from the average of all sources
    ///
    /// Any failing source fails the whole review, as does a reading out of
    /// range (`SentimentAnalysis`).
    pub async fn enrich(&self, device: &mut Device, ctrl: &FlowControl) -> CollectorResult<()> {
        if self.sources.is_empty() {
            return Err(CollectorError::MissingDocument(
                "No review sources configured".to_string(),
            ));
        }

        let mut sentiment = 0.0;
        let mut magnitude = 0.0;
        for source in &self.sources {
            ctrl.check("review")?;
            let sample = source.review(device, ctrl).await?;
            sample.check(source.name())?;
            debug!(device = %device.name, source = source.name(), ?sample, "Collected review");
            sentiment += sample.blended_sentiment();
            magnitude += sample.magnitude;
        }

        let n = self.sources.len() as f64;
        device.review.sentiment = sentiment / n;
        device.review.magnitude = magnitude / n;
        Ok(())
    }
}

/// Every collaborator the pipeline drives
#[derive(Clone)]
pub struct Collaborators {
    pub discovery: Arc<dyn CatalogDiscovery>,
    pub specs: Arc<dyn SpecSource>,
    pub price: Arc<dyn PriceSource>,
    pub benchmark: Arc<dyn BenchmarkSource>,
    pub reviewer: Reviewer,
}
