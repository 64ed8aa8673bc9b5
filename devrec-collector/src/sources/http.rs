//! HTTP enrichment adapter
//!
//! Implements every collaborator trait against a JSON enrichment service:
//!
//! | Endpoint               | Used by            |
//! |------------------------|--------------------|
//! | `GET /devices`         | catalog discovery  |
//! | `GET /specs`           | specifications     |
//! | `GET /price`           | real price         |
//! | `GET /price-category`  | price category     |
//! | `GET /benchmark`       | benchmark scores   |
//! | `GET /reviews/{name}`  | one review source  |
//!
//! All requests share one rate limiter. Transport failures map to
//! `GettingUrl`, error statuses to `GettingDocument`, undecodable bodies to
//! `Parsing`, and a 404 from `/benchmark` to `NoSuchBenchmark`.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{BenchmarkSource, CatalogDiscovery, PriceSource, ReviewSample, ReviewSource, SpecSource};
use crate::config::SourcesConfig;
use crate::control::FlowControl;
use crate::error::{CollectorError, CollectorResult};
use crate::models::{Device, PriceCategory, QueueEntry};

#[derive(Debug, Deserialize)]
struct SpecsResponse {
    brand: String,
    release_date: NaiveDate,
    battery_capacity: f64,
    display_size: f64,
    #[serde(default)]
    display_resolution: String,
    #[serde(default)]
    main_cameras_setup: String,
    #[serde(default)]
    selfie_cameras_setup: String,
    pixel_density: f64,
    refresh_rate: i64,
    nits: i64,
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    price: i64,
}

#[derive(Debug, Deserialize)]
struct PriceCategoryResponse {
    price_category: PriceCategory,
}

#[derive(Debug, Deserialize)]
struct BenchmarkResponse {
    single_core: f64,
    multi_core: f64,
}

/// Shared HTTP client for the enrichment service
pub struct EnrichmentClient {
    client: Client,
    base_url: String,
    rate_limiter: DefaultDirectRateLimiter,
}

impl EnrichmentClient {
    pub fn new(config: &SourcesConfig) -> CollectorResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| CollectorError::GettingUrl(format!("Failed to build HTTP client: {}", e)))?;

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    /// GET `path` with `query` and decode the JSON body
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        ctrl: &FlowControl,
    ) -> CollectorResult<T> {
        ctrl.check(path)?;
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Querying enrichment service");

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| CollectorError::GettingUrl(format!("{}: {}", url, e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND && path == "/benchmark" {
            let name = query
                .iter()
                .find(|(k, _)| *k == "name")
                .map(|(_, v)| v.to_string())
                .unwrap_or_default();
            return Err(CollectorError::NoSuchBenchmark(name));
        }
        if !status.is_success() {
            return Err(CollectorError::GettingDocument(format!(
                "{} returned {}",
                url, status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| CollectorError::GettingDocument(format!("{}: {}", url, e)))?;
        serde_json::from_slice(&body)
            .map_err(|e| CollectorError::Parsing(format!("{}: {}", url, e)))
    }

    /// One review source per configured name, all sharing this client
    pub fn review_sources(self: &Arc<Self>, names: &[String]) -> Vec<Arc<dyn ReviewSource>> {
        names
            .iter()
            .map(|name| {
                Arc::new(HttpReviewSource {
                    client: Arc::clone(self),
                    name: name.clone(),
                }) as Arc<dyn ReviewSource>
            })
            .collect()
    }
}

#[async_trait]
impl CatalogDiscovery for EnrichmentClient {
    async fn discover_all(&self, ctrl: &FlowControl) -> CollectorResult<Vec<QueueEntry>> {
        self.get_json("/devices", &[], ctrl).await
    }
}

#[async_trait]
impl SpecSource for EnrichmentClient {
    async fn enrich(
        &self,
        device: &mut Device,
        entry: &QueueEntry,
        ctrl: &FlowControl,
    ) -> CollectorResult<()> {
        let specs: SpecsResponse = self
            .get_json("/specs", &[("detail", entry.detail.as_str())], ctrl)
            .await?;

        device.brand = specs.brand;
        device.specs.release_date = specs.release_date;
        device.specs.battery_capacity = specs.battery_capacity;
        device.specs.display_size = specs.display_size;
        device.specs.display_resolution = specs.display_resolution;
        device.specs.main_cameras_setup = specs.main_cameras_setup;
        device.specs.selfie_cameras_setup = specs.selfie_cameras_setup;
        device.specs.pixel_density = specs.pixel_density;
        device.specs.refresh_rate = specs.refresh_rate;
        device.specs.nits = specs.nits;
        Ok(())
    }
}

#[async_trait]
impl PriceSource for EnrichmentClient {
    async fn enrich(
        &self,
        device: &mut Device,
        _entry: &QueueEntry,
        ctrl: &FlowControl,
    ) -> CollectorResult<()> {
        let price: PriceResponse = self
            .get_json("/price", &[("name", device.name.as_str())], ctrl)
            .await?;
        device.real_price = price.price;

        let price_text = price.price.to_string();
        let category: PriceCategoryResponse = self
            .get_json(
                "/price-category",
                &[("name", device.name.as_str()), ("price", price_text.as_str())],
                ctrl,
            )
            .await?;
        device.price_category = category.price_category;
        Ok(())
    }
}

#[async_trait]
impl BenchmarkSource for EnrichmentClient {
    async fn enrich(
        &self,
        device: &mut Device,
        _entry: &QueueEntry,
        ctrl: &FlowControl,
    ) -> CollectorResult<()> {
        let scores: BenchmarkResponse = self
            .get_json("/benchmark", &[("name", device.name.as_str())], ctrl)
            .await?;
        device.benchmark.is_estimated = false;
        device.benchmark.single_core = scores.single_core;
        device.benchmark.multi_core = scores.multi_core;
        Ok(())
    }
}

/// Review source served at `/reviews/{name}`
pub struct HttpReviewSource {
    client: Arc<EnrichmentClient>,
    name: String,
}

#[async_trait]
impl ReviewSource for HttpReviewSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn review(&self, device: &Device, ctrl: &FlowControl) -> CollectorResult<ReviewSample> {
        let path = format!("/reviews/{}", self.name);
        self.client
            .get_json(&path, &[("name", device.name.as_str())], ctrl)
            .await
    }
}
