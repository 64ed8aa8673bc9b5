//! Shared fixtures for collector integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tempfile::TempDir;

use devrec_collector::config::{CeilingsConfig, PipelineConfig};
use devrec_collector::control::FlowControl;
use devrec_collector::db::{CatalogDb, DbSettings};
use devrec_collector::models::{Device, PriceCategory, QueueEntry};
use devrec_collector::monitor::{ErrorMonitor, ParseErrorLog};
use devrec_collector::scoring;
use devrec_collector::sources::{
    BenchmarkSource, CatalogDiscovery, Collaborators, PriceSource, ReviewSample, ReviewSource,
    Reviewer, SpecSource,
};
use devrec_collector::{CollectorError, CollectorResult};
use devrec_common::db::PoolSettings;

/// Pipeline settings with no uploader waits and a one second enqueuer cadence
pub fn fast_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        enqueuer_retry_secs: 1,
        enqueuer_idle_secs: 1,
        enqueuer_interval_secs: 1,
        uploader_retry_secs: 0,
        uploader_interval_secs: 0,
        db_timeout_secs: 10,
        dequeue_timeout_secs: 10,
        source_timeout_secs: 10,
        ..PipelineConfig::default()
    }
}

/// On-disk catalog in a temporary directory
///
/// Keep the returned `TempDir` alive for the duration of the test.
pub async fn test_catalog(ceilings: CeilingsConfig) -> (TempDir, CatalogDb) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = dir.path().join("devrec.db");
    let parse_log = ParseErrorLog::new(dir.path().join("parse_errors.jsonl"));

    let settings = DbSettings::from(&fast_pipeline_config());
    let catalog = CatalogDb::connect(&db_path, &PoolSettings::default(), settings, |pool| {
        ErrorMonitor::new(pool, ceilings)
            .with_parse_log(parse_log)
            .with_db_timeout(Duration::from_secs(10))
    })
    .await
    .expect("Failed to open test catalog");

    (dir, catalog)
}

pub async fn default_catalog() -> (TempDir, CatalogDb) {
    test_catalog(CeilingsConfig::default()).await
}

pub fn control() -> FlowControl {
    let (ctrl, _stop) = FlowControl::new();
    ctrl
}

pub fn entry(name: &str) -> QueueEntry {
    QueueEntry {
        name: name.to_string(),
        detail: name.to_lowercase().replace(' ', "-"),
        image: format!("{}.png", name.to_lowercase().replace(' ', "-")),
    }
}

pub fn entries(prefix: &str, count: usize) -> Vec<QueueEntry> {
    (0..count).map(|i| entry(&format!("{} {}", prefix, i))).collect()
}

/// Raw attributes the fake sources hand out for one device
#[derive(Debug, Clone)]
pub struct Fixture {
    pub brand: String,
    pub release_date: NaiveDate,
    pub battery_capacity: f64,
    pub display_size: f64,
    pub pixel_density: f64,
    pub nits: i64,
    pub refresh_rate: i64,
    pub price: i64,
    pub price_category: PriceCategory,
    /// `None` means the benchmark source has no entry
    pub benchmark: Option<(f64, f64)>,
    pub sentiment: f64,
    pub magnitude: f64,
}

impl Fixture {
    pub fn new(brand: &str, year: i32, month: u32) -> Self {
        Self {
            brand: brand.to_string(),
            release_date: NaiveDate::from_ymd_opt(year, month, 1).expect("valid date"),
            battery_capacity: 5000.0,
            display_size: 6.1,
            pixel_density: 400.0,
            nits: 1000,
            refresh_rate: 120,
            price: 800,
            price_category: PriceCategory::HighMidRange,
            benchmark: Some((100.0, 300.0)),
            sentiment: 0.5,
            magnitude: 1.0,
        }
    }

    pub fn benchmark(mut self, single_core: f64, multi_core: f64) -> Self {
        self.benchmark = Some((single_core, multi_core));
        self
    }

    pub fn no_benchmark(mut self) -> Self {
        self.benchmark = None;
        self
    }

    pub fn price_category(mut self, category: PriceCategory) -> Self {
        self.price_category = category;
        self
    }

    pub fn price(mut self, price: i64) -> Self {
        self.price = price;
        self
    }

    pub fn refresh_rate(mut self, refresh_rate: i64) -> Self {
        self.refresh_rate = refresh_rate;
        self
    }

    pub fn battery(mut self, battery_capacity: f64) -> Self {
        self.battery_capacity = battery_capacity;
        self
    }

    /// Fully enriched device as the Uploader would build it
    pub fn device(&self, name: &str) -> Device {
        let mut device = Device::from_entry(&entry(name));
        device.brand = self.brand.clone();
        device.specs.release_date = self.release_date;
        device.specs.battery_capacity = self.battery_capacity;
        device.specs.display_size = self.display_size;
        device.specs.pixel_density = self.pixel_density;
        device.specs.nits = self.nits;
        device.specs.refresh_rate = self.refresh_rate;
        device.real_price = self.price;
        device.price_category = self.price_category;
        match self.benchmark {
            Some((single_core, multi_core)) => {
                device.benchmark.single_core = single_core;
                device.benchmark.multi_core = multi_core;
            }
            None => device.benchmark.is_estimated = true,
        }
        device.review.sentiment = self.sentiment;
        device.review.magnitude = self.magnitude;
        device
    }
}

/// Commit a device with the same protocol the Uploader follows
pub async fn commit(catalog: &CatalogDb, mut device: Device) -> Device {
    let ctrl = control();
    if catalog
        .is_interrupted_validation(&ctrl)
        .await
        .expect("read phase")
    {
        catalog.recover_validation(&ctrl).await.expect("recover");
    }
    let bounds = catalog.get_min_max(&ctrl).await.expect("load bounds");
    let new_box = bounds.unvalidated.folded(&device);
    scoring::apply_unvalidated(&new_box, &mut device);
    if !new_box.same_bounds(&bounds.validated) {
        catalog
            .normalize_unvalidated(&new_box, &ctrl)
            .await
            .expect("normalize");
    }
    let committed = catalog
        .upload_device(&device, &new_box, &ctrl)
        .await
        .expect("upload");
    catalog.validate(&committed, &ctrl).await.expect("validate");
    device
}

/// In-memory stand-in for every enrichment source
#[derive(Default)]
pub struct FakeSources {
    pub fixtures: Mutex<HashMap<String, Fixture>>,
    pub discovered: Mutex<Vec<QueueEntry>>,
    /// Returned by every specs lookup when set
    pub specs_failure: Mutex<Option<CollectorError>>,
}

impl FakeSources {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, name: &str, fixture: Fixture) {
        self.fixtures
            .lock()
            .expect("fixtures lock")
            .insert(name.to_string(), fixture);
    }

    pub fn discover(&self, entries: Vec<QueueEntry>) {
        *self.discovered.lock().expect("discovered lock") = entries;
    }

    pub fn fail_specs_with(&self, err: CollectorError) {
        *self.specs_failure.lock().expect("failure lock") = Some(err);
    }

    fn fixture(&self, name: &str) -> CollectorResult<Fixture> {
        self.fixtures
            .lock()
            .expect("fixtures lock")
            .get(name)
            .cloned()
            .ok_or_else(|| CollectorError::MissingDocument(format!("No fixture for {}", name)))
    }

    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        Collaborators {
            discovery: self.clone(),
            specs: self.clone(),
            price: self.clone(),
            benchmark: self.clone(),
            reviewer: Reviewer::new(vec![self.clone() as Arc<dyn ReviewSource>]),
        }
    }
}

#[async_trait]
impl CatalogDiscovery for FakeSources {
    async fn discover_all(&self, _ctrl: &FlowControl) -> CollectorResult<Vec<QueueEntry>> {
        Ok(self.discovered.lock().expect("discovered lock").clone())
    }
}

#[async_trait]
impl SpecSource for FakeSources {
    async fn enrich(
        &self,
        device: &mut Device,
        _entry: &QueueEntry,
        _ctrl: &FlowControl,
    ) -> CollectorResult<()> {
        if let Some(err) = self.specs_failure.lock().expect("failure lock").clone() {
            return Err(err);
        }
        let fixture = self.fixture(&device.name)?;
        device.brand = fixture.brand;
        device.specs.release_date = fixture.release_date;
        device.specs.battery_capacity = fixture.battery_capacity;
        device.specs.display_size = fixture.display_size;
        device.specs.pixel_density = fixture.pixel_density;
        device.specs.nits = fixture.nits;
        device.specs.refresh_rate = fixture.refresh_rate;
        Ok(())
    }
}

#[async_trait]
impl PriceSource for FakeSources {
    async fn enrich(
        &self,
        device: &mut Device,
        _entry: &QueueEntry,
        _ctrl: &FlowControl,
    ) -> CollectorResult<()> {
        let fixture = self.fixture(&device.name)?;
        device.real_price = fixture.price;
        device.price_category = fixture.price_category;
        Ok(())
    }
}

#[async_trait]
impl BenchmarkSource for FakeSources {
    async fn enrich(
        &self,
        device: &mut Device,
        _entry: &QueueEntry,
        _ctrl: &FlowControl,
    ) -> CollectorResult<()> {
        let fixture = self.fixture(&device.name)?;
        let (single_core, multi_core) = fixture
            .benchmark
            .ok_or_else(|| CollectorError::NoSuchBenchmark(device.name.clone()))?;
        device.benchmark.is_estimated = false;
        device.benchmark.single_core = single_core;
        device.benchmark.multi_core = multi_core;
        Ok(())
    }
}

#[async_trait]
impl ReviewSource for FakeSources {
    fn name(&self) -> &str {
        "fake"
    }

    async fn review(&self, device: &Device, _ctrl: &FlowControl) -> CollectorResult<ReviewSample> {
        let fixture = self.fixture(&device.name)?;
        Ok(ReviewSample {
            sentiment: fixture.sentiment,
            magnitude: fixture.magnitude,
            stars: None,
        })
    }
}
