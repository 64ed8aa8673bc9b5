//! Device catalog records and queue entries

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CollectorError, CollectorResult};

/// Devices released before this year are rejected
pub const EARLIEST_YEAR_BOUND: i32 = 2019;

/// Price bracket, ordered from cheapest to most expensive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceCategory {
    LowEnd,
    LowMidRange,
    HighMidRange,
    HighEnd,
}

impl PriceCategory {
    pub fn ordinal(self) -> i64 {
        match self {
            PriceCategory::LowEnd => 0,
            PriceCategory::LowMidRange => 1,
            PriceCategory::HighMidRange => 2,
            PriceCategory::HighEnd => 3,
        }
    }

    pub fn from_ordinal(value: i64) -> CollectorResult<Self> {
        match value {
            0 => Ok(PriceCategory::LowEnd),
            1 => Ok(PriceCategory::LowMidRange),
            2 => Ok(PriceCategory::HighMidRange),
            3 => Ok(PriceCategory::HighEnd),
            other => Err(CollectorError::Parsing(format!(
                "Unknown price category ordinal {}",
                other
            ))),
        }
    }

    /// Absolute distance between two brackets
    pub fn distance(self, other: PriceCategory) -> i64 {
        (self.ordinal() - other.ordinal()).abs()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specifications {
    pub release_date: NaiveDate,
    /// mAh
    pub battery_capacity: f64,
    /// Inches
    pub display_size: f64,
    pub display_resolution: String,
    pub main_cameras_setup: String,
    pub selfie_cameras_setup: String,
    /// Pixels per inch
    pub pixel_density: f64,
    /// Hz
    pub refresh_rate: i64,
    pub nits: i64,
}

impl Default for Specifications {
    fn default() -> Self {
        Self {
            release_date: NaiveDate::MIN,
            battery_capacity: 0.0,
            display_size: 0.0,
            display_resolution: String::new(),
            main_cameras_setup: String::new(),
            selfie_cameras_setup: String::new(),
            pixel_density: 0.0,
            refresh_rate: 0,
            nits: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkScores {
    pub is_estimated: bool,
    pub single_core: f64,
    pub multi_core: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewData {
    pub sentiment: f64,
    pub magnitude: f64,
    pub validated_score: f64,
    pub unvalidated_score: f64,
}

/// A fully enriched catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: Uuid,
    pub brand: String,
    /// Name as reported by catalog discovery; unique across catalog and queue
    pub name: String,
    pub specs: Specifications,
    pub benchmark: BenchmarkScores,
    pub review: ReviewData,
    pub validated_final_score: f64,
    pub unvalidated_final_score: f64,
    pub real_price: i64,
    pub price_category: PriceCategory,
    pub image: String,
}

impl Device {
    /// Empty device seeded from a queue entry, ready for enrichment
    pub fn from_entry(entry: &QueueEntry) -> Self {
        Self {
            id: Uuid::new_v4(),
            brand: String::new(),
            name: entry.name.clone(),
            specs: Specifications::default(),
            benchmark: BenchmarkScores::default(),
            review: ReviewData::default(),
            validated_final_score: 0.0,
            unvalidated_final_score: 0.0,
            real_price: 0,
            price_category: PriceCategory::LowEnd,
            image: entry.image.clone(),
        }
    }

    pub fn release_year(&self) -> i32 {
        self.specs.release_date.year()
    }

    pub fn release_month(&self) -> u32 {
        self.specs.release_date.month()
    }

    /// Reject devices the catalog never accepts
    pub fn ensure_acceptable(&self) -> CollectorResult<()> {
        if self.release_year() < EARLIEST_YEAR_BOUND {
            return Err(CollectorError::InvalidDevice(format!(
                "{} was released in {}, before {}",
                self.name,
                self.release_year(),
                EARLIEST_YEAR_BOUND
            )));
        }
        Ok(())
    }
}

/// A discovered device waiting to be enriched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub name: String,
    /// Opaque locator handed back to the enrichment sources
    pub detail: String,
    pub image: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range<T> {
    pub min: T,
    pub max: T,
}

/// Filters for the top devices query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceFilters {
    pub price: Range<i64>,
    pub display_size: Range<f64>,
    pub refresh_rate: Range<i64>,
    /// Empty means any brand
    #[serde(default)]
    pub brands: Vec<String>,
}
