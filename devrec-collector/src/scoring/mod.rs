//! Score computation and the normalization/validation protocol
//!
//! Scores are a pure function of device fields and a bounding box:
//! - benchmark = 0.6 single core + 0.4 multi core (both normalized)
//! - display = nits 0.3 * density 0.3 + refresh rate 0.3
//! - review = normalized sentiment * normalized magnitude
//! - final = weighted sum; an estimated benchmark shifts weight to the
//!   other components

pub mod normalizer;
pub mod validator;

use crate::models::{Device, MinMaxValues};

const SINGLE_CORE_WEIGHT: f64 = 0.6;
const MULTI_CORE_WEIGHT: f64 = 0.4;
const NITS_WEIGHT: f64 = 0.3;
const DENSITY_WEIGHT: f64 = 0.3;
const REFRESH_RATE_WEIGHT: f64 = 0.3;

/// Component weights of the final score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub benchmark: f64,
    pub display: f64,
    pub battery: f64,
    pub review: f64,
}

impl ScoreWeights {
    pub const MEASURED: ScoreWeights = ScoreWeights {
        benchmark: 50.0,
        display: 20.0,
        battery: 10.0,
        review: 10.0,
    };

    pub const ESTIMATED: ScoreWeights = ScoreWeights {
        benchmark: 30.0,
        display: 25.0,
        battery: 15.0,
        review: 15.0,
    };

    pub fn for_device(device: &Device) -> ScoreWeights {
        if device.benchmark.is_estimated {
            ScoreWeights::ESTIMATED
        } else {
            ScoreWeights::MEASURED
        }
    }
}

/// Fixed score per supported refresh rate; anything else scores 0
pub fn refresh_rate_score(refresh_rate: i64) -> f64 {
    match refresh_rate {
        60 => 0.1,
        90 => 0.5,
        120 => 0.8,
        144 => 1.0,
        _ => 0.0,
    }
}

pub fn review_score(bounds: &MinMaxValues, device: &Device) -> f64 {
    let sentiment = bounds.sentiment.normalize(device.review.sentiment);
    let magnitude = bounds.magnitude.normalize(device.review.magnitude);
    sentiment * magnitude
}

pub fn benchmark_score(bounds: &MinMaxValues, device: &Device) -> f64 {
    SINGLE_CORE_WEIGHT * bounds.single_core.normalize(device.benchmark.single_core)
        + MULTI_CORE_WEIGHT * bounds.multi_core.normalize(device.benchmark.multi_core)
}

pub fn display_score(bounds: &MinMaxValues, device: &Device) -> f64 {
    let nits = bounds.nits.normalize(device.specs.nits as f64);
    let density = bounds.pixel_density.normalize(device.specs.pixel_density);
    nits * NITS_WEIGHT * density * DENSITY_WEIGHT
        + refresh_rate_score(device.specs.refresh_rate) * REFRESH_RATE_WEIGHT
}

/// Weighted final score given an already computed review score
pub fn final_score(bounds: &MinMaxValues, device: &Device, review: f64) -> f64 {
    let weights = ScoreWeights::for_device(device);
    let battery = bounds
        .battery_capacity
        .normalize(device.specs.battery_capacity);

    weights.display * display_score(bounds, device)
        + weights.battery * battery
        + weights.benchmark * benchmark_score(bounds, device)
        + weights.review * review
}

/// Recompute the device's unvalidated review and final scores in place
pub fn apply_unvalidated(bounds: &MinMaxValues, device: &mut Device) {
    let review = review_score(bounds, device);
    device.review.unvalidated_score = review;
    device.unvalidated_final_score = final_score(bounds, device, review);
}
