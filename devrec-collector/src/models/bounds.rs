//! Min-max bounding boxes used to normalize scored dimensions

use serde::{Deserialize, Serialize};

use super::device::Device;

/// Linear position of `value` inside `[min, max]`, clamped to `[0, 1]`
///
/// A degenerate or empty range (`max <= min`) always yields 0.
pub fn normalize(min: f64, max: f64, value: f64) -> f64 {
    if max <= min {
        return 0.0;
    }
    ((value - min) / (max - min)).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMax {
    pub min: f64,
    pub max: f64,
}

impl MinMax {
    /// Range that has seen no values; any fold replaces both ends
    pub const EMPTY: MinMax = MinMax {
        min: f64::MAX,
        max: f64::MIN,
    };

    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    /// Expand to include `value`; never shrinks
    pub fn fold(self, value: f64) -> MinMax {
        MinMax {
            min: self.min.min(value),
            max: self.max.max(value),
        }
    }

    pub fn normalize(&self, value: f64) -> f64 {
        normalize(self.min, self.max, value)
    }

    /// True if `other` lies entirely within this range
    pub fn contains(&self, other: &MinMax) -> bool {
        other.is_empty() || (self.min <= other.min && self.max >= other.max)
    }
}

impl Default for MinMax {
    fn default() -> Self {
        MinMax::EMPTY
    }
}

/// Bounding box over every scored dimension plus the number of devices
/// folded into it
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MinMaxValues {
    pub sentiment: MinMax,
    pub magnitude: MinMax,
    pub single_core: MinMax,
    pub multi_core: MinMax,
    pub battery_capacity: MinMax,
    pub pixel_density: MinMax,
    pub nits: MinMax,
    pub device_count: u64,
}

impl MinMaxValues {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Box expanded by the measurable dimensions of `device`
    ///
    /// The device count is left untouched; it only moves when a device is
    /// committed. An estimated benchmark with no predecessor (both scores
    /// zero) is a placeholder and does not widen the benchmark bounds.
    pub fn folded(&self, device: &Device) -> MinMaxValues {
        let placeholder_benchmark = device.benchmark.is_estimated
            && device.benchmark.single_core == 0.0
            && device.benchmark.multi_core == 0.0;

        let (single_core, multi_core) = if placeholder_benchmark {
            (self.single_core, self.multi_core)
        } else {
            (
                self.single_core.fold(device.benchmark.single_core),
                self.multi_core.fold(device.benchmark.multi_core),
            )
        };

        MinMaxValues {
            sentiment: self.sentiment.fold(device.review.sentiment),
            magnitude: self.magnitude.fold(device.review.magnitude),
            single_core,
            multi_core,
            battery_capacity: self.battery_capacity.fold(device.specs.battery_capacity),
            pixel_density: self.pixel_density.fold(device.specs.pixel_density),
            nits: self.nits.fold(device.specs.nits as f64),
            device_count: self.device_count,
        }
    }

    pub fn with_device_count(mut self, device_count: u64) -> Self {
        self.device_count = device_count;
        self
    }

    /// Compare bounds only, ignoring the device count
    pub fn same_bounds(&self, other: &MinMaxValues) -> bool {
        self.dimensions() == other.dimensions()
    }

    /// True if every dimension of `other` lies within this box
    pub fn contains(&self, other: &MinMaxValues) -> bool {
        self.dimensions()
            .iter()
            .zip(other.dimensions().iter())
            .all(|(outer, inner)| outer.contains(inner))
    }

    fn dimensions(&self) -> [MinMax; 7] {
        [
            self.sentiment,
            self.magnitude,
            self.single_core,
            self.multi_core,
            self.battery_capacity,
            self.pixel_density,
            self.nits,
        ]
    }
}

/// Both persisted boxes
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBounds {
    pub validated: MinMaxValues,
    pub unvalidated: MinMaxValues,
}

/// Persisted validation state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPhase {
    Idle,
    /// A promotion started and was not confirmed complete
    Promoting,
}

impl ValidationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationPhase::Idle => "idle",
            ValidationPhase::Promoting => "promoting",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "idle" => Some(ValidationPhase::Idle),
            "promoting" => Some(ValidationPhase::Promoting),
            _ => None,
        }
    }
}
