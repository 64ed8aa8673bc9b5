//! Domain types for the device catalog

pub mod bounds;
pub mod device;

pub use bounds::{normalize, MinMax, MinMaxValues, ScoreBounds, ValidationPhase};
pub use device::{
    BenchmarkScores, Device, DeviceFilters, PriceCategory, QueueEntry, Range, ReviewData,
    Specifications, EARLIEST_YEAR_BOUND,
};
