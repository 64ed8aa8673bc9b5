//! HTTP surface for the collector
//!
//! Starts and stops the pipeline, reports its status and serves the
//! read-only top devices query.

pub mod catalog;
pub mod health;
pub mod pipeline;

pub use catalog::catalog_routes;
pub use health::health_routes;
pub use pipeline::pipeline_routes;

use crate::control::FlowControl;

/// Flow control for a single request; never cancelled or tripped
pub(crate) fn request_control() -> FlowControl {
    let (ctrl, _stop) = FlowControl::new();
    ctrl
}
