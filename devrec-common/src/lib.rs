//! # devrec Common Library
//!
//! Shared code for the device recommendation services:
//! - Error type shared by every crate
//! - Bootstrap configuration loading and root folder resolution
//! - Logging initialisation
//! - SQLite pool initialisation

pub mod config;
pub mod db;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
