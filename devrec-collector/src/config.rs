//! Collector configuration (`devrec.toml`)
//!
//! Every section is optional; absent keys fall back to compiled defaults.

use devrec_common::config::{LoggingConfig, ServerConfig};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::monitor::ErrorCategory;

/// Configuration file name looked up in the user config directory
pub const CONFIG_FILE_NAME: &str = "devrec.toml";

/// Top-level collector configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectorConfig {
    /// Root folder holding the database and parse error log
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub ceilings: CeilingsConfig,

    #[serde(default)]
    pub sources: SourcesConfig,
}

/// Pacing, capacity and timeout settings for the Enqueuer/Uploader pair
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub queue_capacity: u32,
    /// Enqueuer: discovery or enqueue failure
    pub enqueuer_retry_secs: u64,
    /// Enqueuer: discovery returned nothing
    pub enqueuer_idle_secs: u64,
    /// Enqueuer: successful pass
    pub enqueuer_interval_secs: u64,
    pub uploader_retry_secs: u64,
    /// Uploader: pause between committed devices
    pub uploader_interval_secs: u64,
    /// Re-estimate once more than this many estimated devices were committed
    pub estimation_cycle_limit: u32,
    pub db_timeout_secs: u64,
    pub dequeue_timeout_secs: u64,
    /// Upper bound for a single enrichment collaborator call
    pub source_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 30,
            enqueuer_retry_secs: 10,
            enqueuer_idle_secs: 24,
            enqueuer_interval_secs: 300,
            uploader_retry_secs: 10,
            uploader_interval_secs: 30,
            estimation_cycle_limit: 3,
            db_timeout_secs: 30,
            dequeue_timeout_secs: 10,
            source_timeout_secs: 60,
        }
    }
}

impl PipelineConfig {
    pub fn db_timeout(&self) -> Duration {
        Duration::from_secs(self.db_timeout_secs)
    }

    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_secs(self.dequeue_timeout_secs)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }
}

/// Per-category error ceilings; a category trips the breaker once its
/// count exceeds the ceiling
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CeilingsConfig {
    pub clean_up: u32,
    pub sentiment_analysis: u32,
    pub creating_ai_client: u32,
    pub ai_network: u32,
    pub failed_ai_instruction: u32,
    pub getting_url: u32,
    pub getting_document: u32,
    pub parsing: u32,
    pub missing_document: u32,
    pub database_network: u32,
    pub general_database: u32,
}

impl Default for CeilingsConfig {
    fn default() -> Self {
        Self {
            clean_up: 10,
            sentiment_analysis: 3,
            creating_ai_client: 3,
            ai_network: 3,
            failed_ai_instruction: 1,
            getting_url: 5,
            getting_document: 5,
            parsing: 5,
            missing_document: 1,
            database_network: 3,
            general_database: 1,
        }
    }
}

impl CeilingsConfig {
    pub fn ceiling(&self, category: ErrorCategory) -> u32 {
        match category {
            ErrorCategory::CleanUp => self.clean_up,
            ErrorCategory::SentimentAnalysis => self.sentiment_analysis,
            ErrorCategory::CreatingAiClient => self.creating_ai_client,
            ErrorCategory::AiNetwork => self.ai_network,
            ErrorCategory::FailedAiInstruction => self.failed_ai_instruction,
            ErrorCategory::GettingUrl => self.getting_url,
            ErrorCategory::GettingDocument => self.getting_document,
            ErrorCategory::Parsing => self.parsing,
            ErrorCategory::MissingDocument => self.missing_document,
            ErrorCategory::DatabaseNetwork => self.database_network,
            ErrorCategory::GeneralDatabase => self.general_database,
        }
    }
}

/// Enrichment service settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Base URL of the JSON enrichment service
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub requests_per_second: u32,
    /// Review sources to query, by name
    pub review_sources: Vec<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5790".to_string(),
            request_timeout_secs: 30,
            requests_per_second: 2,
            review_sources: vec!["expert".to_string(), "community".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: CollectorConfig = toml::from_str(
            r#"
            [pipeline]
            queue_capacity = 12

            [ceilings]
            parsing = 9
            "#,
        )
        .unwrap();

        assert_eq!(cfg.pipeline.queue_capacity, 12);
        assert_eq!(cfg.pipeline.uploader_interval_secs, 30);
        assert_eq!(cfg.ceilings.ceiling(ErrorCategory::Parsing), 9);
        assert_eq!(cfg.ceilings.ceiling(ErrorCategory::MissingDocument), 1);
        assert_eq!(cfg.sources.review_sources.len(), 2);
    }

    #[test]
    fn default_ceilings_cover_every_category() {
        let ceilings = CeilingsConfig::default();
        assert_eq!(ceilings.ceiling(ErrorCategory::CleanUp), 10);
        assert_eq!(ceilings.ceiling(ErrorCategory::FailedAiInstruction), 1);
        assert_eq!(ceilings.ceiling(ErrorCategory::DatabaseNetwork), 3);
    }
}
