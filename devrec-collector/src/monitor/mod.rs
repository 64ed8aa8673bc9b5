//! Error monitor (circuit breaker)
//!
//! Owns the persisted per-category failure counters. `record` increments a
//! counter and trips the flow control's stop signal once the count exceeds
//! the category's ceiling. Counters only return to zero through `reset`.

pub mod parse_log;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;
use tracing::{error, warn};

use crate::config::CeilingsConfig;
use crate::control::FlowControl;
use crate::error::{CollectorError, CollectorResult};

pub use parse_log::ParseErrorLog;

/// Failure categories with an independent ceiling each
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    CleanUp,
    SentimentAnalysis,
    CreatingAiClient,
    AiNetwork,
    FailedAiInstruction,
    GettingUrl,
    GettingDocument,
    Parsing,
    MissingDocument,
    DatabaseNetwork,
    GeneralDatabase,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 11] = [
        ErrorCategory::CleanUp,
        ErrorCategory::SentimentAnalysis,
        ErrorCategory::CreatingAiClient,
        ErrorCategory::AiNetwork,
        ErrorCategory::FailedAiInstruction,
        ErrorCategory::GettingUrl,
        ErrorCategory::GettingDocument,
        ErrorCategory::Parsing,
        ErrorCategory::MissingDocument,
        ErrorCategory::DatabaseNetwork,
        ErrorCategory::GeneralDatabase,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::CleanUp => "clean_up",
            ErrorCategory::SentimentAnalysis => "sentiment_analysis",
            ErrorCategory::CreatingAiClient => "creating_ai_client",
            ErrorCategory::AiNetwork => "ai_network",
            ErrorCategory::FailedAiInstruction => "failed_ai_instruction",
            ErrorCategory::GettingUrl => "getting_url",
            ErrorCategory::GettingDocument => "getting_document",
            ErrorCategory::Parsing => "parsing",
            ErrorCategory::MissingDocument => "missing_document",
            ErrorCategory::DatabaseNetwork => "database_network",
            ErrorCategory::GeneralDatabase => "general_database",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        ErrorCategory::ALL
            .into_iter()
            .find(|category| category.as_str() == value)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time copy of every counter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorCounters(pub BTreeMap<ErrorCategory, u32>);

impl ErrorCounters {
    pub fn get(&self, category: ErrorCategory) -> u32 {
        self.0.get(&category).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.0.values().sum()
    }
}

/// Persisted counters service shared by both pipeline loops
pub struct ErrorMonitor {
    pool: SqlitePool,
    ceilings: CeilingsConfig,
    parse_log: Option<ParseErrorLog>,
    db_timeout: Duration,
    /// Serializes read-increment-write on the counters
    lock: Mutex<()>,
}

impl ErrorMonitor {
    pub fn new(pool: SqlitePool, ceilings: CeilingsConfig) -> Self {
        Self {
            pool,
            ceilings,
            parse_log: None,
            db_timeout: Duration::from_secs(30),
            lock: Mutex::new(()),
        }
    }

    /// Append parsing failures to a durable JSON lines log
    pub fn with_parse_log(mut self, parse_log: ParseErrorLog) -> Self {
        self.parse_log = Some(parse_log);
        self
    }

    pub fn with_db_timeout(mut self, db_timeout: Duration) -> Self {
        self.db_timeout = db_timeout;
        self
    }

    pub fn ceiling(&self, category: ErrorCategory) -> u32 {
        self.ceilings.ceiling(category)
    }

    /// Increment `category` and trip the stop signal past its ceiling
    ///
    /// Returns the new count, or `None` when the flow control was already
    /// cancelled and nothing was recorded.
    pub async fn record(
        &self,
        category: ErrorCategory,
        ctrl: &FlowControl,
    ) -> CollectorResult<Option<u32>> {
        if ctrl.is_cancelled() {
            return Ok(None);
        }

        let _guard = self.lock.lock().await;

        let count = tokio::time::timeout(self.db_timeout, self.increment(category))
            .await
            .map_err(|_| CollectorError::Timeout {
                operation: "record error".to_string(),
                category: ErrorCategory::DatabaseNetwork,
            })??;

        let ceiling = self.ceilings.ceiling(category);
        if count > ceiling {
            error!(
                category = %category,
                count,
                ceiling,
                "Error ceiling exceeded, stopping pipeline"
            );
            ctrl.trip();
        }

        Ok(Some(count))
    }

    async fn increment(&self, category: ErrorCategory) -> CollectorResult<u32> {
        let next: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO error_counters (category, count) VALUES (?, 1)
            ON CONFLICT(category) DO UPDATE SET count = count + 1
            RETURNING count
            "#,
        )
        .bind(category.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(next as u32)
    }

    /// Log an absorbed pipeline failure and count it if it has a category
    ///
    /// Parsing failures are also appended to the durable parse error log.
    pub async fn report(&self, err: &CollectorError, context: &str, ctrl: &FlowControl) {
        let Some(category) = err.category() else {
            return;
        };

        warn!(category = %category, context, error = %err, "Pipeline step failed");

        if category == ErrorCategory::Parsing {
            if let Some(log) = &self.parse_log {
                if let Err(e) = log.append(&err.to_string(), context).await {
                    warn!(error = %e, "Failed to write parse error log");
                }
            }
        }

        if let Err(e) = self.record(category, ctrl).await {
            warn!(category = %category, error = %e, "Failed to record error counter");
        }
    }

    /// Zero every counter
    ///
    /// Only call while no pipeline task is running.
    pub async fn reset(&self) -> CollectorResult<()> {
        let _guard = self.lock.lock().await;
        sqlx::query("UPDATE error_counters SET count = 0")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn snapshot(&self) -> CollectorResult<ErrorCounters> {
        let rows = sqlx::query("SELECT category, count FROM error_counters")
            .fetch_all(&self.pool)
            .await?;

        let mut counters: BTreeMap<ErrorCategory, u32> =
            ErrorCategory::ALL.iter().map(|c| (*c, 0)).collect();
        for row in rows {
            let name: String = row.get("category");
            let count: i64 = row.get("count");
            if let Some(category) = ErrorCategory::parse(&name) {
                counters.insert(category, count as u32);
            }
        }

        Ok(ErrorCounters(counters))
    }
}
