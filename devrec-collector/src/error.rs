//! Error types for devrec-collector
//!
//! `CollectorError` is the pipeline failure taxonomy. Each variant maps to
//! at most one error counter category; benign kinds (empty queue, missing
//! benchmark, rejected device, cancellation) are never counted.
//!
//! `ApiError` is the HTTP-facing error rendered by the axum handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::monitor::ErrorCategory;

/// Result type for pipeline operations
pub type CollectorResult<T> = Result<T, CollectorError>;

/// Pipeline failure taxonomy
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CollectorError {
    /// The flow control was cancelled before or during the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Transport-level failure talking to an external source
    #[error("Failed to get URL: {0}")]
    GettingUrl(String),

    /// External source answered but the document could not be fetched
    #[error("Failed to get document: {0}")]
    GettingDocument(String),

    /// Malformed external payload
    #[error("Parsing error: {0}")]
    Parsing(String),

    /// An expected record was absent
    #[error("Missing document: {0}")]
    MissingDocument(String),

    /// Dequeue found nothing to hand out
    #[error("Queue is empty")]
    EmptyQueue,

    /// Database unreachable, pool exhausted or I/O failure
    #[error("Database network error: {0}")]
    DatabaseNetwork(String),

    /// Any other database failure
    #[error("Database error: {0}")]
    GeneralDatabase(String),

    /// The benchmark source has no entry for this device
    #[error("No benchmark found for {0}")]
    NoSuchBenchmark(String),

    /// The estimator could not find a predecessor device
    #[error("No last year equivalent for {0}")]
    NoLastYearEquivalent(String),

    /// Semantically rejected device (e.g. released before the earliest year)
    #[error("Invalid device: {0}")]
    InvalidDevice(String),

    /// A review source produced an unusable tone reading
    #[error("Sentiment analysis failed: {0}")]
    SentimentAnalysis(String),

    /// A bounded call did not finish in time
    #[error("{operation} timed out")]
    Timeout {
        operation: String,
        category: ErrorCategory,
    },
}

impl CollectorError {
    /// Counter category this error feeds, if any
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            CollectorError::Cancelled
            | CollectorError::EmptyQueue
            | CollectorError::NoSuchBenchmark(_)
            | CollectorError::NoLastYearEquivalent(_)
            | CollectorError::InvalidDevice(_) => None,
            CollectorError::GettingUrl(_) => Some(ErrorCategory::GettingUrl),
            CollectorError::GettingDocument(_) => Some(ErrorCategory::GettingDocument),
            CollectorError::Parsing(_) => Some(ErrorCategory::Parsing),
            CollectorError::MissingDocument(_) => Some(ErrorCategory::MissingDocument),
            CollectorError::DatabaseNetwork(_) => Some(ErrorCategory::DatabaseNetwork),
            CollectorError::GeneralDatabase(_) => Some(ErrorCategory::GeneralDatabase),
            CollectorError::SentimentAnalysis(_) => Some(ErrorCategory::SentimentAnalysis),
            CollectorError::Timeout { category, .. } => Some(*category),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CollectorError::Cancelled)
    }
}

impl From<sqlx::Error> for CollectorError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => CollectorError::MissingDocument(err.to_string()),
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => CollectorError::DatabaseNetwork(err.to_string()),
            other => CollectorError::GeneralDatabase(other.to_string()),
        }
    }
}

impl From<devrec_common::Error> for CollectorError {
    fn from(err: devrec_common::Error) -> Self {
        match err {
            devrec_common::Error::Database(db_err) => db_err.into(),
            devrec_common::Error::Io(io_err) => CollectorError::DatabaseNetwork(io_err.to_string()),
            other => CollectorError::GeneralDatabase(other.to_string()),
        }
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409), e.g. pipeline already running
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Pipeline or persistence failure
    #[error(transparent)]
    Collector(#[from] CollectorError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Collector(ref err) => {
                let status = match err {
                    CollectorError::InvalidDevice(_) => StatusCode::BAD_REQUEST,
                    CollectorError::Timeout { .. } | CollectorError::DatabaseNetwork(_) => {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, "COLLECTOR_ERROR", err.to_string())
            }
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
