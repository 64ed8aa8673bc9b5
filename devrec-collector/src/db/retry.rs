//! Exponential backoff retry for transient SQLite lock errors
//!
//! Backoff starts at 10ms and doubles up to 1000ms until `max_wait`
//! elapses. Errors other than "database is locked" fail immediately.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::error::{CollectorError, CollectorResult};

fn is_lock_error(err: &CollectorError) -> bool {
    match err {
        CollectorError::GeneralDatabase(msg) | CollectorError::DatabaseNetwork(msg) => {
            msg.contains("database is locked") || msg.contains("database table is locked")
        }
        _ => false,
    }
}

pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait: Duration,
    mut operation: F,
) -> CollectorResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CollectorResult<T>>,
{
    let start_time = Instant::now();
    let mut attempt = 0u32;
    let mut backoff_ms = 10u64;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Database operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) if is_lock_error(&err) => {
                let elapsed = start_time.elapsed();
                if elapsed >= max_wait {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Database still locked, giving up"
                    );
                    return Err(CollectorError::DatabaseNetwork(format!(
                        "{}: database locked after {} attempts ({} ms)",
                        operation_name,
                        attempt,
                        elapsed.as_millis()
                    )));
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms,
                    "Database locked, retrying"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(1000);
            }
            Err(err) => return Err(err),
        }
    }
}
