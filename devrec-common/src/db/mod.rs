//! SQLite pool initialisation

use crate::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Pool sizing and lock-wait behaviour
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_connections: u32,
    /// Upper bound for waiting on a free pooled connection
    pub acquire_timeout: Duration,
    /// SQLite `busy_timeout` applied to each connection
    pub busy_timeout_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 8,
            acquire_timeout: Duration::from_secs(10),
            busy_timeout_ms: 5000,
        }
    }
}

/// Open (creating if needed) the SQLite database at `db_path`
///
/// Enables foreign keys and WAL journaling, and sets the busy timeout on
/// every connection the pool hands out.
pub async fn init_database_pool(db_path: &Path, settings: &PoolSettings) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let busy_timeout = format!("PRAGMA busy_timeout = {}", settings.busy_timeout_ms);

    let pool = SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.acquire_timeout)
        .after_connect(move |conn, _meta| {
            let busy_timeout = busy_timeout.clone();
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query(&busy_timeout).execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(&db_url)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    Ok(pool)
}
