//! Bounded work queue
//!
//! Entries and the size counter are written inside one transaction, so a
//! concurrent reader never sees them disagree. Both transactions open with
//! a write so SQLite takes the write lock up front.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::db::devices;
use crate::error::{CollectorError, CollectorResult};
use crate::models::QueueEntry;

/// Pick up to `amount` entries uniformly at random without repeats
pub fn sample_entries(mut candidates: Vec<QueueEntry>, amount: usize) -> Vec<QueueEntry> {
    let mut rng = rand::thread_rng();
    candidates.shuffle(&mut rng);
    candidates.truncate(amount);
    candidates
}

/// Top the queue up with unseen candidates, never exceeding `capacity`
///
/// Returns the number of entries inserted.
pub async fn enqueue_batch(
    pool: &SqlitePool,
    candidates: &[QueueEntry],
    capacity: u32,
) -> CollectorResult<usize> {
    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE queue_size SET size = size WHERE id = 1")
        .execute(&mut *tx)
        .await?;
    let size: i64 = sqlx::query_scalar("SELECT size FROM queue_size WHERE id = 1")
        .fetch_one(&mut *tx)
        .await?;

    let remaining = (capacity as i64 - size).max(0) as usize;
    if remaining == 0 {
        tx.commit().await?;
        debug!(queue_size = size, "Queue full, nothing enqueued");
        return Ok(0);
    }

    let mut seen: HashSet<String> = devices::device_names(&mut *tx).await?.into_iter().collect();
    let queued: Vec<String> = sqlx::query_scalar("SELECT name FROM device_queue")
        .fetch_all(&mut *tx)
        .await?;
    seen.extend(queued);

    let fresh: Vec<QueueEntry> = candidates
        .iter()
        .filter(|entry| seen.insert(entry.name.clone()))
        .cloned()
        .collect();

    let chosen = sample_entries(fresh, remaining);

    for entry in &chosen {
        sqlx::query("INSERT INTO device_queue (name, detail, image) VALUES (?, ?, ?)")
            .bind(&entry.name)
            .bind(&entry.detail)
            .bind(&entry.image)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query("UPDATE queue_size SET size = size + ? WHERE id = 1")
        .bind(chosen.len() as i64)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    if !chosen.is_empty() {
        let names: Vec<&str> = chosen.iter().map(|e| e.name.as_str()).collect();
        info!(count = chosen.len(), devices = ?names, "Enqueued devices");
    }
    Ok(chosen.len())
}

/// Remove and return the oldest entry
pub async fn dequeue(pool: &SqlitePool) -> CollectorResult<QueueEntry> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query(
        r#"
        DELETE FROM device_queue
        WHERE seq = (SELECT MIN(seq) FROM device_queue)
        RETURNING name, detail, image
        "#,
    )
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        tx.rollback().await?;
        return Err(CollectorError::EmptyQueue);
    };

    sqlx::query("UPDATE queue_size SET size = size - 1 WHERE id = 1")
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    let entry = QueueEntry {
        name: row.get("name"),
        detail: row.get("detail"),
        image: row.get("image"),
    };
    info!(device = %entry.name, "Dequeued device");
    Ok(entry)
}

/// Value of the size counter
pub async fn queue_size(pool: &SqlitePool) -> CollectorResult<u32> {
    let size: i64 = sqlx::query_scalar("SELECT size FROM queue_size WHERE id = 1")
        .fetch_one(pool)
        .await?;
    Ok(size as u32)
}

/// Actual number of queued entries
pub async fn entry_count(pool: &SqlitePool) -> CollectorResult<u32> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM device_queue")
        .fetch_one(pool)
        .await?;
    Ok(count as u32)
}
