//! Persisted bounding boxes and validation phase (single row)

use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::error::{CollectorError, CollectorResult};
use crate::models::{MinMaxValues, ScoreBounds, ValidationPhase};

fn encode(values: &MinMaxValues) -> CollectorResult<String> {
    serde_json::to_string(values)
        .map_err(|e| CollectorError::GeneralDatabase(format!("Failed to serialize bounds: {}", e)))
}

fn decode(raw: &str) -> CollectorResult<MinMaxValues> {
    serde_json::from_str(raw)
        .map_err(|e| CollectorError::GeneralDatabase(format!("Failed to deserialize bounds: {}", e)))
}

/// Insert the empty row if the table has never been written
pub async fn seed(pool: &SqlitePool) -> CollectorResult<()> {
    let empty = encode(&MinMaxValues::empty())?;
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO score_bounds (id, validated, unvalidated, validation_phase)
        VALUES (1, ?, ?, 'idle')
        "#,
    )
    .bind(&empty)
    .bind(&empty)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn load(pool: &SqlitePool) -> CollectorResult<ScoreBounds> {
    let row = sqlx::query("SELECT validated, unvalidated FROM score_bounds WHERE id = 1")
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CollectorError::MissingDocument("Score bounds row missing".to_string()))?;

    let validated: String = row.get("validated");
    let unvalidated: String = row.get("unvalidated");
    Ok(ScoreBounds {
        validated: decode(&validated)?,
        unvalidated: decode(&unvalidated)?,
    })
}

/// Take the write lock on the bounds row before reading it
///
/// A transaction that reads first fails with SQLITE_BUSY under WAL if
/// another writer commits in between.
pub async fn lock_row(conn: &mut SqliteConnection) -> CollectorResult<()> {
    sqlx::query("UPDATE score_bounds SET unvalidated = unvalidated WHERE id = 1")
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Unvalidated box as seen inside an open transaction
pub async fn load_unvalidated(conn: &mut SqliteConnection) -> CollectorResult<MinMaxValues> {
    let raw: String = sqlx::query_scalar("SELECT unvalidated FROM score_bounds WHERE id = 1")
        .fetch_one(&mut *conn)
        .await?;
    decode(&raw)
}

pub async fn store_unvalidated(
    conn: &mut SqliteConnection,
    values: &MinMaxValues,
) -> CollectorResult<()> {
    sqlx::query("UPDATE score_bounds SET unvalidated = ? WHERE id = 1")
        .bind(encode(values)?)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn store_validated(pool: &SqlitePool, values: &MinMaxValues) -> CollectorResult<()> {
    sqlx::query("UPDATE score_bounds SET validated = ? WHERE id = 1")
        .bind(encode(values)?)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn phase(pool: &SqlitePool) -> CollectorResult<ValidationPhase> {
    let raw: String = sqlx::query_scalar("SELECT validation_phase FROM score_bounds WHERE id = 1")
        .fetch_one(pool)
        .await?;
    ValidationPhase::parse(&raw).ok_or_else(|| {
        CollectorError::GeneralDatabase(format!("Unknown validation phase '{}'", raw))
    })
}

pub async fn set_phase(pool: &SqlitePool, phase: ValidationPhase) -> CollectorResult<()> {
    sqlx::query("UPDATE score_bounds SET validation_phase = ? WHERE id = 1")
        .bind(phase.as_str())
        .execute(pool)
        .await?;
    Ok(())
}

/// Both boxes back to empty and the phase to idle
pub async fn reset(conn: &mut SqliteConnection) -> CollectorResult<()> {
    let empty = encode(&MinMaxValues::empty())?;
    sqlx::query(
        "UPDATE score_bounds SET validated = ?, unvalidated = ?, validation_phase = 'idle' WHERE id = 1",
    )
    .bind(&empty)
    .bind(&empty)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
