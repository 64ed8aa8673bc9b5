//! Year/month grouping used for chronological traversal

use sqlx::SqliteConnection;

use crate::error::CollectorResult;

/// Ids of the year and month rows for a release date, creating them on
/// first use
pub async fn ensure_year_month(
    conn: &mut SqliteConnection,
    year: i32,
    month: u32,
) -> CollectorResult<(i64, i64)> {
    sqlx::query("INSERT OR IGNORE INTO release_years (year_number) VALUES (?)")
        .bind(year)
        .execute(&mut *conn)
        .await?;
    let year_id: i64 = sqlx::query_scalar("SELECT id FROM release_years WHERE year_number = ?")
        .bind(year)
        .fetch_one(&mut *conn)
        .await?;

    sqlx::query("INSERT OR IGNORE INTO release_months (year_id, month_number) VALUES (?, ?)")
        .bind(year_id)
        .bind(month as i64)
        .execute(&mut *conn)
        .await?;
    let month_id: i64 = sqlx::query_scalar(
        "SELECT id FROM release_months WHERE year_id = ? AND month_number = ?",
    )
    .bind(year_id)
    .bind(month as i64)
    .fetch_one(&mut *conn)
    .await?;

    Ok((year_id, month_id))
}

/// Id of a year row, if any device was released that year
pub async fn find_year(conn: &mut SqliteConnection, year: i32) -> CollectorResult<Option<i64>> {
    let id = sqlx::query_scalar("SELECT id FROM release_years WHERE year_number = ?")
        .bind(year)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(id)
}
