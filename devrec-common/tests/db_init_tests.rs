//! Tests for SQLite pool initialization

use devrec_common::db::{init_database_pool, PoolSettings};
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("sub").join("devrec.db");

    let pool = init_database_pool(&db_path, &PoolSettings::default()).await;

    assert!(pool.is_ok(), "Database initialization failed: {:?}", pool.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("devrec.db");

    let pool1 = init_database_pool(&db_path, &PoolSettings::default())
        .await
        .unwrap();
    sqlx::query("CREATE TABLE marker (id INTEGER PRIMARY KEY)")
        .execute(&pool1)
        .await
        .unwrap();
    pool1.close().await;

    let pool2 = init_database_pool(&db_path, &PoolSettings::default())
        .await
        .unwrap();
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'marker'",
    )
    .fetch_one(&pool2)
    .await
    .unwrap();

    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_pragmas_applied() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("devrec.db");

    let pool = init_database_pool(&db_path, &PoolSettings::default())
        .await
        .unwrap();

    let journal: String = sqlx::query_scalar("PRAGMA journal_mode")
        .fetch_one(&pool)
        .await
        .unwrap();
    let foreign_keys: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
        .fetch_one(&pool)
        .await
        .unwrap();

    assert_eq!(journal.to_lowercase(), "wal");
    assert_eq!(foreign_keys, 1);
}
