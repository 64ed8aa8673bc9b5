//! Device catalog table operations
//!
//! The catalog order is insertion order (`catalog_seq`), which doubles as
//! the device id index walked by normalization and validation.

use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::error::{CollectorError, CollectorResult};
use crate::models::{
    BenchmarkScores, Device, DeviceFilters, PriceCategory, ReviewData, Specifications,
};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Most results the top devices query returns
pub const TOP_N_LIMIT: i64 = 3;

const DEVICE_COLUMNS: &str = r#"
    id, brand, name, release_date, battery_capacity, display_size,
    display_resolution, main_cameras_setup, selfie_cameras_setup,
    pixel_density, refresh_rate, nits,
    benchmark_estimated, single_core, multi_core,
    review_sentiment, review_magnitude, validated_review_score, unvalidated_review_score,
    validated_final_score, unvalidated_final_score,
    real_price, price_category, image
"#;

fn device_from_row(row: &SqliteRow) -> CollectorResult<Device> {
    let id: String = row.get("id");
    let id = Uuid::parse_str(&id)
        .map_err(|e| CollectorError::GeneralDatabase(format!("Bad device id '{}': {}", id, e)))?;

    let release_date: String = row.get("release_date");
    let release_date = NaiveDate::parse_from_str(&release_date, DATE_FORMAT).map_err(|e| {
        CollectorError::GeneralDatabase(format!("Bad release date '{}': {}", release_date, e))
    })?;

    let price_category: i64 = row.get("price_category");
    let benchmark_estimated: bool = row.get("benchmark_estimated");

    Ok(Device {
        id,
        brand: row.get("brand"),
        name: row.get("name"),
        specs: Specifications {
            release_date,
            battery_capacity: row.get("battery_capacity"),
            display_size: row.get("display_size"),
            display_resolution: row.get("display_resolution"),
            main_cameras_setup: row.get("main_cameras_setup"),
            selfie_cameras_setup: row.get("selfie_cameras_setup"),
            pixel_density: row.get("pixel_density"),
            refresh_rate: row.get("refresh_rate"),
            nits: row.get("nits"),
        },
        benchmark: BenchmarkScores {
            is_estimated: benchmark_estimated,
            single_core: row.get("single_core"),
            multi_core: row.get("multi_core"),
        },
        review: ReviewData {
            sentiment: row.get("review_sentiment"),
            magnitude: row.get("review_magnitude"),
            validated_score: row.get("validated_review_score"),
            unvalidated_score: row.get("unvalidated_review_score"),
        },
        validated_final_score: row.get("validated_final_score"),
        unvalidated_final_score: row.get("unvalidated_final_score"),
        real_price: row.get("real_price"),
        price_category: PriceCategory::from_ordinal(price_category)?,
        image: row.get("image"),
    })
}

/// Insert a fully populated device linked to its year and month
pub async fn insert_device(
    conn: &mut SqliteConnection,
    device: &Device,
    year_id: i64,
    month_id: i64,
) -> CollectorResult<()> {
    sqlx::query(
        r#"
        INSERT INTO devices (
            id, year_id, month_id, brand, name, release_date,
            battery_capacity, display_size, display_resolution,
            main_cameras_setup, selfie_cameras_setup, pixel_density, refresh_rate, nits,
            benchmark_estimated, single_core, multi_core,
            review_sentiment, review_magnitude, validated_review_score, unvalidated_review_score,
            validated_final_score, unvalidated_final_score,
            real_price, price_category, image
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(device.id.to_string())
    .bind(year_id)
    .bind(month_id)
    .bind(&device.brand)
    .bind(&device.name)
    .bind(device.specs.release_date.format(DATE_FORMAT).to_string())
    .bind(device.specs.battery_capacity)
    .bind(device.specs.display_size)
    .bind(&device.specs.display_resolution)
    .bind(&device.specs.main_cameras_setup)
    .bind(&device.specs.selfie_cameras_setup)
    .bind(device.specs.pixel_density)
    .bind(device.specs.refresh_rate)
    .bind(device.specs.nits)
    .bind(device.benchmark.is_estimated)
    .bind(device.benchmark.single_core)
    .bind(device.benchmark.multi_core)
    .bind(device.review.sentiment)
    .bind(device.review.magnitude)
    .bind(device.review.validated_score)
    .bind(device.review.unvalidated_score)
    .bind(device.validated_final_score)
    .bind(device.unvalidated_final_score)
    .bind(device.real_price)
    .bind(device.price_category.ordinal())
    .bind(&device.image)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Device ids in catalog order
pub async fn list_device_ids(pool: &SqlitePool) -> CollectorResult<Vec<Uuid>> {
    let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM devices ORDER BY catalog_seq")
        .fetch_all(pool)
        .await?;

    ids.into_iter()
        .map(|id| {
            Uuid::parse_str(&id).map_err(|e| {
                CollectorError::GeneralDatabase(format!("Bad device id '{}': {}", id, e))
            })
        })
        .collect()
}

pub async fn load_device(pool: &SqlitePool, id: Uuid) -> CollectorResult<Device> {
    let sql = format!("SELECT {} FROM devices WHERE id = ?", DEVICE_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CollectorError::MissingDocument(format!("Device {} not found", id)))?;
    device_from_row(&row)
}

pub async fn find_by_name(pool: &SqlitePool, name: &str) -> CollectorResult<Option<Device>> {
    let sql = format!("SELECT {} FROM devices WHERE name = ?", DEVICE_COLUMNS);
    let row = sqlx::query(&sql).bind(name).fetch_optional(pool).await?;
    row.as_ref().map(device_from_row).transpose()
}

/// Names already in the catalog, used to deduplicate discovery results
pub async fn device_names(conn: &mut SqliteConnection) -> CollectorResult<Vec<String>> {
    let names = sqlx::query_scalar("SELECT name FROM devices")
        .fetch_all(&mut *conn)
        .await?;
    Ok(names)
}

/// Devices released in `year` whose price category lies in the window
pub async fn devices_in_year(
    pool: &SqlitePool,
    year_id: i64,
    lowest: PriceCategory,
    highest: PriceCategory,
) -> CollectorResult<Vec<Device>> {
    let sql = format!(
        "SELECT {} FROM devices WHERE year_id = ? AND price_category BETWEEN ? AND ? ORDER BY catalog_seq",
        DEVICE_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(year_id)
        .bind(lowest.ordinal())
        .bind(highest.ordinal())
        .fetch_all(pool)
        .await?;
    rows.iter().map(device_from_row).collect()
}

/// Devices carrying an estimated benchmark, oldest release first
pub async fn estimated_devices(pool: &SqlitePool) -> CollectorResult<Vec<Device>> {
    let sql = format!(
        "SELECT {} FROM devices WHERE benchmark_estimated = 1 ORDER BY release_date, catalog_seq",
        DEVICE_COLUMNS
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.iter().map(device_from_row).collect()
}

/// Overwrite the unvalidated review and final scores of one device
pub async fn update_unvalidated_scores(
    pool: &SqlitePool,
    id: Uuid,
    review_score: f64,
    final_score: f64,
) -> CollectorResult<()> {
    sqlx::query(
        "UPDATE devices SET unvalidated_review_score = ?, unvalidated_final_score = ? WHERE id = ?",
    )
    .bind(review_score)
    .bind(final_score)
    .bind(id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Copy a device's unvalidated scores into its validated slots
pub async fn promote_scores(pool: &SqlitePool, id: Uuid) -> CollectorResult<()> {
    sqlx::query(
        r#"
        UPDATE devices
        SET validated_review_score = unvalidated_review_score,
            validated_final_score = unvalidated_final_score
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn update_benchmark(
    conn: &mut SqliteConnection,
    id: Uuid,
    benchmark: &BenchmarkScores,
) -> CollectorResult<()> {
    sqlx::query(
        "UPDATE devices SET benchmark_estimated = ?, single_core = ?, multi_core = ? WHERE id = ?",
    )
    .bind(benchmark.is_estimated)
    .bind(benchmark.single_core)
    .bind(benchmark.multi_core)
    .bind(id.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Best validated devices matching `filters`
pub async fn top_devices(pool: &SqlitePool, filters: &DeviceFilters) -> CollectorResult<Vec<Device>> {
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT ");
    builder.push(DEVICE_COLUMNS);
    builder.push(" FROM devices WHERE real_price BETWEEN ");
    builder.push_bind(filters.price.min);
    builder.push(" AND ");
    builder.push_bind(filters.price.max);
    builder.push(" AND display_size BETWEEN ");
    builder.push_bind(filters.display_size.min);
    builder.push(" AND ");
    builder.push_bind(filters.display_size.max);
    builder.push(" AND refresh_rate BETWEEN ");
    builder.push_bind(filters.refresh_rate.min);
    builder.push(" AND ");
    builder.push_bind(filters.refresh_rate.max);

    if !filters.brands.is_empty() {
        builder.push(" AND brand IN (");
        let mut separated = builder.separated(", ");
        for brand in &filters.brands {
            separated.push_bind(brand.clone());
        }
        separated.push_unseparated(")");
    }

    builder.push(" ORDER BY validated_final_score DESC LIMIT ");
    builder.push_bind(TOP_N_LIMIT);

    let rows = builder.build().fetch_all(pool).await?;
    rows.iter().map(device_from_row).collect()
}
