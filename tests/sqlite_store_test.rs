//! Tests for the SQLite time-series store

use chrono::{NaiveDate, NaiveDateTime};
use index_resolver::resolver::{EntityRegistry, SeriesFetcher, SqliteSeriesStore, TimeSeriesStore};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;

fn naive(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 9, day)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

async fn memory_store() -> SqliteSeriesStore {
    // A single connection so every query sees the same in-memory database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");
    SqliteSeriesStore::from_pool(pool)
}

async fn create_collection(
    store: &SqliteSeriesStore,
    name: &str,
    rows: &[(NaiveDateTime, i64, f64)],
) {
    sqlx::query(&format!(
        "CREATE TABLE \"{}\" (date TEXT NOT NULL, hour INTEGER NOT NULL, value REAL NOT NULL)",
        name
    ))
    .execute(store.get_db_pool())
    .await
    .expect("Failed to create collection");

    for (date, hour, value) in rows {
        sqlx::query(&format!("INSERT INTO \"{}\" (date, hour, value) VALUES (?, ?, ?)", name))
            .bind(date)
            .bind(hour)
            .bind(value)
            .execute(store.get_db_pool())
            .await
            .expect("Failed to insert row");
    }
}

#[tokio::test]
async fn test_fetch_all_returns_rows_in_insertion_order() {
    let store = memory_store().await;
    create_collection(
        &store,
        "London_primary",
        &[(naive(2, 5), 5, 12.5), (naive(1, 3), 3, 10.0), (naive(2, 0), 0, 11.25)],
    )
    .await;

    let rows = store.fetch_all("London_primary").await.expect("Failed to fetch");

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].timestamp, naive(2, 5));
    assert_eq!(rows[1].hour_of_day, 3);
    assert_eq!(rows[2].value, 11.25);
    assert!(store.health_check().await.expect("Health check failed"));
}

#[tokio::test]
async fn test_missing_collection_is_an_error() {
    let store = memory_store().await;
    assert!(store.fetch_all("Nowhere_secondary").await.is_err());
}

#[tokio::test]
async fn test_malformed_rows_are_an_error() {
    let store = memory_store().await;
    sqlx::query("CREATE TABLE \"Bad_secondary\" (date TEXT, hour INTEGER, value REAL)")
        .execute(store.get_db_pool())
        .await
        .unwrap();
    sqlx::query("INSERT INTO \"Bad_secondary\" (date, hour, value) VALUES ('not a date', 1, 1.0)")
        .execute(store.get_db_pool())
        .await
        .unwrap();

    assert!(store.fetch_all("Bad_secondary").await.is_err());
}

#[tokio::test]
async fn test_fetcher_normalizes_sqlite_rows() {
    let store = memory_store().await;
    create_collection(
        &store,
        "Dubai_secondary",
        &[(naive(3, 10), 10, 3.0), (naive(3, 8), 8, 1.0), (naive(3, 9), 9, 2.0)],
    )
    .await;

    let mut registry = EntityRegistry::from_json(
        r#"[{"name":"Dubai","category":"secondary","utc_offset_hours":4,"day_delay_days":0}]"#,
    )
    .unwrap();
    let fetcher = SeriesFetcher::new(Arc::new(store), 2);

    fetcher.refresh_all(&mut registry).await.expect("refresh succeeds");

    let series = &registry.get("Dubai").unwrap().series;
    assert_eq!(series.values(), &[1.0, 2.0, 3.0]);
    assert_eq!(series.hours(), &[8, 9, 10]);
    assert_eq!(series.timestamps()[0].naive_utc(), naive(3, 12));
}
