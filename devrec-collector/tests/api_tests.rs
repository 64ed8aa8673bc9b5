//! HTTP surface tests via `tower::ServiceExt::oneshot`

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::util::ServiceExt;

use common::{commit, default_catalog, fast_pipeline_config, FakeSources, Fixture};
use devrec_collector::db::CatalogDb;
use devrec_collector::pipeline::PipelineManager;
use devrec_collector::{build_router, AppState};

async fn create_test_app() -> (TempDir, Router, CatalogDb) {
    let (dir, catalog) = default_catalog().await;
    let sources = FakeSources::new();
    let mut config = fast_pipeline_config();
    config.uploader_retry_secs = 1;

    let manager = PipelineManager::new(catalog.clone(), sources.collaborators(), config);
    let app = build_router(AppState::new(manager));
    (dir, app, catalog)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn any_filters() -> Value {
    json!({
        "price": { "min": 0, "max": 100000 },
        "display_size": { "min": 0.0, "max": 20.0 },
        "refresh_rate": { "min": 0, "max": 240 }
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let (_dir, app, _catalog) = create_test_app().await;

    let (status, body) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "devrec-collector");
    assert_eq!(body["database_up"], true);
}

#[tokio::test]
async fn test_status_reports_idle_pipeline_and_counters() {
    let (_dir, app, _catalog) = create_test_app().await;

    let (status, body) = send(&app, get("/pipeline/status")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["running"], false);
    assert_eq!(body["queue_size"], 0);
    assert_eq!(body["error_counters"]["parsing"], 0);
    assert_eq!(body["error_counters"]["missing_document"], 0);
}

#[tokio::test]
async fn test_start_stop_lifecycle() {
    let (_dir, app, _catalog) = create_test_app().await;

    let (status, body) = send(&app, post("/pipeline/start")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["started"], true);

    let (status, body) = send(&app, post("/pipeline/start")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (status, body) = send(&app, post("/catalog/reset")).await;
    assert_eq!(status, StatusCode::CONFLICT, "reset refused while running: {}", body);

    let (status, body) = send(&app, post("/pipeline/stop")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stopped"], true);
    assert_eq!(body["outcome"], "stopped_by_request");

    let (_, body) = send(&app, get("/pipeline/status")).await;
    assert_eq!(body["running"], false);
    assert_eq!(body["last_outcome"], "stopped_by_request");
}

#[tokio::test]
async fn test_top_devices_sorted_and_capped() {
    let (_dir, app, catalog) = create_test_app().await;

    for (name, single_core) in [
        ("Phone 1", 100.0),
        ("Phone 2", 300.0),
        ("Phone 3", 200.0),
        ("Phone 4", 400.0),
    ] {
        commit(
            &catalog,
            Fixture::new("Acme", 2024, 4)
                .benchmark(single_core, 500.0)
                .device(name),
        )
        .await;
    }
    commit(
        &catalog,
        Fixture::new("Other", 2024, 4)
            .benchmark(500.0, 500.0)
            .device("Other 1"),
    )
    .await;

    let mut filters = any_filters();
    filters["brands"] = json!(["Acme"]);
    let (status, body) = send(&app, post_json("/devices/top", filters)).await;

    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["devices"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Phone 4", "Phone 2", "Phone 3"]);
}

#[tokio::test]
async fn test_top_devices_filters_by_price() {
    let (_dir, app, catalog) = create_test_app().await;

    commit(&catalog, Fixture::new("Acme", 2024, 4).price(300).device("Budget 1")).await;
    commit(&catalog, Fixture::new("Acme", 2024, 4).price(1200).device("Flagship 1")).await;

    let mut filters = any_filters();
    filters["price"] = json!({ "min": 0, "max": 500 });
    let (status, body) = send(&app, post_json("/devices/top", filters)).await;

    assert_eq!(status, StatusCode::OK);
    let devices = body["devices"].as_array().unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0]["name"], "Budget 1");
}

#[tokio::test]
async fn test_top_devices_rejects_inverted_range() {
    let (_dir, app, _catalog) = create_test_app().await;

    let mut filters = any_filters();
    filters["price"] = json!({ "min": 900, "max": 100 });
    let (status, body) = send(&app, post_json("/devices/top", filters)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_reset_empties_catalog() {
    let (_dir, app, catalog) = create_test_app().await;
    commit(&catalog, Fixture::new("Acme", 2024, 4).device("Phone 1")).await;

    let (status, body) = send(&app, post("/catalog/reset")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reset"], true);

    let (_, body) = send(&app, post_json("/devices/top", any_filters())).await;
    assert!(body["devices"].as_array().unwrap().is_empty());
}
