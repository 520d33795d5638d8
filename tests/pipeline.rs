//! End-to-end tests of the request pipeline over real sockets.

use std::time::Duration;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use carto_service::error::{AppError, BusinessError};
use carto_service::http::{GENERIC_ERROR_MESSAGE, X_REQUEST_ID};

mod common;

fn routes() -> Router {
    Router::new()
        .route("/orders/{id}", get(|| async { Json(json!({"id": 1, "total": 42})) }))
        .route(
            "/users/{id}",
            get(|| async { Err::<(), _>(BusinessError::user_not_found(None)) }),
        )
        .route(
            "/ledger",
            post(|| async { Err::<(), AppError>(AppError::msg("ledger unavailable")) }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(1500)).await;
                Json(json!({"message": "done", "data": {"slept": 1500}}))
            }),
        )
}

#[tokio::test]
async fn test_correlation_id_threads_through_logs() {
    let dir = tempfile::tempdir().unwrap();
    let server = common::spawn_server(common::test_config(28301, dir.path()), routes()).await;

    let res = reqwest::get(format!("{}/api/orders/1", server.base)).await.unwrap();
    assert_eq!(res.status(), 200);
    let header = res.headers()[X_REQUEST_ID].to_str().unwrap().to_string();
    let body: Value = res.json().await.unwrap();

    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["total"], 42);
    assert_eq!(body["message"], "operation succeeded");
    assert_eq!(body["correlationId"], header.as_str());

    server.stop().await;

    let lines = common::read_log(&dir.path().join("app.log"));
    let ours = common::lines_for(&lines, &header);
    assert!(ours.iter().any(|l| l["message"] == "GET /api/orders/1 started"));
    assert!(ours.iter().any(|l| l["status"] == 200 && l["level"] == "info"));
}

#[tokio::test]
async fn test_inbound_correlation_id_is_honored() {
    let dir = tempfile::tempdir().unwrap();
    let server = common::spawn_server(common::test_config(28302, dir.path()), routes()).await;

    let res = reqwest::Client::new()
        .get(format!("{}/api/orders/9", server.base))
        .header(X_REQUEST_ID, "upstream-7f3a")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()[X_REQUEST_ID], "upstream-7f3a");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["correlationId"], "upstream-7f3a");

    server.stop().await;
}

#[tokio::test]
async fn test_business_error_is_logged_once() {
    let dir = tempfile::tempdir().unwrap();
    let server = common::spawn_server(common::test_config(28303, dir.path()), routes()).await;

    let res = reqwest::get(format!("{}/api/users/3", server.base)).await.unwrap();
    assert_eq!(res.status(), 404);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], 2001);
    assert!(body["data"].is_null());

    server.stop().await;

    let id = body["correlationId"].as_str().unwrap();
    let errors = common::read_log(&dir.path().join("error.log"));
    let ours = common::lines_for(&errors, id);
    assert_eq!(ours.len(), 1);
    assert_eq!(ours[0]["code"], 2001);
}

#[tokio::test]
async fn test_sink_levels_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::test_config(28304, dir.path());
    config.logging.file.level = Some("warn".to_string());
    let server = common::spawn_server(config, routes()).await;

    reqwest::get(format!("{}/api/orders/1", server.base)).await.unwrap();
    reqwest::get(format!("{}/api/missing", server.base)).await.unwrap();
    server.stop().await;

    let app = common::read_log(&dir.path().join("app.log"));
    assert!(!app.is_empty());
    assert!(app.iter().all(|l| l["level"] == "warn" || l["level"] == "error"));

    let errors = common::read_log(&dir.path().join("error.log"));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["message"], "GET /api/missing - 404 - Cannot GET /api/missing");
}

#[tokio::test]
async fn test_slow_request_flags_both_layers() {
    let dir = tempfile::tempdir().unwrap();
    let server = common::spawn_server(common::test_config(28305, dir.path()), routes()).await;

    let res = reqwest::get(format!("{}/api/slow", server.base)).await.unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], 200);
    assert_eq!(body["message"], "done");
    assert_eq!(body["data"]["slept"], 1500);

    server.stop().await;

    let id = body["correlationId"].as_str().unwrap();
    let lines = common::read_log(&dir.path().join("app.log"));
    let warns: Vec<String> = common::lines_for(&lines, id)
        .into_iter()
        .filter(|l| l["level"] == "warn")
        .map(|l| l["message"].as_str().unwrap_or_default().to_string())
        .collect();
    assert!(warns.iter().any(|m| m.starts_with("slow request: GET /api/slow")));
    assert!(warns.iter().any(|m| m.starts_with("slow interface: GET /api/slow")));
}

#[tokio::test]
async fn test_production_redacts_unexpected_errors() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::test_config(28306, dir.path());
    config.environment.production = true;
    let server = common::spawn_server(config, routes()).await;

    let res = reqwest::Client::new()
        .post(format!("{}/api/ledger", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 500);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], GENERIC_ERROR_MESSAGE);
    assert!(body.get("stack").is_none());
    assert!(!body.to_string().contains("ledger unavailable"));

    server.stop().await;

    let errors = common::read_log(&dir.path().join("error.log"));
    let ours = common::lines_for(&errors, body["correlationId"].as_str().unwrap());
    assert_eq!(ours.len(), 1);
    assert!(ours[0]["message"].as_str().unwrap().contains("ledger unavailable"));
    assert!(ours[0]["stack"].is_string());
}

#[tokio::test]
async fn test_log_file_rotates() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::test_config(28307, dir.path());
    config.logging.max_bytes = 4096;
    config.logging.backups = 2;
    let server = common::spawn_server(config, routes()).await;

    let client = reqwest::Client::new();
    for i in 0..40 {
        client
            .get(format!("{}/api/orders/{i}", server.base))
            .send()
            .await
            .unwrap();
    }
    server.stop().await;

    let active = dir.path().join("app.log");
    assert!(std::fs::metadata(&active).unwrap().len() <= 4096);
    assert!(dir.path().join("app.log.1").exists());
    assert!(dir.path().join("app.log.2").exists());
    assert!(!dir.path().join("app.log.3").exists());
}
