//! End-to-end tests: mocked Firestore through to the in-memory destination.
//!
//! The PostgreSQL round trip needs a provisioned database:
//! - `LINKSDECK_TEST_DATABASE_URL`: connection string of a database that
//!   already has the LinksDeck schema
//!
//! Run with: `cargo test --test pipeline_test -- --ignored`

#![allow(clippy::pedantic)]

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::env;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use linksdeck_migrate::config::SourceConfig;
use linksdeck_migrate::connectors::firestore::FirestoreConfig;
use linksdeck_migrate::{
    Destination, MemoryDestination, MigrationConfig, Pipeline, PipelineState, Stage,
    TransformedDataset, Transformer, VerificationSummary,
};

const DOCUMENTS: &str = "/projects/demo/databases/(default)/documents";

fn firestore_doc(collection: &str, id: &str, fields: Value) -> Value {
    json!({
        "name": format!("projects/demo/databases/(default)/documents/{collection}/{id}"),
        "fields": fields
    })
}

/// One user `u1` with one link `l1` tagged `["A", "a "]` and a blank title.
async fn mock_firestore() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("{DOCUMENTS}/users")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [firestore_doc("users", "u1", json!({
                "email": {"stringValue": "u1@example.com"},
                "createdAt": {"timestampValue": "2024-01-01T00:00:00Z"}
            }))]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{DOCUMENTS}/links")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [firestore_doc("links", "l1", json!({
                "userId": {"stringValue": "u1"},
                "url": {"stringValue": "http://x"},
                "title": {"stringValue": ""},
                "tags": {"arrayValue": {"values": [
                    {"stringValue": "A"},
                    {"stringValue": "a "}
                ]}},
                "createdAt": {"timestampValue": "2024-01-02T00:00:00Z"}
            }))]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{DOCUMENTS}/maintenance/current")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": {"code": 404}})))
        .mount(&server)
        .await;

    // Every other collection exists and is empty.
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .with_priority(10)
        .mount(&server)
        .await;

    server
}

fn config_for(server: &MockServer, dir: &Path) -> MigrationConfig {
    let mut config = MigrationConfig {
        source: SourceConfig::Firestore(FirestoreConfig {
            project_id: "demo".to_string(),
            access_token: Some("test-token".to_string()),
            base_url: Some(server.uri()),
            ..FirestoreConfig::default()
        }),
        ..MigrationConfig::default()
    };
    config.artifacts.export_file = dir.join("tmp/firestore-export.json");
    config.artifacts.transformed_file = dir.join("tmp/transformed.json");
    config.artifacts.verify_report = dir.join("tmp/verify-report.json");
    config.options.dry_run = true;
    config
}

fn fixed_transformer() -> Transformer {
    Transformer::with_clock(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> T {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_end_to_end_single_link() {
    let server = mock_firestore().await;
    let dir = TempDir::new().unwrap();
    let config = config_for(&server, dir.path());
    let artifacts = config.artifacts.clone();

    let mut pipeline = Pipeline::new(config).with_transformer(fixed_transformer());
    let report = pipeline.run(Stage::All).await.unwrap();
    assert_eq!(pipeline.state(), PipelineState::Done);

    let dataset: TransformedDataset = read_json(&artifacts.transformed_file);
    assert_eq!(dataset.links.len(), 1);
    assert_eq!(dataset.links[0].title, "http://x");
    assert_eq!(dataset.tags.len(), 1);
    assert_eq!(dataset.tags[0].name, "A");
    assert_eq!(dataset.link_tags.len(), 1);
    assert_eq!(dataset.link_tags[0].tag_id, dataset.tags[0].id);

    let summary = report.verification.unwrap();
    assert!(summary.matched);
    assert_eq!(summary.actual["links"], 1);
    assert_eq!(summary.actual["tags"], 1);
    assert_eq!(summary.actual["link_tags"], 1);
    assert_eq!(summary.actual["maintenance_status"], 1);

    let written: VerificationSummary = read_json(&artifacts.verify_report);
    assert_eq!(written, summary);
}

#[tokio::test]
async fn test_export_artifact_shape() {
    let server = mock_firestore().await;
    let dir = TempDir::new().unwrap();
    let config = config_for(&server, dir.path());
    let export_file = config.artifacts.export_file.clone();

    Pipeline::new(config).run(Stage::Export).await.unwrap();

    let raw: Value = read_json(&export_file);
    assert!(raw["exportedAt"].is_string());
    assert_eq!(raw["collections"]["links"][0]["id"], "l1");
    assert_eq!(raw["collections"]["links"][0]["data"]["tags"], json!(["A", "a "]));
    assert_eq!(raw["collections"]["tags"], json!([]));
    assert!(raw.get("maintenanceCurrent").is_none());
}

#[tokio::test]
async fn test_import_twice_converges() {
    let server = mock_firestore().await;
    let dir = TempDir::new().unwrap();
    let config = config_for(&server, dir.path());
    let destination: Arc<dyn Destination> = Arc::new(MemoryDestination::new());

    for stage in [Stage::Export, Stage::Transform] {
        Pipeline::new(config.clone())
            .with_transformer(fixed_transformer())
            .run(stage)
            .await
            .unwrap();
    }

    let mut counts = Vec::new();
    for _ in 0..2 {
        let mut pipeline = Pipeline::new(config.clone()).with_destination(Arc::clone(&destination));
        pipeline.run(Stage::Import).await.unwrap();

        let mut pipeline = Pipeline::new(config.clone()).with_destination(Arc::clone(&destination));
        let summary = pipeline.run(Stage::Verify).await.unwrap().verification.unwrap();
        assert!(summary.matched);
        counts.push(summary.actual);
    }
    assert_eq!(counts[0], counts[1]);
}

#[tokio::test]
async fn test_auth_failure_aborts_export() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403).set_body_string("permission denied"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = config_for(&server, dir.path());
    let export_file = config.artifacts.export_file.clone();

    let mut pipeline = Pipeline::new(config);
    let err = pipeline.run(Stage::All).await.unwrap_err();

    assert!(err.is_source_access());
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert!(!export_file.exists());
}

#[tokio::test]
async fn test_unknown_project_aborts_export() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"status": "NOT_FOUND", "message": "The database (default) does not exist"}
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = config_for(&server, dir.path());
    let artifacts = config.artifacts.clone();

    let mut pipeline = Pipeline::new(config);
    let err = pipeline.run(Stage::All).await.unwrap_err();

    assert!(err.is_source_access());
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert!(!artifacts.export_file.exists());
    assert!(!artifacts.verify_report.exists());
}

#[tokio::test]
#[ignore] // Run with --ignored flag when LINKSDECK_TEST_DATABASE_URL is set
async fn test_postgres_round_trip() {
    let Ok(url) = env::var("LINKSDECK_TEST_DATABASE_URL") else {
        eprintln!("Skipping: LINKSDECK_TEST_DATABASE_URL not set");
        return;
    };

    let server = mock_firestore().await;
    let dir = TempDir::new().unwrap();
    let mut config = config_for(&server, dir.path());
    config.options.dry_run = false;
    config.destination.database_url = Some(url);

    for _ in 0..2 {
        let mut pipeline = Pipeline::new(config.clone()).with_transformer(fixed_transformer());
        let report = pipeline.run(Stage::All).await.expect("migration failed");
        let summary = report.verification.unwrap();
        println!("✅ Verified: {:?}", summary.actual);
    }
}
