//! Tests for pipeline orchestration.

use super::*;
use crate::config::SourceConfig;
use crate::connectors::json_dump::JsonDumpConfig;
use crate::destination::MemoryDestination;
use crate::model::TransformedDataset;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use indicatif::ProgressBar;
use std::path::Path;
use tempfile::TempDir;

const DUMP: &str = r#"{
    "users": {"u1": {"email": "a@example.com", "createdAt": "2024-01-01T00:00:00Z"}},
    "links": {"l1": {"userId": "u1", "url": "http://x", "tags": ["Reading", "reading"], "createdAt": "2024-01-02T00:00:00Z"}},
    "maintenance": {"current": {"isMaintenanceMode": false}}
}"#;

fn config_in(dir: &Path) -> MigrationConfig {
    let dump = dir.join("dump.json");
    std::fs::write(&dump, DUMP).unwrap();

    let mut config = MigrationConfig {
        source: SourceConfig::JsonDump(JsonDumpConfig { path: dump }),
        ..MigrationConfig::default()
    };
    config.artifacts.export_file = dir.join("tmp/firestore-export.json");
    config.artifacts.transformed_file = dir.join("tmp/transformed.json");
    config.artifacts.verify_report = dir.join("tmp/verify-report.json");
    config.options.dry_run = true;
    config
}

fn fixed_transformer() -> Transformer {
    Transformer::with_clock(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap())
}

/// Reports one extra link so verification never matches.
struct MiscountingDestination(MemoryDestination);

#[async_trait]
impl Destination for MiscountingDestination {
    fn destination_type(&self) -> &'static str {
        "miscounting"
    }

    async fn apply(&self, dataset: &TransformedDataset, progress: &ProgressBar) -> Result<ImportStats> {
        self.0.apply(dataset, progress).await
    }

    async fn count_rows(&self, table: &str) -> Result<u64> {
        let n = self.0.count_rows(table).await?;
        Ok(if table == "links" { n + 1 } else { n })
    }

    async fn count_orphan_link_tags(&self) -> Result<u64> {
        self.0.count_orphan_link_tags().await
    }
}

#[test]
fn test_stage_includes() {
    assert!(Stage::All.includes(Stage::Export));
    assert!(Stage::All.includes(Stage::Verify));
    assert!(Stage::Import.includes(Stage::Import));
    assert!(!Stage::Import.includes(Stage::Verify));
    assert_eq!(Stage::Transform.to_string(), "transform");
}

#[test]
fn test_state_transitions() {
    use PipelineState::*;

    assert!(Idle.can_transition_to(Exporting));
    assert!(Idle.can_transition_to(Verifying));
    assert!(Exporting.can_transition_to(Transforming));
    assert!(Importing.can_transition_to(Verifying));
    assert!(Verifying.can_transition_to(Done));
    assert!(Transforming.can_transition_to(Failed));

    assert!(!Idle.can_transition_to(Done));
    assert!(!Exporting.can_transition_to(Importing));
    assert!(!Verifying.can_transition_to(Exporting));
    assert!(!Done.can_transition_to(Exporting));
    assert!(!Failed.can_transition_to(Idle));

    assert!(Done.is_terminal());
    assert!(!Verifying.is_terminal());
}

#[tokio::test]
async fn test_all_dry_run_matches() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    let report_path = config.artifacts.verify_report.clone();

    let mut pipeline = Pipeline::new(config).with_transformer(fixed_transformer());
    let report = pipeline.run(Stage::All).await.unwrap();

    assert_eq!(pipeline.state(), PipelineState::Done);
    assert_eq!(report.export.unwrap().total(), 3);
    assert_eq!(report.transform.unwrap().skipped_links, 0);
    assert_eq!(report.import.unwrap().rows["tags"], 1);

    let summary = report.verification.unwrap();
    assert!(summary.matched);
    assert_eq!(summary.actual["links"], 1);
    assert_eq!(summary.actual["link_tags"], 1);
    assert!(report_path.exists());
}

#[tokio::test]
async fn test_single_stages_chain_through_files() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    let destination: Arc<dyn Destination> = Arc::new(MemoryDestination::new());

    for stage in [Stage::Export, Stage::Transform, Stage::Import, Stage::Verify] {
        let mut pipeline = Pipeline::new(config.clone())
            .with_transformer(fixed_transformer())
            .with_destination(Arc::clone(&destination));
        pipeline.run(stage).await.unwrap();
        assert_eq!(pipeline.state(), PipelineState::Done);
    }

    assert!(config.artifacts.export_file.exists());
    assert!(config.artifacts.transformed_file.exists());
    assert_eq!(destination.count_rows("users").await.unwrap(), 1);
}

#[tokio::test]
async fn test_transform_is_byte_identical_across_runs() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());

    Pipeline::new(config.clone()).run(Stage::Export).await.unwrap();

    let mut first = Pipeline::new(config.clone()).with_transformer(fixed_transformer());
    first.run(Stage::Transform).await.unwrap();
    let a = std::fs::read(&config.artifacts.transformed_file).unwrap();

    let mut second = Pipeline::new(config.clone()).with_transformer(fixed_transformer());
    second.run(Stage::Transform).await.unwrap();
    let b = std::fs::read(&config.artifacts.transformed_file).unwrap();

    assert_eq!(a, b);
}

#[tokio::test]
async fn test_all_fails_on_mismatch() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());

    let mut pipeline = Pipeline::new(config)
        .with_transformer(fixed_transformer())
        .with_destination(Arc::new(MiscountingDestination(MemoryDestination::new())));
    let err = pipeline.run(Stage::All).await.unwrap_err();

    match err {
        Error::ReconciliationMismatch { mismatches } => {
            assert_eq!(mismatches, vec!["links: expected 1, actual 2".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(pipeline.state(), PipelineState::Failed);
}

#[tokio::test]
async fn test_verify_stage_alone_reports_without_failing() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());

    Pipeline::new(config.clone())
        .with_transformer(fixed_transformer())
        .run(Stage::Export)
        .await
        .unwrap();
    Pipeline::new(config.clone())
        .with_transformer(fixed_transformer())
        .run(Stage::Transform)
        .await
        .unwrap();

    let mut pipeline = Pipeline::new(config).with_destination(Arc::new(MemoryDestination::new()));
    let report = pipeline.run(Stage::Verify).await.unwrap();
    assert!(!report.verification.unwrap().matched);
    assert_eq!(pipeline.state(), PipelineState::Done);
}

#[tokio::test]
async fn test_missing_artifact_fails_stage() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());

    let mut pipeline = Pipeline::new(config);
    let err = pipeline.run(Stage::Transform).await.unwrap_err();
    assert!(matches!(err, Error::Artifact { .. }));
    assert_eq!(pipeline.state(), PipelineState::Failed);
}

#[tokio::test]
async fn test_invalid_config_fails_before_export() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(dir.path());
    config.source = SourceConfig::default();

    let mut pipeline = Pipeline::new(config);
    let err = pipeline.run(Stage::Export).await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert_eq!(pipeline.state(), PipelineState::Failed);
}

#[tokio::test]
async fn test_pipeline_runs_once() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());

    let mut pipeline = Pipeline::new(config);
    pipeline.run(Stage::Export).await.unwrap();
    let err = pipeline.run(Stage::Export).await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition(_)));
    assert_eq!(pipeline.state(), PipelineState::Done);
}
