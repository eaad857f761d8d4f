//! Migration pipeline orchestration.
//!
//! Stages hand data to each other only through the artifact files, so any
//! stage can run on its own. `all` chains them and additionally fails when
//! verification does not match.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::config::MigrationConfig;
use crate::connectors::{create_source, DocumentSource};
use crate::destination::{create_destination, Destination, ImportStats};
use crate::error::{Error, Result};
use crate::export::{export_to_file, ExportStats};
use crate::import::import_file;
use crate::model::VerificationSummary;
use crate::transform::{transform_file_with, TransformStats, Transformer};
use crate::verify::verify_file;

/// A unit of work the pipeline can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Document store to raw snapshot.
    Export,
    /// Raw snapshot to dataset.
    Transform,
    /// Dataset to destination.
    Import,
    /// Dataset against destination.
    Verify,
    /// Every stage in order.
    All,
}

impl Stage {
    /// True if running `self` runs `other`.
    #[must_use]
    pub fn includes(self, other: Stage) -> bool {
        self == other || self == Stage::All
    }

    /// Stage name as used on the command line.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Export => "export",
            Self::Transform => "transform",
            Self::Import => "import",
            Self::Verify => "verify",
            Self::All => "all",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run state of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Nothing has run yet.
    Idle,
    /// Reading the document store.
    Exporting,
    /// Building the dataset.
    Transforming,
    /// Writing the destination.
    Importing,
    /// Reconciling counts.
    Verifying,
    /// The requested stage finished.
    Done,
    /// A stage failed; the pipeline will not run again.
    Failed,
}

impl PipelineState {
    /// Whether the state machine allows moving to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::{Done, Exporting, Failed, Idle, Importing, Transforming, Verifying};
        matches!(
            (self, next),
            (Idle, Exporting | Transforming | Importing | Verifying | Failed)
                | (Exporting, Transforming)
                | (Transforming, Importing)
                | (Importing, Verifying)
                | (Exporting | Transforming | Importing | Verifying, Done | Failed)
        )
    }

    /// True for `Done` and `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Exporting => "exporting",
            Self::Transforming => "transforming",
            Self::Importing => "importing",
            Self::Verifying => "verifying",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What a pipeline run produced, per stage that ran.
#[derive(Debug, Default, Clone)]
pub struct PipelineReport {
    /// Export statistics.
    pub export: Option<ExportStats>,
    /// Transform skip and merge counters.
    pub transform: Option<TransformStats>,
    /// Import statistics.
    pub import: Option<ImportStats>,
    /// Verification outcome.
    pub verification: Option<VerificationSummary>,
    /// Duration in seconds.
    pub duration_secs: f64,
}

/// Migration pipeline.
pub struct Pipeline {
    config: MigrationConfig,
    state: PipelineState,
    transformer: Transformer,
    source: Option<Box<dyn DocumentSource>>,
    destination: Option<Arc<dyn Destination>>,
}

impl Pipeline {
    /// Create a new migration pipeline.
    ///
    /// The source and destination are opened lazily by the first stage
    /// that needs them.
    #[must_use]
    pub fn new(config: MigrationConfig) -> Self {
        Self {
            config,
            state: PipelineState::Idle,
            transformer: Transformer::new(),
            source: None,
            destination: None,
        }
    }

    /// Uses `source` instead of the configured one.
    #[must_use]
    pub fn with_source(mut self, source: Box<dyn DocumentSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Uses `destination` instead of the configured one.
    #[must_use]
    pub fn with_destination(mut self, destination: Arc<dyn Destination>) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Uses `transformer` for the transform stage.
    #[must_use]
    pub fn with_transformer(mut self, transformer: Transformer) -> Self {
        self.transformer = transformer;
        self
    }

    /// Current run state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Run one stage, or every stage for [`Stage::All`].
    ///
    /// # Errors
    ///
    /// Returns the first stage error; the state becomes
    /// [`PipelineState::Failed`]. For [`Stage::All`], a verification
    /// mismatch is returned as [`Error::ReconciliationMismatch`].
    pub async fn run(&mut self, stage: Stage) -> Result<PipelineReport> {
        if self.state != PipelineState::Idle {
            return Err(Error::InvalidTransition(format!(
                "cannot run {} from state {}",
                stage, self.state
            )));
        }

        let start = Instant::now();
        info!("Starting {} run", stage);

        match self.execute(stage).await {
            Ok(mut report) => {
                self.transition(PipelineState::Done)?;
                report.duration_secs = start.elapsed().as_secs_f64();
                info!("{} run complete in {:.2}s", stage, report.duration_secs);
                Ok(report)
            }
            Err(err) => {
                error!("{} run failed in state {}: {}", stage, self.state, err);
                self.state = PipelineState::Failed;
                Err(err)
            }
        }
    }

    async fn execute(&mut self, stage: Stage) -> Result<PipelineReport> {
        self.config.validate_for(stage)?;
        let artifacts = self.config.artifacts.clone();
        let mut report = PipelineReport::default();

        if stage.includes(Stage::Export) {
            self.transition(PipelineState::Exporting)?;
            let source = self.source()?;
            report.export = Some(export_to_file(source, &artifacts.export_file).await?);
        }

        if stage.includes(Stage::Transform) {
            self.transition(PipelineState::Transforming)?;
            info!("[transform] start from {}", artifacts.export_file.display());
            let transformation =
                transform_file_with(&self.transformer, &artifacts.export_file, &artifacts.transformed_file)?;
            info!("[transform] done: {} rows", transformation.dataset.row_count());
            report.transform = Some(transformation.stats);
        }

        if stage.includes(Stage::Import) {
            self.transition(PipelineState::Importing)?;
            let destination = self.destination().await?;
            report.import = Some(import_file(destination.as_ref(), &artifacts.transformed_file).await?);
        }

        if stage.includes(Stage::Verify) {
            self.transition(PipelineState::Verifying)?;
            let destination = self.destination().await?;
            let summary = verify_file(
                destination.as_ref(),
                &artifacts.transformed_file,
                &artifacts.verify_report,
            )
            .await?;

            if stage == Stage::All && !summary.matched {
                return Err(Error::ReconciliationMismatch {
                    mismatches: summary.mismatches(),
                });
            }
            report.verification = Some(summary);
        }

        Ok(report)
    }

    fn transition(&mut self, next: PipelineState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidTransition(format!("{} -> {}", self.state, next)));
        }
        debug!("Pipeline state: {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    fn source(&mut self) -> Result<&dyn DocumentSource> {
        if self.source.is_none() {
            self.source = Some(create_source(&self.config.source)?);
        }
        self.source
            .as_deref()
            .ok_or_else(|| Error::Config("document source unavailable".to_string()))
    }

    async fn destination(&mut self) -> Result<Arc<dyn Destination>> {
        if let Some(destination) = &self.destination {
            return Ok(Arc::clone(destination));
        }
        let destination: Arc<dyn Destination> = Arc::from(create_destination(&self.config).await?);
        self.destination = Some(Arc::clone(&destination));
        Ok(destination)
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
