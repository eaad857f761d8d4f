//! LinksDeck Migration CLI
//!
//! Moves LinksDeck data from Firestore into PostgreSQL in four
//! file-mediated stages.
//! Pedantic lints relaxed for CLI ergonomics.

// CLI tool - relax pedantic lints for ergonomics
#![allow(clippy::pedantic)]

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use linksdeck_migrate::config::EXAMPLE_CONFIG;
use linksdeck_migrate::{Error, MigrationConfig, Pipeline, PipelineReport, Stage};

#[derive(Parser)]
#[command(name = "linksdeck-migrate")]
#[command(version)]
#[command(about = "Migrate LinksDeck data from Firestore to PostgreSQL", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Firebase project id
    #[arg(long, env = "FIREBASE_PROJECT_ID", global = true)]
    project_id: Option<String>,

    /// OAuth2 access token for the Firestore REST API
    #[arg(long, env = "FIRESTORE_ACCESS_TOKEN", global = true, hide_env_values = true)]
    access_token: Option<String>,

    /// Firestore emulator host:port
    #[arg(long, env = "FIRESTORE_EMULATOR_HOST", global = true)]
    emulator_host: Option<String>,

    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,

    /// Raw snapshot path
    #[arg(long, value_name = "FILE", global = true)]
    export_file: Option<PathBuf>,

    /// Transformed dataset path
    #[arg(long, value_name = "FILE", global = true)]
    transformed_file: Option<PathBuf>,

    /// Verification report path (empty to disable)
    #[arg(long, value_name = "FILE", global = true)]
    verify_report: Option<String>,

    /// Dry run mode (import into memory instead of the database)
    #[arg(long, global = true)]
    dry_run: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Read Firestore into the raw snapshot
    Export,
    /// Build the relational dataset from the snapshot
    Transform,
    /// Upsert the dataset into the database
    Import,
    /// Compare the dataset with the database
    Verify,
    /// Run every stage and fail on any mismatch
    All,
    /// Validate configuration
    Validate,
    /// Generate example configuration
    Init {
        /// Output file path
        #[arg(short, long, default_value = "migration.yaml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let stage = match &cli.command {
        Commands::Export => Stage::Export,
        Commands::Transform => Stage::Transform,
        Commands::Import => Stage::Import,
        Commands::Verify => Stage::Verify,
        Commands::All => Stage::All,
        Commands::Validate => return validate_config(&cli),
        Commands::Init { output } => return generate_config(output),
    };

    let config = load_config(&cli)?;
    run_stage(config, stage).await
}

/// Loads the configuration file, if any, and applies CLI overrides.
fn load_config(cli: &Cli) -> anyhow::Result<MigrationConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            MigrationConfig::from_file(path)?
        }
        None => MigrationConfig::default(),
    };

    let source_overrides = cli.project_id.is_some() || cli.access_token.is_some() || cli.emulator_host.is_some();
    match config.firestore_mut() {
        Some(firestore) => {
            if let Some(project_id) = &cli.project_id {
                firestore.project_id.clone_from(project_id);
            }
            if let Some(token) = &cli.access_token {
                firestore.access_token = Some(token.clone());
            }
            if let Some(host) = &cli.emulator_host {
                firestore.emulator_host = Some(host.clone());
            }
        }
        None if source_overrides => {
            warn!("Firestore flags ignored: the configured source is not Firestore");
        }
        None => {}
    }

    if let Some(url) = &cli.database_url {
        config.destination.database_url = Some(url.clone());
    }
    if let Some(path) = &cli.export_file {
        config.artifacts.export_file.clone_from(path);
    }
    if let Some(path) = &cli.transformed_file {
        config.artifacts.transformed_file.clone_from(path);
    }
    if let Some(path) = &cli.verify_report {
        config.artifacts.verify_report = PathBuf::from(path);
    }
    if cli.dry_run {
        config.options.dry_run = true;
    }

    Ok(config)
}

async fn run_stage(config: MigrationConfig, stage: Stage) -> anyhow::Result<()> {
    if config.options.dry_run {
        info!("Dry run mode - importing into memory, the database is not touched");
        if stage == Stage::Verify {
            warn!("Verifying a dry run on its own compares against an empty destination");
        }
    }

    let mut pipeline = Pipeline::new(config);

    // Dropping the run future rolls back an open transaction and removes
    // any temporary artifact file.
    let result = tokio::select! {
        result = pipeline.run(stage) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, abandoning {} run", stage);
            Err(Error::Cancelled)
        }
    };

    let report = result?;
    print_report(stage, &report);
    Ok(())
}

fn print_report(stage: Stage, report: &PipelineReport) {
    println!("\n✅ {} complete in {:.2}s", stage, report.duration_secs);

    if let Some(export) = &report.export {
        println!("   Exported:  {} documents", export.total());
    }
    if let Some(transform) = &report.transform {
        println!(
            "   Skipped:   {} links, {} tags, {} developers",
            transform.skipped_links, transform.skipped_tags, transform.skipped_developers
        );
        println!("   Merged:    {} duplicate tags", transform.duplicate_tags_merged);
    }
    if let Some(import) = &report.import {
        println!("   Imported:  {} rows ({:.0} rows/sec)", import.total(), import.throughput());
    }
    if let Some(summary) = &report.verification {
        if summary.matched {
            println!("   Verified:  all counts match");
        } else {
            println!("   Verified:  MISMATCH");
            for mismatch in summary.mismatches() {
                println!("     - {}", mismatch);
            }
        }
    }
}

fn validate_config(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    config.validate_for(Stage::All)?;

    println!("✅ Configuration is valid!");
    match &config.source {
        linksdeck_migrate::SourceConfig::Firestore(cfg) => {
            println!("   Source:      firestore (project {})", cfg.project_id);
        }
        linksdeck_migrate::SourceConfig::JsonDump(cfg) => {
            println!("   Source:      json dump {:?}", cfg.path);
        }
    }
    println!(
        "   Destination: {}",
        if config.options.dry_run { "memory (dry run)" } else { "postgres" }
    );
    println!("   Export:      {:?}", config.artifacts.export_file);
    println!("   Transformed: {:?}", config.artifacts.transformed_file);
    println!("   Report:      {:?}", config.artifacts.verify_report);

    Ok(())
}

fn generate_config(output: &Path) -> anyhow::Result<()> {
    std::fs::write(output, EXAMPLE_CONFIG)?;
    println!("✅ Generated configuration: {:?}", output);
    println!("   Edit the file and run: linksdeck-migrate all --config {:?}", output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_verify_report_disables_report() {
        let cli = Cli::try_parse_from(["linksdeck-migrate", "verify", "--verify-report", ""]).unwrap();
        let config = load_config(&cli).unwrap();
        assert!(config.artifacts.verify_report.as_os_str().is_empty());
    }

    #[test]
    fn test_path_overrides() {
        let cli = Cli::try_parse_from([
            "linksdeck-migrate",
            "all",
            "--dry-run",
            "--verify-report",
            "out/report.json",
            "--export-file",
            "out/export.json",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert!(config.options.dry_run);
        assert_eq!(config.artifacts.verify_report, PathBuf::from("out/report.json"));
        assert_eq!(config.artifacts.export_file, PathBuf::from("out/export.json"));
    }
}
