//! Relational destinations.
//!
//! A destination applies a whole [`TransformedDataset`] as one atomic unit
//! of upserts and answers the row-count queries verification needs.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use indicatif::ProgressBar;
use std::collections::BTreeMap;

use crate::config::MigrationConfig;
use crate::error::{Error, Result};
use crate::model::TransformedDataset;

pub use memory::MemoryDestination;
#[cfg(feature = "postgres")]
pub use postgres::PostgresDestination;

/// Destination tables in the order the import writes them.
pub const TABLES: [&str; 8] = [
    "users",
    "links",
    "tags",
    "link_tags",
    "timeline_entries",
    "maintenance_status",
    "developers",
    "maintenance_logs",
];

/// Import statistics.
#[derive(Debug, Default, Clone)]
pub struct ImportStats {
    /// Upsert statements executed per table.
    pub rows: BTreeMap<String, u64>,
    /// Duration in seconds.
    pub duration_secs: f64,
}

impl ImportStats {
    /// Per-table statement counts for a dataset.
    #[must_use]
    pub fn for_dataset(dataset: &TransformedDataset) -> Self {
        let rows = [
            ("users", dataset.users.len()),
            ("links", dataset.links.len()),
            ("tags", dataset.tags.len()),
            ("link_tags", dataset.link_tags.len()),
            ("timeline_entries", dataset.timeline_entries.len()),
            ("maintenance_status", 1),
            ("developers", dataset.developers.len()),
            ("maintenance_logs", dataset.maintenance_logs.len()),
        ]
        .into_iter()
        .map(|(table, n)| (table.to_string(), n as u64))
        .collect();

        Self {
            rows,
            duration_secs: 0.0,
        }
    }

    /// Total rows written.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.rows.values().sum()
    }

    /// Calculate throughput (rows per second).
    #[must_use]
    pub fn throughput(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.total() as f64 / self.duration_secs
        } else {
            0.0
        }
    }
}

/// Trait for relational destinations.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Get the destination type name.
    fn destination_type(&self) -> &'static str;

    /// Applies the dataset in one transaction.
    ///
    /// Either every row lands or none does. `progress` is advanced once per
    /// row written.
    async fn apply(&self, dataset: &TransformedDataset, progress: &ProgressBar) -> Result<ImportStats>;

    /// Counts the rows of one of [`TABLES`]; `maintenance_status` counts only
    /// the `current` row.
    async fn count_rows(&self, table: &str) -> Result<u64>;

    /// Counts `link_tags` rows whose link or tag is missing.
    async fn count_orphan_link_tags(&self) -> Result<u64>;
}

/// Rejects table names outside [`TABLES`].
pub(crate) fn check_table(table: &str) -> Result<&'static str> {
    TABLES
        .iter()
        .copied()
        .find(|t| *t == table)
        .ok_or_else(|| Error::Destination(format!("unknown table '{}'", table)))
}

/// Create a destination from configuration.
///
/// Dry runs get a fresh in-memory destination.
///
/// # Errors
///
/// Returns an error if no database URL is configured or the connection
/// cannot be established.
pub async fn create_destination(config: &MigrationConfig) -> Result<Box<dyn Destination>> {
    if config.options.dry_run {
        return Ok(Box::new(MemoryDestination::new()));
    }

    let url = config
        .destination
        .database_url
        .as_deref()
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| Error::Config("database url is required".to_string()))?;

    connect(url, config.destination.max_connections).await
}

#[cfg(feature = "postgres")]
async fn connect(url: &str, max_connections: u32) -> Result<Box<dyn Destination>> {
    Ok(Box::new(PostgresDestination::connect(url, max_connections).await?))
}

#[cfg(not(feature = "postgres"))]
async fn connect(_url: &str, _max_connections: u32) -> Result<Box<dyn Destination>> {
    Err(Error::Config(
        "built without the `postgres` feature; use --dry-run".to_string(),
    ))
}
