//! Import stage: dataset artifact to relational destination.

use std::path::Path;
use tracing::info;

use crate::destination::{Destination, ImportStats};
use crate::error::Result;
use crate::model::TransformedDataset;
use crate::progress::create_progress_bar;
use crate::snapshot;

/// Applies an in-memory dataset to the destination.
///
/// # Errors
///
/// Returns a destination error; nothing is committed in that case.
pub async fn import_dataset(destination: &dyn Destination, dataset: &TransformedDataset) -> Result<ImportStats> {
    let progress = create_progress_bar(dataset.row_count() as u64);
    let result = destination.apply(dataset, &progress).await;
    progress.finish_and_clear();
    result
}

/// Runs the import stage from the dataset artifact.
///
/// # Errors
///
/// Returns an artifact error if the dataset cannot be read, or a
/// destination error if the transaction fails.
pub async fn import_file(destination: &dyn Destination, transformed_path: &Path) -> Result<ImportStats> {
    info!(
        "[import] start ({} destination) from {}",
        destination.destination_type(),
        transformed_path.display()
    );
    let dataset: TransformedDataset = snapshot::read_json(transformed_path)?;

    let stats = import_dataset(destination, &dataset).await?;

    for (table, rows) in &stats.rows {
        info!("  {}: {} rows", table, rows);
    }
    info!(
        "[import] done: {} rows in {:.2}s ({:.0} rows/sec)",
        stats.total(),
        stats.duration_secs,
        stats.throughput()
    );
    Ok(stats)
}
