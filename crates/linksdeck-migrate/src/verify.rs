//! Verify stage: reconcile the dataset against the destination.
//!
//! Verification only reports. A mismatch is a `matched: false` summary,
//! never an error; the `all` run decides what to do with it.

use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

use crate::destination::{Destination, TABLES};
use crate::error::Result;
use crate::model::{TransformedDataset, VerificationSummary, ORPHAN_LINK_TAGS};
use crate::snapshot;

/// Compares expected row counts with the destination.
///
/// # Errors
///
/// Returns a destination error if a count query fails.
pub async fn verify_dataset(destination: &dyn Destination, dataset: &TransformedDataset) -> Result<VerificationSummary> {
    let expected = dataset.expected_counts();

    let mut actual = BTreeMap::new();
    for table in TABLES {
        actual.insert(table.to_string(), destination.count_rows(table).await?);
    }
    actual.insert(
        ORPHAN_LINK_TAGS.to_string(),
        destination.count_orphan_link_tags().await?,
    );

    Ok(VerificationSummary::new(expected, actual))
}

/// Runs the verify stage from the dataset artifact.
///
/// The summary is also written to `report_path` unless it is empty.
///
/// # Errors
///
/// Returns an artifact error or a destination error.
pub async fn verify_file(
    destination: &dyn Destination,
    transformed_path: &Path,
    report_path: &Path,
) -> Result<VerificationSummary> {
    info!("[verify] start against {}", destination.destination_type());
    let dataset: TransformedDataset = snapshot::read_json(transformed_path)?;

    let summary = verify_dataset(destination, &dataset).await?;

    if report_path.as_os_str().is_empty() {
        info!("Verification report disabled");
    } else {
        snapshot::write_json(report_path, &summary)?;
        info!("Wrote verification report to {}", report_path.display());
    }

    if summary.matched {
        info!("[verify] done: all counts match");
    } else {
        for mismatch in summary.mismatches() {
            warn!("  {}", mismatch);
        }
        warn!("[verify] done: counts do not match");
    }
    Ok(summary)
}
