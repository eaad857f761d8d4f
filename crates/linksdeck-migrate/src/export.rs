//! Export stage: document store to raw snapshot artifact.

use chrono::Utc;
use futures::future::try_join_all;
use indicatif::ProgressBar;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

use crate::connectors::DocumentSource;
use crate::error::Result;
use crate::progress::create_progress_bar;
use crate::snapshot::{self, RawSnapshot, EXPORTED_COLLECTIONS, MAINTENANCE_COLLECTION, MAINTENANCE_DOCUMENT};

/// Export statistics.
#[derive(Debug, Default, Clone)]
pub struct ExportStats {
    /// Documents fetched per collection.
    pub documents: BTreeMap<String, u64>,
    /// Whether the maintenance singleton existed.
    pub singleton_found: bool,
    /// Duration in seconds.
    pub duration_secs: f64,
}

impl ExportStats {
    /// Total documents fetched, singleton included.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.documents.values().sum::<u64>() + u64::from(self.singleton_found)
    }
}

/// Reads every exported collection and the maintenance singleton.
///
/// Collections are fetched concurrently; the first failure aborts the
/// whole export.
///
/// # Errors
///
/// Returns the source access error of the first failing read.
pub async fn export_snapshot(source: &dyn DocumentSource, progress: &ProgressBar) -> Result<RawSnapshot> {
    let exported_at = Utc::now();

    let fetches = EXPORTED_COLLECTIONS.iter().map(|name| async move {
        let documents = source.list(name).await?;
        debug!("Exported {} documents from {}", documents.len(), name);
        progress.inc(1);
        Ok::<_, crate::error::Error>(((*name).to_string(), documents))
    });
    let collections = try_join_all(fetches).await?;

    let singleton = source.get(MAINTENANCE_COLLECTION, MAINTENANCE_DOCUMENT).await?;
    progress.inc(1);
    if singleton.is_none() {
        debug!("{}/{} not found", MAINTENANCE_COLLECTION, MAINTENANCE_DOCUMENT);
    }

    let mut snapshot = RawSnapshot::new(exported_at);
    snapshot.collections = collections.into_iter().collect();
    snapshot.singleton = singleton;
    Ok(snapshot)
}

/// Runs the export stage and writes the snapshot to `export_path`.
///
/// Nothing is written when any read fails.
///
/// # Errors
///
/// Returns a source access error or an artifact error.
pub async fn export_to_file(source: &dyn DocumentSource, export_path: &Path) -> Result<ExportStats> {
    let start = Instant::now();
    info!("[export] start ({} source)", source.source_type());

    let progress = create_progress_bar(EXPORTED_COLLECTIONS.len() as u64 + 1);
    let result = export_snapshot(source, &progress).await;
    progress.finish_and_clear();
    let snapshot = result?;

    snapshot::write_json(export_path, &snapshot)?;

    let stats = ExportStats {
        documents: snapshot
            .collections
            .iter()
            .map(|(name, docs)| (name.clone(), docs.len() as u64))
            .collect(),
        singleton_found: snapshot.singleton.is_some(),
        duration_secs: start.elapsed().as_secs_f64(),
    };

    info!(
        "[export] done: {} documents to {} in {:.2}s",
        stats.total(),
        export_path.display(),
        stats.duration_secs
    );
    Ok(stats)
}
