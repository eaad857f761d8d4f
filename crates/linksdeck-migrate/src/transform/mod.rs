//! Transform engine: raw snapshot in, normalized relational dataset out.
//!
//! The transform is a pure function of the snapshot and an injected "now"
//! instant, which is only used as a fallback for missing timestamps. All
//! merge rules are order independent, so the output does not depend on the
//! enumeration order of the document store.

pub mod coerce;
pub mod ids;

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

use crate::error::Result;
use crate::model::{
    DeveloperRow, LinkRow, LinkTagRow, MaintenanceAction, MaintenanceLogRow, MaintenanceStatusRow,
    TagRow, TimelineEntryRow, TimelineEntryType, TransformedDataset, UserRow,
    MAINTENANCE_STATUS_ID,
};
use crate::snapshot::{self, RawDocument, RawSnapshot};

/// Counters collected while transforming.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransformStats {
    /// Tag documents dropped for a blank user id or name.
    pub skipped_tags: u64,
    /// Link documents dropped for a blank user id or URL.
    pub skipped_links: u64,
    /// Developer documents dropped for a blank email.
    pub skipped_developers: u64,
    /// Embedded tag names dropped because they were blank.
    pub skipped_embedded_tags: u64,
    /// Embedded timeline entries dropped for blank content.
    pub skipped_timeline_entries: u64,
    /// Tag documents that collided with another tag of the same key.
    pub duplicate_tags_merged: u64,
}

/// Output of a transform run.
#[derive(Debug, Clone)]
pub struct Transformation {
    /// The dataset to import and verify.
    pub dataset: TransformedDataset,
    /// Skip and merge counters.
    pub stats: TransformStats,
}

/// Converts raw snapshots into relational datasets.
#[derive(Debug, Clone, Default)]
pub struct Transformer {
    clock: Option<DateTime<Utc>>,
}

impl Transformer {
    /// Creates a transformer that uses the current time as the fallback.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transformer with a fixed "now", for reproducible output.
    #[must_use]
    pub fn with_clock(now: DateTime<Utc>) -> Self {
        Self { clock: Some(now) }
    }

    /// Transforms a snapshot.
    #[must_use]
    pub fn transform(&self, snapshot: &RawSnapshot) -> Transformation {
        let now = self.clock.unwrap_or_else(Utc::now);
        let mut state = TransformState::new(now);

        for doc in snapshot.collection("users") {
            state.add_user(doc);
        }
        // Collection tags must be merged before link embeddings are resolved
        // so an explicit tag always owns its key.
        for doc in snapshot.collection("tags") {
            state.add_tag(doc);
        }
        for doc in snapshot.collection("links") {
            state.add_link(doc);
        }
        for doc in snapshot.collection("developers") {
            state.add_developer(doc);
        }
        for doc in snapshot.collection("maintenanceLogs") {
            state.add_maintenance_log(doc);
        }
        if let Some(doc) = &snapshot.singleton {
            state.set_maintenance_status(doc);
        }

        state.finish()
    }
}

/// Runs the transform stage from the export artifact to the dataset artifact.
///
/// # Errors
///
/// Returns an artifact error if the export cannot be read or the dataset
/// cannot be written.
pub fn transform_file(export_path: &Path, transformed_path: &Path) -> Result<Transformation> {
    transform_file_with(&Transformer::new(), export_path, transformed_path)
}

/// Like [`transform_file`] with a caller-supplied transformer.
///
/// # Errors
///
/// Returns an artifact error if the export cannot be read or the dataset
/// cannot be written.
pub fn transform_file_with(
    transformer: &Transformer,
    export_path: &Path,
    transformed_path: &Path,
) -> Result<Transformation> {
    let start = Instant::now();
    let raw: RawSnapshot = snapshot::read_json(export_path)?;
    info!(
        "Read {} documents exported at {} from {}",
        raw.document_count(),
        raw.exported_at,
        export_path.display()
    );

    let transformation = transformer.transform(&raw);
    log_stats(&transformation.stats);

    snapshot::write_json(transformed_path, &transformation.dataset)?;
    info!(
        "Wrote {} rows to {} in {:.2}s",
        transformation.dataset.row_count(),
        transformed_path.display(),
        start.elapsed().as_secs_f64()
    );
    Ok(transformation)
}

fn log_stats(stats: &TransformStats) {
    info!(
        "Skipped documents: {} tags, {} links, {} developers; merged {} duplicate tags",
        stats.skipped_tags, stats.skipped_links, stats.skipped_developers, stats.duplicate_tags_merged
    );
    if stats.skipped_embedded_tags > 0 || stats.skipped_timeline_entries > 0 {
        info!(
            "Skipped embedded values: {} blank tag names, {} empty timeline entries",
            stats.skipped_embedded_tags, stats.skipped_timeline_entries
        );
    }
}

/// Where a tag row came from; decides which candidate owns a key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum TagOrigin {
    /// A document of the `tags` collection: earliest `created_at`, then id.
    Collection { created_at: DateTime<Utc>, id: String },
    /// A name embedded in a link: earliest link, then link id, then position.
    Embedded {
        created_at: DateTime<Utc>,
        link_id: String,
        index: usize,
    },
}

#[derive(Debug)]
struct TagEntry {
    row: TagRow,
    origin: TagOrigin,
}

/// Accumulator for one transform invocation.
struct TransformState {
    now: DateTime<Utc>,
    dataset: TransformedDataset,
    tags: HashMap<(String, String), TagEntry>,
    link_tags: BTreeMap<(String, String), LinkTagRow>,
    stats: TransformStats,
}

impl TransformState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            dataset: TransformedDataset::empty(now),
            tags: HashMap::new(),
            link_tags: BTreeMap::new(),
            stats: TransformStats::default(),
        }
    }

    fn add_user(&mut self, doc: &RawDocument) {
        let created_at = coerce::timestamp(doc.get("createdAt"), self.now);
        self.dataset.users.push(UserRow {
            id: doc.id.clone(),
            email: coerce::optional_string(doc.get("email")),
            display_name: coerce::optional_string(doc.get("displayName")),
            created_at,
            updated_at: coerce::timestamp(doc.get("updatedAt"), created_at),
        });
    }

    fn add_tag(&mut self, doc: &RawDocument) {
        let user_id = coerce::string(doc.get("userId"));
        let raw_name = coerce::string(doc.get("name"));
        let name = ids::sanitize_tag_name(&raw_name);
        if user_id.is_empty() || name.is_empty() {
            debug!("Skipping tag {}: missing userId or name", doc.id);
            self.stats.skipped_tags += 1;
            return;
        }

        let created_at = coerce::timestamp(doc.get("createdAt"), self.now);
        let candidate = TagEntry {
            origin: TagOrigin::Collection {
                created_at,
                id: doc.id.clone(),
            },
            row: TagRow {
                id: doc.id.clone(),
                user_id: user_id.clone(),
                name: name.to_string(),
                created_at,
            },
        };

        let key = ids::tag_key(&user_id, name);
        match self.tags.get_mut(&key) {
            None => {
                self.tags.insert(key, candidate);
            }
            Some(existing) => {
                self.stats.duplicate_tags_merged += 1;
                debug!(
                    "Merging duplicate tag {} into key {}|{}",
                    doc.id, key.0, key.1
                );
                if candidate.origin < existing.origin {
                    *existing = candidate;
                }
            }
        }
    }

    /// Resolves an embedded tag name to a tag id, synthesizing the tag if needed.
    fn resolve_embedded_tag(
        &mut self,
        user_id: &str,
        name: &str,
        link_id: &str,
        index: usize,
        link_created_at: DateTime<Utc>,
    ) -> String {
        let origin = TagOrigin::Embedded {
            created_at: link_created_at,
            link_id: link_id.to_string(),
            index,
        };
        let key = ids::tag_key(user_id, name);
        match self.tags.get_mut(&key) {
            Some(existing) => {
                // Synthesized ids are content-derived, so only the display name
                // and creation time can change hands here.
                if matches!(existing.origin, TagOrigin::Embedded { .. }) && origin < existing.origin {
                    existing.row.name = name.to_string();
                    existing.row.created_at = link_created_at;
                    existing.origin = origin;
                }
                existing.row.id.clone()
            }
            None => {
                let id = ids::deterministic_tag_id(user_id, name);
                self.tags.insert(
                    key,
                    TagEntry {
                        row: TagRow {
                            id: id.clone(),
                            user_id: user_id.to_string(),
                            name: name.to_string(),
                            created_at: link_created_at,
                        },
                        origin,
                    },
                );
                id
            }
        }
    }

    fn add_link(&mut self, doc: &RawDocument) {
        let user_id = coerce::string(doc.get("userId"));
        let url = coerce::string(doc.get("url")).trim().to_string();
        if user_id.is_empty() || url.is_empty() {
            debug!("Skipping link {}: missing userId or url", doc.id);
            self.stats.skipped_links += 1;
            return;
        }
        let title = match coerce::string(doc.get("title")).trim() {
            "" => url.clone(),
            title => title.to_string(),
        };

        let created_at = coerce::timestamp(doc.get("createdAt"), self.now);
        self.dataset.links.push(LinkRow {
            id: doc.id.clone(),
            user_id: user_id.clone(),
            url,
            title,
            is_archived: coerce::boolean(doc.get("isArchived"), false),
            summary: coerce::optional_string(doc.get("summary")),
            created_at,
            updated_at: coerce::timestamp(doc.get("updatedAt"), created_at),
        });

        for (index, value) in coerce::list(doc.get("tags")).iter().enumerate() {
            let raw_name = coerce::string(Some(value));
            let name = ids::sanitize_tag_name(&raw_name);
            if name.is_empty() {
                self.stats.skipped_embedded_tags += 1;
                continue;
            }
            let tag_id = self.resolve_embedded_tag(&user_id, name, &doc.id, index, created_at);
            self.link_tags.insert(
                (doc.id.clone(), tag_id.clone()),
                LinkTagRow {
                    link_id: doc.id.clone(),
                    tag_id,
                    created_at,
                },
            );
        }

        for (index, value) in coerce::list(doc.get("timeline")).iter().enumerate() {
            let entry = Some(value);
            let content = coerce::string(coerce::field(entry, "content")).trim().to_string();
            if content.is_empty() {
                self.stats.skipped_timeline_entries += 1;
                continue;
            }
            let entry_type = match coerce::string(coerce::field(entry, "type")).trim() {
                "summary" => TimelineEntryType::Summary,
                _ => TimelineEntryType::Note,
            };
            self.dataset.timeline_entries.push(TimelineEntryRow {
                id: ids::timeline_entry_id(&doc.id, index),
                link_id: doc.id.clone(),
                entry_type,
                content,
                created_at: coerce::timestamp(coerce::field(entry, "createdAt"), created_at),
            });
        }
    }

    fn add_developer(&mut self, doc: &RawDocument) {
        let email = coerce::string(doc.get("email")).trim().to_string();
        if email.is_empty() {
            debug!("Skipping developer {}: missing email", doc.id);
            self.stats.skipped_developers += 1;
            return;
        }

        // A deletedAt without the deleted flag is kept as-is.
        let mut deleted_at = coerce::optional_timestamp(doc.get("deletedAt"));
        if deleted_at.is_none() && coerce::boolean(doc.get("deleted"), false) {
            deleted_at = Some(self.now);
        }

        self.dataset.developers.push(DeveloperRow {
            uid: doc.id.clone(),
            email,
            added_at: coerce::timestamp(doc.get("addedAt"), self.now),
            deleted_at,
        });
    }

    fn add_maintenance_log(&mut self, doc: &RawDocument) {
        let action = match coerce::string(doc.get("action")).trim() {
            "enabled" => MaintenanceAction::Enabled,
            _ => MaintenanceAction::Disabled,
        };
        self.dataset.maintenance_logs.push(MaintenanceLogRow {
            id: doc.id.clone(),
            action,
            reason: coerce::optional_string(doc.get("reason")),
            performed_by: coerce::string(doc.get("performedBy")).trim().to_string(),
            performed_by_uid: coerce::string(doc.get("performedByUid")).trim().to_string(),
            timestamp: coerce::timestamp(doc.get("timestamp"), self.now),
            previous_status: coerce::boolean(doc.get("previousStatus"), false),
        });
    }

    fn set_maintenance_status(&mut self, doc: &RawDocument) {
        self.dataset.maintenance_status = MaintenanceStatusRow {
            id: MAINTENANCE_STATUS_ID.to_string(),
            is_maintenance_mode: coerce::boolean(doc.get("isMaintenanceMode"), false),
            reason: coerce::optional_string(doc.get("reason")),
            started_at: coerce::optional_timestamp(doc.get("startedAt")),
            started_by: coerce::optional_string(doc.get("startedBy")),
        };
    }

    fn finish(mut self) -> Transformation {
        let dataset = &mut self.dataset;
        dataset.tags = self.tags.into_values().map(|entry| entry.row).collect();
        dataset.link_tags = self.link_tags.into_values().collect();

        dataset.users.sort_by(|a, b| a.id.cmp(&b.id));
        dataset
            .links
            .sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        dataset.tags.sort_by(|a, b| {
            (&a.user_id, &a.name, &a.id).cmp(&(&b.user_id, &b.name, &b.id))
        });
        dataset.timeline_entries.sort_by(|a, b| {
            (&a.link_id, a.created_at, &a.id).cmp(&(&b.link_id, b.created_at, &b.id))
        });
        dataset.developers.sort_by(|a, b| a.uid.cmp(&b.uid));
        dataset
            .maintenance_logs
            .sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));

        dataset.report = build_report(dataset, self.stats.duplicate_tags_merged);
        Transformation {
            dataset: self.dataset,
            stats: self.stats,
        }
    }
}

/// Count lines appended to the dataset, in a fixed order.
fn build_report(dataset: &TransformedDataset, duplicate_tags_merged: u64) -> Vec<String> {
    vec![
        format!("users: {}", dataset.users.len()),
        format!("links: {}", dataset.links.len()),
        format!("tags: {}", dataset.tags.len()),
        format!("link_tags: {}", dataset.link_tags.len()),
        format!("timeline_entries: {}", dataset.timeline_entries.len()),
        format!("developers: {}", dataset.developers.len()),
        format!("maintenance_logs: {}", dataset.maintenance_logs.len()),
        format!("duplicate_tags_merged: {duplicate_tags_merged}"),
    ]
}

#[cfg(test)]
#[path = "transform_tests.rs"]
mod tests;
