//! Relational rows produced by the transform and consumed by import/verify.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Fixed id of the maintenance status singleton row.
pub const MAINTENANCE_STATUS_ID: &str = "current";

/// Row of the `users` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRow {
    /// Primary key.
    pub id: String,
    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// Row of the `links` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRow {
    /// Primary key.
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// Target URL, never empty.
    pub url: String,
    /// Title, never empty (falls back to the URL).
    pub title: String,
    /// Archived flag.
    pub is_archived: bool,
    /// Optional summary text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// Row of the `tags` table, unique per `(user_id, lower(trim(name)))`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagRow {
    /// Primary key.
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// Trimmed display name.
    pub name: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Row of the `link_tags` join table, keyed by `(link_id, tag_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkTagRow {
    /// Referenced link.
    pub link_id: String,
    /// Referenced tag.
    pub tag_id: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Kind of a timeline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelineEntryType {
    /// Free-form note.
    Note,
    /// Generated summary.
    Summary,
}

impl TimelineEntryType {
    /// Column value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Summary => "summary",
        }
    }
}

impl fmt::Display for TimelineEntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row of the `timeline_entries` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntryRow {
    /// Primary key, `{link_id}_{array_index}`.
    pub id: String,
    /// Parent link.
    pub link_id: String,
    /// Entry kind.
    #[serde(rename = "type")]
    pub entry_type: TimelineEntryType,
    /// Non-empty trimmed content.
    pub content: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// The `maintenance_status` singleton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceStatusRow {
    /// Always [`MAINTENANCE_STATUS_ID`].
    pub id: String,
    /// Whether maintenance mode is on.
    pub is_maintenance_mode: bool,
    /// Reason given when enabling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// When maintenance started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Who started maintenance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_by: Option<String>,
}

impl Default for MaintenanceStatusRow {
    fn default() -> Self {
        Self {
            id: MAINTENANCE_STATUS_ID.to_string(),
            is_maintenance_mode: false,
            reason: None,
            started_at: None,
            started_by: None,
        }
    }
}

/// Row of the `developers` table (soft-deleted via `deleted_at`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeveloperRow {
    /// Primary key.
    pub uid: String,
    /// Email address, never empty.
    pub email: String,
    /// When the developer was added.
    pub added_at: DateTime<Utc>,
    /// Soft-delete time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Maintenance toggle action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaintenanceAction {
    /// Maintenance mode switched on.
    Enabled,
    /// Maintenance mode switched off.
    Disabled,
}

impl MaintenanceAction {
    /// Column value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
        }
    }
}

impl fmt::Display for MaintenanceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row of the `maintenance_logs` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceLogRow {
    /// Primary key.
    pub id: String,
    /// What happened.
    pub action: MaintenanceAction,
    /// Optional reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Display name of the operator.
    pub performed_by: String,
    /// Uid of the operator.
    pub performed_by_uid: String,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
    /// Maintenance mode before the action.
    pub previous_status: bool,
}

/// Output of the transform stage; the only input of import and verify.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformedDataset {
    /// When the transform ran.
    pub generated_at: DateTime<Utc>,
    /// Users by id ascending.
    pub users: Vec<UserRow>,
    /// Links by `created_at` descending.
    pub links: Vec<LinkRow>,
    /// Tags by `(user_id, name)` ascending.
    pub tags: Vec<TagRow>,
    /// Link tags by `(link_id, tag_id)` ascending.
    pub link_tags: Vec<LinkTagRow>,
    /// Timeline entries by `(link_id, created_at)` ascending.
    pub timeline_entries: Vec<TimelineEntryRow>,
    /// The maintenance singleton.
    pub maintenance_status: MaintenanceStatusRow,
    /// Developers by uid ascending.
    pub developers: Vec<DeveloperRow>,
    /// Maintenance logs by timestamp descending.
    pub maintenance_logs: Vec<MaintenanceLogRow>,
    /// Human-readable count lines.
    #[serde(default)]
    pub report: Vec<String>,
}

impl TransformedDataset {
    /// Creates an empty dataset with the default maintenance status.
    #[must_use]
    pub fn empty(generated_at: DateTime<Utc>) -> Self {
        Self {
            generated_at,
            users: Vec::new(),
            links: Vec::new(),
            tags: Vec::new(),
            link_tags: Vec::new(),
            timeline_entries: Vec::new(),
            maintenance_status: MaintenanceStatusRow::default(),
            developers: Vec::new(),
            maintenance_logs: Vec::new(),
            report: Vec::new(),
        }
    }

    /// Row counts per destination table, as verification expects them.
    #[must_use]
    pub fn expected_counts(&self) -> BTreeMap<String, u64> {
        [
            ("users", self.users.len()),
            ("links", self.links.len()),
            ("tags", self.tags.len()),
            ("link_tags", self.link_tags.len()),
            ("timeline_entries", self.timeline_entries.len()),
            ("developers", self.developers.len()),
            ("maintenance_logs", self.maintenance_logs.len()),
            ("maintenance_status", 1),
        ]
        .into_iter()
        .map(|(table, count)| (table.to_string(), count as u64))
        .collect()
    }

    /// Total number of rows the import writes.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.users.len()
            + self.links.len()
            + self.tags.len()
            + self.link_tags.len()
            + self.timeline_entries.len()
            + 1
            + self.developers.len()
            + self.maintenance_logs.len()
    }
}

/// Key under which verification reports referential-integrity orphans.
pub const ORPHAN_LINK_TAGS: &str = "orphan_link_tags";

/// Result of reconciling a dataset against the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSummary {
    /// Counts taken from the transformed dataset.
    pub expected: BTreeMap<String, u64>,
    /// Counts queried from the destination, plus `orphan_link_tags`.
    pub actual: BTreeMap<String, u64>,
    /// True iff every expected count matches and there are no orphans.
    pub matched: bool,
}

impl VerificationSummary {
    /// Builds a summary and computes the verdict.
    #[must_use]
    pub fn new(expected: BTreeMap<String, u64>, actual: BTreeMap<String, u64>) -> Self {
        let mut summary = Self {
            expected,
            actual,
            matched: false,
        };
        summary.matched = summary.mismatches().is_empty();
        summary
    }

    /// Orphaned `link_tags` rows found in the destination.
    #[must_use]
    pub fn orphan_link_tags(&self) -> u64 {
        self.actual.get(ORPHAN_LINK_TAGS).copied().unwrap_or(0)
    }

    /// Describes every count that disagrees, orphans included.
    #[must_use]
    pub fn mismatches(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .expected
            .iter()
            .filter_map(|(table, expected)| {
                let actual = self.actual.get(table).copied().unwrap_or(0);
                (actual != *expected)
                    .then(|| format!("{table}: expected {expected}, actual {actual}"))
            })
            .collect();
        let orphans = self.orphan_link_tags();
        if orphans > 0 {
            out.push(format!("{ORPHAN_LINK_TAGS}: {orphans}"));
        }
        out
    }
}
