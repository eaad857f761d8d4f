//! In-memory destination used for dry runs and tests.
//!
//! Mirrors the relational schema closely enough to exercise the import
//! semantics: the same conflict keys, the `LEAST` merges, and the foreign
//! keys of `link_tags` and `timeline_entries`. An import works on a copy of
//! the tables and swaps it in only when every row was accepted.

use async_trait::async_trait;
use indicatif::ProgressBar;
use std::collections::BTreeMap;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::destination::{check_table, Destination, ImportStats};
use crate::error::{Error, Result};
use crate::model::{
    DeveloperRow, LinkRow, LinkTagRow, MaintenanceLogRow, MaintenanceStatusRow, TagRow,
    TimelineEntryRow, TransformedDataset, UserRow, MAINTENANCE_STATUS_ID,
};

#[derive(Debug, Clone, Default)]
struct Tables {
    users: BTreeMap<String, UserRow>,
    links: BTreeMap<String, LinkRow>,
    tags: BTreeMap<String, TagRow>,
    /// `(user_id, name)` to stored tag id, the conflict key of `tags`.
    tag_names: BTreeMap<(String, String), String>,
    link_tags: BTreeMap<(String, String), LinkTagRow>,
    timeline_entries: BTreeMap<String, TimelineEntryRow>,
    maintenance_status: BTreeMap<String, MaintenanceStatusRow>,
    developers: BTreeMap<String, DeveloperRow>,
    maintenance_logs: BTreeMap<String, MaintenanceLogRow>,
}

impl Tables {
    fn upsert_user(&mut self, row: &UserRow) {
        match self.users.get_mut(&row.id) {
            Some(existing) => {
                existing.email.clone_from(&row.email);
                existing.display_name.clone_from(&row.display_name);
                existing.updated_at = row.updated_at;
            }
            None => {
                self.users.insert(row.id.clone(), row.clone());
            }
        }
    }

    fn upsert_link(&mut self, row: &LinkRow) {
        self.links.insert(row.id.clone(), row.clone());
    }

    /// Conflict key is `(user_id, name)`; the stored id survives.
    fn upsert_tag(&mut self, row: &TagRow) -> Result<()> {
        let key = (row.user_id.clone(), row.name.clone());
        if let Some(existing) = self.tag_names.get(&key).and_then(|id| self.tags.get_mut(id)) {
            existing.created_at = existing.created_at.min(row.created_at);
            return Ok(());
        }
        if self.tags.contains_key(&row.id) {
            return Err(Error::Constraint {
                table: "tags",
                message: format!("duplicate key value violates primary key: id={}", row.id),
            });
        }
        self.tag_names.insert(key, row.id.clone());
        self.tags.insert(row.id.clone(), row.clone());
        Ok(())
    }

    fn insert_link_tag(&mut self, row: &LinkTagRow) -> Result<()> {
        if !self.links.contains_key(&row.link_id) {
            return Err(Error::Constraint {
                table: "link_tags",
                message: format!("link_id={} is not present in links", row.link_id),
            });
        }
        if !self.tags.contains_key(&row.tag_id) {
            return Err(Error::Constraint {
                table: "link_tags",
                message: format!("tag_id={} is not present in tags", row.tag_id),
            });
        }
        self.link_tags
            .entry((row.link_id.clone(), row.tag_id.clone()))
            .or_insert_with(|| row.clone());
        Ok(())
    }

    fn upsert_timeline_entry(&mut self, row: &TimelineEntryRow) -> Result<()> {
        if !self.links.contains_key(&row.link_id) {
            return Err(Error::Constraint {
                table: "timeline_entries",
                message: format!("link_id={} is not present in links", row.link_id),
            });
        }
        self.timeline_entries.insert(row.id.clone(), row.clone());
        Ok(())
    }

    fn upsert_maintenance_status(&mut self, row: &MaintenanceStatusRow) {
        self.maintenance_status.insert(row.id.clone(), row.clone());
    }

    fn upsert_developer(&mut self, row: &DeveloperRow) {
        match self.developers.get_mut(&row.uid) {
            Some(existing) => {
                existing.email.clone_from(&row.email);
                existing.added_at = existing.added_at.min(row.added_at);
                existing.deleted_at = row.deleted_at;
            }
            None => {
                self.developers.insert(row.uid.clone(), row.clone());
            }
        }
    }

    fn upsert_maintenance_log(&mut self, row: &MaintenanceLogRow) {
        self.maintenance_logs.insert(row.id.clone(), row.clone());
    }

    fn apply(&mut self, dataset: &TransformedDataset, progress: &ProgressBar) -> Result<()> {
        for row in &dataset.users {
            self.upsert_user(row);
            progress.inc(1);
        }
        for row in &dataset.links {
            self.upsert_link(row);
            progress.inc(1);
        }
        for row in &dataset.tags {
            self.upsert_tag(row)?;
            progress.inc(1);
        }
        for row in &dataset.link_tags {
            self.insert_link_tag(row)?;
            progress.inc(1);
        }
        for row in &dataset.timeline_entries {
            self.upsert_timeline_entry(row)?;
            progress.inc(1);
        }
        self.upsert_maintenance_status(&dataset.maintenance_status);
        progress.inc(1);
        for row in &dataset.developers {
            self.upsert_developer(row);
            progress.inc(1);
        }
        for row in &dataset.maintenance_logs {
            self.upsert_maintenance_log(row);
            progress.inc(1);
        }
        Ok(())
    }

    fn count(&self, table: &str) -> u64 {
        let n = match table {
            "users" => self.users.len(),
            "links" => self.links.len(),
            "tags" => self.tags.len(),
            "link_tags" => self.link_tags.len(),
            "timeline_entries" => self.timeline_entries.len(),
            "maintenance_status" => usize::from(self.maintenance_status.contains_key(MAINTENANCE_STATUS_ID)),
            "developers" => self.developers.len(),
            "maintenance_logs" => self.maintenance_logs.len(),
            _ => 0,
        };
        n as u64
    }

    fn orphan_link_tags(&self) -> u64 {
        self.link_tags
            .values()
            .filter(|lt| !self.links.contains_key(&lt.link_id) || !self.tags.contains_key(&lt.tag_id))
            .count() as u64
    }
}

/// Destination that keeps the tables in process memory.
#[derive(Debug, Default)]
pub struct MemoryDestination {
    tables: RwLock<Tables>,
}

impl MemoryDestination {
    /// Creates an empty destination.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Destination for MemoryDestination {
    fn destination_type(&self) -> &'static str {
        "memory"
    }

    async fn apply(&self, dataset: &TransformedDataset, progress: &ProgressBar) -> Result<ImportStats> {
        let start = Instant::now();
        let mut tables = self.tables.write().await;

        let mut staged = tables.clone();
        staged.apply(dataset, progress)?;
        *tables = staged;

        let mut stats = ImportStats::for_dataset(dataset);
        stats.duration_secs = start.elapsed().as_secs_f64();
        Ok(stats)
    }

    async fn count_rows(&self, table: &str) -> Result<u64> {
        let table = check_table(table)?;
        Ok(self.tables.read().await.count(table))
    }

    async fn count_orphan_link_tags(&self) -> Result<u64> {
        Ok(self.tables.read().await.orphan_link_tags())
    }
}
