//! `PostgreSQL` destination.
//!
//! The schema is provisioned out of band; this module only upserts into the
//! existing tables and counts rows.

use async_trait::async_trait;
use indicatif::ProgressBar;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Instant;
use tracing::{debug, info};

use crate::destination::{check_table, Destination, ImportStats};
use crate::error::{Error, Result};
use crate::model::TransformedDataset;

const UPSERT_USER: &str = "
INSERT INTO users (id, email, display_name, created_at, updated_at)
VALUES ($1, $2, $3, $4, $5)
ON CONFLICT (id) DO UPDATE
SET email = EXCLUDED.email,
    display_name = EXCLUDED.display_name,
    updated_at = EXCLUDED.updated_at";

const UPSERT_LINK: &str = "
INSERT INTO links (id, user_id, url, title, is_archived, summary, created_at, updated_at)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
ON CONFLICT (id) DO UPDATE
SET user_id = EXCLUDED.user_id,
    url = EXCLUDED.url,
    title = EXCLUDED.title,
    is_archived = EXCLUDED.is_archived,
    summary = EXCLUDED.summary,
    created_at = EXCLUDED.created_at,
    updated_at = EXCLUDED.updated_at";

const UPSERT_TAG: &str = "
INSERT INTO tags (id, user_id, name, created_at)
VALUES ($1, $2, $3, $4)
ON CONFLICT (user_id, name) DO UPDATE
SET created_at = LEAST(tags.created_at, EXCLUDED.created_at)";

const INSERT_LINK_TAG: &str = "
INSERT INTO link_tags (link_id, tag_id, created_at)
VALUES ($1, $2, $3)
ON CONFLICT (link_id, tag_id) DO NOTHING";

const UPSERT_TIMELINE_ENTRY: &str = "
INSERT INTO timeline_entries (id, link_id, type, content, created_at)
VALUES ($1, $2, $3, $4, $5)
ON CONFLICT (id) DO UPDATE
SET link_id = EXCLUDED.link_id,
    type = EXCLUDED.type,
    content = EXCLUDED.content,
    created_at = EXCLUDED.created_at";

const UPSERT_MAINTENANCE_STATUS: &str = "
INSERT INTO maintenance_status (id, is_maintenance_mode, reason, started_at, started_by, updated_at)
VALUES ($1, $2, $3, $4, $5, NOW())
ON CONFLICT (id) DO UPDATE
SET is_maintenance_mode = EXCLUDED.is_maintenance_mode,
    reason = EXCLUDED.reason,
    started_at = EXCLUDED.started_at,
    started_by = EXCLUDED.started_by,
    updated_at = NOW()";

const UPSERT_DEVELOPER: &str = "
INSERT INTO developers (uid, email, added_at, deleted_at)
VALUES ($1, $2, $3, $4)
ON CONFLICT (uid) DO UPDATE
SET email = EXCLUDED.email,
    added_at = LEAST(developers.added_at, EXCLUDED.added_at),
    deleted_at = EXCLUDED.deleted_at";

const UPSERT_MAINTENANCE_LOG: &str = "
INSERT INTO maintenance_logs (id, action, reason, performed_by, performed_by_uid, timestamp, previous_status)
VALUES ($1, $2, $3, $4, $5, $6, $7)
ON CONFLICT (id) DO UPDATE
SET action = EXCLUDED.action,
    reason = EXCLUDED.reason,
    performed_by = EXCLUDED.performed_by,
    performed_by_uid = EXCLUDED.performed_by_uid,
    timestamp = EXCLUDED.timestamp,
    previous_status = EXCLUDED.previous_status";

const COUNT_ORPHAN_LINK_TAGS: &str = "
SELECT COUNT(*)
FROM link_tags lt
LEFT JOIN links l ON l.id = lt.link_id
LEFT JOIN tags t ON t.id = lt.tag_id
WHERE l.id IS NULL OR t.id IS NULL";

fn count_query(table: &'static str) -> &'static str {
    match table {
        "users" => "SELECT COUNT(*) FROM users",
        "links" => "SELECT COUNT(*) FROM links",
        "tags" => "SELECT COUNT(*) FROM tags",
        "link_tags" => "SELECT COUNT(*) FROM link_tags",
        "timeline_entries" => "SELECT COUNT(*) FROM timeline_entries",
        "maintenance_status" => "SELECT COUNT(*) FROM maintenance_status WHERE id = 'current'",
        "developers" => "SELECT COUNT(*) FROM developers",
        _ => "SELECT COUNT(*) FROM maintenance_logs",
    }
}

/// `PostgreSQL` destination backed by a connection pool.
pub struct PostgresDestination {
    pool: PgPool,
}

impl PostgresDestination {
    /// Connects to the database.
    ///
    /// # Errors
    ///
    /// Returns a destination error if the connection cannot be established.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| Error::Destination(format!("Failed to connect: {}", e)))?;
        debug!("Connected to PostgreSQL (max {} connections)", max_connections);
        Ok(Self { pool })
    }
}

#[async_trait]
impl Destination for PostgresDestination {
    fn destination_type(&self) -> &'static str {
        "postgres"
    }

    async fn apply(&self, dataset: &TransformedDataset, progress: &ProgressBar) -> Result<ImportStats> {
        let start = Instant::now();
        // Dropping the transaction without commit rolls it back.
        let mut tx = self.pool.begin().await?;

        sqlx::query("SET TIME ZONE 'UTC'").execute(&mut *tx).await?;

        for user in &dataset.users {
            sqlx::query(UPSERT_USER)
                .bind(&user.id)
                .bind(&user.email)
                .bind(&user.display_name)
                .bind(user.created_at)
                .bind(user.updated_at)
                .execute(&mut *tx)
                .await?;
            progress.inc(1);
        }

        for link in &dataset.links {
            sqlx::query(UPSERT_LINK)
                .bind(&link.id)
                .bind(&link.user_id)
                .bind(&link.url)
                .bind(&link.title)
                .bind(link.is_archived)
                .bind(&link.summary)
                .bind(link.created_at)
                .bind(link.updated_at)
                .execute(&mut *tx)
                .await?;
            progress.inc(1);
        }

        for tag in &dataset.tags {
            sqlx::query(UPSERT_TAG)
                .bind(&tag.id)
                .bind(&tag.user_id)
                .bind(&tag.name)
                .bind(tag.created_at)
                .execute(&mut *tx)
                .await?;
            progress.inc(1);
        }

        for link_tag in &dataset.link_tags {
            sqlx::query(INSERT_LINK_TAG)
                .bind(&link_tag.link_id)
                .bind(&link_tag.tag_id)
                .bind(link_tag.created_at)
                .execute(&mut *tx)
                .await?;
            progress.inc(1);
        }

        for entry in &dataset.timeline_entries {
            sqlx::query(UPSERT_TIMELINE_ENTRY)
                .bind(&entry.id)
                .bind(&entry.link_id)
                .bind(entry.entry_type.as_str())
                .bind(&entry.content)
                .bind(entry.created_at)
                .execute(&mut *tx)
                .await?;
            progress.inc(1);
        }

        let status = &dataset.maintenance_status;
        sqlx::query(UPSERT_MAINTENANCE_STATUS)
            .bind(&status.id)
            .bind(status.is_maintenance_mode)
            .bind(&status.reason)
            .bind(status.started_at)
            .bind(&status.started_by)
            .execute(&mut *tx)
            .await?;
        progress.inc(1);

        for developer in &dataset.developers {
            sqlx::query(UPSERT_DEVELOPER)
                .bind(&developer.uid)
                .bind(&developer.email)
                .bind(developer.added_at)
                .bind(developer.deleted_at)
                .execute(&mut *tx)
                .await?;
            progress.inc(1);
        }

        for log in &dataset.maintenance_logs {
            sqlx::query(UPSERT_MAINTENANCE_LOG)
                .bind(&log.id)
                .bind(log.action.as_str())
                .bind(&log.reason)
                .bind(&log.performed_by)
                .bind(&log.performed_by_uid)
                .bind(log.timestamp)
                .bind(log.previous_status)
                .execute(&mut *tx)
                .await?;
            progress.inc(1);
        }

        tx.commit().await?;

        let mut stats = ImportStats::for_dataset(dataset);
        stats.duration_secs = start.elapsed().as_secs_f64();
        info!("Committed {} rows", stats.total());
        Ok(stats)
    }

    async fn count_rows(&self, table: &str) -> Result<u64> {
        let table = check_table(table)?;
        let count: i64 = sqlx::query_scalar(count_query(table))
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn count_orphan_link_tags(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(COUNT_ORPHAN_LINK_TAGS)
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}
