//! Raw export snapshot and the file store shared by every stage.
//!
//! Artifacts are pretty-printed JSON. Writes go to a temporary file in the
//! destination directory and are renamed into place only once fully
//! flushed, so a reader never sees a half-written artifact.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Collections captured by an export, in export order.
pub const EXPORTED_COLLECTIONS: [&str; 5] =
    ["users", "links", "tags", "developers", "maintenanceLogs"];

/// Collection holding the maintenance singleton.
pub const MAINTENANCE_COLLECTION: &str = "maintenance";

/// Document id of the maintenance singleton.
pub const MAINTENANCE_DOCUMENT: &str = "current";

/// One document read from the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDocument {
    /// Document id within its collection.
    pub id: String,
    /// Untyped field mapping.
    #[serde(rename = "data", default)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl RawDocument {
    /// Creates a document from an id and its fields.
    pub fn new(id: impl Into<String>, fields: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Returns a field, if present.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.fields.get(field)
    }
}

/// Root artifact of the export stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSnapshot {
    /// When the export ran.
    pub exported_at: DateTime<Utc>,
    /// Documents per collection.
    #[serde(default)]
    pub collections: BTreeMap<String, Vec<RawDocument>>,
    /// The `maintenance/current` document, when it exists.
    #[serde(
        rename = "maintenanceCurrent",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub singleton: Option<RawDocument>,
}

impl RawSnapshot {
    /// Creates an empty snapshot stamped with `exported_at`.
    #[must_use]
    pub fn new(exported_at: DateTime<Utc>) -> Self {
        Self {
            exported_at,
            collections: BTreeMap::new(),
            singleton: None,
        }
    }

    /// Documents of a collection; an unknown collection is empty.
    #[must_use]
    pub fn collection(&self, name: &str) -> &[RawDocument] {
        self.collections.get(name).map_or(&[], Vec::as_slice)
    }

    /// Total number of documents across collections, singleton included.
    #[must_use]
    pub fn document_count(&self) -> usize {
        self.collections.values().map(Vec::len).sum::<usize>() + usize::from(self.singleton.is_some())
    }
}

/// Serializes `value` as pretty JSON and atomically replaces `path`.
///
/// Missing parent directories are created. If anything fails before the
/// rename, the temporary file is removed and `path` is left untouched.
///
/// # Errors
///
/// Returns [`Error::Artifact`] if the file cannot be written.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| Error::artifact(path, e))?;

    let temp = NamedTempFile::new_in(parent).map_err(|e| Error::artifact(path, e))?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        serde_json::to_writer_pretty(&mut writer, value).map_err(|e| Error::artifact(path, e))?;
        writer.write_all(b"\n").map_err(|e| Error::artifact(path, e))?;
        writer.flush().map_err(|e| Error::artifact(path, e))?;
    }
    temp.as_file()
        .sync_all()
        .map_err(|e| Error::artifact(path, e))?;
    temp.persist(path).map_err(|e| Error::artifact(path, e.error))?;
    Ok(())
}

/// Reads and deserializes a JSON artifact.
///
/// # Errors
///
/// Returns [`Error::Artifact`] if the file is missing or malformed.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| Error::artifact(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| Error::artifact(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn sample_snapshot() -> RawSnapshot {
        let mut snapshot = RawSnapshot::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        snapshot.collections.insert(
            "links".to_string(),
            vec![RawDocument::new(
                "l1",
                BTreeMap::from([
                    ("url".to_string(), serde_json::json!("http://x")),
                    ("tags".to_string(), serde_json::json!(["A", "a "])),
                ]),
            )],
        );
        snapshot
    }

    #[test]
    fn test_snapshot_uses_legacy_field_names() {
        let json = serde_json::to_value(sample_snapshot()).unwrap();
        assert_eq!(json["exportedAt"], "2024-05-01T12:00:00Z");
        assert_eq!(json["collections"]["links"][0]["id"], "l1");
        assert_eq!(json["collections"]["links"][0]["data"]["url"], "http://x");
        assert!(json.get("maintenanceCurrent").is_none());
    }

    #[test]
    fn test_unknown_collection_is_empty() {
        let snapshot = sample_snapshot();
        assert!(snapshot.collection("developers").is_empty());
        assert_eq!(snapshot.collection("links").len(), 1);
        assert_eq!(snapshot.document_count(), 1);
    }

    #[test]
    fn test_write_creates_parent_and_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("export.json");

        write_json(&path, &sample_snapshot()).unwrap();
        let loaded: RawSnapshot = read_json(&path).unwrap();
        assert_eq!(loaded, sample_snapshot());

        let entries: Vec<_> = fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_write_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("export.json");
        fs::write(&path, "stale").unwrap();

        write_json(&path, &sample_snapshot()).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"exportedAt\""));
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn test_read_missing_file_is_artifact_error() {
        let dir = TempDir::new().unwrap();
        let result: Result<RawSnapshot> = read_json(&dir.path().join("missing.json"));
        assert!(matches!(result, Err(Error::Artifact { .. })));
    }

    #[test]
    fn test_read_malformed_file_is_artifact_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        let result: Result<RawSnapshot> = read_json(&path);
        assert!(matches!(result, Err(Error::Artifact { .. })));
    }

    #[test]
    fn test_document_without_data_deserializes() {
        let doc: RawDocument = serde_json::from_str(r#"{"id":"u1"}"#).unwrap();
        assert_eq!(doc.id, "u1");
        assert!(doc.fields.is_empty());
    }
}
