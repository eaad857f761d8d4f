//! Local JSON dump connector.
//!
//! Reads a document store dump shaped as
//! `{"<collection>": {"<id>": {<fields>}}}` so an export can be replayed
//! without network access.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use crate::connectors::DocumentSource;
use crate::error::{Error, Result};
use crate::snapshot::RawDocument;

/// Configuration for a JSON dump source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonDumpConfig {
    /// Path to the dump file.
    pub path: PathBuf,
}

/// Document source backed by a JSON dump file.
pub struct JsonDumpSource {
    collections: BTreeMap<String, BTreeMap<String, Map<String, Value>>>,
}

impl JsonDumpSource {
    /// Opens and parses the dump file.
    ///
    /// # Errors
    ///
    /// Returns an artifact error if the file cannot be read or is not a
    /// collection-to-documents mapping.
    pub fn open(config: &JsonDumpConfig) -> Result<Self> {
        let file = File::open(&config.path).map_err(|e| Error::artifact(&config.path, e))?;
        let root: Value = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::artifact(&config.path, e))?;

        let Value::Object(root) = root else {
            return Err(Error::artifact(
                &config.path,
                "root must be an object keyed by collection name",
            ));
        };

        let mut collections = BTreeMap::new();
        for (name, documents) in root {
            let Value::Object(documents) = documents else {
                return Err(Error::artifact(
                    &config.path,
                    format!("collection '{}' must be an object keyed by document id", name),
                ));
            };
            let documents = documents
                .into_iter()
                .map(|(id, fields)| match fields {
                    Value::Object(fields) => (id, fields),
                    // Non-object documents carry no fields.
                    _ => (id, Map::new()),
                })
                .collect();
            collections.insert(name, documents);
        }

        Ok(Self { collections })
    }

    fn to_raw(id: &str, fields: &Map<String, Value>) -> RawDocument {
        RawDocument::new(
            id,
            fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

#[async_trait]
impl DocumentSource for JsonDumpSource {
    fn source_type(&self) -> &'static str {
        "json_dump"
    }

    async fn list(&self, collection: &str) -> Result<Vec<RawDocument>> {
        Ok(self
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Self::to_raw(id, fields))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<RawDocument>> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Self::to_raw(id, fields)))
    }
}
