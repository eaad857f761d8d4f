//! Document source connectors.
//!
//! A source hands out documents as an id plus an untyped field mapping.
//! Enumeration order is whatever the store returns; nothing downstream
//! relies on it.

pub mod common;
pub mod firestore;
pub mod json_dump;

use async_trait::async_trait;

use crate::config::SourceConfig;
use crate::error::Result;
use crate::snapshot::RawDocument;

/// Trait for hierarchical document stores.
///
/// Implement this trait to export from a new kind of document store.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Get the source type name.
    fn source_type(&self) -> &'static str;

    /// Lists every document of a collection.
    ///
    /// A missing collection is empty, not an error.
    async fn list(&self, collection: &str) -> Result<Vec<RawDocument>>;

    /// Fetches one document; `None` when it does not exist.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<RawDocument>>;
}

/// Create a document source from configuration.
pub fn create_source(config: &SourceConfig) -> Result<Box<dyn DocumentSource>> {
    match config {
        SourceConfig::Firestore(cfg) => Ok(Box::new(firestore::FirestoreSource::new(cfg.clone())?)),
        SourceConfig::JsonDump(cfg) => Ok(Box::new(json_dump::JsonDumpSource::open(cfg)?)),
    }
}
