//! Error types for the migration pipeline.
//!
//! Every stage fails loudly with one of these variants. Malformed source
//! documents are not errors: the transform drops them and counts the skip.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a migration stage.
///
/// Error codes follow the pattern `MIGRATE-XXX`.
#[derive(Error, Debug)]
pub enum Error {
    /// The document store could not be reached (MIGRATE-001).
    #[error("[MIGRATE-001] Source connection error: {0}")]
    SourceConnection(String),

    /// The document store rejected the credentials (MIGRATE-002).
    #[error("[MIGRATE-002] Authentication failed: {0}")]
    Authentication(String),

    /// The document store throttled the export (MIGRATE-003).
    #[error("[MIGRATE-003] Rate limited, retry after {0}s")]
    RateLimit(u64),

    /// An intermediate artifact could not be read, parsed or written (MIGRATE-004).
    #[error("[MIGRATE-004] Artifact error at {}: {message}", path.display())]
    Artifact {
        /// Path of the artifact.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// IO error (MIGRATE-005).
    #[error("[MIGRATE-005] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A source response body was not the expected JSON (MIGRATE-006).
    #[error("[MIGRATE-006] JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error (MIGRATE-007).
    #[error("[MIGRATE-007] Configuration error: {0}")]
    Config(String),

    /// YAML configuration could not be parsed (MIGRATE-008).
    #[error("[MIGRATE-008] YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Destination connection or statement failure (MIGRATE-009).
    #[error("[MIGRATE-009] Destination error: {0}")]
    Destination(String),

    /// A destination constraint was violated; the import was rolled back (MIGRATE-010).
    #[error("[MIGRATE-010] Constraint violation on {table}: {message}")]
    Constraint {
        /// Table whose constraint failed.
        table: &'static str,
        /// Description of the violation.
        message: String,
    },

    /// Verification found drift between the dataset and the destination (MIGRATE-011).
    #[error("[MIGRATE-011] Verification mismatch: {}", mismatches.join(", "))]
    ReconciliationMismatch {
        /// Human-readable description of each differing count.
        mismatches: Vec<String>,
    },

    /// The run was cancelled by the operator (MIGRATE-012).
    #[error("[MIGRATE-012] Cancelled")]
    Cancelled,

    /// Illegal pipeline state transition (MIGRATE-013).
    #[error("[MIGRATE-013] Invalid pipeline transition: {0}")]
    InvalidTransition(String),
}

impl Error {
    /// Builds an [`Error::Artifact`] for `path`.
    pub fn artifact(path: &Path, message: impl std::fmt::Display) -> Self {
        Self::Artifact {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }

    /// Returns true for failures reading the document store.
    #[must_use]
    pub fn is_source_access(&self) -> bool {
        matches!(
            self,
            Self::SourceConnection(_) | Self::Authentication(_) | Self::RateLimit(_)
        )
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::Destination(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_in_display() {
        let err = Error::Config("database url is required".to_string());
        assert_eq!(
            err.to_string(),
            "[MIGRATE-007] Configuration error: database url is required"
        );

        let err = Error::artifact(Path::new("tmp/export.json"), "not found");
        assert!(err.to_string().starts_with("[MIGRATE-004]"));
        assert!(err.to_string().contains("tmp/export.json"));
    }

    #[test]
    fn test_mismatch_lists_keys() {
        let err = Error::ReconciliationMismatch {
            mismatches: vec!["links: expected 2, actual 1".to_string(), "orphan_link_tags: 1".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "[MIGRATE-011] Verification mismatch: links: expected 2, actual 1, orphan_link_tags: 1"
        );
    }

    #[test]
    fn test_source_access_classification() {
        assert!(Error::RateLimit(60).is_source_access());
        assert!(Error::Authentication("denied".to_string()).is_source_access());
        assert!(!Error::Cancelled.is_source_access());
    }
}
