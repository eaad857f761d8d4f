// Migration tool - pedantic lints relaxed for CLI ergonomics
#![allow(clippy::pedantic)]

//! # LinksDeck Migration Tool
//!
//! `linksdeck-migrate` is a CLI tool and library for moving LinksDeck data
//! out of Firestore and into a relational database.
//!
//! ## Stages
//!
//! | Stage | Reads | Writes |
//! |-------|-------|--------|
//! | export | Firestore | `firestore-export.json` |
//! | transform | `firestore-export.json` | `transformed.json` |
//! | import | `transformed.json` | PostgreSQL (one transaction) |
//! | verify | `transformed.json` + PostgreSQL | `verify-report.json` |
//!
//! Every stage is idempotent: re-running a stage against unchanged input
//! converges on the same destination state.
//!
//! ## Quick Start
//!
//! ```bash
//! export FIREBASE_PROJECT_ID=linksdeck-prod
//! export FIRESTORE_ACCESS_TOKEN=$(gcloud auth print-access-token)
//! export DATABASE_URL=postgres://localhost/linksdeck
//!
//! # Everything, failing on any count mismatch
//! linksdeck-migrate all
//!
//! # Preview against an in-memory destination
//! linksdeck-migrate all --dry-run
//! ```
//!
//! ## Configuration Example
//!
//! ```yaml
//! source:
//!   type: firestore
//!   project_id: linksdeck-prod
//!
//! destination:
//!   database_url: postgres://localhost/linksdeck
//!
//! artifacts:
//!   export_file: ./tmp/firestore-export.json
//!   transformed_file: ./tmp/transformed.json
//!   verify_report: ./tmp/verify-report.json
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod connectors;
pub mod destination;
pub mod error;
pub mod export;
pub mod import;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod snapshot;
pub mod transform;
pub mod verify;

pub use config::{MigrationConfig, MigrationOptions, SourceConfig};
pub use connectors::DocumentSource;
pub use destination::{Destination, ImportStats, MemoryDestination};
pub use error::{Error, Result};
pub use export::ExportStats;
pub use model::{TransformedDataset, VerificationSummary};
pub use pipeline::{Pipeline, PipelineReport, PipelineState, Stage};
pub use snapshot::{RawDocument, RawSnapshot};
pub use transform::{TransformStats, Transformer};
