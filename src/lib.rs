//! Schema Guard
//!
//! A versioned, append-only schema registry that validates record payloads
//! against registered JSON-Schema-like documents.
//!
//! ## Features
//!
//! - **Append-only history**: every registration adds version `max + 1`; old
//!   versions are never touched, so historical validation is reproducible
//! - **Validation**: per-record, per-field diagnostics collected in one pass
//! - **Drift diffing**: property-level comparison of two versions
//! - **Mappings**: field-renaming rule sets applied before validation
//! - **Checksum Validation**: SHA256 checksums guard stored documents
//!
//! ## Architecture
//!
//! ```text
//! SchemaRegistry
//! ├── SchemaStore   ──┐
//! ├── MappingStore  ──┴── Storage (MemoryStorage | SqliteStorage)
//! ├── validation::Validator
//! ├── diff::diff
//! └── mapping::apply
//! ```

pub mod checksum;
pub mod config;
pub mod diff;
pub mod document;
pub mod error;
pub mod mapping;
pub mod mapping_store;
pub mod records;
pub mod registry;
pub mod schema;
pub mod schema_store;
pub mod storage;
pub mod validation;
pub mod version;

pub use checksum::Checksum;
pub use config::GuardConfig;
pub use diff::{DiffResult, FieldChange};
pub use document::{Kind, SchemaNode};
pub use error::{Result, SchemaError};
pub use mapping_store::MappingStore;
pub use registry::SchemaRegistry;
pub use schema::{MappingRuleSet, Record, RuleSet, Schema, SchemaResponse};
pub use schema_store::SchemaStore;
pub use storage::{MemoryStorage, SqliteStorage, SqliteStorageConfig, Storage};
pub use validation::{ValidationResult, Validator, Violation, ViolationKind};
pub use version::SchemaVersion;
