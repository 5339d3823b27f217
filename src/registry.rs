//! Schema Registry
//!
//! Orchestrates the stores and the pure engines: registration goes through
//! [`SchemaStore`], validation resolves the latest (or a pinned) version and
//! optionally the latest mapping first, diffing resolves two exact versions.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::diff::{self, DiffResult};
use crate::error::{Result, SchemaError};
use crate::mapping;
use crate::mapping_store::MappingStore;
use crate::records;
use crate::schema::{MappingRuleSet, Record, RuleSet, SchemaResponse};
use crate::schema_store::SchemaStore;
use crate::storage::{MemoryStorage, SqliteStorage, SqliteStorageConfig, Storage};
use crate::validation::{ValidationResult, Validator};

/// Default cap on the number of records accepted in one validation call
pub const DEFAULT_MAX_RECORDS: usize = 100_000;

/// The main schema registry
pub struct SchemaRegistry {
    schemas: SchemaStore,
    mappings: MappingStore,
    max_records: usize,
}

impl SchemaRegistry {
    /// Build a registry over any storage backend
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            schemas: SchemaStore::new(storage.clone()),
            mappings: MappingStore::new(storage),
            max_records: DEFAULT_MAX_RECORDS,
        }
    }

    /// Registry backed by process memory
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Open or create a registry backed by SQLite
    pub fn open(config: &SqliteStorageConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(SqliteStorage::open(config)?)))
    }

    /// Cap the number of records a single validation call accepts
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records;
        self
    }

    /// Register a new version of `name`
    pub fn register_schema(
        &self,
        name: &str,
        description: Option<&str>,
        document: Value,
    ) -> Result<SchemaResponse> {
        self.schemas.register(name, description, document)
    }

    /// Latest version of every schema
    pub fn list_schemas(&self) -> Result<Vec<SchemaResponse>> {
        self.schemas.list_latest()
    }

    pub fn latest_schema(&self, name: &str) -> Result<Option<SchemaResponse>> {
        self.schemas.latest(name)
    }

    /// A pinned version, or the latest when `version` is `None`
    pub fn get_schema(&self, name: &str, version: Option<u32>) -> Result<Option<SchemaResponse>> {
        match version {
            Some(v) => self.schemas.get(name, v),
            None => self.schemas.latest(name),
        }
    }

    /// Every version of `name`, oldest first
    pub fn versions(&self, name: &str) -> Result<Vec<SchemaResponse>> {
        self.schemas.history(name)
    }

    /// Whether a stored version still matches its checksum
    pub fn verify(&self, name: &str, version: u32) -> Result<bool> {
        self.schemas.verify(name, version)
    }

    /// Validate `records` against the latest version of `schema_name`.
    ///
    /// An unregistered name yields a failed result with a single
    /// schema-not-found diagnostic. With `apply_mapping`, the latest mapping
    /// saved for the schema (if any) renames fields first.
    pub fn validate(
        &self,
        schema_name: &str,
        records: &[Record],
        apply_mapping: bool,
    ) -> Result<ValidationResult> {
        let schema = self.schemas.latest(schema_name)?;
        self.run_validation(schema_name, schema, records, apply_mapping)
    }

    /// Validate against an exact historical version
    pub fn validate_version(
        &self,
        schema_name: &str,
        version: u32,
        records: &[Record],
        apply_mapping: bool,
    ) -> Result<ValidationResult> {
        let schema = self.schemas.get(schema_name, version)?;
        if schema.is_none() && self.schemas.latest(schema_name)?.is_some() {
            return Err(SchemaError::version_not_found(schema_name, version));
        }
        self.run_validation(schema_name, schema, records, apply_mapping)
    }

    /// Validate the records of a payload file against the latest version
    pub fn validate_file(
        &self,
        schema_name: &str,
        path: impl AsRef<Path>,
        apply_mapping: bool,
    ) -> Result<ValidationResult> {
        let records = records::load_records(path)?;
        self.validate(schema_name, &records, apply_mapping)
    }

    fn run_validation(
        &self,
        schema_name: &str,
        schema: Option<SchemaResponse>,
        records: &[Record],
        apply_mapping: bool,
    ) -> Result<ValidationResult> {
        let Some(schema) = schema else {
            debug!(schema = schema_name, "validation requested for unknown schema");
            return Ok(ValidationResult::schema_not_found(schema_name));
        };

        if records.len() > self.max_records {
            return Err(SchemaError::PayloadTooLarge {
                records: records.len(),
                limit: self.max_records,
            });
        }

        let validator = Validator::new(&schema.document)?;

        let mapped;
        let records = if apply_mapping {
            match self.mappings.latest(schema_name)? {
                Some(mapping) => {
                    debug!(schema = schema_name, mapping = mapping.id, "applying mapping");
                    mapped = mapping::apply(records, &mapping.rules);
                    &mapped[..]
                }
                None => {
                    warn!(schema = schema_name, "no mapping saved; validating records as given");
                    records
                }
            }
        } else {
            records
        };

        let mut result = validator.validate(records);
        result.schema_version = Some(schema.version);

        debug!(
            schema = schema_name,
            version = schema.version,
            records = records.len(),
            errors = result.errors.len(),
            "validated records"
        );
        Ok(result)
    }

    /// Compare the properties of two versions of `schema_name`
    pub fn diff(&self, schema_name: &str, v1: u32, v2: u32) -> Result<DiffResult> {
        let from = self
            .schemas
            .get(schema_name, v1)?
            .ok_or_else(|| SchemaError::version_not_found(schema_name, v1))?;
        let to = self
            .schemas
            .get(schema_name, v2)?
            .ok_or_else(|| SchemaError::version_not_found(schema_name, v2))?;
        diff::diff(&from.document, &to.document)
    }

    /// Save a rule set as the newest mapping for `schema_name`
    pub fn save_mapping(&self, schema_name: &str, rules: RuleSet) -> Result<MappingRuleSet> {
        self.mappings.save(schema_name, rules)
    }

    pub fn latest_mapping(&self, schema_name: &str) -> Result<Option<MappingRuleSet>> {
        self.mappings.latest(schema_name)
    }
}
