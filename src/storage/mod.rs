//! Durable storage collaborator
//!
//! The stores only talk to storage through [`Storage`]. Two backends ship with
//! the crate: [`MemoryStorage`] for tests and throwaway registries, and
//! [`SqliteStorage`] for anything that must survive a restart.
//!
//! Documents and rule sets are persisted as serialized JSON text. Some
//! backends hand the column back already parsed and some hand back the text,
//! so rows carry the raw column as a [`Value`] and callers go through
//! [`decode_json_column`].

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::checksum::Checksum;
use crate::error::Result;
use crate::schema::{Schema, MappingRuleSet, RuleSet};
use crate::version::SchemaVersion;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::{SqliteStorage, SqliteStorageConfig};

/// A schema version row joined with its schema's description
#[derive(Debug, Clone)]
pub struct SchemaVersionRow {
    pub name: String,
    pub description: Option<String>,
    pub version: u32,
    /// Raw document column (structured or still serialized)
    pub document: Value,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

impl SchemaVersionRow {
    /// Decode the row into its domain parts
    pub fn into_parts(self) -> Result<(Schema, SchemaVersion)> {
        let schema = Schema {
            name: self.name,
            description: self.description,
        };
        let version = SchemaVersion {
            version: self.version,
            document: decode_json_column(self.document)?,
            checksum: Checksum::from(self.checksum),
            created_at: self.created_at,
        };
        Ok((schema, version))
    }
}

/// A stored mapping row
#[derive(Debug, Clone)]
pub struct MappingRow {
    pub id: u64,
    pub schema_name: String,
    /// Raw rules column (structured or still serialized)
    pub rules: Value,
    pub created_at: DateTime<Utc>,
}

impl MappingRow {
    pub fn into_rule_set(self) -> Result<MappingRuleSet> {
        let rules = RuleSet::try_from(decode_json_column(self.rules)?)?;
        Ok(MappingRuleSet {
            id: self.id,
            schema_name: self.schema_name,
            rules,
            created_at: self.created_at,
        })
    }
}

/// Result of appending a schema version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendedVersion {
    pub version: u32,
    /// Description stored with the schema row (the first registration's)
    pub description: Option<String>,
}

/// Storage operations the registry needs. Implementations must be safe to
/// share between threads; each call acquires and releases its own handle.
pub trait Storage: Send + Sync {
    /// Create the schema row. A second call for the same name is a no-op.
    fn insert_schema(&self, name: &str, description: Option<&str>) -> Result<()>;

    /// Store one version row. Fails if `(name, version)` already exists.
    fn insert_schema_version(
        &self,
        name: &str,
        version: u32,
        document_json: &str,
        checksum: &Checksum,
        created_at: DateTime<Utc>,
    ) -> Result<()>;

    fn max_version(&self, name: &str) -> Result<Option<u32>>;

    /// `insert_schema`, `max_version` and `insert_schema_version` for
    /// `max + 1`, performed as one atomic step, also against other handles
    /// on the same database.
    fn append_schema_version(
        &self,
        name: &str,
        description: Option<&str>,
        document_json: &str,
        checksum: &Checksum,
        created_at: DateTime<Utc>,
    ) -> Result<AppendedVersion>;

    fn get_schema_version(&self, name: &str, version: u32) -> Result<Option<SchemaVersionRow>>;

    fn latest_schema_version(&self, name: &str) -> Result<Option<SchemaVersionRow>>;

    /// Latest version of every schema, ordered by schema name
    fn list_latest_per_schema(&self) -> Result<Vec<SchemaVersionRow>>;

    /// Every version of one schema, ascending
    fn list_schema_versions(&self, name: &str) -> Result<Vec<SchemaVersionRow>>;

    fn insert_mapping(
        &self,
        id: u64,
        schema_name: &str,
        rules_json: &str,
        created_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Next value of the store-wide mapping id counter
    fn next_mapping_id(&self) -> Result<u64>;

    /// The mapping with the greatest id for `schema_name`
    fn latest_mapping_for_schema(&self, schema_name: &str) -> Result<Option<MappingRow>>;
}

/// Decode a JSON column that may arrive either parsed or as text
pub fn decode_json_column(raw: Value) -> Result<Value> {
    match raw {
        Value::String(text) => Ok(serde_json::from_str(&text)?),
        structured => Ok(structured),
    }
}
