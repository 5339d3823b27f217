//! In-memory storage backend

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;

use super::{AppendedVersion, MappingRow, SchemaVersionRow, Storage};
use crate::checksum::Checksum;
use crate::error::{Result, SchemaError};
use crate::version::next_version;

#[derive(Debug, Clone)]
struct VersionEntry {
    document: Value,
    checksum: String,
    created_at: DateTime<Utc>,
}

impl VersionEntry {
    fn new(document_json: &str, checksum: &Checksum, created_at: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            document: serde_json::from_str(document_json)?,
            checksum: checksum.to_string(),
            created_at,
        })
    }
}

#[derive(Debug, Default)]
struct Inner {
    /// name -> description
    schemas: BTreeMap<String, Option<String>>,
    versions: HashMap<String, BTreeMap<u32, VersionEntry>>,
    mappings: Vec<MappingRow>,
    mapping_seq: u64,
}

impl Inner {
    fn row(&self, name: &str, version: u32, entry: &VersionEntry) -> SchemaVersionRow {
        SchemaVersionRow {
            name: name.to_string(),
            description: self.schemas.get(name).cloned().flatten(),
            version,
            document: entry.document.clone(),
            checksum: entry.checksum.clone(),
            created_at: entry.created_at,
        }
    }

    fn insert_schema(&mut self, name: &str, description: Option<&str>) {
        self.schemas
            .entry(name.to_string())
            .or_insert_with(|| description.map(String::from));
    }

    fn max_version(&self, name: &str) -> Option<u32> {
        self.versions.get(name)?.keys().next_back().copied()
    }

    fn insert_version(&mut self, name: &str, version: u32, entry: VersionEntry) -> Result<()> {
        if !self.schemas.contains_key(name) {
            return Err(SchemaError::Storage(format!(
                "schema '{}' has no schema row",
                name
            )));
        }
        let versions = self.versions.entry(name.to_string()).or_default();
        if versions.contains_key(&version) {
            return Err(SchemaError::Storage(format!(
                "version {} of '{}' already stored",
                version, name
            )));
        }
        versions.insert(version, entry);
        Ok(())
    }

    fn latest(&self, name: &str) -> Option<SchemaVersionRow> {
        let (version, entry) = self.versions.get(name)?.iter().next_back()?;
        Some(self.row(name, *version, entry))
    }
}

/// Process-local storage. Documents are kept already parsed, the way drivers
/// with native JSON columns return them.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: RwLock<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn insert_schema(&self, name: &str, description: Option<&str>) -> Result<()> {
        self.inner.write().insert_schema(name, description);
        Ok(())
    }

    fn insert_schema_version(
        &self,
        name: &str,
        version: u32,
        document_json: &str,
        checksum: &Checksum,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let entry = VersionEntry::new(document_json, checksum, created_at)?;
        self.inner.write().insert_version(name, version, entry)
    }

    fn max_version(&self, name: &str) -> Result<Option<u32>> {
        Ok(self.inner.read().max_version(name))
    }

    fn append_schema_version(
        &self,
        name: &str,
        description: Option<&str>,
        document_json: &str,
        checksum: &Checksum,
        created_at: DateTime<Utc>,
    ) -> Result<AppendedVersion> {
        let entry = VersionEntry::new(document_json, checksum, created_at)?;
        let mut inner = self.inner.write();
        inner.insert_schema(name, description);
        let version = next_version(inner.max_version(name));
        inner.insert_version(name, version, entry)?;
        Ok(AppendedVersion {
            version,
            description: inner.schemas.get(name).cloned().flatten(),
        })
    }

    fn get_schema_version(&self, name: &str, version: u32) -> Result<Option<SchemaVersionRow>> {
        let inner = self.inner.read();
        Ok(inner
            .versions
            .get(name)
            .and_then(|v| v.get(&version))
            .map(|entry| inner.row(name, version, entry)))
    }

    fn latest_schema_version(&self, name: &str) -> Result<Option<SchemaVersionRow>> {
        Ok(self.inner.read().latest(name))
    }

    fn list_latest_per_schema(&self) -> Result<Vec<SchemaVersionRow>> {
        let inner = self.inner.read();
        Ok(inner
            .schemas
            .keys()
            .filter_map(|name| inner.latest(name))
            .collect())
    }

    fn list_schema_versions(&self, name: &str) -> Result<Vec<SchemaVersionRow>> {
        let inner = self.inner.read();
        Ok(inner
            .versions
            .get(name)
            .map(|versions| {
                versions
                    .iter()
                    .map(|(version, entry)| inner.row(name, *version, entry))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn insert_mapping(
        &self,
        id: u64,
        schema_name: &str,
        rules_json: &str,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let rules: Value = serde_json::from_str(rules_json)?;
        let mut inner = self.inner.write();
        if inner.mappings.iter().any(|m| m.id == id) {
            return Err(SchemaError::Storage(format!("mapping id {} already used", id)));
        }
        inner.mappings.push(MappingRow {
            id,
            schema_name: schema_name.to_string(),
            rules,
            created_at,
        });
        Ok(())
    }

    fn next_mapping_id(&self) -> Result<u64> {
        let mut inner = self.inner.write();
        inner.mapping_seq += 1;
        Ok(inner.mapping_seq)
    }

    fn latest_mapping_for_schema(&self, schema_name: &str) -> Result<Option<MappingRow>> {
        let inner = self.inner.read();
        Ok(inner
            .mappings
            .iter()
            .filter(|m| m.schema_name == schema_name)
            .max_by_key(|m| m.id)
            .cloned())
    }
}
