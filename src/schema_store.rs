//! Append-only schema version storage
//!
//! Version numbers are assigned by the storage backend as `max + 1` in one
//! atomic step, so concurrent registrations of one name never collide, even
//! from separate registries sharing a database file.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use crate::checksum::Checksum;
use crate::error::{Result, SchemaError};
use crate::schema::SchemaResponse;
use crate::storage::{SchemaVersionRow, Storage};

/// Versioned schema history on top of a [`Storage`] backend
pub struct SchemaStore {
    storage: Arc<dyn Storage>,
}

impl SchemaStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Append a new version of `name`.
    ///
    /// The first registration creates the schema with `description`; later
    /// ones ignore the supplied description. The document is stored as given.
    pub fn register(
        &self,
        name: &str,
        description: Option<&str>,
        document: Value,
    ) -> Result<SchemaResponse> {
        let document_json = serde_json::to_string(&document)?;
        // Checksum exactly what a later read will decode
        let document: Value = serde_json::from_str(&document_json)?;
        let checksum = Checksum::from_json(&document);
        let created_at = Utc::now();

        let appended = self.storage.append_schema_version(
            name,
            description,
            &document_json,
            &checksum,
            created_at,
        )?;

        let response = SchemaResponse {
            name: name.to_string(),
            description: appended.description,
            version: appended.version,
            document,
            checksum,
            created_at,
        };
        info!(schema = %response.key(), "registered schema version");
        Ok(response)
    }

    /// Greatest version of `name`, if registered
    pub fn latest(&self, name: &str) -> Result<Option<SchemaResponse>> {
        self.storage
            .latest_schema_version(name)?
            .map(decode_verified)
            .transpose()
    }

    /// Exact `(name, version)` lookup
    pub fn get(&self, name: &str, version: u32) -> Result<Option<SchemaResponse>> {
        self.storage
            .get_schema_version(name, version)?
            .map(decode_verified)
            .transpose()
    }

    /// Every registered schema paired with its own latest version
    pub fn list_latest(&self) -> Result<Vec<SchemaResponse>> {
        self.storage
            .list_latest_per_schema()?
            .into_iter()
            .map(decode_verified)
            .collect()
    }

    /// Full version history of `name`, oldest first
    pub fn history(&self, name: &str) -> Result<Vec<SchemaResponse>> {
        let rows = self.storage.list_schema_versions(name)?;
        if rows.is_empty() {
            return Err(SchemaError::schema_not_found(name));
        }
        rows.into_iter().map(decode_verified).collect()
    }

    /// Check a stored version's checksum without failing on a mismatch
    pub fn verify(&self, name: &str, version: u32) -> Result<bool> {
        let row = self
            .storage
            .get_schema_version(name, version)?
            .ok_or_else(|| SchemaError::version_not_found(name, version))?;
        let (_, entry) = row.into_parts()?;
        Ok(entry.verify_checksum())
    }
}

fn decode_verified(row: SchemaVersionRow) -> Result<SchemaResponse> {
    let (schema, entry) = row.into_parts()?;
    if !entry.verify_checksum() {
        let actual = Checksum::from_json(&entry.document);
        warn!(
            schema = %schema.name,
            version = entry.version,
            "stored document does not match its checksum"
        );
        return Err(SchemaError::ChecksumMismatch {
            expected: entry.checksum.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(SchemaResponse::new(schema, entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    fn store() -> SchemaStore {
        SchemaStore::new(Arc::new(MemoryStorage::new()))
    }

    #[test]
    fn test_register_assigns_sequential_versions() {
        let store = store();
        let v1 = store
            .register("orders", Some("Order rows"), json!({"type": "object"}))
            .unwrap();
        let v2 = store
            .register("orders", Some("ignored"), json!({"type": "object", "required": ["id"]}))
            .unwrap();

        assert_eq!((v1.version, v2.version), (1, 2));
        assert_eq!(v2.description.as_deref(), Some("Order rows"));

        let first = store.get("orders", 1).unwrap().unwrap();
        assert_eq!(first.document, json!({"type": "object"}));
    }

    #[test]
    fn test_latest_returns_last_registration() {
        let store = store();
        for k in 1..=4 {
            store.register("events", None, json!({"rev": k})).unwrap();
        }
        let latest = store.latest("events").unwrap().unwrap();
        assert_eq!(latest.version, 4);
        assert_eq!(latest.document, json!({"rev": 4}));
    }

    #[test]
    fn test_missing_lookups() {
        let store = store();
        assert!(store.latest("nope").unwrap().is_none());
        store.register("orders", None, json!({})).unwrap();
        assert!(store.get("orders", 2).unwrap().is_none());
        assert!(store.history("nope").unwrap_err().is_not_found());
        assert!(store.verify("orders", 9).unwrap_err().is_not_found());
    }

    #[test]
    fn test_malformed_document_is_still_stored() {
        let store = store();
        let stored = store
            .register("odd", None, json!({"properties": "not a map"}))
            .unwrap();
        assert_eq!(stored.version, 1);
        assert!(store.verify("odd", 1).unwrap());
    }

    #[test]
    fn test_list_latest_one_row_per_schema() {
        let store = store();
        store.register("b", None, json!({"v": 1})).unwrap();
        store.register("a", None, json!({"v": 1})).unwrap();
        store.register("b", None, json!({"v": 2})).unwrap();

        let rows: Vec<(String, u32)> = store
            .list_latest()
            .unwrap()
            .into_iter()
            .map(|r| (r.name, r.version))
            .collect();
        assert_eq!(rows, vec![("a".into(), 1), ("b".into(), 2)]);
    }

    #[test]
    fn test_float_keywords_survive_storage() {
        let store = store();
        let document = json!({
            "properties": {"x": {"type": "number", "minimum": 1.1203778759533633e-10}},
            "enum": [2.2112647588890446e-23, 0.1]
        });
        let registered = store.register("floats", None, document.clone()).unwrap();
        assert_eq!(registered.document, document);

        let latest = store.latest("floats").unwrap().unwrap();
        assert_eq!(latest.document, document);
        assert_eq!(latest.checksum, registered.checksum);
        assert!(store.verify("floats", 1).unwrap());
    }

    #[test]
    fn test_concurrent_registration_same_name() {
        let store = store();
        std::thread::scope(|s| {
            for i in 0..8 {
                let store = &store;
                s.spawn(move || {
                    store.register("hot", None, json!({"writer": i})).unwrap();
                });
            }
        });

        let versions: Vec<u32> = store
            .history("hot")
            .unwrap()
            .into_iter()
            .map(|r| r.version)
            .collect();
        assert_eq!(versions, (1..=8).collect::<Vec<_>>());
    }
}
