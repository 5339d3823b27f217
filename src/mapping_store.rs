//! Append-only mapping rule storage
//!
//! Ids come from a single store-wide counter. The latest mapping for a schema
//! is the one with the greatest id, i.e. the most recently saved.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::info;

use crate::error::Result;
use crate::schema::{MappingRuleSet, RuleSet};
use crate::storage::Storage;

pub struct MappingStore {
    storage: Arc<dyn Storage>,
    /// Serializes id allocation with the insert that uses it
    write_lock: Mutex<()>,
}

impl MappingStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    /// Save a new rule set for `schema_name`
    pub fn save(&self, schema_name: &str, rules: RuleSet) -> Result<MappingRuleSet> {
        let rules_json = serde_json::to_string(&rules)?;
        let created_at = Utc::now();

        let id = {
            let _guard = self.write_lock.lock();
            let id = self.storage.next_mapping_id()?;
            self.storage
                .insert_mapping(id, schema_name, &rules_json, created_at)?;
            id
        };

        info!(id, schema = schema_name, rules = rules.len(), "saved mapping");

        Ok(MappingRuleSet {
            id,
            schema_name: schema_name.to_string(),
            rules,
            created_at,
        })
    }

    /// Most recently saved rule set for `schema_name`
    pub fn latest(&self, schema_name: &str) -> Result<Option<MappingRuleSet>> {
        self.storage
            .latest_mapping_for_schema(schema_name)?
            .map(|row| row.into_rule_set())
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, SqliteStorage};

    fn rules(pairs: &[(&str, &str)]) -> RuleSet {
        RuleSet::new(pairs.iter().copied()).unwrap()
    }

    #[test]
    fn test_latest_is_last_saved() {
        let store = MappingStore::new(Arc::new(MemoryStorage::new()));
        let first = store.save("orders", rules(&[("a", "b")])).unwrap();
        let second = store.save("orders", rules(&[("c", "d")])).unwrap();
        assert!(second.id > first.id);

        let latest = store.latest("orders").unwrap().unwrap();
        assert_eq!(latest.rules, rules(&[("c", "d")]));
    }

    #[test]
    fn test_ids_are_store_wide() {
        let store = MappingStore::new(Arc::new(SqliteStorage::open_in_memory().unwrap()));
        let a = store.save("orders", rules(&[("a", "b")])).unwrap();
        let b = store.save("customers", rules(&[("x", "y")])).unwrap();
        let c = store.save("orders", rules(&[("e", "f")])).unwrap();
        assert_eq!((a.id, b.id, c.id), (1, 2, 3));

        assert_eq!(store.latest("customers").unwrap().unwrap().id, 2);
        assert_eq!(store.latest("orders").unwrap().unwrap().id, 3);
        assert!(store.latest("unknown").unwrap().is_none());
    }

    #[test]
    fn test_rule_order_survives_storage() {
        let store = MappingStore::new(Arc::new(SqliteStorage::open_in_memory().unwrap()));
        store
            .save("orders", rules(&[("z", "a"), ("m", "b"), ("a", "c")]))
            .unwrap();
        let latest = store.latest("orders").unwrap().unwrap();
        let sources: Vec<&str> = latest.rules.iter().map(|(s, _)| s).collect();
        assert_eq!(sources, vec!["z", "m", "a"]);
    }
}
