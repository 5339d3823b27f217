//! Field renaming applied to records before validation

use serde_json::Value;

use crate::schema::{Record, RuleSet};

/// Apply `rules` to every record, returning new records in input order.
///
/// Rules run in their insertion order. A renamed field is removed from its
/// old position and appended at the end under the target name, replacing any
/// existing field of that name. Untouched fields keep their order.
pub fn apply(records: &[Record], rules: &RuleSet) -> Vec<Record> {
    records.iter().map(|record| apply_one(record, rules)).collect()
}

/// Apply `rules` to a single record
pub fn apply_one(record: &Record, rules: &RuleSet) -> Record {
    let mut fields: Vec<(String, Value)> = record
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    for (source, target) in rules.iter() {
        if let Some(pos) = fields.iter().position(|(k, _)| k == source) {
            let (_, value) = fields.remove(pos);
            fields.retain(|(k, _)| k != target);
            fields.push((target.to_string(), value));
        }
    }

    fields.into_iter().collect()
}
