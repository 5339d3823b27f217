//! Property-level drift between two schema documents
//!
//! Only the top-level `properties` maps are compared. A field whose
//! sub-schema changed anywhere inside is reported once, with both full
//! sub-schemas attached. Changes to `required` or `type` are not reported.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SchemaError};

/// A field present on both sides whose sub-schema differs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub from: Value,
    pub to: Value,
}

/// Structural delta from document A to document B
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffResult {
    /// In B but not in A, in B's order
    pub added: Vec<String>,
    /// In A but not in B, in A's order
    pub removed: Vec<String>,
    /// In both with a different sub-schema, in A's order
    pub modified: Vec<FieldChange>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// One-line summary of the delta
    pub fn summary(&self) -> String {
        if self.is_empty() {
            "No changes detected".to_string()
        } else {
            format!(
                "{} added, {} removed, {} modified",
                self.added.len(),
                self.removed.len(),
                self.modified.len()
            )
        }
    }
}

/// Compare the `properties` of two documents.
///
/// Fails with `InvalidDocument` when either side has no `properties`
/// mapping, rather than treating it as an empty one.
pub fn diff(a: &Value, b: &Value) -> Result<DiffResult> {
    let props_a = properties(a, "first")?;
    let props_b = properties(b, "second")?;

    let added = props_b
        .keys()
        .filter(|k| !props_a.contains_key(*k))
        .cloned()
        .collect();

    let removed = props_a
        .keys()
        .filter(|k| !props_b.contains_key(*k))
        .cloned()
        .collect();

    let modified = props_a
        .iter()
        .filter_map(|(field, from)| {
            let to = props_b.get(field)?;
            (from != to).then(|| FieldChange {
                field: field.clone(),
                from: from.clone(),
                to: to.clone(),
            })
        })
        .collect();

    Ok(DiffResult {
        added,
        removed,
        modified,
    })
}

fn properties<'a>(document: &'a Value, side: &str) -> Result<&'a Map<String, Value>> {
    match document.get("properties") {
        Some(Value::Object(props)) => Ok(props),
        Some(_) => Err(SchemaError::InvalidDocument(format!(
            "{} document: 'properties' must be a mapping",
            side
        ))),
        None => Err(SchemaError::InvalidDocument(format!(
            "{} document has no 'properties' to compare",
            side
        ))),
    }
}
