//! Record validation against a schema document
//!
//! Validation never stops at the first problem: every record is checked and
//! every violation is reported, ordered by record index and then by the order
//! the checks run within a record (required fields first, then the record's
//! own fields in their order).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document::{Kind, SchemaNode};
use crate::error::Result;
use crate::schema::Record;

/// Category of a validation diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// No schema registered under the requested name
    SchemaNotFound,
    MissingRequired,
    TypeMismatch,
    /// Field not declared while `additionalProperties` is false
    UnexpectedField,
    NotInEnum,
    OutOfRange,
    LengthOutOfRange,
    PatternMismatch,
}

/// One diagnostic produced by validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Zero-based position of the offending record
    pub record: Option<usize>,
    /// Dotted / indexed path of the offending field
    pub field: Option<String>,
    pub kind: ViolationKind,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Outcome of validating a batch of records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<Violation>,
    /// Version the records were checked against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,
}

impl ValidationResult {
    pub fn from_violations(errors: Vec<Violation>, schema_version: Option<u32>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            schema_version,
        }
    }

    /// Result for a request naming an unregistered schema
    pub fn schema_not_found(name: &str) -> Self {
        Self::from_violations(
            vec![Violation {
                record: None,
                field: None,
                kind: ViolationKind::SchemaNotFound,
                message: format!("Schema '{}' not found", name),
            }],
            None,
        )
    }

    pub fn is_schema_not_found(&self) -> bool {
        self.errors
            .iter()
            .any(|e| e.kind == ViolationKind::SchemaNotFound)
    }

    /// Plain diagnostic strings, in order
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.message.clone()).collect()
    }
}

/// A schema document compiled for validation
#[derive(Debug, Clone)]
pub struct Validator {
    root: SchemaNode,
}

impl Validator {
    /// Compile `document`; fails with `InvalidDocument` if it is malformed
    pub fn new(document: &Value) -> Result<Self> {
        Ok(Self {
            root: SchemaNode::compile(document)?,
        })
    }

    /// Validate every record
    pub fn validate(&self, records: &[Record]) -> ValidationResult {
        let mut errors = Vec::new();
        for (index, record) in records.iter().enumerate() {
            self.validate_record(index, record, &mut errors);
        }
        ValidationResult::from_violations(errors, None)
    }

    /// Append the violations of one record to `out`
    pub fn validate_record(&self, index: usize, record: &Record, out: &mut Vec<Violation>) {
        let mut check = Check { index, out };
        let root = &self.root;
        if !root.types.is_empty() && !root.types.contains(&Kind::Object) {
            check.push(
                None,
                ViolationKind::TypeMismatch,
                format!("record expected {}, got object", root.expected()),
            );
            return;
        }
        check.object("", root, record);
    }
}

/// Compile `document` and validate `records` against it
pub fn validate(document: &Value, records: &[Record]) -> Result<ValidationResult> {
    Ok(Validator::new(document)?.validate(records))
}

struct Check<'a> {
    index: usize,
    out: &'a mut Vec<Violation>,
}

impl Check<'_> {
    fn push(&mut self, field: Option<&str>, kind: ViolationKind, detail: String) {
        self.out.push(Violation {
            record: Some(self.index),
            field: field.map(String::from),
            kind,
            message: format!("Row {}: {}", self.index, detail),
        });
    }

    fn object(&mut self, prefix: &str, node: &SchemaNode, map: &Map<String, Value>) {
        for name in &node.required {
            if !map.contains_key(name) {
                let path = join(prefix, name);
                let detail = if prefix.is_empty() {
                    format!("'{}' is a required property", name)
                } else {
                    format!("'{}' is a required property of '{}'", name, prefix)
                };
                self.push(Some(&path), ViolationKind::MissingRequired, detail);
            }
        }

        for (name, value) in map {
            let path = join(prefix, name);
            match node.property(name) {
                Some(sub) => self.value(&path, sub, value),
                None if node.closed => self.push(
                    Some(&path),
                    ViolationKind::UnexpectedField,
                    format!("field '{}' is not allowed by the schema", path),
                ),
                None => {}
            }
        }
    }

    fn value(&mut self, path: &str, node: &SchemaNode, value: &Value) {
        if !node.accepts_kind(value) {
            self.push(
                Some(path),
                ViolationKind::TypeMismatch,
                format!(
                    "field '{}' expected {}, got {}",
                    path,
                    node.expected(),
                    Kind::of(value)
                ),
            );
            return;
        }

        if let Some(allowed) = &node.enumeration {
            if !allowed.contains(value) {
                self.push(
                    Some(path),
                    ViolationKind::NotInEnum,
                    format!(
                        "field '{}' value {} is not one of {}",
                        path,
                        value,
                        Value::Array(allowed.clone())
                    ),
                );
            }
        }

        match value {
            Value::Number(n) => {
                let n = n.as_f64().unwrap_or(f64::NAN);
                if let Some(min) = node.minimum.filter(|min| n < *min) {
                    self.push(
                        Some(path),
                        ViolationKind::OutOfRange,
                        format!("field '{}' value {} is less than the minimum of {}", path, n, min),
                    );
                }
                if let Some(max) = node.maximum.filter(|max| n > *max) {
                    self.push(
                        Some(path),
                        ViolationKind::OutOfRange,
                        format!("field '{}' value {} is greater than the maximum of {}", path, n, max),
                    );
                }
            }
            Value::String(s) => {
                let len = s.chars().count();
                if node.min_length.is_some_and(|min| len < min)
                    || node.max_length.is_some_and(|max| len > max)
                {
                    self.push(
                        Some(path),
                        ViolationKind::LengthOutOfRange,
                        format!("field '{}' has length {} outside the allowed range", path, len),
                    );
                }
                if let Some(re) = &node.pattern {
                    if !re.is_match(s) {
                        self.push(
                            Some(path),
                            ViolationKind::PatternMismatch,
                            format!("field '{}' does not match pattern '{}'", path, re.as_str()),
                        );
                    }
                }
            }
            Value::Object(map) => self.object(path, node, map),
            Value::Array(items) => {
                if let Some(item_node) = &node.items {
                    for (i, item) in items.iter().enumerate() {
                        self.value(&format!("{}[{}]", path, i), item_node, item);
                    }
                }
            }
            Value::Bool(_) | Value::Null => {}
        }
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaError;
    use rstest::rstest;
    use serde_json::json;

    fn records(value: Value) -> Vec<Record> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_missing_required_field() {
        let doc = json!({"type": "object", "required": ["id", "name"]});
        let result = validate(&doc, &records(json!([{"name": "x"}]))).unwrap();

        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        let err = &result.errors[0];
        assert_eq!(err.record, Some(0));
        assert_eq!(err.field.as_deref(), Some("id"));
        assert_eq!(err.kind, ViolationKind::MissingRequired);
        assert_eq!(err.message, "Row 0: 'id' is a required property");
    }

    #[test]
    fn test_type_mismatch() {
        let doc = json!({"type": "object", "properties": {"id": {"type": "integer"}}});
        let result = validate(&doc, &records(json!([{"id": "wrong"}]))).unwrap();

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ViolationKind::TypeMismatch);
        assert_eq!(result.errors[0].field.as_deref(), Some("id"));
        assert_eq!(result.errors[0].message, "Row 0: field 'id' expected integer, got string");
    }

    #[rstest]
    #[case("integer", json!(3), true)]
    #[case("integer", json!(3.5), false)]
    #[case("number", json!(3), true)]
    #[case("number", json!(3.5), true)]
    #[case("string", json!(3), false)]
    #[case("boolean", json!(false), true)]
    #[case("null", json!(null), true)]
    #[case("array", json!({}), false)]
    #[case("object", json!({}), true)]
    fn test_kind_matrix(#[case] ty: &str, #[case] value: Value, #[case] ok: bool) {
        let doc = json!({"type": "object", "properties": {"f": {"type": ty}}});
        let mut record = Record::new();
        record.insert("f".into(), value);
        assert_eq!(validate(&doc, &[record]).unwrap().valid, ok);
    }

    #[test]
    fn test_errors_follow_record_order() {
        let doc = json!({
            "type": "object",
            "properties": {"id": {"type": "integer"}, "name": {"type": "string"}},
            "required": ["id"]
        });
        let data = records(json!([
            {"name": 1},
            {"id": 1, "name": "ok"},
            {"id": "x", "name": false}
        ]));
        let result = validate(&doc, &data).unwrap();

        let positions: Vec<Option<usize>> = result.errors.iter().map(|e| e.record).collect();
        assert_eq!(positions, vec![Some(0), Some(0), Some(2), Some(2)]);
        assert_eq!(result.errors[0].kind, ViolationKind::MissingRequired);
        assert_eq!(result.errors[1].field.as_deref(), Some("name"));
        assert_eq!(result.errors[2].field.as_deref(), Some("id"));
        assert_eq!(result.errors[3].field.as_deref(), Some("name"));
    }

    #[test]
    fn test_open_and_closed_objects() {
        let open = json!({"type": "object", "properties": {"id": {"type": "integer"}}});
        let closed = json!({
            "type": "object",
            "properties": {"id": {"type": "integer"}},
            "additionalProperties": false
        });
        let data = records(json!([{"id": 1, "extra": true}]));

        assert!(validate(&open, &data).unwrap().valid);
        let result = validate(&closed, &data).unwrap();
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ViolationKind::UnexpectedField);
    }

    #[test]
    fn test_nested_objects_and_arrays() {
        let doc = json!({
            "type": "object",
            "properties": {
                "address": {
                    "type": "object",
                    "properties": {"zip": {"type": "string"}},
                    "required": ["zip", "city"]
                },
                "tags": {"type": "array", "items": {"type": "string"}}
            }
        });
        let data = records(json!([{"address": {"zip": 12345}, "tags": ["a", 2]}]));
        let result = validate(&doc, &data).unwrap();

        let fields: Vec<&str> = result
            .errors
            .iter()
            .filter_map(|e| e.field.as_deref())
            .collect();
        assert_eq!(fields, vec!["address.city", "address.zip", "tags[1]"]);
        assert_eq!(
            result.errors[0].message,
            "Row 0: 'city' is a required property of 'address'"
        );
    }

    #[test]
    fn test_value_constraints() {
        let doc = json!({
            "type": "object",
            "properties": {
                "status": {"type": "string", "enum": ["open", "closed"]},
                "qty": {"type": "integer", "minimum": 1, "maximum": 10},
                "code": {"type": "string", "minLength": 2, "maxLength": 3, "pattern": "^[A-Z]+$"}
            }
        });
        let good = records(json!([{"status": "open", "qty": 5, "code": "AB"}]));
        assert!(validate(&doc, &good).unwrap().valid);

        let bad = records(json!([{"status": "lost", "qty": 0, "code": "abcd"}]));
        let kinds: Vec<ViolationKind> = validate(&doc, &bad)
            .unwrap()
            .errors
            .into_iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                ViolationKind::NotInEnum,
                ViolationKind::OutOfRange,
                ViolationKind::LengthOutOfRange,
                ViolationKind::PatternMismatch,
            ]
        );
    }

    #[test]
    fn test_non_object_root_rejects_records() {
        let doc = json!({"type": "array"});
        let result = validate(&doc, &records(json!([{}]))).unwrap();
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].field, None);
        assert_eq!(result.errors[0].kind, ViolationKind::TypeMismatch);
    }

    #[test]
    fn test_malformed_document_is_reported() {
        let doc = json!({"type": "object", "properties": "id"});
        let err = validate(&doc, &records(json!([{"id": 1}]))).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDocument(_)));
    }

    #[test]
    fn test_empty_input_is_valid() {
        let doc = json!({"type": "object", "required": ["id"]});
        let result = validate(&doc, &[]).unwrap();
        assert!(result.valid);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_schema_not_found_result() {
        let result = ValidationResult::schema_not_found("orders");
        assert!(!result.valid);
        assert!(result.is_schema_not_found());
        assert_eq!(result.messages(), vec!["Schema 'orders' not found".to_string()]);
    }
}
