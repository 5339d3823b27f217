//! Typed view of a stored schema document
//!
//! Documents are stored verbatim as JSON. Before a document is used to
//! validate records it is compiled into a [`SchemaNode`] tree, which is where
//! structural mistakes in the document itself are caught.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{Result, SchemaError};

/// Runtime kind of a JSON value, as named by the `type` keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Object,
    Array,
    String,
    Number,
    Integer,
    Boolean,
    Null,
}

impl Kind {
    /// Parse a `type` keyword value
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "object" => Some(Kind::Object),
            "array" => Some(Kind::Array),
            "string" => Some(Kind::String),
            "number" => Some(Kind::Number),
            "integer" => Some(Kind::Integer),
            "boolean" => Some(Kind::Boolean),
            "null" => Some(Kind::Null),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Object => "object",
            Kind::Array => "array",
            Kind::String => "string",
            Kind::Number => "number",
            Kind::Integer => "integer",
            Kind::Boolean => "boolean",
            Kind::Null => "null",
        }
    }

    /// Kind of a concrete value. Integral numbers report `Integer`.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Object(_) => Kind::Object,
            Value::Array(_) => Kind::Array,
            Value::String(_) => Kind::String,
            Value::Number(n) if is_integral(n) => Kind::Integer,
            Value::Number(_) => Kind::Number,
            Value::Bool(_) => Kind::Boolean,
            Value::Null => Kind::Null,
        }
    }

    /// Whether a value satisfies this kind. `number` accepts integers too.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, Kind::of(value)) {
            (Kind::Number, Kind::Integer) => true,
            (expected, actual) => *expected == actual,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_integral(n: &serde_json::Number) -> bool {
    if n.is_i64() || n.is_u64() {
        return true;
    }
    n.as_f64().is_some_and(|f| f.is_finite() && f.fract() == 0.0)
}

/// Compiled constraint tree for one (sub-)schema
#[derive(Debug, Clone, Default)]
pub struct SchemaNode {
    /// Accepted kinds; empty means any kind
    pub types: Vec<Kind>,
    /// Declared properties in document order
    pub properties: Vec<(String, SchemaNode)>,
    /// Required field names in document order
    pub required: Vec<String>,
    /// `additionalProperties: false`
    pub closed: bool,
    /// Sub-schema applied to every array element
    pub items: Option<Box<SchemaNode>>,
    pub enumeration: Option<Vec<Value>>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<Regex>,
}

impl SchemaNode {
    /// Compile a document, rejecting keywords whose shape is wrong.
    pub fn compile(document: &Value) -> Result<Self> {
        Self::compile_at(document, "$")
    }

    fn compile_at(value: &Value, path: &str) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| invalid(path, "a schema must be a JSON object"))?;

        let mut node = SchemaNode {
            types: compile_types(obj, path)?,
            ..SchemaNode::default()
        };

        match obj.get("properties") {
            None => {}
            Some(Value::Object(props)) => {
                for (field, sub) in props {
                    let sub_path = format!("{}.properties.{}", path, field);
                    node.properties
                        .push((field.clone(), Self::compile_at(sub, &sub_path)?));
                }
            }
            Some(_) => return Err(invalid(path, "'properties' must be a mapping")),
        }

        match obj.get("required") {
            None => {}
            Some(Value::Array(names)) => {
                for name in names {
                    let name = name
                        .as_str()
                        .ok_or_else(|| invalid(path, "'required' must list field names"))?;
                    node.required.push(name.to_string());
                }
            }
            Some(_) => return Err(invalid(path, "'required' must be an array")),
        }

        node.closed = match obj.get("additionalProperties") {
            None | Some(Value::Object(_)) => false,
            Some(Value::Bool(allowed)) => !allowed,
            Some(_) => {
                return Err(invalid(
                    path,
                    "'additionalProperties' must be a boolean or a schema",
                ))
            }
        };

        if let Some(items) = obj.get("items") {
            let sub = Self::compile_at(items, &format!("{}.items", path))?;
            node.items = Some(Box::new(sub));
        }

        match obj.get("enum") {
            None => {}
            Some(Value::Array(values)) => node.enumeration = Some(values.clone()),
            Some(_) => return Err(invalid(path, "'enum' must be an array")),
        }

        node.minimum = number_keyword(obj, "minimum", path)?;
        node.maximum = number_keyword(obj, "maximum", path)?;
        node.min_length = length_keyword(obj, "minLength", path)?;
        node.max_length = length_keyword(obj, "maxLength", path)?;

        match obj.get("pattern") {
            None => {}
            Some(Value::String(src)) => {
                let re = Regex::new(src)
                    .map_err(|e| invalid(path, &format!("bad 'pattern': {}", e)))?;
                node.pattern = Some(re);
            }
            Some(_) => return Err(invalid(path, "'pattern' must be a string")),
        }

        Ok(node)
    }

    /// Look up a declared property
    pub fn property(&self, name: &str) -> Option<&SchemaNode> {
        self.properties
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, node)| node)
    }

    /// Whether `value` satisfies the `type` keyword
    pub fn accepts_kind(&self, value: &Value) -> bool {
        self.types.is_empty() || self.types.iter().any(|kind| kind.accepts(value))
    }

    /// Human form of the accepted kinds, e.g. `string or null`
    pub fn expected(&self) -> String {
        self.types
            .iter()
            .map(Kind::as_str)
            .collect::<Vec<_>>()
            .join(" or ")
    }
}

fn compile_types(obj: &Map<String, Value>, path: &str) -> Result<Vec<Kind>> {
    let parse_one = |v: &Value| -> Result<Kind> {
        let name = v
            .as_str()
            .ok_or_else(|| invalid(path, "'type' entries must be strings"))?;
        Kind::parse(name).ok_or_else(|| invalid(path, &format!("unknown type '{}'", name)))
    };

    match obj.get("type") {
        None => Ok(Vec::new()),
        Some(Value::Array(names)) => names.iter().map(parse_one).collect(),
        Some(single) => Ok(vec![parse_one(single)?]),
    }
}

fn number_keyword(obj: &Map<String, Value>, key: &str, path: &str) -> Result<Option<f64>> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| invalid(path, &format!("'{}' must be a number", key))),
    }
}

fn length_keyword(obj: &Map<String, Value>, key: &str, path: &str) -> Result<Option<usize>> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) => {
            let n = v
                .as_u64()
                .ok_or_else(|| invalid(path, &format!("'{}' must be a non-negative integer", key)))?;
            usize::try_from(n)
                .map(Some)
                .map_err(|_| invalid(path, &format!("'{}' is too large: {}", key, n)))
        }
    }
}

fn invalid(path: &str, reason: &str) -> SchemaError {
    SchemaError::InvalidDocument(format!("{}: {}", path, reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!({}), Kind::Object)]
    #[case(json!([1]), Kind::Array)]
    #[case(json!("x"), Kind::String)]
    #[case(json!(3), Kind::Integer)]
    #[case(json!(3.0), Kind::Integer)]
    #[case(json!(3.5), Kind::Number)]
    #[case(json!(true), Kind::Boolean)]
    #[case(json!(null), Kind::Null)]
    fn test_kind_of(#[case] value: Value, #[case] kind: Kind) {
        assert_eq!(Kind::of(&value), kind);
    }

    #[test]
    fn test_number_accepts_integers_but_not_reverse() {
        assert!(Kind::Number.accepts(&json!(4)));
        assert!(Kind::Number.accepts(&json!(4.5)));
        assert!(Kind::Integer.accepts(&json!(4)));
        assert!(!Kind::Integer.accepts(&json!(4.5)));
    }

    #[test]
    fn test_compile_keeps_property_order() {
        let node = SchemaNode::compile(&json!({
            "type": "object",
            "properties": {"zeta": {"type": "string"}, "alpha": {"type": ["integer", "null"]}},
            "required": ["zeta"]
        }))
        .unwrap();

        let names: Vec<&str> = node.properties.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
        assert_eq!(node.required, vec!["zeta"]);
        assert_eq!(node.property("alpha").unwrap().expected(), "integer or null");
    }

    #[rstest]
    #[case(json!({"properties": ["id"]}))]
    #[case(json!({"required": "id"}))]
    #[case(json!({"type": "decimal"}))]
    #[case(json!({"properties": {"id": 5}}))]
    #[case(json!({"pattern": "("}))]
    #[case(json!({"additionalProperties": "no"}))]
    #[case(json!("object"))]
    #[case(json!({"minLength": -1}))]
    #[case(json!({"maxLength": 2.5}))]
    fn test_malformed_documents(#[case] document: Value) {
        let err = SchemaNode::compile(&document).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDocument(_)));
    }

    #[test]
    fn test_length_bounds_fit_usize() {
        let node = SchemaNode::compile(&json!({"maxLength": 10})).unwrap();
        assert_eq!(node.max_length, Some(10));

        let huge = SchemaNode::compile(&json!({"maxLength": u64::MAX}));
        match usize::try_from(u64::MAX) {
            Ok(limit) => assert_eq!(huge.unwrap().max_length, Some(limit)),
            Err(_) => assert!(matches!(huge, Err(SchemaError::InvalidDocument(_)))),
        }
    }
}
