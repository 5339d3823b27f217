//! Schema types and structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::checksum::Checksum;
use crate::error::{Result, SchemaError};
use crate::version::SchemaVersion;

/// One unit of data checked against a schema document
pub type Record = Map<String, Value>;

/// A named schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Unique name of the schema (e.g., "orders")
    pub name: String,
    /// Set by the first registration, never changed afterwards
    pub description: Option<String>,
}

/// A schema paired with one of its versions, as returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaResponse {
    pub name: String,
    pub description: Option<String>,
    pub version: u32,
    pub document: Value,
    pub checksum: Checksum,
    pub created_at: DateTime<Utc>,
}

impl SchemaResponse {
    pub fn new(schema: Schema, version: SchemaVersion) -> Self {
        Self {
            name: schema.name,
            description: schema.description,
            version: version.version,
            document: version.document,
            checksum: version.checksum,
            created_at: version.created_at,
        }
    }

    /// Get a unique key for this entry
    pub fn key(&self) -> String {
        format!("{}/v{}", self.name, self.version)
    }
}

/// Ordered source -> target field renames.
///
/// Sources are unique: a record field can only be renamed once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct RuleSet {
    rules: Vec<(String, String)>,
}

impl RuleSet {
    /// Build a rule set, rejecting duplicate or empty field names
    pub fn new<I, S, T>(rules: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        let mut set = RuleSet::default();
        for (source, target) in rules {
            let (source, target) = (source.into(), target.into());
            if source.is_empty() || target.is_empty() {
                return Err(SchemaError::InvalidMapping(
                    "field names must be non-empty".to_string(),
                ));
            }
            if set.rules.iter().any(|(s, _)| *s == source) {
                return Err(SchemaError::InvalidMapping(format!(
                    "field '{}' is renamed more than once",
                    source
                )));
            }
            set.rules.push((source, target));
        }
        Ok(set)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.rules.iter().map(|(s, t)| (s.as_str(), t.as_str()))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl TryFrom<Map<String, Value>> for RuleSet {
    type Error = SchemaError;

    fn try_from(map: Map<String, Value>) -> Result<Self> {
        let mut pairs = Vec::with_capacity(map.len());
        for (source, target) in map {
            match target {
                Value::String(target) => pairs.push((source, target)),
                other => {
                    return Err(SchemaError::InvalidMapping(format!(
                        "target for '{}' must be a field name, got {}",
                        source, other
                    )))
                }
            }
        }
        RuleSet::new(pairs)
    }
}

impl TryFrom<Value> for RuleSet {
    type Error = SchemaError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => RuleSet::try_from(map),
            other => Err(SchemaError::InvalidMapping(format!(
                "rules must be a mapping, got {}",
                other
            ))),
        }
    }
}

impl From<RuleSet> for Map<String, Value> {
    fn from(set: RuleSet) -> Self {
        set.rules
            .into_iter()
            .map(|(s, t)| (s, Value::String(t)))
            .collect()
    }
}

/// A stored rule set belonging to a schema name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRuleSet {
    /// Assigned from a store-wide counter, not per schema
    pub id: u64,
    pub schema_name: String,
    pub rules: RuleSet,
    pub created_at: DateTime<Utc>,
}
