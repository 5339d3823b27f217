//! Loading record payloads from files

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::document::Kind;
use crate::error::{Result, SchemaError};
use crate::schema::Record;

/// Turn a JSON payload into records.
///
/// Accepts an array of objects, or a single object which becomes a
/// one-record batch.
pub fn parse_records(payload: Value) -> Result<Vec<Record>> {
    match payload {
        Value::Object(record) => Ok(vec![record]),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(record) => Ok(record),
                other => Err(SchemaError::UnsupportedFile(format!(
                    "item {} is {}, expected an object",
                    i,
                    Kind::of(&other)
                ))),
            })
            .collect(),
        other => Err(SchemaError::UnsupportedFile(format!(
            "payload must be an object or an array of objects, got {}",
            Kind::of(&other)
        ))),
    }
}

/// Read a `.json` payload file into records
pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<Record>> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("json") => {
            let content = fs::read_to_string(path)?;
            parse_records(serde_json::from_str(&content)?)
        }
        _ => Err(SchemaError::UnsupportedFile(format!(
            "{}: only .json payloads are supported",
            path.display()
        ))),
    }
}
