//! Schema versioning

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::checksum::Checksum;

/// One immutable snapshot of a schema's document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Position in the schema's history, starting at 1
    pub version: u32,
    /// The schema document as registered
    pub document: Value,
    /// SHA256 checksum of the canonical document
    pub checksum: Checksum,
    /// When this version was inserted
    pub created_at: DateTime<Utc>,
}

impl SchemaVersion {
    /// Verify the stored checksum still matches the document
    pub fn verify_checksum(&self) -> bool {
        self.checksum.verify_json(&self.document)
    }
}

/// Version number assigned to the next registration given the current maximum
pub fn next_version(current_max: Option<u32>) -> u32 {
    current_max.map_or(1, |max| max + 1)
}
