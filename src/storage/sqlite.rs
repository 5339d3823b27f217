//! SQLite storage backend
//!
//! A single connection is opened when the store is created and shared behind
//! a mutex. Every operation takes the lock for its own duration only; the
//! guard is dropped on every return path, errors included.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{AppendedVersion, MappingRow, SchemaVersionRow, Storage};
use crate::checksum::Checksum;
use crate::error::{Result, SchemaError};
use crate::version::next_version;

/// Layout version recorded in `store_meta`
const LAYOUT_VERSION: i64 = 1;

const SELECT_VERSION_ROW: &str = "SELECT s.name, s.description, v.version, v.document, \
     v.checksum, v.created_at FROM schemas s JOIN schema_versions v ON s.name = v.schema_name";

/// Connection settings for [`SqliteStorage`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteStorageConfig {
    /// Database file; created if missing
    pub path: PathBuf,
    /// How long a writer waits on a locked database
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl SqliteStorageConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// SQLite-backed storage
#[derive(Clone)]
pub struct SqliteStorage {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Open (or create) the database described by `config`
    pub fn open(config: &SqliteStorageConfig) -> Result<Self> {
        ensure_parent_dir(&config.path)?;
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let connection = Connection::open_with_flags(&config.path, flags)?;
        connection.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")?;
        connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        debug!(path = %config.path.display(), "opened sqlite storage");
        Self::init(connection)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let connection = Connection::open_in_memory()?;
        connection.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::init(connection)
    }

    fn init(mut connection: Connection) -> Result<Self> {
        initialize_layout(&mut connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn query_rows(&self, sql: &str, name: &str) -> Result<Vec<SchemaVersionRow>> {
        let conn = self.connection.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![name], map_version_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

impl Storage for SqliteStorage {
    fn insert_schema(&self, name: &str, description: Option<&str>) -> Result<()> {
        let conn = self.connection.lock();
        insert_schema_row(&conn, name, description)
    }

    fn insert_schema_version(
        &self,
        name: &str,
        version: u32,
        document_json: &str,
        checksum: &Checksum,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.connection.lock();
        insert_version_row(&conn, name, version, document_json, checksum, created_at)
    }

    fn max_version(&self, name: &str) -> Result<Option<u32>> {
        let conn = self.connection.lock();
        max_version_of(&conn, name)
    }

    fn append_schema_version(
        &self,
        name: &str,
        description: Option<&str>,
        document_json: &str,
        checksum: &Checksum,
        created_at: DateTime<Utc>,
    ) -> Result<AppendedVersion> {
        let mut conn = self.connection.lock();
        // Write lock is held from before MAX(version) until commit
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        insert_schema_row(&tx, name, description)?;
        let version = next_version(max_version_of(&tx, name)?);
        insert_version_row(&tx, name, version, document_json, checksum, created_at)?;
        let description: Option<String> = tx.query_row(
            "SELECT description FROM schemas WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        tx.commit()?;
        Ok(AppendedVersion {
            version,
            description,
        })
    }

    fn get_schema_version(&self, name: &str, version: u32) -> Result<Option<SchemaVersionRow>> {
        let conn = self.connection.lock();
        let sql = format!("{} WHERE s.name = ?1 AND v.version = ?2", SELECT_VERSION_ROW);
        let row = conn
            .query_row(&sql, params![name, version], map_version_row)
            .optional()?;
        Ok(row)
    }

    fn latest_schema_version(&self, name: &str) -> Result<Option<SchemaVersionRow>> {
        let conn = self.connection.lock();
        let sql = format!(
            "{} WHERE s.name = ?1 ORDER BY v.version DESC LIMIT 1",
            SELECT_VERSION_ROW
        );
        let row = conn
            .query_row(&sql, params![name], map_version_row)
            .optional()?;
        Ok(row)
    }

    fn list_latest_per_schema(&self) -> Result<Vec<SchemaVersionRow>> {
        let conn = self.connection.lock();
        let sql = format!(
            "{} WHERE v.version = (SELECT MAX(version) FROM schema_versions \
             WHERE schema_name = s.name) ORDER BY s.name",
            SELECT_VERSION_ROW
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], map_version_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn list_schema_versions(&self, name: &str) -> Result<Vec<SchemaVersionRow>> {
        let sql = format!("{} WHERE s.name = ?1 ORDER BY v.version ASC", SELECT_VERSION_ROW);
        self.query_rows(&sql, name)
    }

    fn insert_mapping(
        &self,
        id: u64,
        schema_name: &str,
        rules_json: &str,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let id = i64::try_from(id)
            .map_err(|_| SchemaError::Storage(format!("mapping id {} out of range", id)))?;
        let conn = self.connection.lock();
        conn.execute(
            "INSERT INTO mappings (id, schema_name, rules, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, schema_name, rules_json, created_at.to_rfc3339()],
        )?;
        Ok(())
    }

    fn next_mapping_id(&self) -> Result<u64> {
        let mut conn = self.connection.lock();
        let tx = conn.transaction()?;
        tx.execute("UPDATE mapping_seq SET value = value + 1", [])?;
        let next: i64 = tx.query_row("SELECT value FROM mapping_seq", [], |row| row.get(0))?;
        tx.commit()?;
        Ok(next as u64)
    }

    fn latest_mapping_for_schema(&self, schema_name: &str) -> Result<Option<MappingRow>> {
        let conn = self.connection.lock();
        let row = conn
            .query_row(
                "SELECT id, schema_name, rules, created_at FROM mappings \
                 WHERE schema_name = ?1 ORDER BY id DESC LIMIT 1",
                params![schema_name],
                |row| {
                    let id: i64 = row.get(0)?;
                    Ok(MappingRow {
                        id: id as u64,
                        schema_name: row.get(1)?,
                        rules: Value::String(row.get(2)?),
                        created_at: timestamp(row, 3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }
}

fn insert_schema_row(conn: &Connection, name: &str, description: Option<&str>) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO schemas (name, description, created_at) VALUES (?1, ?2, ?3)",
        params![name, description, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn max_version_of(conn: &Connection, name: &str) -> Result<Option<u32>> {
    let max: Option<u32> = conn.query_row(
        "SELECT MAX(version) FROM schema_versions WHERE schema_name = ?1",
        params![name],
        |row| row.get(0),
    )?;
    Ok(max)
}

fn insert_version_row(
    conn: &Connection,
    name: &str,
    version: u32,
    document_json: &str,
    checksum: &Checksum,
    created_at: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_versions (schema_name, version, document, checksum, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            name,
            version,
            document_json,
            checksum.as_str(),
            created_at.to_rfc3339()
        ],
    )?;
    Ok(())
}

fn map_version_row(row: &Row<'_>) -> rusqlite::Result<SchemaVersionRow> {
    Ok(SchemaVersionRow {
        name: row.get(0)?,
        description: row.get(1)?,
        version: row.get(2)?,
        document: Value::String(row.get(3)?),
        checksum: row.get(4)?,
        created_at: timestamp(row, 5)?,
    })
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn initialize_layout(connection: &mut Connection) -> Result<()> {
    let tx = connection.transaction()?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", [], |row| row.get(0))
        .optional()?;
    match version {
        None => {
            tx.execute(
                "INSERT INTO store_meta (version) VALUES (?1)",
                params![LAYOUT_VERSION],
            )?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS schemas (
                    name TEXT PRIMARY KEY,
                    description TEXT,
                    created_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS schema_versions (
                    schema_name TEXT NOT NULL,
                    version INTEGER NOT NULL,
                    document TEXT NOT NULL,
                    checksum TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    PRIMARY KEY (schema_name, version),
                    FOREIGN KEY (schema_name) REFERENCES schemas(name)
                );
                CREATE TABLE IF NOT EXISTS mappings (
                    id INTEGER PRIMARY KEY,
                    schema_name TEXT NOT NULL,
                    rules TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_mappings_schema ON mappings (schema_name, id);
                CREATE TABLE IF NOT EXISTS mapping_seq (value INTEGER NOT NULL);
                INSERT INTO mapping_seq (value) VALUES (0);",
            )?;
        }
        Some(v) if v == LAYOUT_VERSION => {}
        Some(v) => {
            return Err(SchemaError::Storage(format!(
                "unsupported storage layout version: {}",
                v
            )))
        }
    }
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn append(storage: &SqliteStorage, name: &str, doc: Value) -> u32 {
        storage
            .append_schema_version(
                name,
                None,
                &doc.to_string(),
                &Checksum::from_json(&doc),
                Utc::now(),
            )
            .unwrap()
            .version
    }

    fn versions(storage: &SqliteStorage, name: &str) -> Vec<u32> {
        storage
            .list_schema_versions(name)
            .unwrap()
            .into_iter()
            .map(|r| r.version)
            .collect()
    }

    #[test]
    fn test_rows_come_back_serialized() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        append(&storage, "orders", json!({"type": "object"}));

        let row = storage.get_schema_version("orders", 1).unwrap().unwrap();
        assert!(row.document.is_string());
        let (_, version) = row.into_parts().unwrap();
        assert_eq!(version.document, json!({"type": "object"}));
        assert!(version.verify_checksum());
    }

    #[test]
    fn test_append_assigns_next_version() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let first = storage
            .append_schema_version("orders", Some("Orders"), "{}", &Checksum::from("x"), Utc::now())
            .unwrap();
        let second = storage
            .append_schema_version("orders", Some("other"), "{}", &Checksum::from("y"), Utc::now())
            .unwrap();
        assert_eq!((first.version, second.version), (1, 2));
        assert_eq!(second.description.as_deref(), Some("Orders"));
        assert_eq!(append(&storage, "customers", json!({})), 1);
    }

    #[test]
    fn test_primary_key_guards_versions() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage.insert_schema("orders", None).unwrap();
        storage
            .insert_schema_version("orders", 1, "{}", &Checksum::from("x"), Utc::now())
            .unwrap();
        let dup = storage.insert_schema_version("orders", 1, "{}", &Checksum::from("x"), Utc::now());
        assert!(matches!(dup, Err(SchemaError::Sqlite(_))));
        assert_eq!(storage.max_version("orders").unwrap(), Some(1));
        assert_eq!(append(&storage, "orders", json!({})), 2);
    }

    #[test]
    fn test_version_requires_schema_row() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let orphan = storage.insert_schema_version("ghost", 1, "{}", &Checksum::from("x"), Utc::now());
        assert!(orphan.is_err());
        assert_eq!(storage.max_version("ghost").unwrap(), None);
    }

    #[test]
    fn test_mapping_ids_and_latest() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let first = storage.next_mapping_id().unwrap();
        let second = storage.next_mapping_id().unwrap();
        assert_eq!((first, second), (1, 2));

        storage.insert_mapping(first, "orders", r#"{"a":"b"}"#, Utc::now()).unwrap();
        storage.insert_mapping(second, "orders", r#"{"c":"d"}"#, Utc::now()).unwrap();
        let latest = storage.latest_mapping_for_schema("orders").unwrap().unwrap();
        assert_eq!(latest.id, 2);
        assert!(storage.latest_mapping_for_schema("other").unwrap().is_none());
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempdir().unwrap();
        let config = SqliteStorageConfig::new(dir.path().join("nested/schemas.sqlite3"));
        {
            let storage = SqliteStorage::open(&config).unwrap();
            append(&storage, "orders", json!({"type": "object"}));
            append(&storage, "orders", json!({"type": "object", "required": ["id"]}));
            storage.next_mapping_id().unwrap();
        }

        let storage = SqliteStorage::open(&config).unwrap();
        assert_eq!(versions(&storage, "orders"), vec![1, 2]);
        assert_eq!(storage.next_mapping_id().unwrap(), 2);
    }

    #[test]
    fn test_separate_connections_share_version_sequence() {
        let dir = tempdir().unwrap();
        let config = SqliteStorageConfig::new(dir.path().join("schemas.sqlite3"));
        let left = SqliteStorage::open(&config).unwrap();
        let right = SqliteStorage::open(&config).unwrap();

        std::thread::scope(|s| {
            for storage in [&left, &right] {
                s.spawn(move || {
                    for i in 0..25 {
                        append(storage, "hot", json!({"i": i}));
                    }
                });
            }
        });

        assert_eq!(versions(&left, "hot"), (1..=50).collect::<Vec<_>>());
    }
}
