//! Snapshot storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::collections::{CollectionPartition, StoredCollection};
use super::layer::{SchemaPartitions, Snapshot};
use super::objects::{ObjectPartition, StoredObject};
use crate::status::Status;

/// A persisted snapshot.
#[derive(Debug, Clone)]
pub struct StoredSnapshot {
  pub snapshot: Snapshot,
  /// When the snapshot was written
  pub cached_at: DateTime<Utc>,
}

/// Trait for snapshot storage backends.
pub trait SnapshotStorage: Send + Sync {
  /// Replace whatever was stored with `snapshot`.
  fn save(&self, snapshot: &Snapshot) -> Result<()>;

  /// Load the last saved snapshot, if any.
  fn load(&self) -> Result<Option<StoredSnapshot>>;
}

/// Storage implementation that doesn't persist anything.
/// Used when persistence is disabled - all operations are no-ops.
pub struct NoopStorage;

impl SnapshotStorage for NoopStorage {
  fn save(&self, _snapshot: &Snapshot) -> Result<()> {
    Ok(()) // Discard
  }

  fn load(&self) -> Result<Option<StoredSnapshot>> {
    Ok(None) // Always miss
  }
}

/// SQLite-based snapshot storage.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open the database at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// Database that lives only as long as this value.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("apistate").join("snapshot.db"))
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Run database migrations for snapshot tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(SNAPSHOT_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for snapshot tables.
const SNAPSHOT_SCHEMA: &str = r#"
-- One row per saved snapshot (only the latest is kept)
CREATE TABLE IF NOT EXISTS snapshot_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Schemas present in the snapshot, including empty ones
CREATE TABLE IF NOT EXISTS schema_cache (
    schema TEXT PRIMARY KEY
);

-- Objects with their status, serialized as JSON
CREATE TABLE IF NOT EXISTS object_cache (
    schema TEXT NOT NULL,
    object_id TEXT NOT NULL,
    data BLOB NOT NULL,
    status BLOB NOT NULL,
    PRIMARY KEY (schema, object_id)
);

-- Tagged collections; ids are a JSON array in server order
CREATE TABLE IF NOT EXISTS collection_cache (
    schema TEXT NOT NULL,
    tag TEXT NOT NULL,
    ids BLOB NOT NULL,
    status BLOB NOT NULL,
    PRIMARY KEY (schema, tag)
);
"#;

impl SnapshotStorage for SqliteStorage {
  fn save(&self, snapshot: &Snapshot) -> Result<()> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute_batch(
      "DELETE FROM collection_cache;
       DELETE FROM object_cache;
       DELETE FROM schema_cache;",
    )
    .map_err(|e| eyre!("Failed to delete old snapshot: {}", e))?;

    for (schema, partitions) in snapshot.schemas() {
      tx.execute("INSERT INTO schema_cache (schema) VALUES (?)", params![schema])
        .map_err(|e| eyre!("Failed to store schema {}: {}", schema, e))?;

      for (id, object) in partitions.objects.iter() {
        let data = serde_json::to_vec(&object.data)
          .map_err(|e| eyre!("Failed to serialize object: {}", e))?;
        let status = serde_json::to_vec(&object.status)
          .map_err(|e| eyre!("Failed to serialize status: {}", e))?;

        tx.execute(
          "INSERT INTO object_cache (schema, object_id, data, status) VALUES (?, ?, ?, ?)",
          params![schema, id, data, status],
        )
        .map_err(|e| eyre!("Failed to store object: {}", e))?;
      }

      for (tag, collection) in partitions.collections.iter() {
        let ids = serde_json::to_vec(&collection.ids)
          .map_err(|e| eyre!("Failed to serialize collection ids: {}", e))?;
        let status = serde_json::to_vec(&collection.status)
          .map_err(|e| eyre!("Failed to serialize status: {}", e))?;

        tx.execute(
          "INSERT INTO collection_cache (schema, tag, ids, status) VALUES (?, ?, ?, ?)",
          params![schema, tag, ids, status],
        )
        .map_err(|e| eyre!("Failed to store collection: {}", e))?;
      }
    }

    tx.execute(
      "INSERT OR REPLACE INTO snapshot_meta (id, cached_at) VALUES (1, datetime('now'))",
      [],
    )
    .map_err(|e| eyre!("Failed to update snapshot metadata: {}", e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn load(&self) -> Result<Option<StoredSnapshot>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let cached_at: Option<String> = conn
      .query_row("SELECT cached_at FROM snapshot_meta WHERE id = 1", [], |row| row.get(0))
      .optional()
      .map_err(|e| eyre!("Failed to read snapshot metadata: {}", e))?;

    let Some(cached_at) = cached_at else {
      return Ok(None);
    };
    let cached_at = parse_datetime(&cached_at)?;

    let mut snapshot = Snapshot::default();

    let schemas: Vec<String> = {
      let mut stmt = conn
        .prepare("SELECT schema FROM schema_cache ORDER BY schema")
        .map_err(|e| eyre!("Failed to prepare schema query: {}", e))?;
      let rows = stmt
        .query_map([], |row| row.get(0))
        .map_err(|e| eyre!("Failed to query schemas: {}", e))?;
      let schemas = rows
        .collect::<rusqlite::Result<Vec<String>>>()
        .map_err(|e| eyre!("Failed to read schema row: {}", e))?;
      schemas
    };

    for schema in schemas {
      let objects = load_objects(&conn, &schema)?;
      let collections = load_collections(&conn, &schema)?;
      snapshot.insert(
        schema,
        SchemaPartitions {
          objects: Arc::new(objects),
          collections: Arc::new(collections),
        },
      );
    }

    Ok(Some(StoredSnapshot {
      snapshot,
      cached_at,
    }))
  }
}

fn load_objects(conn: &Connection, schema: &str) -> Result<ObjectPartition> {
  let mut stmt = conn
    .prepare("SELECT object_id, data, status FROM object_cache WHERE schema = ?")
    .map_err(|e| eyre!("Failed to prepare object query: {}", e))?;

  let rows = stmt
    .query_map(params![schema], |row| {
      Ok((
        row.get::<_, String>(0)?,
        row.get::<_, Vec<u8>>(1)?,
        row.get::<_, Vec<u8>>(2)?,
      ))
    })
    .map_err(|e| eyre!("Failed to query objects: {}", e))?;

  let mut partition = ObjectPartition::default();
  for row in rows {
    let (id, data, status) = row.map_err(|e| eyre!("Failed to read object row: {}", e))?;
    let object = StoredObject {
      data: serde_json::from_slice(&data)
        .map_err(|e| eyre!("Failed to deserialize object {}: {}", id, e))?,
      status: parse_status(&status)?,
    };
    partition.insert(id, object);
  }

  Ok(partition)
}

fn load_collections(conn: &Connection, schema: &str) -> Result<CollectionPartition> {
  let mut stmt = conn
    .prepare("SELECT tag, ids, status FROM collection_cache WHERE schema = ?")
    .map_err(|e| eyre!("Failed to prepare collection query: {}", e))?;

  let rows = stmt
    .query_map(params![schema], |row| {
      Ok((
        row.get::<_, String>(0)?,
        row.get::<_, Vec<u8>>(1)?,
        row.get::<_, Vec<u8>>(2)?,
      ))
    })
    .map_err(|e| eyre!("Failed to query collections: {}", e))?;

  let mut partition = CollectionPartition::default();
  for row in rows {
    let (tag, ids, status) = row.map_err(|e| eyre!("Failed to read collection row: {}", e))?;
    let collection = StoredCollection {
      ids: serde_json::from_slice(&ids)
        .map_err(|e| eyre!("Failed to deserialize collection {}: {}", tag, e))?,
      status: parse_status(&status)?,
    };
    partition.insert(tag, collection);
  }

  Ok(partition)
}

fn parse_status(bytes: &[u8]) -> Result<Status> {
  serde_json::from_slice(bytes).map_err(|e| eyre!("Failed to deserialize status: {}", e))
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheLayer;
  use crate::event::{DerivedEvent, DerivedKind, DerivedMeta};
  use crate::status::{BusyStatus, StatusPatch, ValidationStatus};
  use serde_json::{json, Map, Value};

  fn event(kind: DerivedKind, schema: &str, tag: Option<&str>, payload: Value) -> DerivedEvent {
    let mut meta = DerivedMeta::from_source(&Map::new(), schema);
    meta.tag = tag.map(String::from);
    DerivedEvent::new(kind, payload, meta)
  }

  fn populated_layer() -> CacheLayer {
    let mut layer = CacheLayer::new();
    layer.apply(&event(
      DerivedKind::ObjectsFetched,
      "articles",
      None,
      json!([{ "id": 1, "attributes": { "title": "a" } }, { "id": "two" }]),
    ));
    layer.apply(&event(
      DerivedKind::CollectionFetched,
      "articles",
      Some("page=1"),
      json!([{ "id": "two" }, { "id": 1 }]),
    ));
    layer.apply(&event(
      DerivedKind::CollectionStatus,
      "articles",
      Some("*"),
      StatusPatch::new(ValidationStatus::Invalid, BusyStatus::Busy).to_value(),
    ));
    // schema whose only object was removed again
    layer.apply(&event(DerivedKind::ObjectsFetched, "people", None, json!([{ "id": 9 }])));
    layer.apply(&event(DerivedKind::ObjectsRemoved, "people", None, json!([{ "id": 9 }])));
    layer
  }

  #[test]
  fn test_load_before_save_is_none() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    assert!(storage.load().unwrap().is_none());
  }

  #[test]
  fn test_save_then_load() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let layer = populated_layer();

    storage.save(&layer.snapshot()).unwrap();
    let stored = storage.load().unwrap().unwrap();

    assert_eq!(stored.snapshot, layer.snapshot());
    assert_eq!(
      stored.snapshot.collection("articles", "page=1").unwrap().ids,
      vec!["two", "1"]
    );
    assert!(stored.snapshot.objects("people").unwrap().is_empty());
  }

  #[test]
  fn test_save_replaces_previous_snapshot() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let mut layer = populated_layer();
    storage.save(&layer.snapshot()).unwrap();

    layer.apply(&event(DerivedKind::ObjectsRemoved, "articles", None, json!({ "id": 1 })));
    storage.save(&layer.snapshot()).unwrap();

    let stored = storage.load().unwrap().unwrap();
    assert!(stored.snapshot.object("articles", "1").is_none());
    assert!(stored.snapshot.object("articles", "two").is_some());
  }

  #[test]
  fn test_file_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("snapshot.db");
    let layer = populated_layer();

    SqliteStorage::open(&path).unwrap().save(&layer.snapshot()).unwrap();
    let stored = SqliteStorage::open(&path).unwrap().load().unwrap().unwrap();
    assert_eq!(stored.snapshot, layer.snapshot());
  }

  #[test]
  fn test_noop_storage() {
    let storage = NoopStorage;
    storage.save(&populated_layer().snapshot()).unwrap();
    assert!(storage.load().unwrap().is_none());
  }
}
