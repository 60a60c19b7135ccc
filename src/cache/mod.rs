//! Normalized, schema-partitioned cache.
//!
//! This module holds the state side of the synchronization layer:
//! - Per-schema object stores keyed by resource identifier
//! - Per-schema collection stores keyed by query tag
//! - A layer that hosts both for every schema and hands out snapshots
//! - Optional snapshot persistence for offline start-up

mod collections;
mod layer;
mod objects;
mod storage;
mod traits;

pub use collections::{CollectionPartition, CollectionStore, StoredCollection};
pub use layer::{CacheLayer, SchemaPartitions, Snapshot};
pub use objects::{ObjectPartition, ObjectStore, StoredObject};
pub use storage::{NoopStorage, SnapshotStorage, SqliteStorage, StoredSnapshot};
pub use traits::Reducer;
