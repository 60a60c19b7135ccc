//! Cache layer that hosts the per-schema stores and applies derived events.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::collections::{CollectionPartition, CollectionStore, StoredCollection};
use super::objects::{ObjectPartition, ObjectStore, StoredObject};
use super::traits::Reducer;
use crate::engine::Dispatcher;
use crate::event::DerivedEvent;

/// Object and collection partitions of one schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaPartitions {
  pub objects: Arc<ObjectPartition>,
  pub collections: Arc<CollectionPartition>,
}

/// Immutable view of every schema. Cloning only copies `Arc`s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
  schemas: BTreeMap<String, SchemaPartitions>,
}

impl Snapshot {
  /// id → object mapping of a schema.
  pub fn objects(&self, schema: &str) -> Option<&ObjectPartition> {
    self.schemas.get(schema).map(|p| p.objects.as_ref())
  }

  pub fn object(&self, schema: &str, id: &str) -> Option<&StoredObject> {
    self.objects(schema)?.get(id)
  }

  pub fn collections(&self, schema: &str) -> Option<&CollectionPartition> {
    self.schemas.get(schema).map(|p| p.collections.as_ref())
  }

  /// Ordered ids and status of a tagged query result.
  pub fn collection(&self, schema: &str, tag: &str) -> Option<&StoredCollection> {
    self.collections(schema)?.get(tag)
  }

  pub fn schemas(&self) -> impl Iterator<Item = (&str, &SchemaPartitions)> {
    self.schemas.iter().map(|(schema, p)| (schema.as_str(), p))
  }

  pub fn is_empty(&self) -> bool {
    self.schemas.is_empty()
  }

  pub(crate) fn insert(&mut self, schema: String, partitions: SchemaPartitions) {
    self.schemas.insert(schema, partitions);
  }
}

struct SchemaStores {
  objects: ObjectStore,
  collections: CollectionStore,
}

impl SchemaStores {
  fn new(schema: &str) -> Self {
    Self {
      objects: ObjectStore::new(schema),
      collections: CollectionStore::new(schema),
    }
  }
}

/// Owns one object store and one collection store per schema, created on
/// the first event naming that schema.
///
/// This is the single writer: every mutation goes through [`CacheLayer::apply`]
/// and replaces partitions copy-on-write, so snapshots handed out earlier
/// never change.
#[derive(Default)]
pub struct CacheLayer {
  stores: BTreeMap<String, SchemaStores>,
  state: Snapshot,
  revision: u64,
}

impl CacheLayer {
  pub fn new() -> Self {
    Self::default()
  }

  /// Seed the layer with previously persisted state.
  pub fn restore(snapshot: Snapshot) -> Self {
    let stores = snapshot
      .schemas
      .keys()
      .map(|schema| (schema.clone(), SchemaStores::new(schema)))
      .collect();

    Self {
      stores,
      state: snapshot,
      revision: 0,
    }
  }

  /// Apply a derived event. Returns whether any partition changed.
  pub fn apply(&mut self, event: &DerivedEvent) -> bool {
    let schema = event.schema();
    let stores = self
      .stores
      .entry(schema.to_string())
      .or_insert_with(|| SchemaStores::new(schema));
    // Unknown schemas reduce against empty partitions and only enter the
    // snapshot once something was actually stored.
    let current = match self.state.schemas.get(schema) {
      Some(partitions) => partitions.clone(),
      None => SchemaPartitions {
        objects: stores.objects.initial_state(),
        collections: stores.collections.initial_state(),
      },
    };

    let objects = stores.objects.reduce(&current.objects, event);
    let collections = stores.collections.reduce(&current.collections, event);

    let changed = !Arc::ptr_eq(&objects, &current.objects)
      || !Arc::ptr_eq(&collections, &current.collections);
    if changed {
      self.state.insert(
        schema.to_string(),
        SchemaPartitions {
          objects,
          collections,
        },
      );
      self.revision += 1;
    }

    debug!(kind = ?event.kind, schema, tag = ?event.tag(), changed, "applied derived event");
    changed
  }

  /// Drop every tagged collection of `schema`.
  pub fn clear(&mut self, schema: &str) -> bool {
    self.apply(&crate::actions::clear(schema))
  }

  pub fn snapshot(&self) -> Snapshot {
    self.state.clone()
  }

  /// Number of state changes applied since construction.
  pub fn revision(&self) -> u64 {
    self.revision
  }

  pub fn objects(&self, schema: &str) -> Option<&ObjectPartition> {
    self.state.objects(schema)
  }

  pub fn collection(&self, schema: &str, tag: &str) -> Option<&StoredCollection> {
    self.state.collection(schema, tag)
  }
}

impl Dispatcher for CacheLayer {
  fn dispatch(&mut self, event: DerivedEvent) {
    self.apply(&event);
  }
}
