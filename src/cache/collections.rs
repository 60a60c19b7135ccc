//! Per-schema collection store: tagged query results and their status.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

use super::traits::Reducer;
use crate::event::{resource_id, DerivedEvent, DerivedKind};
use crate::status::{create_status, update_status, Status, StatusPatch};

/// Result of one query: identifiers in server order plus a status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCollection {
  pub ids: Vec<String>,
  pub status: Status,
}

impl Default for StoredCollection {
  fn default() -> Self {
    Self {
      ids: Vec::new(),
      status: create_status(),
    }
  }
}

/// All collections of one schema, keyed by tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionPartition {
  collections: BTreeMap<String, Arc<StoredCollection>>,
}

impl CollectionPartition {
  pub fn get(&self, tag: &str) -> Option<&StoredCollection> {
    self.collections.get(tag).map(|collection| collection.as_ref())
  }

  pub fn tags(&self) -> impl Iterator<Item = &str> {
    self.collections.keys().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.collections.len()
  }

  pub fn is_empty(&self) -> bool {
    self.collections.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &StoredCollection)> {
    self
      .collections
      .iter()
      .map(|(tag, collection)| (tag.as_str(), collection.as_ref()))
  }

  pub(crate) fn insert(&mut self, tag: String, collection: StoredCollection) {
    self.collections.insert(tag, Arc::new(collection));
  }

  fn with(&self, tag: &str, collection: StoredCollection) -> Self {
    let mut next = self.clone();
    next.insert(tag.to_string(), collection);
    next
  }
}

/// Reducer for the collections of one schema. Tags are matched exactly; the
/// wildcard tag is an ordinary key at this level.
#[derive(Debug, Clone)]
pub struct CollectionStore {
  schema: String,
}

impl CollectionStore {
  pub fn new(schema: impl Into<String>) -> Self {
    Self {
      schema: schema.into(),
    }
  }
}

impl Reducer for CollectionStore {
  type State = CollectionPartition;

  fn schema(&self) -> &str {
    &self.schema
  }

  fn reduce(
    &self,
    state: &Arc<CollectionPartition>,
    event: &DerivedEvent,
  ) -> Arc<CollectionPartition> {
    if !self.accepts(event) || !event.kind.is_collection() {
      return Arc::clone(state);
    }

    if event.kind == DerivedKind::CollectionClear {
      if state.is_empty() {
        return Arc::clone(state);
      }
      trace!(schema = %self.schema, tags = state.len(), "clearing collections");
      return self.initial_state();
    }

    let Some(tag) = event.tag() else {
      trace!(schema = %self.schema, kind = ?event.kind, "collection event without tag ignored");
      return Arc::clone(state);
    };
    let previous = state.get(tag);

    match event.kind {
      DerivedKind::CollectionFetched => {
        let ids = event.items().iter().filter_map(resource_id).collect();
        let base = previous.map(|c| c.status.clone()).unwrap_or_else(create_status);
        let patch = StatusPatch::default().with_transformation(event.meta.transformation.as_ref());
        let collection = StoredCollection {
          ids,
          status: update_status(&base, &patch),
        };
        Arc::new(state.with(tag, collection))
      }
      DerivedKind::CollectionStatus => {
        let patch: StatusPatch = match serde_json::from_value(event.payload.clone()) {
          Ok(patch) => patch,
          Err(err) => {
            trace!(schema = %self.schema, %tag, %err, "malformed status payload ignored");
            return Arc::clone(state);
          }
        };
        let current = previous.cloned().unwrap_or_default();
        let status = current.status.merged(&patch);
        if previous.is_some() && status == current.status {
          return Arc::clone(state);
        }
        let collection = StoredCollection {
          ids: current.ids,
          status,
        };
        Arc::new(state.with(tag, collection))
      }
      _ => Arc::clone(state),
    }
  }
}
