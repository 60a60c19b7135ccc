//! Per-schema object store.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

use super::traits::Reducer;
use crate::event::{resource_id, DerivedEvent, DerivedKind};
use crate::merge::merged;
use crate::status::{
  create_status, update_status, BusyStatus, Status, StatusPatch, ValidationStatus,
};

/// A cached resource object. The status lives beside the data, so anything
/// reading `data` never sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
  pub data: Value,
  pub status: Status,
}

/// All objects of one schema, keyed by identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectPartition {
  objects: BTreeMap<String, Arc<StoredObject>>,
}

impl ObjectPartition {
  pub fn get(&self, id: &str) -> Option<&StoredObject> {
    self.objects.get(id).map(Arc::as_ref)
  }

  pub fn contains(&self, id: &str) -> bool {
    self.objects.contains_key(id)
  }

  pub fn len(&self) -> usize {
    self.objects.len()
  }

  pub fn is_empty(&self) -> bool {
    self.objects.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &StoredObject)> {
    self
      .objects
      .iter()
      .map(|(id, object)| (id.as_str(), object.as_ref()))
  }

  pub(crate) fn insert(&mut self, id: String, object: StoredObject) {
    self.objects.insert(id, Arc::new(object));
  }
}

/// Reducer for the objects of one schema.
#[derive(Debug, Clone)]
pub struct ObjectStore {
  schema: String,
}

impl ObjectStore {
  pub fn new(schema: impl Into<String>) -> Self {
    Self {
      schema: schema.into(),
    }
  }
}

impl Reducer for ObjectStore {
  type State = ObjectPartition;

  fn schema(&self) -> &str {
    &self.schema
  }

  fn reduce(&self, state: &Arc<ObjectPartition>, event: &DerivedEvent) -> Arc<ObjectPartition> {
    if !self.accepts(event) || event.kind.is_collection() {
      return Arc::clone(state);
    }

    let transformation = event.meta.transformation.as_ref();
    // Cloned lazily, on the first item that actually changes something.
    let mut next: Option<ObjectPartition> = None;

    for item in event.items() {
      let Some(id) = resource_id(item) else {
        trace!(schema = %self.schema, kind = ?event.kind, "skipping item without identifier");
        continue;
      };
      let current = next.as_ref().unwrap_or(&**state).objects.get(&id).cloned();

      match event.kind {
        DerivedKind::ObjectsFetched | DerivedKind::ObjectsCreated => {
          let patch = StatusPatch::default().with_transformation(transformation);
          let object = StoredObject {
            data: item.clone(),
            status: update_status(&create_status(), &patch),
          };
          next.get_or_insert_with(|| (**state).clone()).insert(id, object);
        }
        DerivedKind::ObjectsUpdating | DerivedKind::ObjectsUpdated => {
          let Some(current) = current else {
            trace!(schema = %self.schema, %id, "update for unknown object ignored");
            continue;
          };
          let patch = if event.kind == DerivedKind::ObjectsUpdating {
            StatusPatch::new(ValidationStatus::Invalid, BusyStatus::Busy)
          } else {
            StatusPatch::new(ValidationStatus::Valid, BusyStatus::Idle)
          };
          let object = StoredObject {
            data: merged(&current.data, item),
            status: update_status(&current.status, &patch.with_transformation(transformation)),
          };
          next.get_or_insert_with(|| (**state).clone()).insert(id, object);
        }
        DerivedKind::ObjectsUpdateFailed => {
          let Some(current) = current else {
            continue;
          };
          let object = StoredObject {
            data: current.data.clone(),
            status: current.status.merged(&StatusPatch::busy(BusyStatus::Idle)),
          };
          next.get_or_insert_with(|| (**state).clone()).insert(id, object);
        }
        DerivedKind::ObjectsRemoving | DerivedKind::ObjectsRemoved => {
          if current.is_some() {
            next
              .get_or_insert_with(|| (**state).clone())
              .objects
              .remove(&id);
          }
        }
        DerivedKind::CollectionFetched
        | DerivedKind::CollectionStatus
        | DerivedKind::CollectionClear => {}
      }
    }

    match next {
      Some(next) => Arc::new(next),
      None => Arc::clone(state),
    }
  }
}
