//! Synchronization engine.
//!
//! Intercepts lifecycle events, validates their envelope and decomposes each
//! one into an ordered sequence of derived events for the object and
//! collection stores of every schema it touches. The original event is always
//! handed back for forwarding; the engine augments traffic, it never
//! swallows it.

mod envelope;

pub use envelope::PrimaryData;

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::SyncResult;
use crate::event::{DerivedEvent, DerivedKind, DerivedMeta, InboundEvent, LifecycleKind};
use crate::query::WILDCARD_TAG;
use crate::status::{BusyStatus, StatusPatch, ValidationStatus};
use envelope::Envelope;

/// Default marker identifying events produced for this engine.
pub const DEFAULT_SOURCE: &str = "@@api_state/json_api";

/// Consumer of derived events.
pub trait Dispatcher {
  fn dispatch(&mut self, event: DerivedEvent);
}

impl Dispatcher for Vec<DerivedEvent> {
  fn dispatch(&mut self, event: DerivedEvent) {
    self.push(event);
  }
}

#[derive(Debug, Clone)]
pub struct SyncEngine {
  source: String,
}

impl Default for SyncEngine {
  fn default() -> Self {
    Self::new(DEFAULT_SOURCE)
  }
}

impl SyncEngine {
  /// Engine that only handles events whose `meta.source` equals `source`.
  pub fn new(source: impl Into<String>) -> Self {
    Self {
      source: source.into(),
    }
  }

  pub fn source(&self) -> &str {
    &self.source
  }

  /// Decompose `event` into `dispatcher` and return it for forwarding.
  ///
  /// Every derived event is dispatched before this returns. Events that are
  /// not lifecycle kinds, or that carry another source marker, are returned
  /// without dispatching anything.
  pub fn handle<D>(&self, event: InboundEvent, dispatcher: &mut D) -> SyncResult<InboundEvent>
  where
    D: Dispatcher + ?Sized,
  {
    match envelope::validate(&event, &self.source)? {
      Some(envelope) => self.decompose(envelope, dispatcher),
      None => trace!(kind = %event.kind, "passing through foreign event"),
    }
    Ok(event)
  }

  /// Derived events for `event`, in dispatch order.
  pub fn derive(&self, event: &InboundEvent) -> SyncResult<Vec<DerivedEvent>> {
    let mut derived = Vec::new();
    if let Some(envelope) = envelope::validate(event, &self.source)? {
      self.decompose(envelope, &mut derived);
    }
    Ok(derived)
  }

  fn decompose<D>(&self, envelope: Envelope<'_>, dispatcher: &mut D)
  where
    D: Dispatcher + ?Sized,
  {
    let mut count = 0usize;
    let mut emit = |event: DerivedEvent| {
      count += 1;
      dispatcher.dispatch(event);
    };

    // Included resources first, so primary data can reference them.
    for (schema, items) in group_by_type(&envelope.included) {
      emit(objects_event(&envelope, DerivedKind::ObjectsFetched, &schema, items));
    }

    let data = envelope.data.clone();
    let schema = envelope.schema;
    let invalid_busy = StatusPatch::new(ValidationStatus::Invalid, BusyStatus::Busy);
    let invalid_idle = StatusPatch::new(ValidationStatus::Invalid, BusyStatus::Idle);

    match envelope.kind {
      LifecycleKind::LoadRequest => {
        if let Some(tag) = envelope.tag {
          emit(status_event(&envelope, tag, &StatusPatch::busy(BusyStatus::Busy)));
        }
      }
      LifecycleKind::LoadSuccess => {
        emit(objects_event(&envelope, DerivedKind::ObjectsFetched, schema, data.clone()));
        if let Some(tag) = envelope.tag {
          emit(collection_event(
            &envelope,
            DerivedKind::CollectionFetched,
            tag,
            Value::Array(data),
          ));
        }
      }
      LifecycleKind::LoadError => {
        if let Some(tag) = envelope.tag {
          emit(status_event(&envelope, tag, &StatusPatch::busy(BusyStatus::Idle)));
        }
      }
      LifecycleKind::CreateRequest => {
        emit(status_event(&envelope, WILDCARD_TAG, &invalid_busy));
      }
      LifecycleKind::CreateSuccess => {
        emit(objects_event(&envelope, DerivedKind::ObjectsCreated, schema, data));
        emit(status_event(&envelope, WILDCARD_TAG, &invalid_idle));
      }
      LifecycleKind::UpdateRequest => {
        emit(status_event(&envelope, WILDCARD_TAG, &invalid_busy));
        emit(objects_event(&envelope, DerivedKind::ObjectsUpdating, schema, data));
      }
      LifecycleKind::UpdateSuccess => {
        emit(objects_event(&envelope, DerivedKind::ObjectsUpdated, schema, data));
        emit(status_event(&envelope, WILDCARD_TAG, &invalid_idle));
      }
      LifecycleKind::RemoveRequest => {
        emit(status_event(&envelope, WILDCARD_TAG, &invalid_busy));
        emit(objects_event(&envelope, DerivedKind::ObjectsRemoving, schema, data));
      }
      LifecycleKind::RemoveSuccess => {
        emit(objects_event(&envelope, DerivedKind::ObjectsRemoved, schema, data));
        emit(status_event(&envelope, WILDCARD_TAG, &invalid_idle));
      }
      LifecycleKind::UpdateError => {
        if !data.is_empty() {
          emit(objects_event(&envelope, DerivedKind::ObjectsUpdateFailed, schema, data));
        }
        emit(status_event(&envelope, WILDCARD_TAG, &invalid_idle));
      }
      LifecycleKind::CreateError | LifecycleKind::RemoveError => {
        emit(status_event(&envelope, WILDCARD_TAG, &invalid_idle));
      }
    }

    debug!(
      kind = %envelope.kind,
      schema,
      tag = ?envelope.tag,
      derived = count,
      "decomposed lifecycle event"
    );
  }
}

fn objects_event(envelope: &Envelope<'_>, kind: DerivedKind, schema: &str, items: Vec<Value>) -> DerivedEvent {
  DerivedEvent::new(
    kind,
    Value::Array(items),
    DerivedMeta::from_source(envelope.meta, schema),
  )
}

fn collection_event(envelope: &Envelope<'_>, kind: DerivedKind, tag: &str, payload: Value) -> DerivedEvent {
  DerivedEvent::new(
    kind,
    payload,
    DerivedMeta::from_source(envelope.meta, envelope.schema).with_tag(tag),
  )
}

fn status_event(envelope: &Envelope<'_>, tag: &str, patch: &StatusPatch) -> DerivedEvent {
  collection_event(envelope, DerivedKind::CollectionStatus, tag, patch.to_value())
}

/// Group included resources by their `type`, in order of first appearance.
fn group_by_type(included: &[Value]) -> Vec<(String, Vec<Value>)> {
  let mut groups: Vec<(String, Vec<Value>)> = Vec::new();

  for item in included {
    let Some(kind) = item.get("type").and_then(Value::as_str) else {
      warn!(?item, "included resource without type skipped");
      continue;
    };
    match groups.iter_mut().find(|(schema, _)| schema == kind) {
      Some((_, items)) => items.push(item.clone()),
      None => groups.push((kind.to_string(), vec![item.clone()])),
    }
  }

  groups
}
