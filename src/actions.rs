//! Constructors for lifecycle events produced outside the transport layer,
//! e.g. server-rendered or pushed documents.

use serde_json::{Map, Value};

use crate::error::{SyncError, SyncResult};
use crate::event::{DerivedEvent, DerivedKind, DerivedMeta, InboundEvent, LifecycleKind};

/// LOAD_SUCCESS for a document fetched out of band.
pub fn loaded(payload: Value, schema: &str, tag: Option<&str>, source: &str) -> SyncResult<InboundEvent> {
  check_document(&payload)?;
  let mut meta = meta(schema, source)?;
  if let Some(tag) = tag {
    meta.insert("tag".into(), Value::from(tag));
  }
  Ok(InboundEvent::new(LifecycleKind::LoadSuccess, Some(payload), meta))
}

/// CREATE_SUCCESS for a resource created out of band.
pub fn created(payload: Value, schema: &str, source: &str) -> SyncResult<InboundEvent> {
  check_document(&payload)?;
  let meta = meta(schema, source)?;
  Ok(InboundEvent::new(LifecycleKind::CreateSuccess, Some(payload), meta))
}

/// The three lifecycle events of deleting one resource.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoveEvents {
  pub request: InboundEvent,
  pub success: InboundEvent,
  pub error: InboundEvent,
}

/// Lifecycle events for removing `item`. No tag is needed; every removal
/// invalidates the wildcard collection of the schema.
pub fn removed(item: Value, schema: &str, source: &str) -> SyncResult<RemoveEvents> {
  if !item.is_object() {
    return Err(SyncError::InvalidArgument("item must be an object"));
  }
  let meta = meta(schema, source)?;
  let document = serde_json::json!({ "data": item });

  Ok(RemoveEvents {
    request: InboundEvent::new(LifecycleKind::RemoveRequest, Some(document.clone()), meta.clone()),
    success: InboundEvent::new(LifecycleKind::RemoveSuccess, Some(document), meta.clone()),
    error: InboundEvent::new(LifecycleKind::RemoveError, None, meta),
  })
}

/// Drop every tagged collection of `schema`.
pub fn clear(schema: &str) -> DerivedEvent {
  DerivedEvent::new(
    DerivedKind::CollectionClear,
    Value::Null,
    DerivedMeta::from_source(&Map::new(), schema),
  )
}

fn check_document(payload: &Value) -> SyncResult<()> {
  let document = payload
    .as_object()
    .ok_or(SyncError::InvalidArgument("payload must be an object"))?;
  match document.get("data") {
    Some(Value::Object(_)) | Some(Value::Array(_)) => Ok(()),
    _ => Err(SyncError::InvalidArgument("payload data must be an object or an array")),
  }
}

fn meta(schema: &str, source: &str) -> SyncResult<Map<String, Value>> {
  if schema.is_empty() {
    return Err(SyncError::InvalidArgument("schema must not be empty"));
  }
  let mut meta = Map::new();
  meta.insert("source".into(), Value::from(source));
  meta.insert("schema".into(), Value::from(schema));
  Ok(meta)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheLayer;
  use crate::engine::{SyncEngine, DEFAULT_SOURCE};
  use crate::query::WILDCARD_TAG;
  use serde_json::json;

  #[test]
  fn test_loaded_builds_load_success() {
    let event = loaded(json!({ "data": [] }), "articles", Some("t"), DEFAULT_SOURCE).unwrap();

    assert_eq!(event.lifecycle_kind(), Some(LifecycleKind::LoadSuccess));
    let meta = event.meta.unwrap();
    assert_eq!(meta["source"], json!(DEFAULT_SOURCE));
    assert_eq!(meta["schema"], json!("articles"));
    assert_eq!(meta["tag"], json!("t"));
  }

  #[test]
  fn test_loaded_without_tag() {
    let event = loaded(json!({ "data": { "id": 1 } }), "articles", None, DEFAULT_SOURCE).unwrap();
    assert!(!event.meta.unwrap().contains_key("tag"));
  }

  #[test]
  fn test_invalid_arguments_are_rejected() {
    let cases = [
      (json!([]), "articles"),
      (json!({ "meta": {} }), "articles"),
      (json!({ "data": "x" }), "articles"),
      (json!({ "data": [] }), ""),
    ];
    for (payload, schema) in cases {
      assert!(matches!(
        created(payload.clone(), schema, DEFAULT_SOURCE),
        Err(SyncError::InvalidArgument(_))
      ));
      assert!(matches!(
        loaded(payload, schema, None, DEFAULT_SOURCE),
        Err(SyncError::InvalidArgument(_))
      ));
    }
  }

  #[test]
  fn test_created_feeds_the_engine() {
    let engine = SyncEngine::default();
    let mut layer = CacheLayer::new();

    let event = created(json!({ "data": { "id": "a1", "type": "articles" } }), "articles", DEFAULT_SOURCE).unwrap();
    engine.handle(event, &mut layer).unwrap();

    assert!(layer.objects("articles").unwrap().contains("a1"));
    assert!(!layer.collection("articles", WILDCARD_TAG).unwrap().status.is_valid());
  }

  #[test]
  fn test_removed_builds_lifecycle_triple() {
    let events = removed(json!({ "id": 1 }), "articles", DEFAULT_SOURCE).unwrap();

    assert_eq!(events.request.kind, "REMOVE_REQUEST");
    assert_eq!(events.request.payload, Some(json!({ "data": { "id": 1 } })));
    assert_eq!(events.success.kind, "REMOVE_SUCCESS");
    assert_eq!(events.error.kind, "REMOVE_ERROR");
    assert!(events.error.payload.is_none());

    assert!(removed(json!(1), "articles", DEFAULT_SOURCE).is_err());
    assert!(removed(json!({ "id": 1 }), "", DEFAULT_SOURCE).is_err());
  }

  #[test]
  fn test_clear_targets_schema() {
    let event = clear("articles");
    assert_eq!(event.kind, DerivedKind::CollectionClear);
    assert_eq!(event.schema(), "articles");
    assert_eq!(event.tag(), None);
  }
}
