//! Lifecycle events coming in from the transport side and the derived events
//! handed to the stores.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Request/success/error notifications bracketing a remote operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleKind {
  LoadRequest,
  LoadSuccess,
  LoadError,
  CreateRequest,
  CreateSuccess,
  CreateError,
  UpdateRequest,
  UpdateSuccess,
  UpdateError,
  RemoveRequest,
  RemoveSuccess,
  RemoveError,
}

impl LifecycleKind {
  pub const ALL: [LifecycleKind; 12] = [
    Self::LoadRequest,
    Self::LoadSuccess,
    Self::LoadError,
    Self::CreateRequest,
    Self::CreateSuccess,
    Self::CreateError,
    Self::UpdateRequest,
    Self::UpdateSuccess,
    Self::UpdateError,
    Self::RemoveRequest,
    Self::RemoveSuccess,
    Self::RemoveError,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::LoadRequest => "LOAD_REQUEST",
      Self::LoadSuccess => "LOAD_SUCCESS",
      Self::LoadError => "LOAD_ERROR",
      Self::CreateRequest => "CREATE_REQUEST",
      Self::CreateSuccess => "CREATE_SUCCESS",
      Self::CreateError => "CREATE_ERROR",
      Self::UpdateRequest => "UPDATE_REQUEST",
      Self::UpdateSuccess => "UPDATE_SUCCESS",
      Self::UpdateError => "UPDATE_ERROR",
      Self::RemoveRequest => "REMOVE_REQUEST",
      Self::RemoveSuccess => "REMOVE_SUCCESS",
      Self::RemoveError => "REMOVE_ERROR",
    }
  }

  /// Whether `payload.data` must be present for this kind.
  pub fn requires_data(self) -> bool {
    !matches!(
      self,
      Self::RemoveSuccess
        | Self::LoadRequest
        | Self::CreateRequest
        | Self::LoadError
        | Self::CreateError
        | Self::UpdateError
        | Self::RemoveError
    )
  }
}

impl fmt::Display for LifecycleKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for LifecycleKind {
  type Err = ();

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::ALL.into_iter().find(|kind| kind.as_str() == s).ok_or(())
  }
}

/// An event as emitted by the transport layer. Kept loosely typed so that
/// unrelated traffic can be forwarded untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
  #[serde(rename = "type")]
  pub kind: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub payload: Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub meta: Option<Map<String, Value>>,
}

impl InboundEvent {
  pub fn new(kind: LifecycleKind, payload: Option<Value>, meta: Map<String, Value>) -> Self {
    Self {
      kind: kind.as_str().to_string(),
      payload,
      meta: Some(meta),
    }
  }

  pub fn lifecycle_kind(&self) -> Option<LifecycleKind> {
    self.kind.parse().ok()
  }
}

/// Events consumed by the object and collection stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DerivedKind {
  ObjectsFetched,
  ObjectsCreated,
  ObjectsUpdating,
  ObjectsUpdated,
  ObjectsUpdateFailed,
  ObjectsRemoving,
  ObjectsRemoved,
  CollectionFetched,
  CollectionStatus,
  CollectionClear,
}

impl DerivedKind {
  pub fn is_collection(self) -> bool {
    matches!(
      self,
      Self::CollectionFetched | Self::CollectionStatus | Self::CollectionClear
    )
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMeta {
  pub schema: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tag: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub transformation: Option<Value>,
  /// Every other member of the originating event's meta.
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl DerivedMeta {
  /// Copy the originating meta, scoped to `schema`.
  pub fn from_source(source: &Map<String, Value>, schema: &str) -> Self {
    let mut extra = source.clone();
    extra.remove("schema");
    let tag = match extra.remove("tag") {
      Some(Value::String(tag)) => Some(tag),
      _ => None,
    };
    // Only object patches can be merged into a status transformation.
    let transformation = extra.remove("transformation").filter(Value::is_object);

    Self {
      schema: schema.to_string(),
      tag,
      transformation,
      extra,
    }
  }

  pub fn with_tag(mut self, tag: &str) -> Self {
    self.tag = Some(tag.to_string());
    self
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedEvent {
  #[serde(rename = "type")]
  pub kind: DerivedKind,
  pub payload: Value,
  pub meta: DerivedMeta,
}

impl DerivedEvent {
  pub fn new(kind: DerivedKind, payload: Value, meta: DerivedMeta) -> Self {
    Self {
      kind,
      payload,
      meta,
    }
  }

  pub fn schema(&self) -> &str {
    &self.meta.schema
  }

  pub fn tag(&self) -> Option<&str> {
    self.meta.tag.as_deref()
  }

  /// Payload items, whether the payload is a single item or an array.
  pub fn items(&self) -> &[Value] {
    match &self.payload {
      Value::Array(items) => items,
      Value::Null => &[],
      single => std::slice::from_ref(single),
    }
  }
}

/// Identifier of a resource object. Strings are used as-is and numbers in
/// their decimal form; anything else is not a usable identifier.
pub fn resource_id(item: &Value) -> Option<String> {
  match item.as_object()?.get("id")? {
    Value::String(id) => Some(id.clone()),
    Value::Number(id) => Some(id.to_string()),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_lifecycle_kind_roundtrips_through_str() {
    for kind in LifecycleKind::ALL {
      assert_eq!(kind.as_str().parse::<LifecycleKind>(), Ok(kind));
      assert_eq!(serde_json::to_value(kind).unwrap(), json!(kind.as_str()));
    }
    assert!("OBJECTS_FETCHED".parse::<LifecycleKind>().is_err());
  }

  #[test]
  fn test_requires_data() {
    assert!(!LifecycleKind::RemoveSuccess.requires_data());
    assert!(!LifecycleKind::LoadRequest.requires_data());
    assert!(!LifecycleKind::CreateRequest.requires_data());
    assert!(LifecycleKind::LoadSuccess.requires_data());
    assert!(LifecycleKind::UpdateRequest.requires_data());
    assert!(LifecycleKind::RemoveRequest.requires_data());
  }

  #[test]
  fn test_resource_id() {
    assert_eq!(resource_id(&json!({ "id": 1 })), Some("1".to_string()));
    assert_eq!(resource_id(&json!({ "id": "abc" })), Some("abc".to_string()));
    assert_eq!(resource_id(&json!({ "name": 1 })), None);
    assert_eq!(resource_id(&json!({ "id": null })), None);
    assert_eq!(resource_id(&json!([1])), None);
  }

  #[test]
  fn test_derived_meta_keeps_extra_members() {
    let source = json!({
      "source": "src",
      "schema": "a",
      "tag": "t",
      "timestamp": 12,
      "transformation": { "x": 1 }
    });
    let meta = DerivedMeta::from_source(source.as_object().unwrap(), "b");

    assert_eq!(meta.schema, "b");
    assert_eq!(meta.tag.as_deref(), Some("t"));
    assert_eq!(meta.transformation, Some(json!({ "x": 1 })));
    assert_eq!(meta.extra.get("timestamp"), Some(&json!(12)));
    assert_eq!(meta.extra.get("source"), Some(&json!("src")));
    assert!(!meta.extra.contains_key("schema"));
  }

  #[test]
  fn test_derived_meta_ignores_scalar_transformation() {
    for transformation in [json!("pending"), json!(3), json!([1]), Value::Null] {
      let source = json!({ "source": "src", "transformation": transformation });
      let meta = DerivedMeta::from_source(source.as_object().unwrap(), "s");
      assert_eq!(meta.transformation, None);
      assert!(!meta.extra.contains_key("transformation"));
    }
  }

  #[test]
  fn test_derived_event_wire_format() {
    let meta = DerivedMeta::from_source(&Map::new(), "s").with_tag("*");
    let event = DerivedEvent::new(DerivedKind::CollectionStatus, json!({}), meta);
    assert_eq!(
      serde_json::to_value(&event).unwrap(),
      json!({ "type": "COLLECTION_STATUS", "payload": {}, "meta": { "schema": "s", "tag": "*" } })
    );
  }

  #[test]
  fn test_items_normalizes_payload() {
    let meta = DerivedMeta::from_source(&Map::new(), "s");
    let single = DerivedEvent::new(DerivedKind::ObjectsFetched, json!({ "id": 1 }), meta.clone());
    assert_eq!(single.items().len(), 1);

    let none = DerivedEvent::new(DerivedKind::ObjectsFetched, Value::Null, meta);
    assert!(none.items().is_empty());
  }
}
