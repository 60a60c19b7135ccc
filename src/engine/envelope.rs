//! Validation of inbound lifecycle events.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{SyncError, SyncResult};
use crate::event::{InboundEvent, LifecycleKind};

/// Primary data of a JSON:API document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PrimaryData {
  Many(Vec<Value>),
  One(Map<String, Value>),
}

impl PrimaryData {
  pub fn into_items(self) -> Vec<Value> {
    match self {
      PrimaryData::Many(items) => items,
      PrimaryData::One(item) => vec![Value::Object(item)],
    }
  }
}

/// A lifecycle event that passed validation and belongs to this engine.
#[derive(Debug)]
pub(crate) struct Envelope<'a> {
  pub kind: LifecycleKind,
  pub meta: &'a Map<String, Value>,
  pub schema: &'a str,
  /// Only string tags count; anything else is treated as absent.
  pub tag: Option<&'a str>,
  pub data: Vec<Value>,
  pub included: Vec<Value>,
}

/// Check the envelope of `event`.
///
/// `Ok(None)` means the event is not ours to handle: either it is not a
/// lifecycle kind at all or it was produced for a different source marker.
pub(crate) fn validate<'a>(event: &'a InboundEvent, source: &str) -> SyncResult<Option<Envelope<'a>>> {
  let Some(kind) = event.lifecycle_kind() else {
    return Ok(None);
  };
  let kind_name = || kind.as_str().to_string();

  let meta = event
    .meta
    .as_ref()
    .ok_or_else(|| SyncError::MissingMeta { kind: kind_name() })?;

  let event_source = meta
    .get("source")
    .filter(|s| !s.is_null())
    .ok_or_else(|| SyncError::MissingSource { kind: kind_name() })?;
  if event_source.as_str() != Some(source) {
    return Ok(None);
  }

  let schema = meta
    .get("schema")
    .and_then(Value::as_str)
    .filter(|s| !s.is_empty())
    .ok_or_else(|| SyncError::MissingSchema { kind: kind_name() })?;

  let document = event.payload.as_ref().and_then(Value::as_object);
  // A present `data: null` is an empty single-resource document, not a
  // missing member.
  let data = match document.and_then(|d| d.get("data")) {
    Some(Value::Null) => Vec::new(),
    Some(data) => serde_json::from_value::<PrimaryData>(data.clone())
      .map_err(|_| SyncError::InvalidPayloadShape { kind: kind_name() })?
      .into_items(),
    None if kind.requires_data() => {
      return Err(SyncError::MissingPayloadData { kind: kind_name() });
    }
    None => Vec::new(),
  };

  let included = match document.and_then(|d| d.get("included")).filter(|i| !i.is_null()) {
    Some(Value::Array(included)) => included.clone(),
    Some(_) => return Err(SyncError::InvalidIncluded { kind: kind_name() }),
    None => Vec::new(),
  };

  Ok(Some(Envelope {
    kind,
    meta,
    schema,
    tag: meta.get("tag").and_then(Value::as_str),
    data,
    included,
  }))
}
