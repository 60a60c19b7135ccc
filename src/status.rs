//! Status attached to every cached object and collection.
//!
//! A status has two independent axes: whether the cached data is authoritative
//! (`ValidationStatus`) and whether a request touching it is in flight
//! (`BusyStatus`). It also carries a `transformation`, a free-form patch of
//! client-side annotations that the server has not confirmed yet.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::merge::deep_merge;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
  #[default]
  Valid,
  Invalid,
}

impl ValidationStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Valid => "VALID",
      Self::Invalid => "INVALID",
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BusyStatus {
  #[default]
  Idle,
  Busy,
}

impl BusyStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Idle => "IDLE",
      Self::Busy => "BUSY",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
  pub validation_status: ValidationStatus,
  pub busy_status: BusyStatus,
  pub transformation: Value,
}

impl Default for Status {
  fn default() -> Self {
    create_status()
  }
}

/// Requested status change. Axes left as `None` mean different things
/// depending on how the patch is applied, see [`update_status`] and
/// [`Status::merged`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPatch {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub validation_status: Option<ValidationStatus>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub busy_status: Option<BusyStatus>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub transformation: Option<Value>,
}

impl StatusPatch {
  pub fn new(validation_status: ValidationStatus, busy_status: BusyStatus) -> Self {
    Self {
      validation_status: Some(validation_status),
      busy_status: Some(busy_status),
      transformation: None,
    }
  }

  pub fn busy(busy_status: BusyStatus) -> Self {
    Self {
      busy_status: Some(busy_status),
      ..Self::default()
    }
  }

  pub fn with_transformation(mut self, transformation: Option<&Value>) -> Self {
    self.transformation = transformation.cloned();
    self
  }

  /// Wire form used as the payload of collection status events.
  pub fn to_value(&self) -> Value {
    let mut map = Map::new();
    if let Some(validation_status) = self.validation_status {
      map.insert("validationStatus".into(), Value::from(validation_status.as_str()));
    }
    if let Some(busy_status) = self.busy_status {
      map.insert("busyStatus".into(), Value::from(busy_status.as_str()));
    }
    if let Some(transformation) = &self.transformation {
      map.insert("transformation".into(), transformation.clone());
    }
    Value::Object(map)
  }
}

/// Status of a freshly materialized object: valid, idle, no transformation.
pub fn create_status() -> Status {
  Status {
    validation_status: ValidationStatus::Valid,
    busy_status: BusyStatus::Idle,
    transformation: Value::Object(Map::new()),
  }
}

/// Confirming update: the transformation is merged and both axes take the
/// patch values, falling back to VALID/IDLE.
pub fn update_status(previous: &Status, patch: &StatusPatch) -> Status {
  Status {
    validation_status: patch.validation_status.unwrap_or_default(),
    busy_status: patch.busy_status.unwrap_or_default(),
    transformation: merged_transformation(&previous.transformation, patch.transformation.as_ref()),
  }
}

fn merged_transformation(previous: &Value, patch: Option<&Value>) -> Value {
  let mut transformation = previous.clone();
  if let Some(patch) = patch {
    deep_merge(&mut transformation, patch);
  }
  transformation
}

impl Status {
  /// Partial update: axes missing from the patch keep their current value.
  pub fn merged(&self, patch: &StatusPatch) -> Status {
    Status {
      validation_status: patch.validation_status.unwrap_or(self.validation_status),
      busy_status: patch.busy_status.unwrap_or(self.busy_status),
      transformation: merged_transformation(&self.transformation, patch.transformation.as_ref()),
    }
  }

  pub fn is_valid(&self) -> bool {
    self.validation_status == ValidationStatus::Valid
  }

  pub fn is_busy(&self) -> bool {
    self.busy_status == BusyStatus::Busy
  }
}

/// Whether a consumer should issue a new load for something carrying this
/// status. Nothing cached yet always warrants a load; stale data only when no
/// request is already running.
pub fn should_refresh(status: Option<&Status>) -> bool {
  match status {
    None => true,
    Some(status) => !status.is_valid() && !status.is_busy(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_create_status_is_valid_idle() {
    let status = create_status();
    assert!(status.is_valid());
    assert!(!status.is_busy());
    assert_eq!(status.transformation, json!({}));
  }

  #[test]
  fn test_update_status_defaults_to_confirmed() {
    let previous = Status {
      validation_status: ValidationStatus::Invalid,
      busy_status: BusyStatus::Busy,
      transformation: json!({ "a": 1 }),
    };

    let next = update_status(&previous, &StatusPatch::default());
    assert_eq!(next.validation_status, ValidationStatus::Valid);
    assert_eq!(next.busy_status, BusyStatus::Idle);
    assert_eq!(next.transformation, json!({ "a": 1 }));

    // previous untouched
    assert_eq!(previous.busy_status, BusyStatus::Busy);
  }

  #[test]
  fn test_update_status_merges_transformation() {
    let previous = update_status(
      &create_status(),
      &StatusPatch::default().with_transformation(Some(&json!({ "a": "a", "c": { "ff": 1, "dd": 2 } }))),
    );
    let patch = StatusPatch::new(ValidationStatus::Invalid, BusyStatus::Busy)
      .with_transformation(Some(&json!({ "b": "b", "c": { "ff": 2, "cc": 5 } })));

    let next = update_status(&previous, &patch);
    assert_eq!(next.validation_status, ValidationStatus::Invalid);
    assert_eq!(next.busy_status, BusyStatus::Busy);
    assert_eq!(
      next.transformation,
      json!({ "a": "a", "b": "b", "c": { "ff": 2, "dd": 2, "cc": 5 } })
    );
  }

  #[test]
  fn test_merged_keeps_unspecified_axes() {
    let previous = Status {
      validation_status: ValidationStatus::Invalid,
      busy_status: BusyStatus::Idle,
      transformation: json!({}),
    };

    let next = previous.merged(&StatusPatch::busy(BusyStatus::Busy));
    assert_eq!(next.validation_status, ValidationStatus::Invalid);
    assert_eq!(next.busy_status, BusyStatus::Busy);
  }

  #[test]
  fn test_should_refresh() {
    assert!(should_refresh(None));
    assert!(!should_refresh(Some(&create_status())));

    let stale = create_status().merged(&StatusPatch::new(ValidationStatus::Invalid, BusyStatus::Idle));
    assert!(should_refresh(Some(&stale)));

    let loading = stale.merged(&StatusPatch::busy(BusyStatus::Busy));
    assert!(!should_refresh(Some(&loading)));
  }

  #[test]
  fn test_status_wire_format() {
    let patch = StatusPatch::new(ValidationStatus::Invalid, BusyStatus::Busy);
    assert_eq!(
      serde_json::to_value(&patch).unwrap(),
      json!({ "validationStatus": "INVALID", "busyStatus": "BUSY" })
    );
    assert_eq!(patch.to_value(), serde_json::to_value(&patch).unwrap());

    let parsed: StatusPatch = serde_json::from_value(json!({ "busyStatus": "IDLE" })).unwrap();
    assert_eq!(parsed, StatusPatch::busy(BusyStatus::Idle));
  }
}
