//! Recursive merge over semi-structured JSON values.
//!
//! Objects merge key by key, recursively. Everything else in the patch,
//! arrays included, replaces the target value wholesale. Arrays in JSON:API
//! documents are relationship linkage and attribute lists, which are always
//! sent as complete values, so they are never spliced or concatenated.

use serde_json::Value;

/// Merge `patch` into `target` in place.
pub fn deep_merge(target: &mut Value, patch: &Value) {
  match (target, patch) {
    (Value::Object(target), Value::Object(patch)) => {
      for (key, value) in patch {
        match target.get_mut(key) {
          Some(existing) => deep_merge(existing, value),
          None => {
            target.insert(key.clone(), value.clone());
          }
        }
      }
    }
    (target, patch) => *target = patch.clone(),
  }
}

/// Non-mutating variant of [`deep_merge`].
pub fn merged(base: &Value, patch: &Value) -> Value {
  let mut result = base.clone();
  deep_merge(&mut result, patch);
  result
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_nested_objects_merge_per_key() {
    let base = json!({ "a": { "x": 1, "y": 2 }, "b": true });
    let result = merged(&base, &json!({ "a": { "y": 3, "z": 4 } }));
    assert_eq!(result, json!({ "a": { "x": 1, "y": 3, "z": 4 }, "b": true }));
  }

  #[test]
  fn test_arrays_replace_wholesale() {
    let base = json!({ "list": [1, 2, 3] });
    let result = merged(&base, &json!({ "list": [2] }));
    assert_eq!(result, json!({ "list": [2] }));
  }

  #[test]
  fn test_arrays_of_objects_are_not_merged_by_index() {
    let base = json!({ "data": [{ "id": 1, "type": "c" }, { "id": 2, "type": "d" }] });
    let result = merged(&base, &json!({ "data": [{ "id": 5 }] }));
    assert_eq!(result, json!({ "data": [{ "id": 5 }] }));
  }

  #[test]
  fn test_type_change_replaces() {
    let base = json!({ "a": { "x": 1 } });
    assert_eq!(merged(&base, &json!({ "a": 7 })), json!({ "a": 7 }));
    assert_eq!(merged(&json!({ "a": 7 }), &json!({ "a": { "x": 1 } })), base);
  }

  #[test]
  fn test_null_overrides() {
    let base = json!({ "a": 1 });
    assert_eq!(merged(&base, &json!({ "a": null })), json!({ "a": null }));
  }

  #[test]
  fn test_base_is_untouched() {
    let base = json!({ "a": { "x": 1 } });
    let _ = merged(&base, &json!({ "a": { "x": 2 } }));
    assert_eq!(base, json!({ "a": { "x": 1 } }));
  }
}
