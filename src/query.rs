//! Query fingerprints used as collection tags.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Tag that write events invalidate.
pub const WILDCARD_TAG: &str = "*";

/// Schema plus query parameters of a load. Parameters are kept sorted so
/// that the same query always maps to the same tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct QueryKey {
  pub schema: String,
  pub params: BTreeMap<String, String>,
}

impl QueryKey {
  pub fn new(schema: impl Into<String>) -> Self {
    Self {
      schema: schema.into(),
      params: BTreeMap::new(),
    }
  }

  pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.params.insert(key.into(), value.into());
    self
  }

  /// Stable, fixed-length tag for this query.
  pub fn tag(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.normalized().as_bytes());
    hex::encode(hasher.finalize())
  }

  pub fn description(&self) -> String {
    if self.params.is_empty() {
      return format!("{} (all)", self.schema);
    }
    let params = self
      .params
      .iter()
      .map(|(k, v)| format!("{}={}", k, v.trim()))
      .collect::<Vec<_>>()
      .join(", ");
    format!("{}: {}", self.schema, params)
  }

  fn normalized(&self) -> String {
    let query = self
      .params
      .iter()
      .map(|(k, v)| format!("{}={}", k.trim(), v.trim()))
      .collect::<Vec<_>>()
      .join("&");
    format!("{}?{}", self.schema.trim(), query)
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.description())
  }
}
