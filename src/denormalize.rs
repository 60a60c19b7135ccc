//! Resolution of relationship identifiers against a cache snapshot.

use serde_json::Value;
use tracing::trace;

use crate::cache::Snapshot;
use crate::event::resource_id;

pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Builds nested views of cached objects by replacing each
/// `relationships.<name>.data` identifier with the referenced object's data.
///
/// Identifiers that are unresolved, that would close a cycle, or that sit
/// beyond the depth limit are left untouched.
#[derive(Debug, Clone, Copy)]
pub struct Denormalizer<'a> {
  snapshot: &'a Snapshot,
  max_depth: usize,
}

impl<'a> Denormalizer<'a> {
  pub fn new(snapshot: &'a Snapshot) -> Self {
    Self {
      snapshot,
      max_depth: DEFAULT_MAX_DEPTH,
    }
  }

  pub fn with_max_depth(mut self, max_depth: usize) -> Self {
    self.max_depth = max_depth;
    self
  }

  /// Denormalized data of one object, or `None` if it is not cached.
  pub fn denormalize(&self, schema: &str, id: &str) -> Option<Value> {
    let mut path = Vec::new();
    self.resolve(schema, id, &mut path)
  }

  /// Denormalized data of every object listed by a collection, in order.
  /// Ids no longer present among the objects are skipped.
  pub fn denormalize_collection(&self, schema: &str, tag: &str) -> Vec<Value> {
    let Some(collection) = self.snapshot.collection(schema, tag) else {
      return Vec::new();
    };
    collection
      .ids
      .iter()
      .filter_map(|id| self.denormalize(schema, id))
      .collect()
  }

  fn resolve(&self, schema: &str, id: &str, path: &mut Vec<(String, String)>) -> Option<Value> {
    let mut data = self.snapshot.object(schema, id)?.data.clone();
    if path.len() >= self.max_depth {
      return Some(data);
    }

    path.push((schema.to_string(), id.to_string()));
    if let Some(relationships) = data.get_mut("relationships").and_then(Value::as_object_mut) {
      for relationship in relationships.values_mut() {
        let Some(linkage) = relationship.get_mut("data") else {
          continue;
        };
        if let Value::Array(identifiers) = linkage {
          for identifier in identifiers.iter_mut() {
            self.expand(identifier, path);
          }
        } else if linkage.is_object() {
          self.expand(linkage, path);
        }
      }
    }
    path.pop();

    Some(data)
  }

  fn expand(&self, identifier: &mut Value, path: &mut Vec<(String, String)>) {
    let Some(schema) = identifier.get("type").and_then(Value::as_str).map(String::from) else {
      return;
    };
    let Some(id) = resource_id(identifier) else {
      return;
    };
    if path.iter().any(|(s, i)| *s == schema && *i == id) {
      trace!(%schema, %id, "relationship cycle left as identifier");
      return;
    }
    if let Some(resolved) = self.resolve(&schema, &id, path) {
      *identifier = resolved;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheLayer;
  use crate::event::{DerivedEvent, DerivedKind, DerivedMeta};
  use serde_json::{json, Map};

  fn fetched(layer: &mut CacheLayer, schema: &str, tag: Option<&str>, items: Value) {
    let mut meta = DerivedMeta::from_source(&Map::new(), schema);
    meta.tag = tag.map(String::from);
    layer.apply(&DerivedEvent::new(DerivedKind::ObjectsFetched, items.clone(), meta.clone()));
    if tag.is_some() {
      layer.apply(&DerivedEvent::new(DerivedKind::CollectionFetched, items, meta));
    }
  }

  fn blog() -> CacheLayer {
    let mut layer = CacheLayer::new();
    fetched(
      &mut layer,
      "people",
      None,
      json!([{ "id": "9", "type": "people", "attributes": { "name": "dan" } }]),
    );
    fetched(
      &mut layer,
      "comments",
      None,
      json!([
        { "id": "5", "type": "comments", "relationships": {
          "author": { "data": { "id": "9", "type": "people" } },
          "article": { "data": { "id": "1", "type": "articles" } }
        } },
        { "id": "12", "type": "comments" }
      ]),
    );
    fetched(
      &mut layer,
      "articles",
      Some("t"),
      json!([{
        "id": "1",
        "type": "articles",
        "attributes": { "title": "JSON:API" },
        "relationships": {
          "author": { "data": { "id": "9", "type": "people" } },
          "comments": { "data": [
            { "id": "5", "type": "comments" },
            { "id": "12", "type": "comments" },
            { "id": "404", "type": "comments" }
          ] },
          "tags": { "links": { "related": "/tags" } }
        }
      }]),
    );
    layer
  }

  #[test]
  fn test_resolves_single_and_many() {
    let layer = blog();
    let snapshot = layer.snapshot();
    let article = Denormalizer::new(&snapshot).denormalize("articles", "1").unwrap();

    assert_eq!(
      article["relationships"]["author"]["data"]["attributes"]["name"],
      json!("dan")
    );
    let comments = &article["relationships"]["comments"]["data"];
    assert_eq!(comments[0]["id"], json!("5"));
    assert_eq!(comments[1], json!({ "id": "12", "type": "comments" }));
    // unresolved identifiers stay as they are
    assert_eq!(comments[2], json!({ "id": "404", "type": "comments" }));
    assert_eq!(
      article["relationships"]["tags"],
      json!({ "links": { "related": "/tags" } })
    );
  }

  #[test]
  fn test_cycles_keep_identifier() {
    let layer = blog();
    let snapshot = layer.snapshot();
    let article = Denormalizer::new(&snapshot).denormalize("articles", "1").unwrap();

    let comment = &article["relationships"]["comments"]["data"][0];
    assert_eq!(
      comment["relationships"]["author"]["data"]["attributes"]["name"],
      json!("dan")
    );
    assert_eq!(
      comment["relationships"]["article"]["data"],
      json!({ "id": "1", "type": "articles" })
    );
  }

  #[test]
  fn test_max_depth_limits_expansion() {
    let layer = blog();
    let snapshot = layer.snapshot();

    let flat = Denormalizer::new(&snapshot).with_max_depth(0).denormalize("articles", "1").unwrap();
    assert_eq!(
      flat["relationships"]["author"]["data"],
      json!({ "id": "9", "type": "people" })
    );

    let shallow = Denormalizer::new(&snapshot).with_max_depth(1).denormalize("articles", "1").unwrap();
    let comment = &shallow["relationships"]["comments"]["data"][0];
    assert!(comment.get("relationships").is_some());
    assert_eq!(
      comment["relationships"]["author"]["data"],
      json!({ "id": "9", "type": "people" })
    );
  }

  #[test]
  fn test_missing_object_and_collection() {
    let layer = blog();
    let snapshot = layer.snapshot();
    let denormalizer = Denormalizer::new(&snapshot);

    assert!(denormalizer.denormalize("articles", "2").is_none());
    assert!(denormalizer.denormalize("unknown", "1").is_none());
    assert!(denormalizer.denormalize_collection("articles", "missing").is_empty());

    let listed = denormalizer.denormalize_collection("articles", "t");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["attributes"]["title"], json!("JSON:API"));
  }
}
