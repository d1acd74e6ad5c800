//! Layered key/value lookup where the most recently added layer wins.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::error::ConfigError;

/// One configuration layer.
pub type Layer = Map<String, Value>;

/// An ordered stack of configuration layers.
///
/// Lookups walk the layers newest-first, so a key defined in a later layer
/// shadows the same key in every earlier one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideMapping {
  layers: Vec<Layer>,
}

impl OverrideMapping {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append a layer; it takes precedence over all existing layers.
  pub fn add(&mut self, layer: Layer) {
    self.layers.push(layer);
  }

  /// Append several layers in order.
  pub fn add_all<I: IntoIterator<Item = Layer>>(&mut self, layers: I) {
    self.layers.extend(layers);
  }

  /// Value for `key` from the newest layer that defines it.
  pub fn get(&self, key: &str) -> Option<&Value> {
    self.layers.iter().rev().find_map(|layer| layer.get(key))
  }

  /// Like [`get`](Self::get) but reports absence as an error.
  pub fn lookup(&self, key: &str) -> Result<&Value, ConfigError> {
    self.get(key).ok_or_else(|| ConfigError::MissingKey {
      key: key.to_string(),
    })
  }

  pub fn contains(&self, key: &str) -> bool {
    self.layers.iter().any(|layer| layer.contains_key(key))
  }

  /// Union of keys across all layers.
  pub fn keys(&self) -> BTreeSet<&str> {
    self
      .layers
      .iter()
      .flat_map(|layer| layer.keys().map(String::as_str))
      .collect()
  }

  /// Number of distinct keys.
  pub fn len(&self) -> usize {
    self.keys().len()
  }

  pub fn is_empty(&self) -> bool {
    self.layers.iter().all(Map::is_empty)
  }

  pub fn layer_count(&self) -> usize {
    self.layers.len()
  }

  /// Collapse the stack into a single mapping honoring precedence.
  pub fn flatten(&self) -> Layer {
    let mut merged = Map::new();
    for layer in &self.layers {
      for (key, value) in layer {
        merged.insert(key.clone(), value.clone());
      }
    }
    merged
  }
}

impl FromIterator<Layer> for OverrideMapping {
  fn from_iter<I: IntoIterator<Item = Layer>>(iter: I) -> Self {
    Self {
      layers: iter.into_iter().collect(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn layer(value: Value) -> Layer {
    match value {
      Value::Object(map) => map,
      _ => panic!("expected a JSON object"),
    }
  }

  #[test]
  fn test_last_layer_wins() {
    let mut mapping = OverrideMapping::new();
    mapping.add_all([layer(json!({ "x": 1 })), layer(json!({ "x": 2 }))]);

    assert_eq!(mapping.get("x"), Some(&json!(2)));
    assert!(!mapping.contains("y"));
    assert!(mapping.get("y").is_none());
  }

  #[test]
  fn test_earlier_layers_fill_gaps() {
    let mut mapping = OverrideMapping::new();
    mapping.add(layer(json!({ "x": 1, "y": "base" })));
    mapping.add(layer(json!({ "x": 2 })));

    assert_eq!(mapping.get("y"), Some(&json!("base")));
    assert_eq!(mapping.len(), 2);
  }

  #[test]
  fn test_lookup_reports_missing_key() {
    let mapping: OverrideMapping = [layer(json!({ "x": 1 }))].into_iter().collect();

    match mapping.lookup("nope") {
      Err(ConfigError::MissingKey { key }) => assert_eq!(key, "nope"),
      other => panic!("unexpected: {other:?}"),
    }
  }

  #[test]
  fn test_keys_collapse_duplicates() {
    let mapping: OverrideMapping = [
      layer(json!({ "a": 1, "b": 2 })),
      layer(json!({ "b": 3, "c": 4 })),
    ]
    .into_iter()
    .collect();

    let keys: Vec<&str> = mapping.keys().into_iter().collect();
    assert_eq!(keys, vec!["a", "b", "c"]);
  }

  #[test]
  fn test_flatten_matches_get() {
    let mapping: OverrideMapping = [
      layer(json!({ "a": 1, "b": 2 })),
      layer(json!({ "b": 3 })),
      layer(json!({ "a": null })),
    ]
    .into_iter()
    .collect();

    let flat = mapping.flatten();
    for key in mapping.keys() {
      assert_eq!(flat.get(key), mapping.get(key));
    }
    assert_eq!(flat["a"], Value::Null);
  }

  #[test]
  fn test_empty_mapping() {
    let mapping = OverrideMapping::new();
    assert!(mapping.is_empty());
    assert_eq!(mapping.len(), 0);
    assert_eq!(mapping.layer_count(), 0);
  }
}
