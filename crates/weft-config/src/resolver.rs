//! Effective per-node configuration.
//!
//! A node's configuration is merged coarse-to-fine:
//!
//! ```text
//! base layers (user defaults, project defaults)
//!   └── node_config levels along the node's qualified name
//!         └── the node's own fragment
//! ```
//!
//! Every layer is canonicalized with the project's alias table before it is
//! stacked onto an [`OverrideMapping`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::alias::{AliasTable, canonicalize};
use crate::error::ConfigError;
use crate::fqn::fqn_search;
use crate::overrides::{Layer, OverrideMapping};
use crate::project::ProjectDef;

/// Prefix marking a configuration key inside the hierarchical tree.
const CONFIG_KEY_PREFIX: char = '+';

/// Fully merged configuration for one node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedConfig {
  values: Map<String, Value>,
}

impl ResolvedConfig {
  pub fn get(&self, key: &str) -> Option<&Value> {
    self.values.get(key)
  }

  pub fn get_str(&self, key: &str) -> Option<&str> {
    self.values.get(key).and_then(Value::as_str)
  }

  pub fn get_bool(&self, key: &str) -> Option<bool> {
    self.values.get(key).and_then(Value::as_bool)
  }

  pub fn as_map(&self) -> &Map<String, Value> {
    &self.values
  }

  pub fn into_map(self) -> Map<String, Value> {
    self.values
  }
}

impl From<Map<String, Value>> for ResolvedConfig {
  fn from(values: Map<String, Value>) -> Self {
    Self { values }
  }
}

/// Resolves node configuration against the layered project configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
  base: Vec<Layer>,
  tree: Map<String, Value>,
  aliases: AliasTable,
}

impl ConfigResolver {
  pub fn new(aliases: AliasTable) -> Self {
    Self {
      aliases,
      ..Self::default()
    }
  }

  /// Build a resolver from a project, with an optional user-level layer
  /// placed beneath the project's defaults.
  pub fn from_project(project: &ProjectDef, user: Option<Layer>) -> Result<Self, ConfigError> {
    let aliases = AliasTable::new(project.aliases.clone())?;
    let mut resolver = Self::new(aliases);
    if let Some(user) = user {
      resolver = resolver.with_base_layer(user);
    }
    Ok(
      resolver
        .with_base_layer(project.defaults.clone())
        .with_tree(project.node_config.clone()),
    )
  }

  /// Push a base layer; later base layers win over earlier ones.
  pub fn with_base_layer(mut self, layer: Layer) -> Self {
    self.base.push(layer);
    self
  }

  pub fn with_tree(mut self, tree: Map<String, Value>) -> Self {
    self.tree = tree;
    self
  }

  pub fn aliases(&self) -> &AliasTable {
    &self.aliases
  }

  /// Build the override stack for a node without flattening it.
  pub fn layers<S: AsRef<str>>(
    &self,
    fqn: &[S],
    fragment: &Layer,
  ) -> Result<OverrideMapping, ConfigError> {
    let mut mapping = OverrideMapping::new();

    for layer in &self.base {
      mapping.add(canonicalize(layer, &self.aliases, false)?);
    }
    for level in fqn_search(&self.tree, fqn) {
      mapping.add(canonicalize(&level_config(level)?, &self.aliases, false)?);
    }
    mapping.add(canonicalize(fragment, &self.aliases, false)?);

    Ok(mapping)
  }

  /// Effective configuration for a node at `fqn` carrying `fragment`.
  pub fn resolve<S: AsRef<str>>(
    &self,
    fqn: &[S],
    fragment: &Layer,
  ) -> Result<ResolvedConfig, ConfigError> {
    let mapping = self.layers(fqn, fragment)?;
    debug!(
      layers = mapping.layer_count(),
      keys = mapping.len(),
      "resolved node config"
    );
    Ok(ResolvedConfig::from(mapping.flatten()))
  }
}

/// Configuration entries of one tree level.
///
/// `+key` entries are config (prefix stripped); plain keys are config only
/// when their value is not a mapping, since mappings are nested levels.
/// `+key` next to a plain `key` is a [`ConfigError::DuplicateKey`].
fn level_config(level: &Map<String, Value>) -> Result<Layer, ConfigError> {
  let mut config = Layer::new();
  // output key -> level key it came from
  let mut origin: HashMap<String, &str> = HashMap::new();

  for (key, value) in level {
    let name = match key.strip_prefix(CONFIG_KEY_PREFIX) {
      Some(stripped) => stripped,
      None if !value.is_object() => key.as_str(),
      None => continue,
    };
    if let Some(first) = origin.get(name) {
      return Err(ConfigError::DuplicateKey {
        canonical: name.to_string(),
        first: first.to_string(),
        second: key.clone(),
      });
    }
    origin.insert(name.to_string(), key);
    config.insert(name.to_string(), value.clone());
  }

  Ok(config)
}
