use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// The kind of build unit a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
  Model,
  Seed,
  Snapshot,
  Test,
  /// Compiled for inspection only, never executed.
  Analysis,
}

impl NodeKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      NodeKind::Model => "model",
      NodeKind::Seed => "seed",
      NodeKind::Snapshot => "snapshot",
      NodeKind::Test => "test",
      NodeKind::Analysis => "analysis",
    }
  }
}

impl std::str::FromStr for NodeKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "model" => Ok(NodeKind::Model),
      "seed" => Ok(NodeKind::Seed),
      "snapshot" => Ok(NodeKind::Snapshot),
      "test" => Ok(NodeKind::Test),
      "analysis" => Ok(NodeKind::Analysis),
      other => Err(format!("unknown node kind '{}'", other)),
    }
  }
}

impl std::fmt::Display for NodeKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A node as written in a project file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
  pub unique_id: String,
  #[serde(default = "default_kind")]
  pub kind: NodeKind,
  #[serde(default)]
  pub depends_on: Vec<String>,
  /// Qualified name, outermost segment first.
  #[serde(default)]
  pub fqn: Vec<String>,
  #[serde(default)]
  pub tags: Vec<String>,
  /// Raw configuration fragment attached to the node itself.
  #[serde(default)]
  pub config: Map<String, Value>,
  /// Compiled executable body handed to the adapter.
  #[serde(default)]
  pub payload: String,
}

fn default_kind() -> NodeKind {
  NodeKind::Model
}

/// Scheduling options stored with a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
  #[serde(default = "default_threads")]
  pub threads: usize,
  #[serde(default)]
  pub fail_fast: bool,
}

fn default_threads() -> usize {
  1
}

impl Default for RunConfig {
  fn default() -> Self {
    Self {
      threads: default_threads(),
      fail_fast: false,
    }
  }
}

/// A complete project definition: nodes plus layered configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDef {
  pub name: String,
  pub nodes: Vec<NodeDef>,
  /// Project-wide defaults, the outermost project layer.
  #[serde(default)]
  pub defaults: Map<String, Value>,
  /// Hierarchical configuration keyed by qualified-name segments.
  ///
  /// Keys prefixed with `+` are configuration at that level; other keys
  /// holding mappings are nested levels.
  #[serde(default)]
  pub node_config: Map<String, Value>,
  /// Alternate key name -> canonical key name.
  #[serde(default)]
  pub aliases: HashMap<String, String>,
  #[serde(default)]
  pub run: RunConfig,
}

impl ProjectDef {
  /// Read a project definition from a JSON file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }
}

/// Read an optional JSON object from disk, e.g. user-level defaults.
///
/// A missing file yields `None`.
pub fn load_layer(path: &Path) -> Result<Option<Map<String, Value>>, ConfigError> {
  if !path.exists() {
    return Ok(None);
  }
  let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
    path: path.to_path_buf(),
    source,
  })?;
  serde_json::from_str(&content)
    .map(Some)
    .map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
}
