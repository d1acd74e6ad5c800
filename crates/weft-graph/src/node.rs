use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use weft_config::{NodeDef, NodeKind};

/// One schedulable build unit.
///
/// Nodes are immutable once the graph is built. Their run status is held by
/// the scheduler's queue, keyed by `unique_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
  pub unique_id: String,
  pub kind: NodeKind,
  /// Ids of the nodes this node depends on.
  pub depends_on: BTreeSet<String>,
  /// Qualified name used for hierarchical config lookup.
  pub fqn: Vec<String>,
  pub tags: BTreeSet<String>,
  /// Raw configuration fragment.
  pub config: Map<String, Value>,
  pub payload: String,
}

impl Node {
  /// A bare model node, mostly useful for building graphs in code.
  pub fn new(unique_id: impl Into<String>) -> Self {
    let unique_id = unique_id.into();
    Self {
      fqn: vec![unique_id.clone()],
      unique_id,
      kind: NodeKind::Model,
      depends_on: BTreeSet::new(),
      tags: BTreeSet::new(),
      config: Map::new(),
      payload: String::new(),
    }
  }

  pub fn depends_on<I, S>(mut self, ids: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.depends_on.extend(ids.into_iter().map(Into::into));
    self
  }

  pub fn with_kind(mut self, kind: NodeKind) -> Self {
    self.kind = kind;
    self
  }

  pub fn with_fqn<I, S>(mut self, fqn: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.fqn = fqn.into_iter().map(Into::into).collect();
    self
  }

  pub fn with_tags<I, S>(mut self, tags: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.tags.extend(tags.into_iter().map(Into::into));
    self
  }

  pub fn with_config(mut self, config: Map<String, Value>) -> Self {
    self.config = config;
    self
  }

  pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
    self.payload = payload.into();
    self
  }
}

impl From<NodeDef> for Node {
  fn from(def: NodeDef) -> Self {
    Self {
      unique_id: def.unique_id,
      kind: def.kind,
      depends_on: def.depends_on.into_iter().collect(),
      fqn: def.fqn,
      tags: def.tags.into_iter().collect(),
      config: def.config,
      payload: def.payload,
    }
  }
}

/// Run status of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
  Pending,
  Running,
  Success,
  Error,
  Skipped,
}

impl NodeStatus {
  /// Whether the node has reached a final state.
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      NodeStatus::Success | NodeStatus::Error | NodeStatus::Skipped
    )
  }
}

impl fmt::Display for NodeStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      NodeStatus::Pending => "pending",
      NodeStatus::Running => "running",
      NodeStatus::Success => "success",
      NodeStatus::Error => "error",
      NodeStatus::Skipped => "skipped",
    };
    f.write_str(s)
  }
}
