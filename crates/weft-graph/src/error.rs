use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
  #[error("duplicate node id: {0}")]
  DuplicateNode(String),

  #[error("node '{node_id}' depends on unknown node '{dependency}'")]
  UnknownDependency { node_id: String, dependency: String },

  #[error("dependency cycle detected involving: {}", .nodes.join(", "))]
  CycleDetected { nodes: Vec<String> },
}

/// Errors raised while evaluating a selection.
#[derive(Debug, Error)]
pub enum SelectionError {
  #[error("selection references unknown node: {node_id}")]
  UnknownNode { node_id: String },

  #[error("invalid selector '{input}': {message}")]
  InvalidSelector { input: String, message: String },

  #[error(transparent)]
  Graph(#[from] GraphError),
}
