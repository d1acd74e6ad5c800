//! Task kinds and how they build their queues.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use weft_graph::{Graph, NodeSelector, SelectionError, SelectionSpec};

use crate::queue::GraphQueue;

/// What a run is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
  /// Build the selection. Upstream effects must land first, even through
  /// unselected nodes.
  Run,
  /// Copy the selection. Only ordering inside the selection matters.
  Clone,
}

impl TaskKind {
  pub fn preserve_edges(&self) -> bool {
    match self {
      TaskKind::Run => true,
      TaskKind::Clone => false,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      TaskKind::Run => "run",
      TaskKind::Clone => "clone",
    }
  }

  /// Select from `graph` and build this task's queue.
  pub fn graph_queue<S: SelectionSpec + ?Sized>(
    &self,
    graph: &Graph,
    spec: &S,
  ) -> Result<GraphQueue, SelectionError> {
    get_graph_queue(&NodeSelector::new(graph), spec, self.preserve_edges())
  }
}

impl fmt::Display for TaskKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for TaskKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "run" => Ok(TaskKind::Run),
      "clone" => Ok(TaskKind::Clone),
      other => Err(format!("unknown task kind '{}'", other)),
    }
  }
}

/// Select a sub-graph and wrap it in a queue.
pub fn get_graph_queue<S: SelectionSpec + ?Sized>(
  selector: &NodeSelector<'_>,
  spec: &S,
  preserve_edges: bool,
) -> Result<GraphQueue, SelectionError> {
  Ok(GraphQueue::new(selector.select(spec, preserve_edges)?))
}
