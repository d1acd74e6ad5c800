//! Run result types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use weft_graph::NodeStatus;

/// Final row for one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRunResult {
  pub node_id: String,
  pub status: NodeStatus,
  /// Adapter message on success, error text on failure, reason when skipped.
  pub message: String,
  /// Time spent executing; zero for skipped nodes.
  pub elapsed: Duration,
}

/// Outcome of a run that was not interrupted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
  pub run_id: String,
  /// One row per selected node, in completion order.
  pub results: Vec<NodeRunResult>,
  pub elapsed: Duration,
}

impl RunResult {
  pub fn get(&self, node_id: &str) -> Option<&NodeRunResult> {
    self.results.iter().find(|r| r.node_id == node_id)
  }

  pub fn status(&self, node_id: &str) -> Option<NodeStatus> {
    self.get(node_id).map(|r| r.status)
  }

  pub fn count(&self, status: NodeStatus) -> usize {
    self.results.iter().filter(|r| r.status == status).count()
  }

  /// True when no node errored or was skipped.
  pub fn is_success(&self) -> bool {
    self.results.iter().all(|r| r.status == NodeStatus::Success)
  }
}
