//! Dependency-ordered dispenser of runnable nodes.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use weft_graph::{Node, NodeStatus, SubGraph};

use crate::error::QueueError;

/// Result of asking the queue for work.
#[derive(Debug, Clone)]
pub enum Pop {
  /// A node whose upstreams have all succeeded. It is now `Running` and
  /// belongs to the caller.
  Ready(Arc<Node>),
  /// Nothing is ready yet, but unfinished nodes remain.
  Wait,
  /// Every node has reached a final status.
  Finished,
}

/// Final outcome reported for a running node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
  Success,
  Error,
}

#[derive(Debug)]
struct QueueState {
  status: HashMap<String, NodeStatus>,
  remaining_upstream: HashMap<String, usize>,
  ready: VecDeque<String>,
  unfinished: usize,
}

/// Hands out nodes of a sub-graph once their dependencies have succeeded.
///
/// Safe to share between workers. All bookkeeping sits behind one lock, so
/// a downstream node's counter is only ever touched by one caller at a time.
#[derive(Debug)]
pub struct GraphQueue {
  subgraph: SubGraph,
  state: Mutex<QueueState>,
  changed: Notify,
}

impl GraphQueue {
  pub fn new(subgraph: SubGraph) -> Self {
    let mut status = HashMap::with_capacity(subgraph.len());
    let mut remaining_upstream = HashMap::with_capacity(subgraph.len());
    let mut ready: Vec<String> = Vec::new();

    for id in subgraph.node_ids() {
      let in_degree = subgraph.in_degree(id);
      status.insert(id.to_string(), NodeStatus::Pending);
      remaining_upstream.insert(id.to_string(), in_degree);
      if in_degree == 0 {
        ready.push(id.to_string());
      }
    }

    let unfinished = status.len();
    Self {
      subgraph,
      state: Mutex::new(QueueState {
        status,
        remaining_upstream,
        ready: ready.into(),
        unfinished,
      }),
      changed: Notify::new(),
    }
  }

  pub fn subgraph(&self) -> &SubGraph {
    &self.subgraph
  }

  pub fn len(&self) -> usize {
    self.subgraph.len()
  }

  pub fn is_empty(&self) -> bool {
    self.subgraph.is_empty()
  }

  fn lock(&self) -> MutexGuard<'_, QueueState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Take a ready node, marking it `Running`.
  pub fn pop(&self) -> Pop {
    let mut state = self.lock();

    while let Some(id) = state.ready.pop_front() {
      // skip_pending may have retired it after it became ready
      if state.status.get(&id) != Some(&NodeStatus::Pending) {
        continue;
      }
      let Some(node) = self.subgraph.get(&id) else {
        continue;
      };
      state.status.insert(id, NodeStatus::Running);
      return Pop::Ready(node.clone());
    }

    if state.unfinished == 0 {
      Pop::Finished
    } else {
      Pop::Wait
    }
  }

  /// Record the outcome of a running node.
  ///
  /// Success unblocks downstream nodes whose upstreams are now all done.
  /// Error marks every transitive downstream node `Skipped`. Returns the ids
  /// newly skipped.
  pub fn mark_done(&self, node_id: &str, outcome: Outcome) -> Result<Vec<String>, QueueError> {
    let mut guard = self.lock();
    let state = &mut *guard;

    match state.status.get(node_id) {
      None => {
        return Err(QueueError::UnknownNode {
          node_id: node_id.to_string(),
        });
      }
      Some(NodeStatus::Running) => {}
      Some(status) => {
        return Err(QueueError::NotRunning {
          node_id: node_id.to_string(),
          status: *status,
        });
      }
    }

    state.unfinished -= 1;
    let mut skipped = Vec::new();

    match outcome {
      Outcome::Success => {
        state.status.insert(node_id.to_string(), NodeStatus::Success);
        for downstream in self.subgraph.downstream(node_id).into_iter().flatten() {
          if state.status.get(downstream) != Some(&NodeStatus::Pending) {
            continue;
          }
          if let Some(remaining) = state.remaining_upstream.get_mut(downstream) {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
              state.ready.push_back(downstream.clone());
            }
          }
        }
      }
      Outcome::Error => {
        state.status.insert(node_id.to_string(), NodeStatus::Error);
        let mut frontier: VecDeque<&str> = self
          .subgraph
          .downstream(node_id)
          .into_iter()
          .flatten()
          .map(String::as_str)
          .collect();

        while let Some(id) = frontier.pop_front() {
          if state.status.get(id) != Some(&NodeStatus::Pending) {
            continue;
          }
          state.status.insert(id.to_string(), NodeStatus::Skipped);
          state.unfinished -= 1;
          skipped.push(id.to_string());
          frontier.extend(
            self
              .subgraph
              .downstream(id)
              .into_iter()
              .flatten()
              .map(String::as_str),
          );
        }
      }
    }

    drop(guard);
    self.changed.notify_waiters();
    Ok(skipped)
  }

  /// Mark every node that has not started as `Skipped`.
  pub fn skip_pending(&self) -> Vec<String> {
    let mut state = self.lock();
    let mut skipped: Vec<String> = state
      .status
      .iter()
      .filter(|(_, status)| **status == NodeStatus::Pending)
      .map(|(id, _)| id.clone())
      .collect();
    skipped.sort();

    for id in &skipped {
      state.status.insert(id.clone(), NodeStatus::Skipped);
    }
    state.unfinished -= skipped.len();
    state.ready.clear();

    drop(state);
    self.changed.notify_waiters();
    skipped
  }

  /// Wait until the queue changes or `poll` elapses, whichever is first.
  pub async fn changed(&self, poll: Duration) {
    let _ = tokio::time::timeout(poll, self.changed.notified()).await;
  }

  pub fn status(&self, node_id: &str) -> Option<NodeStatus> {
    self.lock().status.get(node_id).copied()
  }

  /// Snapshot of every node's status.
  pub fn statuses(&self) -> HashMap<String, NodeStatus> {
    self.lock().status.clone()
  }

  /// Nodes without a final status.
  pub fn remaining(&self) -> usize {
    self.lock().unfinished
  }

  pub fn is_finished(&self) -> bool {
    self.remaining() == 0
  }
}
