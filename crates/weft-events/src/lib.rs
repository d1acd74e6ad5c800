//! Run events and notifiers for observability.
//!
//! Events are purely observational: the scheduler and the retry wrapper emit
//! them, nothing in a run depends on anyone listening.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use weft_graph::NodeStatus;

/// Events emitted during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionEvent {
  /// A run has started dispatching nodes.
  RunStarted { run_id: String, node_count: usize },

  /// A node moved to a new status.
  NodeStatusChanged {
    run_id: String,
    node_id: String,
    status: NodeStatus,
  },

  /// A transient external failure is about to be retried.
  RetryException { message: String },

  /// A retry is happening. `attempt` counts from 0.
  RetryOccurred { attempt: u32, max: u32 },

  /// Every selected node reached a final status.
  RunCompleted {
    run_id: String,
    succeeded: usize,
    errored: usize,
    skipped: usize,
  },

  /// The run was interrupted and its connections cancelled.
  RunCancelled { run_id: String, reason: String },
}

/// Receives execution events.
///
/// `notify` is called inline from workers, so implementations should not
/// block.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

impl<T: ExecutionNotifier + ?Sized> ExecutionNotifier for Arc<T> {
  fn notify(&self, event: ExecutionEvent) {
    (**self).notify(event);
  }
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// Sends events to an unbounded channel for asynchronous consumers.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // unbounded so a slow consumer never stalls a worker
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }

  /// A notifier plus the receiving end of its channel.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self { sender }, receiver)
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // receiver may have been dropped
    let _ = self.sender.send(event);
  }
}

/// Writes events to the `tracing` subscriber.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

impl ExecutionNotifier for TracingNotifier {
  fn notify(&self, event: ExecutionEvent) {
    match event {
      ExecutionEvent::RunStarted { run_id, node_count } => {
        info!(%run_id, node_count, "run_started");
      }
      ExecutionEvent::NodeStatusChanged {
        run_id,
        node_id,
        status,
      } => match status {
        NodeStatus::Error => warn!(%run_id, %node_id, %status, "node_status_changed"),
        _ => info!(%run_id, %node_id, %status, "node_status_changed"),
      },
      ExecutionEvent::RetryException { message } => {
        warn!(%message, "retry_exception");
      }
      ExecutionEvent::RetryOccurred { attempt, max } => {
        warn!(attempt, max, "retry_occurred");
      }
      ExecutionEvent::RunCompleted {
        run_id,
        succeeded,
        errored,
        skipped,
      } => {
        info!(%run_id, succeeded, errored, skipped, "run_completed");
      }
      ExecutionEvent::RunCancelled { run_id, reason } => {
        warn!(%run_id, %reason, "run_cancelled");
      }
    }
  }
}
