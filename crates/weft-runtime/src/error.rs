//! Runtime error types.

use weft_config::ConfigError;
use weft_graph::{NodeStatus, SelectionError};

/// Misuse of the graph queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
  #[error("node '{node_id}' is not part of this queue")]
  UnknownNode { node_id: String },

  /// Completion reported for a node that was never handed out, or twice.
  #[error("node '{node_id}' is {status}, not running")]
  NotRunning { node_id: String, status: NodeStatus },
}

/// Errors that end a run early.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
  /// The run was interrupted; open connections were cancelled.
  #[error("run interrupted")]
  Interrupted,

  /// A node requested process exit; open connections were cancelled.
  #[error("run exited with code {code}")]
  Exit { code: i32 },

  /// A worker died without reporting a node outcome.
  #[error("worker failed: {message}")]
  Worker { message: String },

  #[error("failed to resolve config for node '{node_id}': {source}")]
  Config {
    node_id: String,
    #[source]
    source: ConfigError,
  },

  #[error(transparent)]
  Queue(#[from] QueueError),

  #[error(transparent)]
  Selection(#[from] SelectionError),

  #[error("invalid runner config: {message}")]
  InvalidConfig { message: String },
}

impl RunError {
  /// Whether this error came from an interrupt or exit request.
  pub fn is_interrupt(&self) -> bool {
    matches!(self, RunError::Interrupted | RunError::Exit { .. })
  }
}
