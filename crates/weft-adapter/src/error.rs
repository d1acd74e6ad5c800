//! Adapter error types.

/// Errors returned by an adapter while executing a node.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
  /// Could not reach the backing engine. Transient.
  #[error("connection failed: {message}")]
  Connection { message: String },

  /// The backing engine answered with something unreadable. Transient.
  #[error("malformed response: {message}")]
  MalformedResponse { message: String },

  /// Retries of a transient failure were exhausted.
  #[error("external connection exception occurred: {source}")]
  ExternalConnection {
    attempts: u32,
    #[source]
    source: Box<AdapterError>,
  },

  /// The node's payload ran and failed.
  #[error("node '{node_id}' failed: {message}")]
  Execution { node_id: String, message: String },

  /// The node's connection was cancelled before it finished.
  #[error("node '{node_id}' was cancelled")]
  Cancelled { node_id: String },

  /// A process-level interrupt surfaced while executing a node.
  #[error("interrupted")]
  Interrupted,

  /// A system-exit condition raised while executing a node.
  #[error("exit requested with code {code}")]
  Exit { code: i32 },
}

impl AdapterError {
  /// Failures worth retrying.
  pub fn is_transient(&self) -> bool {
    matches!(
      self,
      AdapterError::Connection { .. } | AdapterError::MalformedResponse { .. }
    )
  }

  /// Failures that end the whole run rather than a single node.
  pub fn is_fatal(&self) -> bool {
    matches!(self, AdapterError::Interrupted | AdapterError::Exit { .. })
  }
}
