//! The execution adapter seam.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use weft_config::ResolvedConfig;
use weft_graph::Node;

use crate::error::AdapterError;

/// Everything an adapter needs to execute one node.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
  pub run_id: String,
  pub node: Arc<Node>,
  pub config: ResolvedConfig,
}

impl ExecutionRequest {
  pub fn node_id(&self) -> &str {
    &self.node.unique_id
  }
}

/// What an adapter reports for a node that ran successfully.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResponse {
  /// Short human-readable status, e.g. `"OK"` or `"INSERT 42"`.
  pub message: String,
  #[serde(default)]
  pub output: serde_json::Value,
}

impl ExecutionResponse {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      output: serde_json::Value::Null,
    }
  }
}

/// Executes node payloads against a backing engine.
///
/// Adapters must tolerate concurrent `execute` calls from several workers,
/// and `cancel_all` arriving while those calls are in flight.
#[async_trait]
pub trait Adapter: Send + Sync {
  /// Execute one node's payload with its resolved configuration.
  async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResponse, AdapterError>;

  /// Cancel every open connection. Returns the names of those cancelled.
  async fn cancel_all(&self) -> Vec<String>;
}

#[async_trait]
impl<A: Adapter + ?Sized> Adapter for Arc<A> {
  async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResponse, AdapterError> {
    (**self).execute(request).await
  }

  async fn cancel_all(&self) -> Vec<String> {
    (**self).cancel_all().await
  }
}
