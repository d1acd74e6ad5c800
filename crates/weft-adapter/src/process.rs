//! Adapter that runs each node payload as a shell child process.
//!
//! Each in-flight child is one "connection", named after the node it runs.
//! `cancel_all` kills every child still running.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use weft_events::{ExecutionNotifier, NoopNotifier};

use crate::adapter::{Adapter, ExecutionRequest, ExecutionResponse};
use crate::error::AdapterError;
use crate::retry::{RetryPolicy, with_retry};

/// Options for [`ProcessAdapter`].
#[derive(Debug, Clone)]
pub struct ProcessAdapterConfig {
  /// Shell used as `<shell> -c <payload>`.
  pub shell: String,
  pub working_dir: Option<PathBuf>,
  /// Retry policy applied to spawning a child.
  pub retry: RetryPolicy,
}

impl Default for ProcessAdapterConfig {
  fn default() -> Self {
    Self {
      shell: "sh".to_string(),
      working_dir: None,
      retry: RetryPolicy::default(),
    }
  }
}

/// Runs node payloads with a local shell.
///
/// The node's resolved configuration is exposed to the child as JSON in
/// `WEFT_CONFIG`, and its id in `WEFT_NODE_ID`.
pub struct ProcessAdapter {
  config: ProcessAdapterConfig,
  notifier: Arc<dyn ExecutionNotifier>,
  connections: Mutex<HashMap<String, CancellationToken>>,
}

impl ProcessAdapter {
  pub fn new(config: ProcessAdapterConfig) -> Self {
    Self::with_notifier(config, Arc::new(NoopNotifier))
  }

  /// Create an adapter that reports spawn retries to `notifier`.
  pub fn with_notifier(config: ProcessAdapterConfig, notifier: Arc<dyn ExecutionNotifier>) -> Self {
    Self {
      config,
      notifier,
      connections: Mutex::new(HashMap::new()),
    }
  }

  /// Names of connections currently open.
  pub fn open_connections(&self) -> Vec<String> {
    let mut names: Vec<String> = self.lock().keys().cloned().collect();
    names.sort();
    names
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
    self.connections.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn open(&self, name: &str) -> CancellationToken {
    let token = CancellationToken::new();
    self.lock().insert(name.to_string(), token.clone());
    token
  }

  fn release(&self, name: &str) {
    self.lock().remove(name);
  }

  fn spawn(&self, request: &ExecutionRequest, config_json: &str) -> Result<Child, AdapterError> {
    let mut command = Command::new(&self.config.shell);
    command
      .arg("-c")
      .arg(&request.node.payload)
      .env("WEFT_NODE_ID", request.node_id())
      .env("WEFT_RUN_ID", &request.run_id)
      .env("WEFT_CONFIG", config_json)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);
    if let Some(dir) = &self.config.working_dir {
      command.current_dir(dir);
    }

    command.spawn().map_err(|e| AdapterError::Connection {
      message: format!("failed to spawn '{}': {}", self.config.shell, e),
    })
  }

  async fn run(
    &self,
    request: &ExecutionRequest,
    token: &CancellationToken,
  ) -> Result<ExecutionResponse, AdapterError> {
    let node_id = request.node_id();
    let config_json =
      serde_json::to_string(request.config.as_map()).map_err(|e| AdapterError::Execution {
        node_id: node_id.to_string(),
        message: format!("failed to serialize config: {}", e),
      })?;

    let child = with_retry(&self.config.retry, self.notifier.as_ref(), || {
      std::future::ready(self.spawn(request, &config_json))
    })
    .await?;

    // dropping the child on cancellation kills it
    let output = tokio::select! {
      output = child.wait_with_output() => output.map_err(|e| AdapterError::Connection {
        message: format!("lost child process: {}", e),
      })?,
      _ = token.cancelled() => {
        return Err(AdapterError::Cancelled { node_id: node_id.to_string() });
      }
    };

    if output.status.success() {
      let stdout = String::from_utf8(output.stdout).map_err(|e| {
        AdapterError::MalformedResponse {
          message: format!("stdout is not utf-8: {}", e),
        }
      })?;
      let message = stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("OK")
        .trim()
        .to_string();
      return Ok(ExecutionResponse::new(message));
    }

    if interrupted(&output.status) {
      return Err(AdapterError::Interrupted);
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let message = if stderr.is_empty() {
      format!("exited with {}", output.status)
    } else {
      stderr
    };
    Err(AdapterError::Execution {
      node_id: node_id.to_string(),
      message,
    })
  }
}

/// Whether the child died from SIGINT, i.e. the user hit ctrl-c.
#[cfg(unix)]
fn interrupted(status: &std::process::ExitStatus) -> bool {
  use std::os::unix::process::ExitStatusExt;
  status.signal() == Some(2)
}

#[cfg(not(unix))]
fn interrupted(_status: &std::process::ExitStatus) -> bool {
  false
}

#[async_trait]
impl Adapter for ProcessAdapter {
  async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResponse, AdapterError> {
    let node_id = request.node_id().to_string();
    if request.node.payload.trim().is_empty() {
      debug!(node_id = %node_id, "empty payload, nothing to run");
      return Ok(ExecutionResponse::new("OK"));
    }

    let token = self.open(&node_id);
    let result = self.run(&request, &token).await;
    self.release(&node_id);
    result
  }

  async fn cancel_all(&self) -> Vec<String> {
    let drained: Vec<(String, CancellationToken)> = self.lock().drain().collect();
    let mut names = Vec::with_capacity(drained.len());
    for (name, token) in drained {
      warn!(connection = %name, "cancelling connection");
      token.cancel();
      names.push(name);
    }
    names.sort();
    info!(cancelled = names.len(), "connections cancelled");
    names
  }
}
