//! Worker pool that drives a graph queue to completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use weft_adapter::{Adapter, AdapterError, ExecutionRequest};
use weft_config::{ConfigResolver, RunConfig};
use weft_events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use weft_graph::{Graph, Node, NodeStatus, SelectionSpec};

use crate::cache::ConfigCache;
use crate::dispatch::{Behavior, behavior};
use crate::error::RunError;
use crate::queue::{GraphQueue, Outcome, Pop};
use crate::result::{NodeRunResult, RunResult};
use crate::task::TaskKind;

/// Worker pool options.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
  /// Number of concurrent workers.
  pub threads: usize,
  /// Stop dispatching after the first node error.
  pub fail_fast: bool,
  /// How long an idle worker waits before polling the queue again.
  pub poll_interval: Duration,
}

fn default_threads() -> usize {
  1
}

fn default_poll_interval() -> Duration {
  Duration::from_millis(50)
}

impl Default for RunnerConfig {
  fn default() -> Self {
    Self {
      threads: default_threads(),
      fail_fast: false,
      poll_interval: default_poll_interval(),
    }
  }
}

impl From<&RunConfig> for RunnerConfig {
  fn from(run: &RunConfig) -> Self {
    Self {
      threads: run.threads,
      fail_fast: run.fail_fast,
      ..Self::default()
    }
  }
}

/// Lifecycle of a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
  Idle,
  Running,
  Completed,
  Cancelled,
}

/// Executes selected nodes through an [`Adapter`] with a pool of workers.
///
/// Generic over `N: ExecutionNotifier`. Use `Runner::new()` to discard
/// events, or `Runner::with_notifier()` to observe them.
pub struct Runner<A: Adapter, N: ExecutionNotifier = NoopNotifier> {
  adapter: Arc<A>,
  resolver: Arc<ConfigResolver>,
  config: RunnerConfig,
  notifier: Arc<N>,
  /// Cache of the most recent run; each run starts with an empty one.
  last_cache: Mutex<ConfigCache>,
  state: Mutex<RunState>,
}

impl<A: Adapter + 'static> Runner<A, NoopNotifier> {
  pub fn new(adapter: A, resolver: ConfigResolver, config: RunnerConfig) -> Result<Self, RunError> {
    Self::with_notifier(adapter, resolver, config, NoopNotifier)
  }
}

impl<A: Adapter + 'static, N: ExecutionNotifier + 'static> Runner<A, N> {
  pub fn with_notifier(
    adapter: A,
    resolver: ConfigResolver,
    config: RunnerConfig,
    notifier: N,
  ) -> Result<Self, RunError> {
    if config.threads == 0 {
      return Err(RunError::InvalidConfig {
        message: "threads must be at least 1".to_string(),
      });
    }

    Ok(Self {
      adapter: Arc::new(adapter),
      resolver: Arc::new(resolver),
      config,
      notifier: Arc::new(notifier),
      last_cache: Mutex::new(ConfigCache::new()),
      state: Mutex::new(RunState::Idle),
    })
  }

  pub fn config(&self) -> &RunnerConfig {
    &self.config
  }

  pub fn state(&self) -> RunState {
    *self.lock_state()
  }

  /// Configuration resolved by the current or most recent run, keyed by
  /// node id.
  pub fn config_cache(&self) -> ConfigCache {
    self
      .last_cache
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  fn lock_state(&self) -> MutexGuard<'_, RunState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn set_state(&self, state: RunState) {
    *self.lock_state() = state;
  }

  /// Select nodes for `task` and execute them.
  pub async fn run<S: SelectionSpec + ?Sized>(
    &self,
    task: TaskKind,
    graph: &Graph,
    spec: &S,
    cancel: CancellationToken,
  ) -> Result<RunResult, RunError> {
    let queue = task.graph_queue(graph, spec)?;
    info!(task = %task, selected = queue.len(), "task_started");
    self.execute_nodes(queue, cancel).await
  }

  /// Drive `queue` to completion with `threads` workers.
  ///
  /// Node failures are recorded in the result. Cancelling `cancel`, or a
  /// node raising an interrupt or exit request, stops dispatch, cancels the
  /// adapter's open connections once, and returns the interrupt as an error.
  #[instrument(
    name = "execute_nodes",
    skip(self, queue, cancel),
    fields(threads = self.config.threads, nodes = queue.len())
  )]
  pub async fn execute_nodes(
    &self,
    queue: GraphQueue,
    cancel: CancellationToken,
  ) -> Result<RunResult, RunError> {
    let run_id = uuid::Uuid::new_v4().to_string();
    let started = Instant::now();
    self.set_state(RunState::Running);
    let cache = ConfigCache::new();
    *self.last_cache.lock().unwrap_or_else(PoisonError::into_inner) = cache.clone();

    info!(run_id = %run_id, nodes = queue.len(), "run_started");
    self.notifier.notify(ExecutionEvent::RunStarted {
      run_id: run_id.clone(),
      node_count: queue.len(),
    });

    let run = Arc::new(RunContext {
      run_id: run_id.clone(),
      adapter: self.adapter.clone(),
      resolver: self.resolver.clone(),
      cache,
      notifier: self.notifier.clone(),
      queue: Arc::new(queue),
      dispatch: cancel.child_token(),
      fail_fast: self.config.fail_fast,
      poll_interval: self.config.poll_interval,
      results: Mutex::new(Vec::new()),
      connections_cancelled: AtomicBool::new(false),
    });

    let mut workers = JoinSet::new();
    for worker in 0..self.config.threads {
      workers.spawn(run.clone().worker_loop(worker));
    }

    let failure = loop {
      tokio::select! {
        biased;
        _ = cancel.cancelled() => break Some(RunError::Interrupted),
        joined = workers.join_next() => match joined {
          None => break None,
          Some(Ok(Ok(()))) => {}
          Some(Ok(Err(e))) => break Some(e),
          Some(Err(e)) => break Some(RunError::Worker { message: e.to_string() }),
        },
      }
    };

    let Some(failure) = failure else {
      let result = run.finish(started.elapsed());
      self.set_state(RunState::Completed);
      info!(
        run_id = %run_id,
        succeeded = result.count(NodeStatus::Success),
        errored = result.count(NodeStatus::Error),
        skipped = result.count(NodeStatus::Skipped),
        "run_completed"
      );
      self.notifier.notify(ExecutionEvent::RunCompleted {
        run_id,
        succeeded: result.count(NodeStatus::Success),
        errored: result.count(NodeStatus::Error),
        skipped: result.count(NodeStatus::Skipped),
      });
      return Ok(result);
    };

    run.dispatch.cancel();
    if failure.is_interrupt() {
      run.cancel_connections().await;
    }
    workers.abort_all();
    while workers.join_next().await.is_some() {}

    self.set_state(RunState::Cancelled);
    error!(run_id = %run_id, error = %failure, "run_cancelled");
    self.notifier.notify(ExecutionEvent::RunCancelled {
      run_id,
      reason: failure.to_string(),
    });
    Err(failure)
  }
}

/// State shared by the workers of one run.
struct RunContext<A, N> {
  run_id: String,
  adapter: Arc<A>,
  resolver: Arc<ConfigResolver>,
  cache: ConfigCache,
  notifier: Arc<N>,
  queue: Arc<GraphQueue>,
  /// Cancelled to stop handing out nodes.
  dispatch: CancellationToken,
  fail_fast: bool,
  poll_interval: Duration,
  results: Mutex<Vec<NodeRunResult>>,
  connections_cancelled: AtomicBool,
}

impl<A: Adapter + 'static, N: ExecutionNotifier + 'static> RunContext<A, N> {
  async fn worker_loop(self: Arc<Self>, worker: usize) -> Result<(), RunError> {
    loop {
      if self.dispatch.is_cancelled() {
        return Ok(());
      }

      match self.queue.pop() {
        Pop::Finished => return Ok(()),
        Pop::Wait => {
          tokio::select! {
            _ = self.dispatch.cancelled() => return Ok(()),
            _ = self.queue.changed(self.poll_interval) => {}
          }
        }
        Pop::Ready(node) => {
          info!(run_id = %self.run_id, worker, node_id = %node.unique_id, "node_started");
          self.run_node(node).await?;
        }
      }
    }
  }

  async fn run_node(&self, node: Arc<Node>) -> Result<(), RunError> {
    self.status_changed(&node.unique_id, NodeStatus::Running);
    let started = Instant::now();

    let outcome = match self.execute(node.clone()).await {
      Ok(message) => Ok(message),
      Err(NodeFailure::Adapter(err)) if err.is_fatal() => {
        self.dispatch.cancel();
        return Err(match err {
          AdapterError::Exit { code } => RunError::Exit { code },
          _ => RunError::Interrupted,
        });
      }
      Err(failure) => Err(failure.to_string()),
    };
    let elapsed = started.elapsed();

    match outcome {
      Ok(message) => {
        info!(
          run_id = %self.run_id,
          node_id = %node.unique_id,
          elapsed_ms = elapsed.as_millis() as u64,
          "node_completed"
        );
        self.queue.mark_done(&node.unique_id, Outcome::Success)?;
        self.record(&node.unique_id, NodeStatus::Success, message, elapsed);
      }
      Err(message) => {
        warn!(
          run_id = %self.run_id,
          node_id = %node.unique_id,
          error = %message,
          "node_failed"
        );
        let skipped = self.queue.mark_done(&node.unique_id, Outcome::Error)?;
        self.record(&node.unique_id, NodeStatus::Error, message, elapsed);
        for id in skipped {
          let reason = format!("upstream '{}' failed", node.unique_id);
          self.record(&id, NodeStatus::Skipped, reason, Duration::ZERO);
        }

        if self.fail_fast {
          warn!(run_id = %self.run_id, node_id = %node.unique_id, "fail_fast_triggered");
          self.dispatch.cancel();
          for id in self.queue.skip_pending() {
            self.record(&id, NodeStatus::Skipped, "fail fast".to_string(), Duration::ZERO);
          }
        }
      }
    }

    Ok(())
  }

  /// Resolve config and, when the node's kind calls for it, run the adapter.
  async fn execute(&self, node: Arc<Node>) -> Result<String, NodeFailure> {
    let config = self
      .cache
      .get_or_insert_with(&node.unique_id, || {
        self.resolver.resolve(&node.fqn, &node.config)
      })
      .map_err(|source| {
        NodeFailure::Config(RunError::Config {
          node_id: node.unique_id.clone(),
          source,
        })
      })?;

    match behavior(node.kind) {
      Behavior::CompileOnly => Ok("compiled".to_string()),
      Behavior::Execute => {
        let request = ExecutionRequest {
          run_id: self.run_id.clone(),
          node,
          config,
        };
        let response = self
          .adapter
          .execute(request)
          .await
          .map_err(NodeFailure::Adapter)?;
        Ok(response.message)
      }
    }
  }

  fn record(&self, node_id: &str, status: NodeStatus, message: String, elapsed: Duration) {
    self.status_changed(node_id, status);
    self
      .results
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(NodeRunResult {
        node_id: node_id.to_string(),
        status,
        message,
        elapsed,
      });
  }

  fn status_changed(&self, node_id: &str, status: NodeStatus) {
    self.notifier.notify(ExecutionEvent::NodeStatusChanged {
      run_id: self.run_id.clone(),
      node_id: node_id.to_string(),
      status,
    });
  }

  /// Ask the adapter to drop every open connection, at most once per run.
  async fn cancel_connections(&self) {
    if self.connections_cancelled.swap(true, Ordering::SeqCst) {
      return;
    }
    let cancelled = self.adapter.cancel_all().await;
    warn!(
      run_id = %self.run_id,
      connections = ?cancelled,
      "connections_cancelled"
    );
  }

  fn finish(&self, elapsed: Duration) -> RunResult {
    let results = std::mem::take(&mut *self.results.lock().unwrap_or_else(PoisonError::into_inner));
    RunResult {
      run_id: self.run_id.clone(),
      results,
      elapsed,
    }
  }
}

/// Why a single node did not succeed.
#[derive(Debug, thiserror::Error)]
enum NodeFailure {
  #[error(transparent)]
  Adapter(AdapterError),
  #[error(transparent)]
  Config(RunError),
}
