//! Worker pool behavior against a scripted adapter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use weft_adapter::{
  Adapter, AdapterError, ExecutionRequest, ExecutionResponse, RetryPolicy, with_retry,
};
use weft_config::{AliasTable, ConfigResolver, NodeKind, ResolvedConfig};
use weft_events::{ChannelNotifier, ExecutionEvent, NoopNotifier};
use weft_graph::{Graph, Node, NodeStatus, Selector};
use weft_runtime::{GraphQueue, RunError, RunState, Runner, RunnerConfig, TaskKind};

#[derive(Debug, Clone, Copy)]
enum Script {
  Fail,
  /// Connection refused on every attempt, until retries run out.
  Unreachable,
  Interrupt,
  Exit(i32),
  Panic,
  /// Never finishes on its own.
  Hang,
}

/// Adapter double that records what it was asked to do.
#[derive(Default)]
struct RecordingAdapter {
  scripts: HashMap<String, Script>,
  cancel_calls: AtomicUsize,
  log: Mutex<Vec<(String, &'static str)>>,
  configs: Mutex<HashMap<String, ResolvedConfig>>,
  hanging: Notify,
  /// Cancelled alongside an interrupt, as a real ctrl-c reaches both the
  /// process and its children.
  interrupt_token: Option<CancellationToken>,
}

impl RecordingAdapter {
  fn new() -> Self {
    Self::default()
  }

  fn script(mut self, node_id: &str, script: Script) -> Self {
    self.scripts.insert(node_id.to_string(), script);
    self
  }

  fn cancels_on_interrupt(mut self, token: CancellationToken) -> Self {
    self.interrupt_token = Some(token);
    self
  }

  fn cancel_calls(&self) -> usize {
    self.cancel_calls.load(Ordering::SeqCst)
  }

  fn log(&self) -> Vec<(String, &'static str)> {
    self.log.lock().unwrap().clone()
  }

  fn started(&self) -> Vec<String> {
    self
      .log()
      .into_iter()
      .filter(|(_, event)| *event == "start")
      .map(|(id, _)| id)
      .collect()
  }

  fn position(&self, node_id: &str, event: &str) -> usize {
    self
      .log()
      .iter()
      .position(|(id, e)| id == node_id && *e == event)
      .unwrap_or_else(|| panic!("no {event} recorded for {node_id}"))
  }
}

#[async_trait]
impl Adapter for RecordingAdapter {
  async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResponse, AdapterError> {
    let node_id = request.node_id().to_string();
    self.log.lock().unwrap().push((node_id.clone(), "start"));
    self
      .configs
      .lock()
      .unwrap()
      .insert(node_id.clone(), request.config.clone());

    tokio::time::sleep(Duration::from_millis(5)).await;

    let result = match self.scripts.get(&node_id) {
      None => Ok(ExecutionResponse::new("OK")),
      Some(Script::Fail) => Err(AdapterError::Execution {
        node_id: node_id.clone(),
        message: "relation does not exist".into(),
      }),
      Some(Script::Unreachable) => {
        let policy = RetryPolicy::new(2).with_interval(Duration::ZERO);
        with_retry::<ExecutionResponse, _, _>(&policy, &NoopNotifier, || async {
          Err(AdapterError::Connection {
            message: "connection refused".into(),
          })
        })
        .await
      }
      Some(Script::Interrupt) => {
        if let Some(token) = &self.interrupt_token {
          token.cancel();
        }
        Err(AdapterError::Interrupted)
      }
      Some(Script::Exit(code)) => Err(AdapterError::Exit { code: *code }),
      Some(Script::Panic) => panic!("adapter bug"),
      Some(Script::Hang) => {
        self.hanging.notify_one();
        std::future::pending::<()>().await;
        unreachable!()
      }
    };

    self.log.lock().unwrap().push((node_id, "end"));
    result
  }

  async fn cancel_all(&self) -> Vec<String> {
    self.cancel_calls.fetch_add(1, Ordering::SeqCst);
    vec!["master".to_string()]
  }
}

fn config(threads: usize) -> RunnerConfig {
  RunnerConfig {
    threads,
    poll_interval: Duration::from_millis(5),
    ..RunnerConfig::default()
  }
}

/// a -> b -> c, a -> d, plus an unrelated e.
fn graph() -> Graph {
  Graph::new([
    Node::new("a"),
    Node::new("b").depends_on(["a"]),
    Node::new("c").depends_on(["b"]),
    Node::new("d").depends_on(["a"]),
    Node::new("e"),
  ])
  .unwrap()
}

fn queue(graph: &Graph) -> GraphQueue {
  TaskKind::Run.graph_queue(graph, &Selector::All).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_nodes_start_only_after_upstreams_finish() {
  let graph = Graph::new([
    Node::new("root"),
    Node::new("left").depends_on(["root"]),
    Node::new("right").depends_on(["root"]),
    Node::new("join").depends_on(["left", "right"]),
    Node::new("tail").depends_on(["join"]),
    Node::new("solo"),
  ])
  .unwrap();
  let adapter = Arc::new(RecordingAdapter::new());
  let runner = Runner::new(adapter.clone(), ConfigResolver::default(), config(4)).unwrap();

  let result = runner
    .execute_nodes(queue(&graph), CancellationToken::new())
    .await
    .unwrap();

  assert!(result.is_success());
  assert_eq!(result.results.len(), 6);
  for node in graph.nodes() {
    for upstream in &node.depends_on {
      assert!(
        adapter.position(upstream, "end") < adapter.position(&node.unique_id, "start"),
        "{} started before {} finished",
        node.unique_id,
        upstream
      );
    }
  }
  assert_eq!(runner.state(), RunState::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_node_failure_skips_descendants_and_keeps_connections() {
  let adapter = Arc::new(RecordingAdapter::new().script("b", Script::Fail));
  let runner = Runner::new(adapter.clone(), ConfigResolver::default(), config(2)).unwrap();

  let result = runner
    .execute_nodes(queue(&graph()), CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(result.status("a"), Some(NodeStatus::Success));
  assert_eq!(result.status("b"), Some(NodeStatus::Error));
  assert_eq!(result.status("c"), Some(NodeStatus::Skipped));
  assert_eq!(result.status("d"), Some(NodeStatus::Success));
  assert_eq!(result.status("e"), Some(NodeStatus::Success));
  assert!(result.get("b").unwrap().message.contains("relation does not exist"));
  assert!(!adapter.started().contains(&"c".to_string()));
  assert_eq!(adapter.cancel_calls(), 0);
  assert_eq!(runner.state(), RunState::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_interrupt_cancels_connections_once() {
  let adapter = Arc::new(RecordingAdapter::new().script("b", Script::Hang));
  let runner = Runner::new(adapter.clone(), ConfigResolver::default(), config(2)).unwrap();
  let cancel = CancellationToken::new();

  let interrupter = {
    let adapter = adapter.clone();
    let cancel = cancel.clone();
    tokio::spawn(async move {
      adapter.hanging.notified().await;
      cancel.cancel();
    })
  };

  let err = tokio::time::timeout(
    Duration::from_secs(5),
    runner.execute_nodes(queue(&graph()), cancel),
  )
  .await
  .unwrap()
  .unwrap_err();
  interrupter.await.unwrap();

  assert!(matches!(err, RunError::Interrupted));
  assert_eq!(adapter.cancel_calls(), 1);
  assert!(!adapter.started().contains(&"c".to_string()));
  assert_eq!(runner.state(), RunState::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_interrupt_raised_by_node_cancels_connections_once() {
  let adapter = Arc::new(RecordingAdapter::new().script("a", Script::Interrupt));
  let runner = Runner::new(adapter.clone(), ConfigResolver::default(), config(3)).unwrap();

  let err = runner
    .execute_nodes(queue(&graph()), CancellationToken::new())
    .await
    .unwrap_err();

  assert!(matches!(err, RunError::Interrupted));
  assert_eq!(adapter.cancel_calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_node_interrupt_and_external_cancel_together_cancel_once() {
  let cancel = CancellationToken::new();
  let adapter = Arc::new(
    RecordingAdapter::new()
      .script("a", Script::Interrupt)
      .script("e", Script::Interrupt)
      .cancels_on_interrupt(cancel.clone()),
  );
  let runner = Runner::new(adapter.clone(), ConfigResolver::default(), config(2)).unwrap();

  let err = tokio::time::timeout(
    Duration::from_secs(5),
    runner.execute_nodes(queue(&graph()), cancel.clone()),
  )
  .await
  .unwrap()
  .unwrap_err();

  assert!(matches!(err, RunError::Interrupted));
  assert!(cancel.is_cancelled());
  assert_eq!(adapter.cancel_calls(), 1);
  assert!(!adapter.started().contains(&"b".to_string()));
  assert_eq!(runner.state(), RunState::Cancelled);
}

#[tokio::test]
async fn test_exhausted_retries_fail_the_node_without_cancelling() {
  let adapter = Arc::new(RecordingAdapter::new().script("b", Script::Unreachable));
  let runner = Runner::new(adapter.clone(), ConfigResolver::default(), config(2)).unwrap();

  let result = runner
    .execute_nodes(queue(&graph()), CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(result.status("b"), Some(NodeStatus::Error));
  assert!(
    result
      .get("b")
      .unwrap()
      .message
      .contains("external connection exception occurred")
  );
  assert_eq!(result.status("c"), Some(NodeStatus::Skipped));
  assert_eq!(result.status("d"), Some(NodeStatus::Success));
  assert_eq!(adapter.cancel_calls(), 0);
  assert_eq!(runner.state(), RunState::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_exit_request_cancels_connections_once() {
  let adapter = Arc::new(RecordingAdapter::new().script("d", Script::Exit(2)));
  let runner = Runner::new(adapter.clone(), ConfigResolver::default(), config(2)).unwrap();

  let err = runner
    .execute_nodes(queue(&graph()), CancellationToken::new())
    .await
    .unwrap_err();

  assert!(matches!(err, RunError::Exit { code: 2 }));
  assert_eq!(adapter.cancel_calls(), 1);
  assert_eq!(runner.state(), RunState::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worker_panic_does_not_cancel_connections() {
  let adapter = Arc::new(RecordingAdapter::new().script("a", Script::Panic));
  let runner = Runner::new(adapter.clone(), ConfigResolver::default(), config(2)).unwrap();

  let err = runner
    .execute_nodes(queue(&graph()), CancellationToken::new())
    .await
    .unwrap_err();

  assert!(matches!(err, RunError::Worker { .. }));
  assert_eq!(adapter.cancel_calls(), 0);
}

#[tokio::test]
async fn test_already_cancelled_run_dispatches_nothing() {
  let adapter = Arc::new(RecordingAdapter::new());
  let runner = Runner::new(adapter.clone(), ConfigResolver::default(), config(2)).unwrap();
  let cancel = CancellationToken::new();
  cancel.cancel();

  let err = runner
    .execute_nodes(queue(&graph()), cancel)
    .await
    .unwrap_err();

  assert!(matches!(err, RunError::Interrupted));
  assert!(adapter.started().is_empty());
  assert_eq!(adapter.cancel_calls(), 1);
}

#[tokio::test]
async fn test_fail_fast_skips_everything_not_started() {
  let graph = Graph::new([Node::new("x"), Node::new("y"), Node::new("z")]).unwrap();
  let adapter = Arc::new(
    RecordingAdapter::new()
      .script("x", Script::Fail)
      .script("y", Script::Fail)
      .script("z", Script::Fail),
  );
  let runner = Runner::new(
    adapter.clone(),
    ConfigResolver::default(),
    RunnerConfig {
      fail_fast: true,
      ..config(1)
    },
  )
  .unwrap();

  let result = runner
    .execute_nodes(queue(&graph), CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(adapter.started().len(), 1);
  assert_eq!(result.count(NodeStatus::Error), 1);
  assert_eq!(result.count(NodeStatus::Skipped), 2);
  assert_eq!(adapter.cancel_calls(), 0);
}

#[tokio::test]
async fn test_without_fail_fast_independent_failures_all_run() {
  let graph = Graph::new([Node::new("x"), Node::new("y"), Node::new("z")]).unwrap();
  let adapter = Arc::new(
    RecordingAdapter::new()
      .script("x", Script::Fail)
      .script("y", Script::Fail)
      .script("z", Script::Fail),
  );
  let runner = Runner::new(adapter.clone(), ConfigResolver::default(), config(1)).unwrap();

  let result = runner
    .execute_nodes(queue(&graph), CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(adapter.started().len(), 3);
  assert_eq!(result.count(NodeStatus::Error), 3);
}

fn object(value: Value) -> Map<String, Value> {
  match value {
    Value::Object(map) => map,
    _ => panic!("expected a JSON object"),
  }
}

#[tokio::test]
async fn test_nodes_receive_resolved_config() {
  let resolver = ConfigResolver::new(AliasTable::new([("materialised", "materialized")]).unwrap())
    .with_base_layer(object(json!({ "materialized": "view", "schema": "public" })))
    .with_tree(object(json!({
      "shop": { "+schema": "shop", "marts": { "+materialised": "table" } }
    })));
  let graph = Graph::new([
    Node::new("orders")
      .with_fqn(["shop", "marts", "orders"])
      .with_config(object(json!({ "tags": ["finance"] }))),
    Node::new("events").with_fqn(["shop", "events"]),
  ])
  .unwrap();
  let adapter = Arc::new(RecordingAdapter::new());
  let runner = Runner::new(adapter.clone(), resolver, config(2)).unwrap();

  runner
    .execute_nodes(queue(&graph), CancellationToken::new())
    .await
    .unwrap();

  let configs = adapter.configs.lock().unwrap();
  let orders = &configs["orders"];
  assert_eq!(orders.get_str("materialized"), Some("table"));
  assert_eq!(orders.get_str("schema"), Some("shop"));
  assert_eq!(orders.get("tags"), Some(&json!(["finance"])));
  assert_eq!(configs["events"].get_str("materialized"), Some("view"));
  assert_eq!(runner.config_cache().len(), 2);
}

#[tokio::test]
async fn test_each_run_resolves_config_afresh() {
  let adapter = Arc::new(RecordingAdapter::new());
  let runner = Runner::new(adapter.clone(), ConfigResolver::default(), config(1)).unwrap();

  for schema in ["first", "second"] {
    let graph =
      Graph::new([Node::new("a").with_config(object(json!({ "schema": schema })))]).unwrap();
    runner
      .run(TaskKind::Run, &graph, &Selector::All, CancellationToken::new())
      .await
      .unwrap();

    let configs = adapter.configs.lock().unwrap();
    assert_eq!(configs["a"].get_str("schema"), Some(schema));
    assert_eq!(
      runner.config_cache().get("a").unwrap().get_str("schema"),
      Some(schema)
    );
  }
}

#[tokio::test]
async fn test_analysis_nodes_complete_without_the_adapter() {
  let graph = Graph::new([
    Node::new("model"),
    Node::new("report")
      .with_kind(NodeKind::Analysis)
      .depends_on(["model"]),
  ])
  .unwrap();
  let adapter = Arc::new(RecordingAdapter::new());
  let runner = Runner::new(adapter.clone(), ConfigResolver::default(), config(1)).unwrap();

  let result = runner
    .execute_nodes(queue(&graph), CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(adapter.started(), vec!["model".to_string()]);
  assert_eq!(result.status("report"), Some(NodeStatus::Success));
  assert_eq!(result.get("report").unwrap().message, "compiled");
}

#[tokio::test]
async fn test_events_bracket_the_run() {
  let (notifier, mut rx) = ChannelNotifier::channel();
  let adapter = Arc::new(RecordingAdapter::new().script("b", Script::Fail));
  let runner =
    Runner::with_notifier(adapter, ConfigResolver::default(), config(2), notifier).unwrap();

  runner
    .execute_nodes(queue(&graph()), CancellationToken::new())
    .await
    .unwrap();

  let mut events = Vec::new();
  while let Ok(event) = rx.try_recv() {
    events.push(event);
  }

  assert!(matches!(
    events.first(),
    Some(ExecutionEvent::RunStarted { node_count: 5, .. })
  ));
  assert!(matches!(
    events.last(),
    Some(ExecutionEvent::RunCompleted {
      succeeded: 3,
      errored: 1,
      skipped: 1,
      ..
    })
  ));
  assert!(events.iter().any(|event| matches!(
    event,
    ExecutionEvent::NodeStatusChanged { node_id, status: NodeStatus::Skipped, .. } if node_id == "c"
  )));
}

#[tokio::test]
async fn test_run_selects_by_task_kind() {
  let adapter = Arc::new(RecordingAdapter::new());
  let runner = Runner::new(adapter.clone(), ConfigResolver::default(), config(2)).unwrap();
  let selector: Selector = "+c".parse().unwrap();

  let result = runner
    .run(TaskKind::Clone, &graph(), &selector, CancellationToken::new())
    .await
    .unwrap();

  let mut started = adapter.started();
  started.sort();
  assert_eq!(started, vec!["a", "b", "c"]);
  assert_eq!(result.results.len(), 3);
}

#[test]
fn test_zero_threads_is_rejected() {
  let result = Runner::new(
    RecordingAdapter::new(),
    ConfigResolver::default(),
    RunnerConfig {
      threads: 0,
      ..RunnerConfig::default()
    },
  );

  assert!(matches!(result, Err(RunError::InvalidConfig { .. })));
}
