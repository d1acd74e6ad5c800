use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use weft_adapter::{ProcessAdapter, ProcessAdapterConfig};
use weft_config::{ConfigResolver, ProjectDef, load_layer};
use weft_events::TracingNotifier;
use weft_graph::{Graph, NodeSelector, NodeStatus, Selector};
use weft_runtime::{RunError, RunResult, Runner, RunnerConfig, TaskKind, interrupt};

/// Every selected node succeeded.
const EXIT_SUCCESS: u8 = 0;
/// At least one node errored or was skipped.
const EXIT_NODE_ERROR: u8 = 1;
/// Anything else went wrong.
const EXIT_UNHANDLED: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

/// weft - run a dependency graph of build units
#[derive(Parser)]
#[command(name = "weft")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Directory holding user-level config.json (default: ~/.weft)
  #[arg(long, global = true)]
  config_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build the selected nodes, honoring every upstream dependency
  Run(RunArgs),

  /// Copy the selected nodes; only ordering within the selection applies
  #[command(name = "clone")]
  CloneNodes(RunArgs),

  /// List the selected nodes and their scheduling dependencies
  Ls(SelectArgs),
}

#[derive(Args)]
struct SelectArgs {
  /// Path to the project file (JSON)
  project_file: PathBuf,

  /// Selection criteria (e.g. `tag:nightly`, `path:shop.marts`, `+orders`)
  #[arg(long, short)]
  select: Vec<String>,

  /// Criteria removed from the selection
  #[arg(long)]
  exclude: Vec<String>,
}

#[derive(Args)]
struct RunArgs {
  #[command(flatten)]
  selection: SelectArgs,

  /// Number of concurrent workers (overrides the project setting)
  #[arg(long)]
  threads: Option<usize>,

  /// Stop dispatching after the first node error
  #[arg(long)]
  fail_fast: bool,
}

fn main() -> ExitCode {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let config_dir = cli
    .config_dir
    .or_else(|| dirs::home_dir().map(|home| home.join(".weft")));

  let result = match cli.command {
    Commands::Run(args) => run_task(TaskKind::Run, args, config_dir),
    Commands::CloneNodes(args) => run_task(TaskKind::Clone, args, config_dir),
    Commands::Ls(args) => list(args).map(|()| EXIT_SUCCESS),
  };

  match result {
    Ok(code) => ExitCode::from(code),
    Err(e) => {
      eprintln!("error: {:#}", e);
      ExitCode::from(EXIT_UNHANDLED)
    }
  }
}

struct Loaded {
  project: ProjectDef,
  graph: Graph,
  selector: Selector,
}

fn load(args: &SelectArgs) -> Result<Loaded> {
  let project = ProjectDef::load(&args.project_file)
    .with_context(|| format!("failed to load project: {}", args.project_file.display()))?;
  let graph = Graph::from_project(&project).context("invalid project graph")?;
  let selector =
    Selector::from_args(&args.select, &args.exclude).context("invalid selection criteria")?;

  Ok(Loaded {
    project,
    graph,
    selector,
  })
}

fn run_task(task: TaskKind, args: RunArgs, config_dir: Option<PathBuf>) -> Result<u8> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run_task_async(task, args, config_dir).await })
}

async fn run_task_async(task: TaskKind, args: RunArgs, config_dir: Option<PathBuf>) -> Result<u8> {
  let Loaded {
    project,
    graph,
    selector,
  } = load(&args.selection)?;

  let user_layer = match &config_dir {
    Some(dir) => {
      let path = dir.join("config.json");
      load_layer(&path)
        .with_context(|| format!("failed to read user config: {}", path.display()))?
    }
    None => None,
  };
  let resolver =
    ConfigResolver::from_project(&project, user_layer).context("invalid project config")?;

  let mut config = RunnerConfig::from(&project.run);
  if let Some(threads) = args.threads {
    config.threads = threads;
  }
  config.fail_fast |= args.fail_fast;

  let adapter = ProcessAdapter::with_notifier(
    ProcessAdapterConfig {
      working_dir: project_dir(&args.selection.project_file),
      ..ProcessAdapterConfig::default()
    },
    Arc::new(TracingNotifier),
  );
  let runner = Runner::with_notifier(adapter, resolver, config, TracingNotifier)
    .context("failed to create runner")?;

  info!(project = %project.name, nodes = graph.len(), task = %task, "project_loaded");

  let cancel = CancellationToken::new();
  let listener = interrupt::install(cancel.clone());
  let outcome = runner.run(task, &graph, &selector, cancel).await;
  listener.abort();

  match outcome {
    Ok(result) => {
      print_results(&result);
      Ok(if result.is_success() {
        EXIT_SUCCESS
      } else {
        EXIT_NODE_ERROR
      })
    }
    Err(RunError::Interrupted) => {
      eprintln!("Interrupted; open connections were cancelled");
      Ok(EXIT_INTERRUPTED)
    }
    Err(RunError::Exit { code }) => {
      eprintln!("Exit requested with code {}", code);
      Ok(u8::try_from(code).unwrap_or(EXIT_UNHANDLED))
    }
    Err(e) => Err(e).context(format!("{} failed", task)),
  }
}

fn project_dir(project_file: &Path) -> Option<PathBuf> {
  project_file
    .parent()
    .filter(|dir| !dir.as_os_str().is_empty())
    .map(Path::to_path_buf)
}

fn print_results(result: &RunResult) {
  println!("run {}", result.run_id);
  for row in &result.results {
    println!(
      "{:<40} {:<8} {:>8.2}s  {}",
      row.node_id,
      row.status.to_string(),
      row.elapsed.as_secs_f64(),
      row.message
    );
  }
  println!(
    "finished in {:.2}s: {} succeeded, {} errored, {} skipped",
    result.elapsed.as_secs_f64(),
    result.count(NodeStatus::Success),
    result.count(NodeStatus::Error),
    result.count(NodeStatus::Skipped),
  );
}

fn list(args: SelectArgs) -> Result<()> {
  let Loaded {
    graph, selector, ..
  } = load(&args)?;
  let subgraph = NodeSelector::new(&graph)
    .select(&selector, TaskKind::Run.preserve_edges())
    .context("selection failed")?;

  for id in subgraph.node_ids() {
    let upstream: Vec<&str> = subgraph
      .upstream(id)
      .into_iter()
      .flatten()
      .map(String::as_str)
      .collect();
    if upstream.is_empty() {
      println!("{}", id);
    } else {
      println!("{} <- {}", id, upstream.join(", "));
    }
  }
  Ok(())
}
