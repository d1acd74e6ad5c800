//! Scheduling core for weft.
//!
//! A [`GraphQueue`] hands out nodes of a selected sub-graph in dependency
//! order, and a [`Runner`] drains it with a pool of workers that execute
//! nodes through a [`weft_adapter::Adapter`].

mod cache;
mod dispatch;
mod error;
pub mod interrupt;
mod queue;
mod result;
mod runner;
mod task;

pub use cache::ConfigCache;
pub use dispatch::{Behavior, behavior};
pub use error::{QueueError, RunError};
pub use queue::{GraphQueue, Outcome, Pop};
pub use result::{NodeRunResult, RunResult};
pub use runner::{RunState, Runner, RunnerConfig};
pub use task::{TaskKind, get_graph_queue};
