mod error;
mod graph;
mod node;
mod selection;
mod selector;
mod subgraph;

pub use error::{GraphError, SelectionError};
pub use graph::Graph;
pub use node::{Node, NodeStatus};
pub use selection::{NodeSelector, SelectionSpec};
pub use selector::Selector;
pub use subgraph::SubGraph;

pub use weft_config::NodeKind;
