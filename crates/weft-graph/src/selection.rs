//! Turning a selection into the sub-graph a run will execute.

use std::collections::BTreeSet;

use tracing::debug;

use crate::error::SelectionError;
use crate::graph::Graph;
use crate::subgraph::SubGraph;

/// Something that picks target node ids out of a graph.
///
/// The engine never interprets selection syntax itself; anything that can
/// produce an id set plugs in here.
pub trait SelectionSpec {
  fn evaluate(&self, graph: &Graph) -> Result<BTreeSet<String>, SelectionError>;
}

impl SelectionSpec for BTreeSet<String> {
  fn evaluate(&self, _graph: &Graph) -> Result<BTreeSet<String>, SelectionError> {
    Ok(self.clone())
  }
}

impl<T: SelectionSpec + ?Sized> SelectionSpec for &T {
  fn evaluate(&self, graph: &Graph) -> Result<BTreeSet<String>, SelectionError> {
    (**self).evaluate(graph)
  }
}

/// Selects sub-graphs of one graph.
#[derive(Debug, Clone, Copy)]
pub struct NodeSelector<'g> {
  graph: &'g Graph,
}

impl<'g> NodeSelector<'g> {
  pub fn new(graph: &'g Graph) -> Self {
    Self { graph }
  }

  pub fn graph(&self) -> &'g Graph {
    self.graph
  }

  /// Evaluate `spec` and derive scheduling edges among the selected nodes.
  ///
  /// With `preserve_edges`, `a -> b` is kept whenever `b` transitively
  /// depends on `a` in the full graph, even through unselected nodes.
  /// Without it, only direct dependencies between selected nodes count.
  pub fn select<S: SelectionSpec + ?Sized>(
    &self,
    spec: &S,
    preserve_edges: bool,
  ) -> Result<SubGraph, SelectionError> {
    let selected = spec.evaluate(self.graph)?;

    if let Some(unknown) = selected.iter().find(|id| !self.graph.contains(id)) {
      return Err(SelectionError::UnknownNode {
        node_id: unknown.clone(),
      });
    }

    let mut edges: Vec<(String, String)> = Vec::new();
    for target in &selected {
      if preserve_edges {
        for ancestor in self.graph.ancestors(target) {
          if selected.contains(&ancestor) {
            edges.push((ancestor, target.clone()));
          }
        }
      } else {
        for upstream in self.graph.upstream(target) {
          if selected.contains(upstream) {
            edges.push((upstream.clone(), target.clone()));
          }
        }
      }
    }

    let nodes = selected
      .iter()
      .filter_map(|id| self.graph.get(id).cloned());
    let subgraph = SubGraph::new(nodes, &edges, preserve_edges);

    debug!(
      selected = subgraph.len(),
      edges = subgraph.edge_count(),
      preserve_edges,
      "selected sub-graph"
    );

    Ok(subgraph)
  }
}
