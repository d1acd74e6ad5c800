use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::node::Node;

/// The selected nodes of a run plus the scheduling edges derived for them.
///
/// Edges only ever connect two selected nodes.
#[derive(Debug, Clone)]
pub struct SubGraph {
  nodes: HashMap<String, Arc<Node>>,
  upstream: HashMap<String, BTreeSet<String>>,
  downstream: HashMap<String, BTreeSet<String>>,
  preserve_edges: bool,
}

impl SubGraph {
  /// Assemble a sub-graph from nodes and `(from, to)` scheduling edges.
  ///
  /// Edges naming a node outside `nodes` are dropped.
  pub fn new<I>(nodes: I, edges: &[(String, String)], preserve_edges: bool) -> Self
  where
    I: IntoIterator<Item = Arc<Node>>,
  {
    let nodes: HashMap<String, Arc<Node>> = nodes
      .into_iter()
      .map(|node| (node.unique_id.clone(), node))
      .collect();

    let mut upstream: HashMap<String, BTreeSet<String>> = HashMap::new();
    let mut downstream: HashMap<String, BTreeSet<String>> = HashMap::new();
    for id in nodes.keys() {
      upstream.entry(id.clone()).or_default();
      downstream.entry(id.clone()).or_default();
    }

    for (from, to) in edges {
      if !nodes.contains_key(from) || !nodes.contains_key(to) {
        continue;
      }
      downstream.entry(from.clone()).or_default().insert(to.clone());
      upstream.entry(to.clone()).or_default().insert(from.clone());
    }

    Self {
      nodes,
      upstream,
      downstream,
      preserve_edges,
    }
  }

  pub fn get(&self, node_id: &str) -> Option<&Arc<Node>> {
    self.nodes.get(node_id)
  }

  pub fn contains(&self, node_id: &str) -> bool {
    self.nodes.contains_key(node_id)
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn nodes(&self) -> impl Iterator<Item = &Arc<Node>> {
    self.nodes.values()
  }

  /// Selected ids in sorted order.
  pub fn node_ids(&self) -> BTreeSet<&str> {
    self.nodes.keys().map(String::as_str).collect()
  }

  /// Selected nodes that must finish before `node_id` may run.
  pub fn upstream(&self, node_id: &str) -> Option<&BTreeSet<String>> {
    self.upstream.get(node_id)
  }

  /// Selected nodes waiting on `node_id`.
  pub fn downstream(&self, node_id: &str) -> Option<&BTreeSet<String>> {
    self.downstream.get(node_id)
  }

  pub fn in_degree(&self, node_id: &str) -> usize {
    self.upstream.get(node_id).map_or(0, BTreeSet::len)
  }

  pub fn has_edge(&self, from: &str, to: &str) -> bool {
    self
      .downstream
      .get(from)
      .is_some_and(|targets| targets.contains(to))
  }

  pub fn edge_count(&self) -> usize {
    self.downstream.values().map(BTreeSet::len).sum()
  }

  /// Whether indirect chains through unselected nodes were kept as edges.
  pub fn preserves_edges(&self) -> bool {
    self.preserve_edges
  }
}
