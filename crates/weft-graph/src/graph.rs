use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use weft_config::ProjectDef;

use crate::error::GraphError;
use crate::node::Node;

/// Immutable dependency graph.
///
/// Construction validates the graph (unique ids, known dependencies, no
/// cycles); nothing downstream re-checks those properties.
#[derive(Debug, Clone)]
pub struct Graph {
  nodes: HashMap<String, Arc<Node>>,
  /// Adjacency list: node_id -> list of downstream node_ids.
  adjacency: HashMap<String, Vec<String>>,
  /// Reverse adjacency: node_id -> list of upstream node_ids.
  reverse_adjacency: HashMap<String, Vec<String>>,
  /// Nodes with no upstream dependencies.
  entry_points: Vec<String>,
}

impl Graph {
  /// Build a graph from nodes, wiring edges from each node's `depends_on`.
  pub fn new<I: IntoIterator<Item = Node>>(nodes: I) -> Result<Self, GraphError> {
    let mut by_id: HashMap<String, Arc<Node>> = HashMap::new();
    for node in nodes {
      if by_id.contains_key(&node.unique_id) {
        return Err(GraphError::DuplicateNode(node.unique_id));
      }
      by_id.insert(node.unique_id.clone(), Arc::new(node));
    }

    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut reverse_adjacency: HashMap<String, Vec<String>> = HashMap::new();

    // Initialize all nodes
    for node_id in by_id.keys() {
      adjacency.entry(node_id.clone()).or_default();
      reverse_adjacency.entry(node_id.clone()).or_default();
    }

    for node in by_id.values() {
      for dependency in &node.depends_on {
        if !by_id.contains_key(dependency) {
          return Err(GraphError::UnknownDependency {
            node_id: node.unique_id.clone(),
            dependency: dependency.clone(),
          });
        }
        adjacency
          .entry(dependency.clone())
          .or_default()
          .push(node.unique_id.clone());
        reverse_adjacency
          .entry(node.unique_id.clone())
          .or_default()
          .push(dependency.clone());
      }
    }

    let entry_points: Vec<String> = by_id
      .keys()
      .filter(|id| reverse_adjacency.get(*id).is_none_or(|v| v.is_empty()))
      .cloned()
      .collect();

    let graph = Self {
      nodes: by_id,
      adjacency,
      reverse_adjacency,
      entry_points,
    };
    graph.check_acyclic()?;
    Ok(graph)
  }

  /// Build a graph from a project definition.
  pub fn from_project(project: &ProjectDef) -> Result<Self, GraphError> {
    Self::new(project.nodes.iter().cloned().map(Node::from))
  }

  /// Kahn's algorithm; whatever cannot be ordered sits on a cycle.
  fn check_acyclic(&self) -> Result<(), GraphError> {
    let mut in_degree: HashMap<&str, usize> = self
      .reverse_adjacency
      .iter()
      .map(|(id, upstream)| (id.as_str(), upstream.len()))
      .collect();
    let mut queue: VecDeque<&str> = self.entry_points.iter().map(String::as_str).collect();
    let mut visited = 0;

    while let Some(id) = queue.pop_front() {
      visited += 1;
      for downstream in self.downstream(id) {
        if let Some(degree) = in_degree.get_mut(downstream.as_str()) {
          *degree -= 1;
          if *degree == 0 {
            queue.push_back(downstream.as_str());
          }
        }
      }
    }

    if visited == self.nodes.len() {
      return Ok(());
    }

    let mut nodes: Vec<String> = in_degree
      .into_iter()
      .filter(|(_, degree)| *degree > 0)
      .map(|(id, _)| id.to_string())
      .collect();
    nodes.sort();
    Err(GraphError::CycleDetected { nodes })
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

  pub fn node_ids(&self) -> impl Iterator<Item = &str> {
    self.nodes.keys().map(String::as_str)
  }

  /// Get entry points (nodes with no upstream dependencies).
  pub fn entry_points(&self) -> &[String] {
    &self.entry_points
  }

  /// Get downstream nodes for a given node.
  pub fn downstream(&self, node_id: &str) -> &[String] {
    self
      .adjacency
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Get upstream nodes for a given node.
  pub fn upstream(&self, node_id: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// All transitive upstream nodes, excluding `node_id` itself.
  pub fn ancestors(&self, node_id: &str) -> HashSet<String> {
    self.walk(node_id, |id| self.upstream(id))
  }

  /// All transitive downstream nodes, excluding `node_id` itself.
  pub fn descendants(&self, node_id: &str) -> HashSet<String> {
    self.walk(node_id, |id| self.downstream(id))
  }

  fn walk<'a, F>(&'a self, start: &str, next: F) -> HashSet<String>
  where
    F: Fn(&str) -> &'a [String],
  {
    let mut seen: HashSet<String> = HashSet::new();
    let mut stack: Vec<&str> = next(start).iter().map(String::as_str).collect();

    while let Some(id) = stack.pop() {
      if seen.insert(id.to_string()) {
        stack.extend(next(id).iter().map(String::as_str));
      }
    }
    seen
  }
}
