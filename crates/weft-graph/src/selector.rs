//! Reference selection criteria used by the command line.

use std::collections::BTreeSet;
use std::str::FromStr;

use weft_config::NodeKind;

use crate::error::SelectionError;
use crate::graph::Graph;
use crate::node::Node;
use crate::selection::SelectionSpec;

/// A composable criterion over a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
  All,
  Id(String),
  Tag(String),
  /// Nodes whose qualified name starts with these segments.
  Path(Vec<String>),
  Kind(NodeKind),
  Union(Vec<Selector>),
  Intersection(Vec<Selector>),
  Difference(Box<Selector>, Box<Selector>),
  /// The inner selection plus everything upstream of it.
  Ancestors(Box<Selector>),
  /// The inner selection plus everything downstream of it.
  Descendants(Box<Selector>),
}

impl Selector {
  /// Union of `include` minus the union of `exclude`.
  ///
  /// An empty `include` selects every node.
  pub fn from_args(include: &[String], exclude: &[String]) -> Result<Self, SelectionError> {
    let include = if include.is_empty() {
      Selector::All
    } else {
      Selector::Union(
        include
          .iter()
          .map(|s| s.parse())
          .collect::<Result<Vec<_>, _>>()?,
      )
    };

    if exclude.is_empty() {
      return Ok(include);
    }

    let exclude = Selector::Union(
      exclude
        .iter()
        .map(|s| s.parse())
        .collect::<Result<Vec<_>, _>>()?,
    );
    Ok(Selector::Difference(Box::new(include), Box::new(exclude)))
  }
}

impl SelectionSpec for Selector {
  fn evaluate(&self, graph: &Graph) -> Result<BTreeSet<String>, SelectionError> {
    let selected = match self {
      Selector::All => graph.node_ids().map(str::to_string).collect(),
      Selector::Id(id) => {
        if !graph.contains(id) {
          return Err(SelectionError::UnknownNode {
            node_id: id.clone(),
          });
        }
        BTreeSet::from([id.clone()])
      }
      Selector::Tag(tag) => matching(graph, |node| node.tags.contains(tag)),
      Selector::Path(prefix) => matching(graph, |node| node.fqn.starts_with(prefix)),
      Selector::Kind(kind) => matching(graph, |node| node.kind == *kind),
      Selector::Union(parts) => {
        let mut selected = BTreeSet::new();
        for part in parts {
          selected.extend(part.evaluate(graph)?);
        }
        selected
      }
      Selector::Intersection(parts) => {
        let mut parts = parts.iter();
        let Some(first) = parts.next() else {
          return Ok(BTreeSet::new());
        };
        let mut selected = first.evaluate(graph)?;
        for part in parts {
          let other = part.evaluate(graph)?;
          selected.retain(|id| other.contains(id));
        }
        selected
      }
      Selector::Difference(include, exclude) => {
        let exclude = exclude.evaluate(graph)?;
        let mut selected = include.evaluate(graph)?;
        selected.retain(|id| !exclude.contains(id));
        selected
      }
      Selector::Ancestors(inner) => {
        let mut selected = inner.evaluate(graph)?;
        for id in selected.clone() {
          selected.extend(graph.ancestors(&id));
        }
        selected
      }
      Selector::Descendants(inner) => {
        let mut selected = inner.evaluate(graph)?;
        for id in selected.clone() {
          selected.extend(graph.descendants(&id));
        }
        selected
      }
    };

    Ok(selected)
  }
}

fn matching<F: Fn(&Node) -> bool>(graph: &Graph, pred: F) -> BTreeSet<String> {
  graph
    .nodes()
    .filter(|node| pred(node))
    .map(|node| node.unique_id.clone())
    .collect()
}

impl FromStr for Selector {
  type Err = SelectionError;

  /// Parses `tag:x`, `path:a.b`, `kind:model`, `*`, or a node id, optionally
  /// wrapped as `+expr` (with ancestors) and/or `expr+` (with descendants).
  fn from_str(input: &str) -> Result<Self, Self::Err> {
    let invalid = |message: &str| SelectionError::InvalidSelector {
      input: input.to_string(),
      message: message.to_string(),
    };

    let trimmed = input.trim();
    let (with_ancestors, rest) = match trimmed.strip_prefix('+') {
      Some(rest) => (true, rest),
      None => (false, trimmed),
    };
    let (with_descendants, core) = match rest.strip_suffix('+') {
      Some(core) => (true, core),
      None => (false, rest),
    };

    if core.is_empty() {
      return Err(invalid("empty selector"));
    }

    let mut selector = match core.split_once(':') {
      Some(("tag", tag)) if !tag.is_empty() => Selector::Tag(tag.to_string()),
      Some(("path", path)) if !path.is_empty() => {
        Selector::Path(path.split('.').map(str::to_string).collect())
      }
      Some(("kind", kind)) => Selector::Kind(kind.parse().map_err(|e: String| invalid(&e))?),
      Some((method, _)) => return Err(invalid(&format!("unsupported method '{}'", method))),
      None if core == "*" => Selector::All,
      None => Selector::Id(core.to_string()),
    };

    if with_ancestors {
      selector = Selector::Ancestors(Box::new(selector));
    }
    if with_descendants {
      selector = Selector::Descendants(Box::new(selector));
    }
    Ok(selector)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn graph() -> Graph {
    Graph::new([
      Node::new("raw_orders")
        .with_kind(NodeKind::Seed)
        .with_fqn(["shop", "raw", "orders"]),
      Node::new("stg_orders")
        .depends_on(["raw_orders"])
        .with_fqn(["shop", "staging", "orders"])
        .with_tags(["nightly"]),
      Node::new("orders")
        .depends_on(["stg_orders"])
        .with_fqn(["shop", "marts", "orders"])
        .with_tags(["nightly", "finance"]),
      Node::new("customers").with_fqn(["shop", "marts", "customers"]),
    ])
    .unwrap()
  }

  fn eval(input: &str) -> Vec<String> {
    let selector: Selector = input.parse().unwrap();
    selector.evaluate(&graph()).unwrap().into_iter().collect()
  }

  #[test]
  fn test_parse_methods() {
    assert_eq!(eval("tag:nightly"), vec!["orders", "stg_orders"]);
    assert_eq!(eval("path:shop.marts"), vec!["customers", "orders"]);
    assert_eq!(eval("kind:seed"), vec!["raw_orders"]);
    assert_eq!(eval("customers"), vec!["customers"]);
    assert_eq!(eval("*").len(), 4);
  }

  #[test]
  fn test_graph_operators() {
    assert_eq!(eval("+orders"), vec!["orders", "raw_orders", "stg_orders"]);
    assert_eq!(eval("stg_orders+"), vec!["orders", "stg_orders"]);
    assert_eq!(eval("+stg_orders+"), vec!["orders", "raw_orders", "stg_orders"]);
  }

  #[test]
  fn test_from_args_applies_excludes() {
    let selector = Selector::from_args(
      &["path:shop".to_string()],
      &["tag:finance".to_string(), "kind:seed".to_string()],
    )
    .unwrap();
    let selected: Vec<String> = selector.evaluate(&graph()).unwrap().into_iter().collect();

    assert_eq!(selected, vec!["customers", "stg_orders"]);
  }

  #[test]
  fn test_intersection() {
    let selector = Selector::Intersection(vec![
      Selector::Tag("nightly".into()),
      Selector::Path(vec!["shop".into(), "marts".into()]),
    ]);
    let selected = selector.evaluate(&graph()).unwrap();

    assert_eq!(selected, BTreeSet::from(["orders".to_string()]));
  }

  #[test]
  fn test_invalid_selectors() {
    assert!(matches!(
      "".parse::<Selector>(),
      Err(SelectionError::InvalidSelector { .. })
    ));
    assert!(matches!(
      "kind:widget".parse::<Selector>(),
      Err(SelectionError::InvalidSelector { .. })
    ));
    assert!(matches!(
      "source:raw".parse::<Selector>(),
      Err(SelectionError::InvalidSelector { .. })
    ));
  }

  #[test]
  fn test_unknown_id_is_an_error() {
    let err = Selector::Id("nope".into()).evaluate(&graph()).unwrap_err();
    assert!(matches!(err, SelectionError::UnknownNode { .. }));
  }
}
