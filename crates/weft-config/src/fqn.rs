//! Hierarchical configuration lookup by qualified name.

use serde_json::{Map, Value};

/// Walk `root` along `path`, yielding each configuration level.
///
/// The root is always yielded first. Each path segment then descends one
/// level if that key exists and holds a mapping; the walk stops quietly at
/// the first segment that is absent or not a mapping.
pub fn fqn_search<'a, S: AsRef<str>>(
  root: &'a Map<String, Value>,
  path: &'a [S],
) -> FqnLevels<'a, S> {
  FqnLevels {
    current: Some(root),
    path,
    position: 0,
    started: false,
  }
}

/// Lazy iterator returned by [`fqn_search`], outermost level first.
#[derive(Debug)]
pub struct FqnLevels<'a, S> {
  current: Option<&'a Map<String, Value>>,
  path: &'a [S],
  position: usize,
  started: bool,
}

impl<'a, S: AsRef<str>> Iterator for FqnLevels<'a, S> {
  type Item = &'a Map<String, Value>;

  fn next(&mut self) -> Option<Self::Item> {
    let current = self.current?;
    if !self.started {
      self.started = true;
      return Some(current);
    }

    let segment = self.path.get(self.position)?;
    self.position += 1;

    match current.get(segment.as_ref()) {
      Some(Value::Object(level)) => {
        self.current = Some(level);
        Some(level)
      }
      _ => {
        self.current = None;
        None
      }
    }
  }
}
