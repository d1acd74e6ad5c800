//! Key-alias canonicalization.
//!
//! Configuration authors may spell a key several ways (`materialised`,
//! `materialized`). An [`AliasTable`] maps every alternate spelling to its
//! canonical key, and [`canonicalize`] rewrites a fragment so that only
//! canonical keys remain.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::ConfigError;

/// Maximum nesting depth walked by [`canonicalize`].
///
/// Structures nested deeper than this are reported as
/// [`ConfigError::RecursionLimit`] instead of exhausting the stack.
pub const MAX_CANONICALIZE_DEPTH: usize = 64;

/// Mapping from alternate key name to canonical key name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
  aliases: HashMap<String, String>,
}

impl AliasTable {
  /// Build a validated alias table.
  ///
  /// Rejects empty names, self-aliases, and chains (an alias whose
  /// canonical key is itself an alias).
  pub fn new<I, K, V>(pairs: I) -> Result<Self, ConfigError>
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    let aliases: HashMap<String, String> = pairs
      .into_iter()
      .map(|(k, v)| (k.into(), v.into()))
      .collect();

    for (alias, canonical) in &aliases {
      if alias.is_empty() || canonical.is_empty() {
        return Err(ConfigError::MalformedAliasTable {
          message: "alias and canonical names must be non-empty".to_string(),
        });
      }
      if alias == canonical {
        return Err(ConfigError::MalformedAliasTable {
          message: format!("'{}' is an alias of itself", alias),
        });
      }
      if aliases.contains_key(canonical) {
        return Err(ConfigError::MalformedAliasTable {
          message: format!(
            "'{}' maps to '{}', which is itself an alias",
            alias, canonical
          ),
        });
      }
    }

    Ok(Self { aliases })
  }

  /// Canonical name for `key` (the key itself when it has no alias).
  pub fn canonical<'a>(&'a self, key: &'a str) -> &'a str {
    self.aliases.get(key).map(String::as_str).unwrap_or(key)
  }

  pub fn is_empty(&self) -> bool {
    self.aliases.is_empty()
  }

  pub fn len(&self) -> usize {
    self.aliases.len()
  }
}

/// Rename the keys of `fragment` to their canonical names.
///
/// With `recursive`, nested mappings (including mappings inside sequences)
/// are rewritten as well. Two keys of one mapping level resolving to the
/// same canonical key is a [`ConfigError::DuplicateKey`].
pub fn canonicalize(
  fragment: &Map<String, Value>,
  aliases: &AliasTable,
  recursive: bool,
) -> Result<Map<String, Value>, ConfigError> {
  Canonicalizer { aliases, recursive }.mapping(fragment, 0)
}

struct Canonicalizer<'a> {
  aliases: &'a AliasTable,
  recursive: bool,
}

impl Canonicalizer<'_> {
  fn mapping(
    &self,
    input: &Map<String, Value>,
    depth: usize,
  ) -> Result<Map<String, Value>, ConfigError> {
    if depth > MAX_CANONICALIZE_DEPTH {
      return Err(ConfigError::RecursionLimit {
        limit: MAX_CANONICALIZE_DEPTH,
      });
    }

    let mut result = Map::new();
    // canonical key -> input key it came from
    let mut origin: HashMap<&str, &str> = HashMap::new();

    for (key, value) in input {
      let canonical = self.aliases.canonical(key);
      if let Some(first) = origin.get(canonical) {
        return Err(ConfigError::DuplicateKey {
          canonical: canonical.to_string(),
          first: first.to_string(),
          second: key.clone(),
        });
      }
      origin.insert(canonical, key);
      result.insert(canonical.to_string(), self.value(value, depth)?);
    }

    Ok(result)
  }

  fn value(&self, value: &Value, depth: usize) -> Result<Value, ConfigError> {
    if !self.recursive {
      return Ok(value.clone());
    }
    match value {
      Value::Object(map) => Ok(Value::Object(self.mapping(map, depth + 1)?)),
      Value::Array(items) => {
        if depth + 1 > MAX_CANONICALIZE_DEPTH {
          return Err(ConfigError::RecursionLimit {
            limit: MAX_CANONICALIZE_DEPTH,
          });
        }
        items
          .iter()
          .map(|item| self.value(item, depth + 1))
          .collect::<Result<Vec<_>, _>>()
          .map(Value::Array)
      }
      other => Ok(other.clone()),
    }
  }
}
