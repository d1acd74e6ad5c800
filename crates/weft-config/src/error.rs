use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while building or resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  /// Two keys in the same mapping level canonicalize to the same key.
  #[error("keys '{first}' and '{second}' both resolve to '{canonical}'")]
  DuplicateKey {
    canonical: String,
    first: String,
    second: String,
  },

  #[error("malformed alias table: {message}")]
  MalformedAliasTable { message: String },

  /// Nesting exceeded the canonicalization depth bound.
  #[error("cycle detected in a value passed to canonicalize (depth limit {limit} exceeded)")]
  RecursionLimit { limit: usize },

  #[error("key '{key}' not found in any configuration layer")]
  MissingKey { key: String },

  #[error("failed to parse {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to read {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}
