//! Per-run cache of resolved node configuration.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use weft_config::ResolvedConfig;

/// Resolved configuration keyed by node id.
///
/// Populated explicitly through [`ConfigCache::get_or_insert_with`]; a
/// failed population caches nothing.
#[derive(Debug, Clone, Default)]
pub struct ConfigCache {
  cache: Arc<RwLock<HashMap<String, ResolvedConfig>>>,
}

impl ConfigCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, node_id: &str) -> Option<ResolvedConfig> {
    let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
    cache.get(node_id).cloned()
  }

  /// Get the cached config for `node_id`, or compute and cache it.
  pub fn get_or_insert_with<E, F>(&self, node_id: &str, resolve: F) -> Result<ResolvedConfig, E>
  where
    F: FnOnce() -> Result<ResolvedConfig, E>,
  {
    if let Some(config) = self.get(node_id) {
      return Ok(config);
    }

    let config = resolve()?;
    let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
    cache.insert(node_id.to_string(), config.clone());
    Ok(config)
  }

  pub fn len(&self) -> usize {
    self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn clear(&self) {
    self.cache.write().unwrap_or_else(PoisonError::into_inner).clear();
  }
}
