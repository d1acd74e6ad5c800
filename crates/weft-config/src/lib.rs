//! Weft Config
//!
//! Serializable project definitions and the layered configuration
//! utilities that turn them into per-node configuration:
//!
//! - [`OverrideMapping`]: stacked layers, newest wins
//! - [`canonicalize`] with an [`AliasTable`]: key normalization
//! - [`fqn_search`]: hierarchical lookup along a qualified name
//! - [`ConfigResolver`]: the three combined for one node

mod alias;
mod error;
mod fqn;
mod overrides;
mod project;
mod resolver;

pub use alias::{AliasTable, MAX_CANONICALIZE_DEPTH, canonicalize};
pub use error::ConfigError;
pub use fqn::{FqnLevels, fqn_search};
pub use overrides::{Layer, OverrideMapping};
pub use project::{NodeDef, NodeKind, ProjectDef, RunConfig, load_layer};
pub use resolver::{ConfigResolver, ResolvedConfig};
