//! What the scheduler does with each kind of node.

use weft_config::NodeKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
  /// Resolve config and hand the payload to the adapter.
  Execute,
  /// Resolve config only; the node completes without touching the adapter.
  CompileOnly,
}

pub fn behavior(kind: NodeKind) -> Behavior {
  match kind {
    NodeKind::Model | NodeKind::Seed | NodeKind::Snapshot | NodeKind::Test => Behavior::Execute,
    NodeKind::Analysis => Behavior::CompileOnly,
  }
}
