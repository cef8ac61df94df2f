//! Defines the `DependencyNode`, one named item of a dependency forest.

use super::storage::NodeId;
use smallvec::SmallVec;

/// A named item together with the items that depend on it.
///
/// Children are the dependents: a child may only be bound or evaluated after
/// its parent. The same child id may sit under several parents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyNode<K> {
    pub key: K,
    pub children: SmallVec<[NodeId; 4]>,
}

impl<K> DependencyNode<K> {
    pub fn new(key: K) -> Self { Self { key, children: SmallVec::new() } }
}
