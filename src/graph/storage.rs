//! storage.rs
//! Arena of dependency nodes addressed by integer id.
//!
//! Attaching a child inserts its id into the parent's child list, so a node
//! reachable from several parents is one shared entry, never a copy.

use super::node::DependencyNode;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline(always)]
    pub fn index(&self) -> usize { self.0 as usize }
    pub fn new(idx: usize) -> Self { Self(idx as u32) }
}

#[derive(Debug, Clone)]
pub struct NodeArena<K> {
    nodes: Vec<DependencyNode<K>>,
    index: BTreeMap<K, NodeId>,
}

impl<K> Default for NodeArena<K> {
    fn default() -> Self { Self { nodes: Vec::new(), index: BTreeMap::new() } }
}

impl<K: Ord + Clone> NodeArena<K> {
    pub fn new() -> Self { Self::default() }
    pub fn count(&self) -> usize { self.nodes.len() }
    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    /// Returns the node for `key`, creating it on first sight.
    pub fn intern(&mut self, key: &K) -> NodeId {
        if let Some(&id) = self.index.get(key) {
            return id;
        }
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(DependencyNode::new(key.clone()));
        self.index.insert(key.clone(), id);
        id
    }

    pub fn get(&self, key: &K) -> Option<NodeId> { self.index.get(key).copied() }

    pub fn contains(&self, id: NodeId) -> bool { id.index() < self.nodes.len() }

    #[inline(always)]
    pub fn node(&self, id: NodeId) -> &DependencyNode<K> { &self.nodes[id.index()] }

    pub fn key(&self, id: NodeId) -> &K { &self.nodes[id.index()].key }

    #[inline(always)]
    pub fn children(&self, id: NodeId) -> &[NodeId] { &self.nodes[id.index()].children }

    /// Records `child` as a dependent of `parent`. Repeated edges are ignored.
    pub fn attach_child(&mut self, parent: NodeId, child: NodeId) {
        let children = &mut self.nodes[parent.index()].children;
        if !children.contains(&child) {
            children.push(child);
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ { (0..self.nodes.len()).map(NodeId::new) }

    /// Every `(parent, child)` edge in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.ids().flat_map(move |p| self.children(p).iter().map(move |&c| (p, c)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_child_is_single_node() {
        let mut arena: NodeArena<String> = NodeArena::new();
        let a = arena.intern(&"a".to_string());
        let b = arena.intern(&"b".to_string());
        let c = arena.intern(&"c".to_string());
        arena.attach_child(a, c);
        arena.attach_child(b, c);
        arena.attach_child(b, c);

        assert_eq!(arena.count(), 3);
        assert_eq!(arena.children(b), &[c]);
        assert_eq!(arena.intern(&"c".to_string()), c);
        assert_eq!(arena.edges().count(), 2);
    }
}
