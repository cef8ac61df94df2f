//! dag.rs
//! Builds the dependency forest for a set of named items and rejects cycles.

use super::edge::DependencyKind;
use super::storage::{NodeArena, NodeId};
use crate::analysis::topology;
use petgraph::algo::is_cyclic_directed;
use petgraph::graphmap::DiGraphMap;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// `chain` is one representative cycle, e.g. `a -> b -> a`.
    #[error("Cyclic {kind} dependencies: {chain}")]
    CyclicDependencies { kind: DependencyKind, chain: String },
}

/// A forest whose edges mean "must be bound/evaluated before".
#[derive(Debug, Clone)]
pub struct DependencyGraph<K> {
    arena: NodeArena<K>,
    roots: Vec<NodeId>,
    kind: DependencyKind,
}

impl<K: Ord + Clone + fmt::Display> DependencyGraph<K> {
    /// Builds the forest from `name -> names it references`.
    ///
    /// Items with no references seed the root set. For every edge
    /// `dependent -> user`, `user` becomes a provisional root unless it is
    /// already known to depend on something, `dependent` leaves the root set,
    /// and `dependent` is attached under `user`. An emptied root set over a
    /// non-empty forest means every item depends on something: a cycle.
    pub fn build(kind: DependencyKind, references: &BTreeMap<K, BTreeSet<K>>) -> Result<Self, GraphError> {
        let mut arena = NodeArena::new();
        let mut roots: Vec<NodeId> = Vec::new();
        let mut non_roots: BTreeSet<NodeId> = BTreeSet::new();

        for (name, refs) in references {
            if refs.is_empty() {
                let id = arena.intern(name);
                if !roots.contains(&id) {
                    roots.push(id);
                }
            }
        }

        for (dependent, refs) in references {
            for user in refs {
                let user_id = arena.intern(user);
                if !non_roots.contains(&user_id) && !roots.contains(&user_id) {
                    roots.push(user_id);
                }

                let dependent_id = arena.intern(dependent);
                roots.retain(|&r| r != dependent_id);
                non_roots.insert(dependent_id);

                arena.attach_child(user_id, dependent_id);
            }
        }

        if !arena.is_empty() && roots.is_empty() {
            return Err(GraphError::CyclicDependencies { kind, chain: describe_cycle(references) });
        }

        // Roots only prove that some item is free of dependencies; a cycle
        // disjoint from them leaves the root set intact.
        if has_cycle(&arena) {
            let chain = describe_cycle(references);
            warn!(%kind, %chain, "root tracking accepted a cyclic graph; rejecting it");
            return Err(GraphError::CyclicDependencies { kind, chain });
        }

        roots.retain(|&r| arena.contains(r));
        Ok(Self { arena, roots, kind })
    }

    pub fn roots(&self) -> &[NodeId] { &self.roots }
    pub fn arena(&self) -> &NodeArena<K> { &self.arena }
    pub fn kind(&self) -> DependencyKind { self.kind }
    pub fn node_count(&self) -> usize { self.arena.count() }

    pub fn root_keys(&self) -> Vec<K> { self.roots.iter().map(|&r| self.arena.key(r).clone()).collect() }

    /// Depth-first flattening in which every item follows all items it depends on.
    pub fn flatten(&self) -> Vec<K> {
        topology::flatten(&self.arena, &self.roots)
            .into_iter()
            .map(|id| self.arena.key(id).clone())
            .collect()
    }
}

fn has_cycle<K: Ord + Clone>(arena: &NodeArena<K>) -> bool {
    let mut g: DiGraphMap<NodeId, ()> = DiGraphMap::with_capacity(arena.count(), arena.count());
    for id in arena.ids() {
        g.add_node(id);
    }
    for (parent, child) in arena.edges() {
        g.add_edge(parent, child, ());
    }
    is_cyclic_directed(&g)
}

fn describe_cycle<K: Ord + Clone + fmt::Display>(references: &BTreeMap<K, BTreeSet<K>>) -> String {
    match topology::find_cycle(references) {
        Some(path) => path.iter().map(|k| k.to_string()).collect::<Vec<_>>().join(" -> "),
        None => "<unknown>".to_string(),
    }
}
