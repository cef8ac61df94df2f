use crate::graph::{NodeArena, NodeId};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Flattens a dependency forest depth-first with the stable reinsertion rule.
///
/// When a node is reached again through another parent, it is removed from
/// its earlier slot and re-appended, and its subtree follows it. The result
/// holds every reachable node exactly once, after all of its parents, which
/// is what diamonds (two siblings sharing a dependent) need.
///
/// The walk below a node is the same whichever parent reaches it, so each
/// node's walk is computed once and reused. Keeping only the last occurrence
/// of every node in the concatenated walks gives the reinsertion order.
pub fn flatten<K: Ord + Clone>(arena: &NodeArena<K>, roots: &[NodeId]) -> Vec<NodeId> {
    let mut memo = HashMap::new();
    let mut on_path = HashSet::new();
    let walks: Vec<Vec<NodeId>> = roots.iter().map(|&root| walk_below(arena, root, &mut memo, &mut on_path)).collect();
    last_occurrences(&walks)
}

fn walk_below<K: Ord + Clone>(
    arena: &NodeArena<K>,
    node: NodeId,
    memo: &mut HashMap<NodeId, Vec<NodeId>>,
    on_path: &mut HashSet<NodeId>,
) -> Vec<NodeId> {
    if let Some(walk) = memo.get(&node) {
        return walk.clone();
    }
    // The forest is acyclic once built; the path guard keeps a malformed arena finite.
    if !on_path.insert(node) {
        return vec![node];
    }

    let mut parts = vec![vec![node]];
    for &child in arena.children(node) {
        parts.push(walk_below(arena, child, memo, on_path));
    }
    on_path.remove(&node);

    let walk = last_occurrences(&parts);
    memo.insert(node, walk.clone());
    walk
}

/// Concatenates `parts` and keeps the last occurrence of each node.
fn last_occurrences(parts: &[Vec<NodeId>]) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    let mut reversed: Vec<NodeId> = parts.iter().rev().flat_map(|p| p.iter().rev()).copied().filter(|&n| seen.insert(n)).collect();
    reversed.reverse();
    reversed
}

/// Searches `name -> referenced names` for a cycle by tracking the names on
/// the active path. Returns the cycle as a path whose last element repeats
/// the first, e.g. `[a, b, a]`.
pub fn find_cycle<K: Ord + Clone>(references: &BTreeMap<K, BTreeSet<K>>) -> Option<Vec<K>> {
    let mut done = BTreeSet::new();
    for start in references.keys() {
        let mut path = Vec::new();
        if let Some(cycle) = walk(start, references, &mut path, &mut done) {
            return Some(cycle);
        }
    }
    None
}

fn walk<K: Ord + Clone>(
    node: &K,
    references: &BTreeMap<K, BTreeSet<K>>,
    path: &mut Vec<K>,
    done: &mut BTreeSet<K>,
) -> Option<Vec<K>> {
    if let Some(pos) = path.iter().position(|k| k == node) {
        let mut cycle = path[pos..].to_vec();
        cycle.push(node.clone());
        return Some(cycle);
    }
    if done.contains(node) {
        return None;
    }

    path.push(node.clone());
    if let Some(refs) = references.get(node) {
        for next in refs {
            if let Some(cycle) = walk(next, references, path, done) {
                return Some(cycle);
            }
        }
    }
    path.pop();
    done.insert(node.clone());
    None
}

/// Orders names so that every name follows the names it references
/// (consumer-last). Names referenced but not present as keys are skipped.
/// On a cycle, returns the cycle path as the error.
pub fn dependency_order<K: Ord + Clone>(references: &BTreeMap<K, BTreeSet<K>>) -> Result<Vec<K>, Vec<K>> {
    if let Some(cycle) = find_cycle(references) {
        return Err(cycle);
    }

    let mut order = Vec::with_capacity(references.len());
    let mut visited = BTreeSet::new();
    for name in references.keys() {
        post_order(name, references, &mut visited, &mut order);
    }
    Ok(order)
}

fn post_order<K: Ord + Clone>(
    node: &K,
    references: &BTreeMap<K, BTreeSet<K>>,
    visited: &mut BTreeSet<K>,
    order: &mut Vec<K>,
) {
    if !references.contains_key(node) || !visited.insert(node.clone()) {
        return;
    }
    if let Some(refs) = references.get(node) {
        for dep in refs {
            post_order(dep, references, visited, order);
        }
    }
    order.push(node.clone());
}
