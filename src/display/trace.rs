use crate::graph::{DependencyGraph, NodeArena, NodeId};
use std::collections::HashMap;
use std::fmt::{Display, Write};

/// Renders a dependency forest as an indented tree, one root after another.
///
/// Children are the items that depend on their parent. A node reached a second
/// time is printed as a back-reference to the level it first appeared at.
/// `annotate` may add a suffix to each line, e.g. the kind of a variable set.
pub fn format_hierarchy<K, F>(graph: &DependencyGraph<K>, title: &str, annotate: F) -> String
where
    K: Ord + Clone + Display,
    F: Fn(&K) -> Option<String>,
{
    let mut tracer = Tracer { arena: graph.arena(), annotate, visited_at_level: HashMap::new(), output: String::new() };

    let _ = writeln!(tracer.output, "{}", title);
    let _ = writeln!(tracer.output, "--------------------------------------------------");
    if graph.roots().is_empty() {
        let _ = writeln!(tracer.output, "(empty)");
    }
    for &root in graph.roots() {
        tracer.trace_node(root, 1, "");
    }
    tracer.output
}

struct Tracer<'a, K, F> {
    arena: &'a NodeArena<K>,
    annotate: F,
    visited_at_level: HashMap<NodeId, usize>,
    output: String,
}

impl<'a, K, F> Tracer<'a, K, F>
where
    K: Ord + Clone + Display,
    F: Fn(&K) -> Option<String>,
{
    fn trace_node(&mut self, node_id: NodeId, level: usize, prefix: &str) {
        let key = self.arena.key(node_id);
        if let Some(&first_seen) = self.visited_at_level.get(&node_id) {
            let _ = writeln!(self.output, "{}{} -> (Ref to L{})", prefix, key, first_seen);
            return;
        }
        self.visited_at_level.insert(node_id, level);

        let suffix = (self.annotate)(key).map(|s| format!(" ({})", s)).unwrap_or_default();
        let _ = writeln!(self.output, "{}[L{}] {}{}", prefix, level, key, suffix);

        let children = self.arena.children(node_id).to_vec();
        self.recurse_children(prefix, &children, level);
    }

    fn recurse_children(&mut self, prefix: &str, children: &[NodeId], level: usize) {
        let stem = build_child_stem(prefix);
        for (i, &child) in children.iter().enumerate() {
            let connector = if i == children.len() - 1 { "`--" } else { "|--" };
            self.trace_node(child, level + 1, &format!("{}{}", stem, connector));
        }
    }
}

fn build_child_stem(current_prefix: &str) -> String {
    current_prefix.replace("`--", "   ").replace("|--", "|  ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DependencyKind;
    use std::collections::{BTreeMap, BTreeSet};

    #[test]
    fn test_shared_dependent_is_back_referenced() {
        // b and c take scope from a; d takes scope from both
        let refs: BTreeMap<String, BTreeSet<String>> = [
            ("a", vec![]),
            ("b", vec!["a"]),
            ("c", vec!["a"]),
            ("d", vec!["b", "c"]),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.into_iter().map(String::from).collect()))
        .collect();
        let graph = DependencyGraph::build(DependencyKind::ScopeDependency, &refs).unwrap();

        let text = format_hierarchy(&graph, "SCOPE", |k| (k == "a").then(|| "formula".to_string()));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "SCOPE");
        assert_eq!(lines[2], "[L1] a (formula)");
        assert_eq!(lines[3], "|--[L2] b");
        assert_eq!(lines[4], "|  `--[L3] d");
        assert_eq!(lines[5], "`--[L2] c");
        assert_eq!(lines[6], "   `--d -> (Ref to L3)");
    }

    #[test]
    fn test_empty_graph() {
        let graph = DependencyGraph::<String>::build(DependencyKind::VariableReference, &BTreeMap::new()).unwrap();
        assert!(format_hierarchy(&graph, "VARIABLES", |_| None).ends_with("(empty)\n"));
    }
}
