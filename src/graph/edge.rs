//! Defines the `DependencyKind`, naming what a dependency graph's edges mean.

use std::fmt;

/// Describes the semantic type of the dependencies a graph was built from.
///
/// The same builder orders variables inside a variable set and variable sets
/// across the taxonomy; the kind only changes how failures are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    /// A variable's select, filter or fallback expression names another variable.
    /// Example: `$net` is selected as `$gross - $tax`.
    VariableReference,
    /// A variable set reuses another variable set's bound variables through a variables-scope arc.
    ScopeDependency,
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyKind::VariableReference => f.write_str("variable"),
            DependencyKind::ScopeDependency => f.write_str("variable-set scope"),
        }
    }
}
