//! Defines the dependency forest shared by variable-level and variable-set-level ordering.
pub mod dag;
pub mod edge;
pub mod node;
pub mod storage;

// Re-export key types for convenient access
pub use dag::{DependencyGraph, GraphError};
pub use edge::DependencyKind;
pub use node::DependencyNode;
pub use storage::{NodeArena, NodeId};
