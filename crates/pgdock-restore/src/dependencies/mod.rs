//! Creation-order dependency graph.
//!
//! Dumping or restoring interdependent objects (functions over tables over
//! domains) needs a producible order. The graph records "depends on" edges
//! and topologically sorts them, tolerating cycles by appending the cyclic
//! nodes in a stable order at the end.

mod graph;


pub use graph::{DependencyGraph, DependencyNode, NodeId, ObjectKind, SortResult};
