//! Operator fusion analysis for a functional tensor IR.
//!
//! Given the body of a program, the crate decides which operator nodes may be
//! lowered together as a single kernel: it flattens the expression into an
//! indexed dataflow graph, computes a post-dominator tree over it, and merges
//! nodes into fusion groups with a union-find engine driven by operator
//! pattern kinds. See [`analysis::partition`] for the entry point.

pub mod analysis;
pub mod ir;

mod env;

pub use analysis::{partition, FuseOptions, Partition};
pub use ir::{ExprId, Module, OpId, OpPattern};
