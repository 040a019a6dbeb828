//! Operator fusion analysis pipeline.
//!
//! ```text
//! ir::Module (body)
//!      |
//!      +-- DependencyGraph      scope boundaries, parent/child uses
//!      |
//!      +-- IndexedForwardGraph  dataflow fragment, patterns, extern refs
//!      |        |
//!      |        +-- DominatorTree   post-dominators + aggregated patterns
//!      |        |
//!      |        +-- GraphPartitioner  union-find fusion groups
//!      v
//! Partition (group per node)
//! ```
//!
//! The partition only *assigns* nodes to groups; rewriting the IR into fused
//! kernels is the caller's concern.

pub mod dependency_graph;
pub mod dominator;
pub mod forward_graph;
pub mod partitioner;

use anyhow::{bail, Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::ir::expr::{ExprId, Module};
use crate::ir::topology;

pub use dependency_graph::{DepNode, DepNodeId, DependencyGraph};
pub use dominator::{DomNode, DominatorTree};
pub use forward_graph::{Edge, GraphNode, IndexedForwardGraph};
pub use partitioner::{GraphPartitioner, Group, Partition};

/// Tuning knobs for the fusion pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuseOptions {
    /// Phase gate: phase 1 needs `>= 1`, phase 2 needs `>= 2`.
    pub opt_level: u32,
    /// Maximum number of nodes a fused kernel may contain.
    pub max_fuse_depth: usize,
}

impl Default for FuseOptions {
    fn default() -> FuseOptions {
        FuseOptions {
            opt_level: 2,
            max_fuse_depth: crate::env::default_max_fuse_depth(),
        }
    }
}

/// Partitions `body` into fusion groups.
///
/// Preflights the module (the analyses assume an acyclic, in-range IR),
/// builds the forward dataflow graph, and runs the phased partitioner.
pub fn partition(module: &Module, body: ExprId, options: &FuseOptions) -> Result<Partition> {
    if options.max_fuse_depth == 0 {
        bail!("max_fuse_depth must be positive");
    }
    topology::validate_body(module, body).context("fusion preflight failed")?;

    let graph = IndexedForwardGraph::build(module, body);
    if crate::env::dump_graphs() {
        debug!("forward graph:\n{}", graph.debug_dump(module));
    }

    let partitioner = GraphPartitioner::new(options.opt_level, options.max_fuse_depth);
    let partition = partitioner.partition(&graph);
    debug!(
        "fusion partitioned {} nodes into {} groups (opt_level={}, max_fuse_depth={})",
        partition.len(),
        partition.num_groups(),
        options.opt_level,
        options.max_fuse_depth,
    );
    Ok(partition)
}
