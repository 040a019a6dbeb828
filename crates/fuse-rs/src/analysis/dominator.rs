//! Post-dominator tree over the indexed forward graph.
//!
//! Because the graph is a DAG stored in post-DFS order, a single reverse pass
//! suffices: when a node is processed, the dominator nodes of everything it
//! feeds already exist, and its post-dominator is the least common ancestor of
//! those consumers. The LCA walk folds every edge and climbed-node pattern
//! into one aggregate, so the tree also records the worst pattern between a
//! node and its dominator parent.

use crate::analysis::forward_graph::IndexedForwardGraph;
use crate::ir::op::OpPattern;

/// A node of the dominator tree; slot `i` corresponds to graph node `i`.
#[derive(Debug, Clone, Copy)]
pub struct DomNode {
    /// Graph index of the immediate post-dominator; `None` attaches the node
    /// directly under the implicit super-sink.
    pub parent: Option<usize>,
    /// Distance from the super-sink.
    pub depth: usize,
    /// Aggregated pattern along the paths up to the dominator parent.
    pub pattern: OpPattern,
}

/// Post-dominator relation of a dataflow graph.
#[derive(Debug)]
pub struct DominatorTree {
    nodes: Vec<DomNode>,
}

impl DominatorTree {
    /// Computes the post-dominator tree of `graph`.
    pub fn post_dom(graph: &IndexedForwardGraph) -> DominatorTree {
        let mut nodes = vec![
            DomNode {
                parent: None,
                depth: 0,
                pattern: OpPattern::Opaque,
            };
            graph.len()
        ];

        for index in (0..graph.len()).rev() {
            let gnode = graph.node(index);
            if gnode.extern_ref || gnode.outputs.is_empty() {
                // Attached directly under the super-sink.
                continue;
            }

            let mut pattern = OpPattern::Elemwise;
            let mut parent: Option<usize> = None;
            let mut first = true;
            for edge in &gnode.outputs {
                debug_assert!(edge.node > index, "edges must point at consumers");
                pattern = pattern.combine(edge.pattern);
                parent = if first {
                    first = false;
                    Some(edge.node)
                } else {
                    least_common_ancestor(&nodes, parent, Some(edge.node), &mut pattern)
                };
            }

            let depth = match parent {
                Some(p) => nodes[p].depth + 1,
                None => 0,
            };
            nodes[index] = DomNode {
                parent,
                depth,
                pattern,
            };
        }

        DominatorTree { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> &DomNode {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> &[DomNode] {
        &self.nodes
    }
}

/// Walks both nodes toward the root until they meet, folding the pattern of
/// every climbed node into `pattern`. Returns `None` when the walks reach the
/// super-sink without meeting.
fn least_common_ancestor(
    nodes: &[DomNode],
    mut lhs: Option<usize>,
    mut rhs: Option<usize>,
    pattern: &mut OpPattern,
) -> Option<usize> {
    loop {
        let (l, r) = match (lhs, rhs) {
            (Some(l), Some(r)) => (l, r),
            _ => return None,
        };
        if l == r {
            return Some(l);
        }
        if nodes[l].depth < nodes[r].depth {
            *pattern = pattern.combine(nodes[r].pattern);
            rhs = nodes[r].parent;
        } else if nodes[r].depth < nodes[l].depth {
            *pattern = pattern.combine(nodes[l].pattern);
            lhs = nodes[l].parent;
        } else {
            *pattern = pattern.combine(nodes[l].pattern);
            *pattern = pattern.combine(nodes[r].pattern);
            lhs = nodes[l].parent;
            rhs = nodes[r].parent;
        }
    }
}
