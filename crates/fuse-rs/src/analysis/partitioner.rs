//! Union-find partitioning of the forward graph into fusion groups.
//!
//! Every node starts in its own group; three phased sweeps then merge groups
//! along post-dominator edges:
//!
//! - phase 0 fuses the elementwise/broadcast region below a complex
//!   out-elementwise-fusable anchor (conv2d and friends) and collapses plain
//!   elementwise chains;
//! - phase 1 fuses injective producers into injective consumers;
//! - phase 2 fuses tuple groups forward into their consumer and folds the
//!   tuple's injective producers after them.
//!
//! Merges respect pattern compatibility along *every* path between a node and
//! its post-dominator, a fused-size budget, and anchor uniqueness.

use std::collections::{BTreeMap, HashSet};

use crate::analysis::dominator::DominatorTree;
use crate::analysis::forward_graph::IndexedForwardGraph;
use crate::ir::expr::ExprId;
use crate::ir::op::OpPattern;

/// A fusion group in the union-find forest.
#[derive(Debug)]
pub struct Group {
    /// Union-find parent; `None` marks a root.
    pub parent: Option<usize>,
    /// Pattern of the group root.
    pub pattern: OpPattern,
    /// Expression of the root node.
    pub root_ref: ExprId,
    /// The single out-elementwise-fusable node of the group, when present.
    pub anchor_ref: Option<ExprId>,
    /// Number of nodes absorbed into this group. Meaningful on roots only.
    pub num_nodes: usize,
    /// Attached metadata for downstream consumers.
    pub attrs: BTreeMap<String, String>,
}

/// Result of partitioning: one group record per graph node.
#[derive(Debug)]
pub struct Partition {
    groups: Vec<Group>,
}

impl Partition {
    /// Number of nodes (and group records).
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Group record at `index` (not necessarily a root).
    pub fn group(&self, index: usize) -> &Group {
        &self.groups[index]
    }

    /// Canonical group of node `index`, with path compression.
    pub fn find_root(&mut self, index: usize) -> usize {
        find_root(&mut self.groups, index)
    }

    /// Whether two nodes were fused into the same kernel.
    pub fn same_group(&mut self, a: usize, b: usize) -> bool {
        self.find_root(a) == self.find_root(b)
    }

    /// Canonical root per node, aligned with the graph's post-DFS order.
    pub fn assignments(&mut self) -> Vec<usize> {
        (0..self.groups.len())
            .map(|index| find_root(&mut self.groups, index))
            .collect()
    }

    /// Number of group roots, i.e. kernels.
    pub fn num_groups(&self) -> usize {
        self.groups
            .iter()
            .filter(|group| group.parent.is_none())
            .count()
    }
}

/// Partitions an [`IndexedForwardGraph`] into fusion groups.
#[derive(Debug)]
pub struct GraphPartitioner {
    opt_level: u32,
    max_fuse_depth: usize,
    groups: Vec<Group>,
    /// Deduplication scratch for path walks; cleared per top-level walk.
    visited: HashSet<usize>,
}

/// Per-node data shared by every fusion rule, gathered after the common
/// skip checks have passed.
struct FuseCandidate {
    index: usize,
    /// Root of the node's group.
    target: usize,
    /// Graph index of the immediate post-dominator.
    dom_parent: usize,
    /// Root of the post-dominator's group.
    dom_target: usize,
    /// Aggregated pattern between the node and its post-dominator.
    dom_pattern: OpPattern,
}

impl GraphPartitioner {
    pub fn new(opt_level: u32, max_fuse_depth: usize) -> GraphPartitioner {
        assert!(max_fuse_depth > 0, "max_fuse_depth must be positive");
        GraphPartitioner {
            opt_level,
            max_fuse_depth,
            groups: Vec::new(),
            visited: HashSet::new(),
        }
    }

    /// Runs all enabled fusion phases and returns the group assignment.
    pub fn partition(mut self, graph: &IndexedForwardGraph) -> Partition {
        self.init_groups(graph);
        let post_dom_tree = DominatorTree::post_dom(graph);
        self.run_fuse(graph, &post_dom_tree, 0);
        if self.opt_level >= 1 {
            self.run_fuse(graph, &post_dom_tree, 1);
        }
        if self.opt_level >= 2 {
            self.fuse_tuples(graph, &post_dom_tree);
        }
        Partition {
            groups: self.groups,
        }
    }

    fn init_groups(&mut self, graph: &IndexedForwardGraph) {
        self.groups = graph
            .nodes()
            .iter()
            .map(|node| Group {
                parent: None,
                pattern: node.pattern,
                root_ref: node.expr,
                anchor_ref: (node.pattern == OpPattern::OutElemwiseFusable).then_some(node.expr),
                num_nodes: 1,
                attrs: BTreeMap::new(),
            })
            .collect();
    }

    /// Applies the common skip rules for node `index`. `None` means the node
    /// cannot fuse toward its post-dominator in any phase.
    fn candidate(
        &mut self,
        graph: &IndexedForwardGraph,
        post_dom_tree: &DominatorTree,
        index: usize,
    ) -> Option<FuseCandidate> {
        let gnode = graph.node(index);
        if gnode.extern_ref || gnode.pattern == OpPattern::Opaque {
            return None;
        }
        let dom_node = post_dom_tree.node(index);
        let dom_parent = dom_node.parent?;
        if dom_node.pattern == OpPattern::Opaque {
            return None;
        }
        let target = find_root(&mut self.groups, index);
        let dom_target = find_root(&mut self.groups, dom_parent);
        if target == dom_target {
            return None;
        }
        if self.count_fused_nodes_with_new_child(graph, index, dom_parent) > self.max_fuse_depth {
            return None;
        }
        // An extern-referenced dominator keeps at most one anchor; refuse a
        // merge that would bring a second one.
        if graph.node(dom_parent).extern_ref
            && self.groups[dom_target].anchor_ref.is_some()
            && self.groups[target].pattern == OpPattern::OutElemwiseFusable
        {
            return None;
        }
        Some(FuseCandidate {
            index,
            target,
            dom_parent,
            dom_target,
            dom_pattern: dom_node.pattern,
        })
    }

    fn run_fuse(&mut self, graph: &IndexedForwardGraph, post_dom_tree: &DominatorTree, phase: u32) {
        for index in 0..graph.len() {
            let Some(candidate) = self.candidate(graph, post_dom_tree, index) else {
                continue;
            };
            // Tuples are the business of the dedicated tuple phase.
            if self.groups[candidate.dom_parent].pattern == OpPattern::Tuple {
                continue;
            }
            match phase {
                0 => self.fuse_phase0(graph, &candidate),
                1 => self.fuse_phase1(graph, &candidate),
                _ => unreachable!("phase 2 runs through fuse_tuples"),
            }
        }
    }

    /// Phase 0: anchor epilogues and elementwise/broadcast chains.
    fn fuse_phase0(&mut self, graph: &IndexedForwardGraph, candidate: &FuseCandidate) {
        let target_pattern = self.groups[candidate.target].pattern;
        if target_pattern == OpPattern::OutElemwiseFusable {
            // The anchor absorbs its elementwise epilogue as long as every
            // path stays at most broadcast.
            if candidate.dom_pattern <= OpPattern::Broadcast
                && self.check_path(graph, candidate.index, candidate.dom_parent, &|kind, _| {
                    kind <= OpPattern::Broadcast
                })
            {
                self.commit_fuse(graph, candidate.index, candidate.dom_parent);
            }
        } else if target_pattern <= OpPattern::Broadcast {
            if self.groups[candidate.dom_target].pattern <= OpPattern::Broadcast
                && candidate.dom_pattern <= OpPattern::Injective
            {
                self.commit_fuse(graph, candidate.index, candidate.dom_parent);
            }
        }
        // Injective and reduction groups wait for the later phases.
    }

    /// Phase 1: injective producers into non-opaque consumers.
    fn fuse_phase1(&mut self, graph: &IndexedForwardGraph, candidate: &FuseCandidate) {
        if self.groups[candidate.target].pattern <= OpPattern::Injective
            && candidate.dom_pattern <= OpPattern::Injective
            && self.check_path(graph, candidate.index, candidate.dom_parent, &|kind, _| {
                kind <= OpPattern::Injective
            })
        {
            self.commit_fuse(graph, candidate.index, candidate.dom_parent);
        }
    }

    /// Phase 2: tuple groups fuse forward, then their producers follow.
    fn fuse_tuples(&mut self, graph: &IndexedForwardGraph, post_dom_tree: &DominatorTree) {
        // First sweep: fuse each tuple into its post-dominator when all of
        // its consumers can host it.
        for index in 0..graph.len() {
            let Some(candidate) = self.candidate(graph, post_dom_tree, index) else {
                continue;
            };
            if self.groups[candidate.target].pattern != OpPattern::Tuple {
                continue;
            }
            let mut consumers_fusable = true;
            for edge in &graph.node(index).outputs {
                let root = find_root(&mut self.groups, edge.node);
                if matches!(
                    self.groups[root].pattern,
                    OpPattern::Opaque | OpPattern::Tuple
                ) {
                    consumers_fusable = false;
                    break;
                }
            }
            if !consumers_fusable {
                continue;
            }
            // The sink may be a complex consumer; only the intermediate path
            // must stay injective.
            if self.check_path(
                graph,
                candidate.index,
                candidate.dom_parent,
                &|kind, is_sink| is_sink || kind <= OpPattern::Injective,
            ) {
                self.commit_fuse(graph, candidate.index, candidate.dom_parent);
            }
        }

        // Second sweep: fold still-separate injective producers (tuple
        // fields, tuple projections) into tuples that were fused forward.
        for index in 0..graph.len() {
            let Some(candidate) = self.candidate(graph, post_dom_tree, index) else {
                continue;
            };
            if self.groups[candidate.target].pattern > OpPattern::Injective {
                continue;
            }
            if self.groups[candidate.dom_parent].pattern != OpPattern::Tuple {
                continue;
            }
            if matches!(
                self.groups[candidate.dom_target].pattern,
                OpPattern::Opaque | OpPattern::Tuple
            ) {
                continue;
            }
            if self.check_path(
                graph,
                candidate.index,
                candidate.dom_parent,
                &|kind, is_sink| is_sink || kind <= OpPattern::Injective,
            ) {
                self.commit_fuse(graph, candidate.index, candidate.dom_parent);
            }
        }
    }

    /// Checks that the group-root pattern of every node on every path from
    /// `src` (exclusive) to `sink` (inclusive) satisfies `fcond`.
    fn check_path<F>(
        &mut self,
        graph: &IndexedForwardGraph,
        src: usize,
        sink: usize,
        fcond: &F,
    ) -> bool
    where
        F: Fn(OpPattern, bool) -> bool,
    {
        debug_assert!(src != sink);
        debug_assert!(!graph.node(src).extern_ref);
        self.visited.clear();
        for edge in &graph.node(src).outputs {
            if !self.check_path_from(graph, edge.node, sink, fcond) {
                return false;
            }
        }
        true
    }

    fn check_path_from<F>(
        &mut self,
        graph: &IndexedForwardGraph,
        src: usize,
        sink: usize,
        fcond: &F,
    ) -> bool
    where
        F: Fn(OpPattern, bool) -> bool,
    {
        if self.visited.contains(&src) {
            return true;
        }
        self.visited.insert(src);
        let root = find_root(&mut self.groups, src);
        if !fcond(self.groups[root].pattern, src == sink) {
            return false;
        }
        if src == sink {
            return true;
        }
        for edge in &graph.node(src).outputs {
            if !self.check_path_from(graph, edge.node, sink, fcond) {
                return false;
            }
        }
        true
    }

    /// Merges `src`'s group and every group on the paths to `sink` into
    /// `sink`'s group.
    fn commit_fuse(&mut self, graph: &IndexedForwardGraph, src: usize, sink: usize) {
        debug_assert!(src != sink);
        let target = find_root(&mut self.groups, sink);
        self.visited.clear();
        self.commit_fuse_from(graph, src, sink, target);
    }

    fn commit_fuse_from(
        &mut self,
        graph: &IndexedForwardGraph,
        src: usize,
        sink: usize,
        target: usize,
    ) {
        if src == sink || self.visited.contains(&src) {
            return;
        }
        self.visited.insert(src);
        let child = find_root(&mut self.groups, src);
        if child != target {
            merge_from_to(&mut self.groups, child, target);
        }
        for edge in &graph.node(src).outputs {
            self.commit_fuse_from(graph, edge.node, sink, target);
        }
    }

    /// Size of the subgraph that would result from fusing `child` into the
    /// group of `dom_parent`: the parent root's current count plus each
    /// distinct group root reachable strictly between `child` (inclusive) and
    /// `dom_parent` (exclusive) that is not already part of the parent group.
    fn count_fused_nodes_with_new_child(
        &mut self,
        graph: &IndexedForwardGraph,
        child: usize,
        dom_parent: usize,
    ) -> usize {
        debug_assert!(child != dom_parent);
        let target = find_root(&mut self.groups, dom_parent);
        self.visited.clear();
        let mut counted = HashSet::new();
        counted.insert(target);
        self.groups[target].num_nodes + self.count_nodes_upto_sink(graph, child, dom_parent, &mut counted)
    }

    fn count_nodes_upto_sink(
        &mut self,
        graph: &IndexedForwardGraph,
        src: usize,
        sink: usize,
        counted: &mut HashSet<usize>,
    ) -> usize {
        if src == sink || self.visited.contains(&src) {
            return 0;
        }
        self.visited.insert(src);
        let root = find_root(&mut self.groups, src);
        let mut sum = if counted.insert(root) {
            self.groups[root].num_nodes
        } else {
            0
        };
        for edge in &graph.node(src).outputs {
            sum += self.count_nodes_upto_sink(graph, edge.node, sink, counted);
        }
        sum
    }
}

/// Root of `index`'s group with full path compression. Iterative on both
/// walks so deep forests cannot overflow the stack.
fn find_root(groups: &mut [Group], index: usize) -> usize {
    let mut root = index;
    while let Some(parent) = groups[root].parent {
        root = parent;
    }
    let mut current = index;
    while current != root {
        let next = groups[current]
            .parent
            .expect("non-root group must have a parent");
        groups[current].parent = Some(root);
        current = next;
    }
    root
}

/// Merges root `child` into root `parent`, carrying node counts and the
/// anchor, if any, along.
fn merge_from_to(groups: &mut [Group], child: usize, parent: usize) {
    if child == parent {
        return;
    }
    assert!(
        groups[child].parent.is_none() && groups[parent].parent.is_none(),
        "merge requires group roots"
    );
    groups[child].parent = Some(parent);
    groups[parent].num_nodes += groups[child].num_nodes;
    if let Some(anchor) = groups[child].anchor_ref {
        assert!(
            groups[parent].anchor_ref.is_none(),
            "a fused group keeps exactly one anchor"
        );
        groups[parent].anchor_ref = Some(anchor);
        groups[parent].pattern = groups[child].pattern;
    }
}

#[cfg(test)]
mod tests {
    use super::{find_root, merge_from_to, Group};
    use crate::ir::expr::ExprId;
    use crate::ir::op::OpPattern;
    use std::collections::BTreeMap;

    fn group(pattern: OpPattern, slot: u32) -> Group {
        Group {
            parent: None,
            pattern,
            root_ref: ExprId(slot),
            anchor_ref: (pattern == OpPattern::OutElemwiseFusable).then_some(ExprId(slot)),
            num_nodes: 1,
            attrs: BTreeMap::new(),
        }
    }

    #[test]
    fn find_root_compresses_paths() {
        let mut groups: Vec<Group> = (0..4).map(|i| group(OpPattern::Elemwise, i)).collect();
        groups[0].parent = Some(1);
        groups[1].parent = Some(2);
        groups[2].parent = Some(3);

        assert_eq!(find_root(&mut groups, 0), 3);
        assert_eq!(groups[0].parent, Some(3));
        assert_eq!(groups[1].parent, Some(3));
        assert_eq!(find_root(&mut groups, 0), 3);
    }

    #[test]
    fn merge_accumulates_counts_and_moves_anchor() {
        let mut groups = vec![
            group(OpPattern::OutElemwiseFusable, 0),
            group(OpPattern::Elemwise, 1),
        ];
        merge_from_to(&mut groups, 0, 1);

        assert_eq!(groups[0].parent, Some(1));
        assert_eq!(groups[1].num_nodes, 2);
        assert_eq!(groups[1].anchor_ref, Some(ExprId(0)));
        assert_eq!(groups[1].pattern, OpPattern::OutElemwiseFusable);
    }

    #[test]
    #[should_panic(expected = "merge requires group roots")]
    fn merge_rejects_non_roots() {
        let mut groups = vec![
            group(OpPattern::Elemwise, 0),
            group(OpPattern::Elemwise, 1),
            group(OpPattern::Elemwise, 2),
        ];
        groups[0].parent = Some(1);
        merge_from_to(&mut groups, 0, 2);
    }
}
