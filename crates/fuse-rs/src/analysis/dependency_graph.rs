//! Dependency graph over IR expressions.
//!
//! Tracks, for every distinct sub-expression, which expressions it depends on
//! and which depend on it, together with scope-boundary markers. The graph
//! feeds passes that must not move code across a binding or a conditional,
//! e.g. let-binding linearization; the forward dataflow graph shares its
//! scoping model.

use std::collections::{HashMap, HashSet};

use smallvec::SmallVec;

use crate::ir::expr::{Clause, ExprId, Module};
use crate::ir::op::OpId;
use crate::ir::visit::{walk_expr, ExprVisitor};

/// Handle to a node owned by a [`DependencyGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepNodeId(pub u32);

/// A node in the dependency graph.
#[derive(Debug, Default)]
pub struct DepNode {
    /// Whether this node occupies a scoped child position (function body,
    /// let body, if branch, match-arm body, ref operand). Code motion must
    /// not cross such a node.
    pub new_scope: bool,
    /// Nodes this node depends on, one entry per syntactic use.
    pub children: SmallVec<[DepNodeId; 4]>,
    /// Nodes depending on this node, one entry per syntactic use.
    pub parents: SmallVec<[DepNodeId; 4]>,
}

/// Dependency DAG of an expression, in post-DFS order.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: Vec<DepNode>,
    expr_node: HashMap<ExprId, DepNodeId>,
    post_dfs_order: Vec<DepNodeId>,
}

impl DependencyGraph {
    /// Builds the dependency graph for `body`.
    pub fn build(module: &Module, body: ExprId) -> DependencyGraph {
        let mut creator = Creator {
            graph: DependencyGraph::default(),
            visited: HashSet::new(),
        };
        creator.visit_expr(module, body);
        creator.graph
    }

    pub fn node(&self, id: DepNodeId) -> &DepNode {
        &self.nodes[id.0 as usize]
    }

    /// Node recorded for an expression; let-bound variables resolve to the
    /// node of their bound value.
    pub fn node_of(&self, expr: ExprId) -> Option<DepNodeId> {
        self.expr_node.get(&expr).copied()
    }

    /// All nodes, children before parents.
    pub fn post_dfs_order(&self) -> &[DepNodeId] {
        &self.post_dfs_order
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn new_node(&mut self) -> DepNodeId {
        let id = DepNodeId(self.nodes.len() as u32);
        self.nodes.push(DepNode::default());
        id
    }
}

struct Creator {
    graph: DependencyGraph,
    visited: HashSet<ExprId>,
}

impl Creator {
    /// Node for `expr`, allocating on first sight.
    fn ensure_node(&mut self, expr: ExprId) -> DepNodeId {
        if let Some(&node) = self.graph.expr_node.get(&expr) {
            return node;
        }
        let node = self.graph.new_node();
        self.graph.expr_node.insert(expr, node);
        node
    }

    /// Records that `parent` depends on `child`, visiting `child` first so
    /// the post-DFS order keeps children ahead of their parents.
    fn depend(&mut self, module: &Module, parent: DepNodeId, child: ExprId) -> DepNodeId {
        self.visit_expr(module, child);
        let node = *self
            .graph
            .expr_node
            .get(&child)
            .expect("child node must exist after visit");
        self.graph.nodes[node.0 as usize].parents.push(parent);
        self.graph.nodes[parent.0 as usize].children.push(node);
        node
    }

    fn mark_scope(&mut self, node: DepNodeId) {
        self.graph.nodes[node.0 as usize].new_scope = true;
    }

    fn add_leaf(&mut self, expr: ExprId) {
        let node = self.ensure_node(expr);
        self.graph.post_dfs_order.push(node);
    }
}

impl ExprVisitor for Creator {
    fn visit_expr(&mut self, module: &Module, id: ExprId) {
        if !self.visited.insert(id) {
            return;
        }
        walk_expr(self, module, id);
    }

    fn visit_var(&mut self, _module: &Module, id: ExprId, _name: &str) {
        // Let-bound variables are aliased when their binding is visited; a
        // variable reaching this hook is free or a function parameter.
        self.add_leaf(id);
    }

    fn visit_constant(&mut self, _module: &Module, id: ExprId, _value: f64) {
        self.add_leaf(id);
    }

    fn visit_op(&mut self, _module: &Module, id: ExprId, _op: OpId) {
        self.add_leaf(id);
    }

    fn visit_call(&mut self, module: &Module, id: ExprId, callee: ExprId, args: &[ExprId]) {
        let node = self.ensure_node(id);
        self.depend(module, node, callee);
        for &arg in args {
            self.depend(module, node, arg);
        }
        self.graph.post_dfs_order.push(node);
    }

    fn visit_function(&mut self, module: &Module, id: ExprId, _params: &[ExprId], body: ExprId) {
        let node = self.ensure_node(id);
        let body_node = self.depend(module, node, body);
        self.mark_scope(body_node);
        self.graph.post_dfs_order.push(node);
    }

    fn visit_tuple(&mut self, module: &Module, id: ExprId, fields: &[ExprId]) {
        let node = self.ensure_node(id);
        for &field in fields {
            self.depend(module, node, field);
        }
        self.graph.post_dfs_order.push(node);
    }

    fn visit_tuple_get_item(&mut self, module: &Module, id: ExprId, tuple: ExprId, _index: usize) {
        let node = self.ensure_node(id);
        self.depend(module, node, tuple);
        self.graph.post_dfs_order.push(node);
    }

    fn visit_let(&mut self, module: &Module, id: ExprId, var: ExprId, value: ExprId, body: ExprId) {
        let node = self.ensure_node(id);
        let value_node = self.depend(module, node, value);
        if self.visited.insert(var) {
            // References to the bound variable resolve to the value's node.
            self.graph.expr_node.insert(var, value_node);
        }
        let body_node = self.depend(module, node, body);
        self.mark_scope(body_node);
        self.graph.post_dfs_order.push(node);
    }

    fn visit_if(
        &mut self,
        module: &Module,
        id: ExprId,
        cond: ExprId,
        then_branch: ExprId,
        else_branch: ExprId,
    ) {
        let node = self.ensure_node(id);
        self.depend(module, node, cond);
        let then_node = self.depend(module, node, then_branch);
        self.mark_scope(then_node);
        let else_node = self.depend(module, node, else_branch);
        self.mark_scope(else_node);
        self.graph.post_dfs_order.push(node);
    }

    fn visit_match(&mut self, module: &Module, id: ExprId, scrutinee: ExprId, clauses: &[Clause]) {
        let node = self.ensure_node(id);
        self.depend(module, node, scrutinee);
        for clause in clauses {
            let body_node = self.depend(module, node, clause.body);
            self.mark_scope(body_node);
        }
        self.graph.post_dfs_order.push(node);
    }

    fn visit_ref_create(&mut self, module: &Module, id: ExprId, value: ExprId) {
        let node = self.ensure_node(id);
        let value_node = self.depend(module, node, value);
        self.mark_scope(value_node);
        self.graph.post_dfs_order.push(node);
    }

    fn visit_ref_read(&mut self, module: &Module, id: ExprId, cell: ExprId) {
        let node = self.ensure_node(id);
        let cell_node = self.depend(module, node, cell);
        self.mark_scope(cell_node);
        self.graph.post_dfs_order.push(node);
    }

    fn visit_ref_write(&mut self, module: &Module, id: ExprId, cell: ExprId, value: ExprId) {
        let node = self.ensure_node(id);
        let cell_node = self.depend(module, node, cell);
        self.mark_scope(cell_node);
        let value_node = self.depend(module, node, value);
        self.mark_scope(value_node);
        self.graph.post_dfs_order.push(node);
    }
}
