//! Indexed forward dataflow graph.
//!
//! Captures only the dataflow fragment of an expression: scoping constructs
//! are collapsed (a `let` participates through its body, the bound variable
//! through its value) and any value consumed across a scope boundary is marked
//! `extern_ref` instead of receiving a fusable edge. Nodes are stored in
//! post-DFS order, so producers always precede their consumers and every edge
//! points at a higher index.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use smallvec::SmallVec;

use crate::ir::expr::{Clause, Expr, ExprId, Module};
use crate::ir::op::{OpId, OpPattern};
use crate::ir::visit::{walk_expr, ExprVisitor};

/// Forward edge to a consumer node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// Index of the consumer.
    pub node: usize,
    /// The consumer's expectation of this input.
    pub pattern: OpPattern,
}

/// A node of the indexed graph.
#[derive(Debug)]
pub struct GraphNode {
    /// The expression this node indexes.
    pub expr: ExprId,
    /// Position in post-DFS order; `graph.node(node.index)` is `node`.
    pub index: usize,
    /// Whether the value escapes the analyzed dataflow fragment.
    pub extern_ref: bool,
    /// Pattern kind of the node itself.
    pub pattern: OpPattern,
    /// Consumers, in discovery order.
    pub outputs: SmallVec<[Edge; 2]>,
}

/// Indexed dataflow graph in forward direction.
#[derive(Debug)]
pub struct IndexedForwardGraph {
    nodes: Vec<GraphNode>,
    node_map: HashMap<ExprId, usize>,
}

impl IndexedForwardGraph {
    /// Builds the forward graph for `body`.
    pub fn build(module: &Module, body: ExprId) -> IndexedForwardGraph {
        let mut creator = Creator {
            module,
            nodes: Vec::new(),
            node_map: HashMap::new(),
            order: Vec::new(),
            bindings: HashMap::new(),
            visited: HashSet::new(),
        };
        creator.update(body, None, OpPattern::Opaque);
        creator.visit_expr(module, body);
        creator.finish()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> &GraphNode {
        &self.nodes[index]
    }

    /// Nodes in post-DFS order.
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// Index assigned to an expression; aliased expressions (lets, let-bound
    /// variables) resolve to their representative's node.
    pub fn node_of(&self, expr: ExprId) -> Option<usize> {
        self.node_map.get(&expr).copied()
    }

    /// Renders the graph one node per line, for `debug!` logging.
    pub fn debug_dump(&self, module: &Module) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            let _ = write!(
                out,
                "node[{}] {} [{}]{}",
                node.index,
                expr_label(module, node.expr),
                node.pattern.name(),
                if node.extern_ref { " extern" } else { "" },
            );
            let _ = write!(out, " outputs=[");
            for (i, edge) in node.outputs.iter().enumerate() {
                if i > 0 {
                    let _ = write!(out, ", ");
                }
                let _ = write!(out, "{}:{}", edge.node, edge.pattern.name());
            }
            let _ = writeln!(out, "]");
        }
        out
    }
}

fn expr_label(module: &Module, expr: ExprId) -> String {
    match module.expr(expr) {
        Expr::Var { name } => format!("var({name})"),
        Expr::Constant { value } => format!("const({value})"),
        Expr::Op(op) => match module.op_decl(*op) {
            Some(decl) => format!("op({})", decl.name),
            None => format!("op(#{})", op.0),
        },
        Expr::Call { callee, .. } => match module.expr(*callee) {
            Expr::Op(op) => match module.op_decl(*op) {
                Some(decl) => format!("call({})", decl.name),
                None => format!("call(op#{})", op.0),
            },
            _ => "call(closure)".to_string(),
        },
        Expr::Function { .. } => "function".to_string(),
        Expr::Tuple { fields } => format!("tuple/{}", fields.len()),
        Expr::TupleGetItem { index, .. } => format!("tuple_get_item({index})"),
        Expr::Let { .. } => "let".to_string(),
        Expr::If { .. } => "if".to_string(),
        Expr::Match { .. } => "match".to_string(),
        Expr::RefCreate { .. } => "ref_create".to_string(),
        Expr::RefRead { .. } => "ref_read".to_string(),
        Expr::RefWrite { .. } => "ref_write".to_string(),
    }
}

#[derive(Debug)]
struct BuildNode {
    expr: Option<ExprId>,
    index: Option<usize>,
    extern_ref: bool,
    pattern: OpPattern,
    outputs: SmallVec<[(usize, OpPattern); 2]>,
}

impl Default for BuildNode {
    fn default() -> BuildNode {
        BuildNode {
            expr: None,
            index: None,
            extern_ref: false,
            pattern: OpPattern::Opaque,
            outputs: SmallVec::new(),
        }
    }
}

struct Creator<'m> {
    module: &'m Module,
    /// Nodes in creation order; remapped to post-DFS order by `finish`.
    nodes: Vec<BuildNode>,
    /// Representative expression -> creation slot (plus alias entries).
    node_map: HashMap<ExprId, usize>,
    /// Creation slots in post-DFS order.
    order: Vec<usize>,
    /// Let-bound variable -> bound value expression.
    bindings: HashMap<ExprId, ExprId>,
    visited: HashSet<ExprId>,
}

impl<'m> Creator<'m> {
    /// Resolves an expression to the representative that carries its dataflow
    /// node: lets collapse to their body, bound variables to their value.
    /// Bindings encountered on the way are registered.
    fn rep(&mut self, mut expr: ExprId) -> ExprId {
        loop {
            match self.module.expr(expr) {
                Expr::Let { var, value, body } => {
                    self.bindings.insert(*var, *value);
                    expr = *body;
                }
                Expr::Var { .. } => match self.bindings.get(&expr) {
                    Some(&value) => expr = value,
                    None => return expr,
                },
                _ => return expr,
            }
        }
    }

    /// Creation slot for `expr`'s representative, allocating on first sight.
    fn node_id(&mut self, expr: ExprId) -> usize {
        let rep = self.rep(expr);
        if let Some(&id) = self.node_map.get(&rep) {
            if rep != expr {
                self.node_map.insert(expr, id);
            }
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(BuildNode::default());
        self.node_map.insert(rep, id);
        if rep != expr {
            self.node_map.insert(expr, id);
        }
        id
    }

    /// Records a use of `expr`. With a consumer, an edge carrying the
    /// consumer's pattern is appended; without one, the value escapes the
    /// fragment and the node is marked `extern_ref`.
    fn update(&mut self, expr: ExprId, consumer: Option<usize>, pattern: OpPattern) -> usize {
        let id = self.node_id(expr);
        match consumer {
            Some(target) => self.nodes[id].outputs.push((target, pattern)),
            None => self.nodes[id].extern_ref = true,
        }
        id
    }

    /// Assigns the next post-DFS index to `expr`'s node.
    fn add_node(&mut self, expr: ExprId) {
        let rep = self.rep(expr);
        let id = *self
            .node_map
            .get(&rep)
            .expect("node must be created before it is indexed");
        let node = &mut self.nodes[id];
        assert!(node.index.is_none(), "node indexed twice");
        node.expr = Some(rep);
        node.index = Some(self.order.len());
        self.order.push(id);
    }

    fn finish(self) -> IndexedForwardGraph {
        let Creator {
            nodes,
            node_map,
            order,
            ..
        } = self;
        assert_eq!(
            order.len(),
            nodes.len(),
            "every dataflow node must receive a post-DFS index"
        );

        let mut index_of = vec![usize::MAX; nodes.len()];
        for (index, &creation) in order.iter().enumerate() {
            index_of[creation] = index;
        }

        let final_nodes = order
            .iter()
            .enumerate()
            .map(|(index, &creation)| {
                let build = &nodes[creation];
                debug_assert_eq!(build.index, Some(index));
                GraphNode {
                    expr: build.expr.expect("indexed node must record its expression"),
                    index,
                    extern_ref: build.extern_ref,
                    pattern: build.pattern,
                    outputs: build
                        .outputs
                        .iter()
                        .map(|&(target, pattern)| Edge {
                            node: index_of[target],
                            pattern,
                        })
                        .collect(),
                }
            })
            .collect();

        let node_map = node_map
            .into_iter()
            .map(|(expr, creation)| (expr, index_of[creation]))
            .collect();

        IndexedForwardGraph {
            nodes: final_nodes,
            node_map,
        }
    }
}

impl ExprVisitor for Creator<'_> {
    fn visit_expr(&mut self, module: &Module, id: ExprId) {
        if !self.visited.insert(id) {
            return;
        }
        walk_expr(self, module, id);
    }

    fn visit_var(&mut self, _module: &Module, id: ExprId, _name: &str) {
        if self.bindings.contains_key(&id) {
            // Aliased to the bound value; the value's visit indexes the node.
            return;
        }
        let node = self.node_id(id);
        self.nodes[node].pattern = OpPattern::Opaque;
        self.add_node(id);
    }

    fn visit_constant(&mut self, _module: &Module, id: ExprId, _value: f64) {
        let node = self.node_id(id);
        self.nodes[node].pattern = OpPattern::Opaque;
        self.add_node(id);
    }

    fn visit_op(&mut self, _module: &Module, id: ExprId, _op: OpId) {
        let node = self.node_id(id);
        self.nodes[node].pattern = OpPattern::Opaque;
        self.add_node(id);
    }

    fn visit_call(&mut self, module: &Module, id: ExprId, callee: ExprId, args: &[ExprId]) {
        let node = self.node_id(id);
        let op_pattern = match module.expr(callee) {
            Expr::Op(op) => module.op_pattern(*op),
            _ => OpPattern::Opaque,
        };
        self.nodes[node].pattern = op_pattern;

        if matches!(module.expr(callee), Expr::Op(_)) {
            self.update(callee, None, OpPattern::Opaque);
        } else {
            // A closure callee joins the dataflow behind an opaque edge and
            // always escapes.
            self.update(callee, Some(node), OpPattern::Opaque);
            self.update(callee, None, OpPattern::Opaque);
        }
        for &arg in args {
            self.update(arg, Some(node), op_pattern);
        }

        self.visit_expr(module, callee);
        for &arg in args {
            self.visit_expr(module, arg);
        }
        self.add_node(id);
    }

    fn visit_function(&mut self, module: &Module, id: ExprId, params: &[ExprId], body: ExprId) {
        let node = self.node_id(id);
        self.nodes[node].pattern = OpPattern::Opaque;
        for &param in params {
            self.update(param, None, OpPattern::Opaque);
        }
        self.update(body, None, OpPattern::Opaque);
        for &param in params {
            self.visit_expr(module, param);
        }
        self.visit_expr(module, body);
        self.add_node(id);
    }

    fn visit_tuple(&mut self, module: &Module, id: ExprId, fields: &[ExprId]) {
        let node = self.node_id(id);
        self.nodes[node].pattern = OpPattern::Tuple;
        for &field in fields {
            self.update(field, Some(node), OpPattern::Injective);
        }
        for &field in fields {
            self.visit_expr(module, field);
        }
        self.add_node(id);
    }

    fn visit_tuple_get_item(&mut self, module: &Module, id: ExprId, tuple: ExprId, _index: usize) {
        let node = self.node_id(id);
        self.nodes[node].pattern = OpPattern::Injective;
        self.update(tuple, Some(node), OpPattern::Injective);
        self.visit_expr(module, tuple);
        self.add_node(id);
    }

    fn visit_let(&mut self, module: &Module, _id: ExprId, var: ExprId, value: ExprId, body: ExprId) {
        // The bound value is consumed inside the body's scope; it must stay a
        // group root.
        self.update(value, None, OpPattern::Opaque);
        self.visit_expr(module, value);
        self.bindings.insert(var, value);
        self.visit_expr(module, body);
        // No add_node: the let shares its body's node.
    }

    fn visit_if(
        &mut self,
        module: &Module,
        id: ExprId,
        cond: ExprId,
        then_branch: ExprId,
        else_branch: ExprId,
    ) {
        let node = self.node_id(id);
        self.nodes[node].pattern = OpPattern::Opaque;
        self.update(cond, None, OpPattern::Opaque);
        self.update(then_branch, None, OpPattern::Opaque);
        self.update(else_branch, None, OpPattern::Opaque);
        self.visit_expr(module, cond);
        self.visit_expr(module, then_branch);
        self.visit_expr(module, else_branch);
        self.add_node(id);
    }

    fn visit_match(&mut self, module: &Module, id: ExprId, scrutinee: ExprId, clauses: &[Clause]) {
        let node = self.node_id(id);
        self.nodes[node].pattern = OpPattern::Opaque;
        self.update(scrutinee, None, OpPattern::Opaque);
        for clause in clauses {
            self.update(clause.body, None, OpPattern::Opaque);
        }
        self.visit_expr(module, scrutinee);
        for clause in clauses {
            self.visit_expr(module, clause.body);
        }
        self.add_node(id);
    }

    fn visit_ref_create(&mut self, module: &Module, id: ExprId, value: ExprId) {
        let node = self.node_id(id);
        self.nodes[node].pattern = OpPattern::Opaque;
        self.update(value, None, OpPattern::Opaque);
        self.visit_expr(module, value);
        self.add_node(id);
    }

    fn visit_ref_read(&mut self, module: &Module, id: ExprId, cell: ExprId) {
        let node = self.node_id(id);
        self.nodes[node].pattern = OpPattern::Opaque;
        self.update(cell, None, OpPattern::Opaque);
        self.visit_expr(module, cell);
        self.add_node(id);
    }

    fn visit_ref_write(&mut self, module: &Module, id: ExprId, cell: ExprId, value: ExprId) {
        let node = self.node_id(id);
        self.nodes[node].pattern = OpPattern::Opaque;
        self.update(cell, None, OpPattern::Opaque);
        self.update(value, None, OpPattern::Opaque);
        self.visit_expr(module, cell);
        self.visit_expr(module, value);
        self.add_node(id);
    }
}
