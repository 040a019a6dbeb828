//! Visitor dispatch over expression forms.
//!
//! Every analysis builder walks the IR through [`ExprVisitor`]: one hook per
//! form, defaulting to a plain child walk. Builders override `visit_expr` to
//! memoize shared sub-expressions and the form hooks they care about.

use crate::ir::expr::{Clause, Expr, ExprId, Module};
use crate::ir::op::OpId;

pub trait ExprVisitor {
    /// Entry point for a sub-expression; dispatches on the form tag.
    fn visit_expr(&mut self, module: &Module, id: ExprId) {
        walk_expr(self, module, id);
    }

    fn visit_var(&mut self, _module: &Module, _id: ExprId, _name: &str) {}

    fn visit_constant(&mut self, _module: &Module, _id: ExprId, _value: f64) {}

    fn visit_op(&mut self, _module: &Module, _id: ExprId, _op: OpId) {}

    fn visit_call(&mut self, module: &Module, _id: ExprId, callee: ExprId, args: &[ExprId]) {
        self.visit_expr(module, callee);
        for &arg in args {
            self.visit_expr(module, arg);
        }
    }

    fn visit_function(&mut self, module: &Module, _id: ExprId, params: &[ExprId], body: ExprId) {
        for &param in params {
            self.visit_expr(module, param);
        }
        self.visit_expr(module, body);
    }

    fn visit_tuple(&mut self, module: &Module, _id: ExprId, fields: &[ExprId]) {
        for &field in fields {
            self.visit_expr(module, field);
        }
    }

    fn visit_tuple_get_item(&mut self, module: &Module, _id: ExprId, tuple: ExprId, _index: usize) {
        self.visit_expr(module, tuple);
    }

    fn visit_let(&mut self, module: &Module, _id: ExprId, var: ExprId, value: ExprId, body: ExprId) {
        self.visit_expr(module, var);
        self.visit_expr(module, value);
        self.visit_expr(module, body);
    }

    fn visit_if(
        &mut self,
        module: &Module,
        _id: ExprId,
        cond: ExprId,
        then_branch: ExprId,
        else_branch: ExprId,
    ) {
        self.visit_expr(module, cond);
        self.visit_expr(module, then_branch);
        self.visit_expr(module, else_branch);
    }

    fn visit_match(&mut self, module: &Module, _id: ExprId, scrutinee: ExprId, clauses: &[Clause]) {
        self.visit_expr(module, scrutinee);
        for clause in clauses {
            self.visit_expr(module, clause.body);
        }
    }

    fn visit_ref_create(&mut self, module: &Module, _id: ExprId, value: ExprId) {
        self.visit_expr(module, value);
    }

    fn visit_ref_read(&mut self, module: &Module, _id: ExprId, cell: ExprId) {
        self.visit_expr(module, cell);
    }

    fn visit_ref_write(&mut self, module: &Module, _id: ExprId, cell: ExprId, value: ExprId) {
        self.visit_expr(module, cell);
        self.visit_expr(module, value);
    }
}

/// Dispatches `id` to the matching form hook of `visitor`.
pub fn walk_expr<V: ExprVisitor + ?Sized>(visitor: &mut V, module: &Module, id: ExprId) {
    match module.expr(id) {
        Expr::Var { name } => visitor.visit_var(module, id, name),
        Expr::Constant { value } => visitor.visit_constant(module, id, *value),
        Expr::Op(op) => visitor.visit_op(module, id, *op),
        Expr::Call { callee, args } => visitor.visit_call(module, id, *callee, args),
        Expr::Function { params, body } => visitor.visit_function(module, id, params, *body),
        Expr::Tuple { fields } => visitor.visit_tuple(module, id, fields),
        Expr::TupleGetItem { tuple, index } => {
            visitor.visit_tuple_get_item(module, id, *tuple, *index)
        }
        Expr::Let { var, value, body } => visitor.visit_let(module, id, *var, *value, *body),
        Expr::If {
            cond,
            then_branch,
            else_branch,
        } => visitor.visit_if(module, id, *cond, *then_branch, *else_branch),
        Expr::Match { scrutinee, clauses } => visitor.visit_match(module, id, *scrutinee, clauses),
        Expr::RefCreate { value } => visitor.visit_ref_create(module, id, *value),
        Expr::RefRead { cell } => visitor.visit_ref_read(module, id, *cell),
        Expr::RefWrite { cell, value } => visitor.visit_ref_write(module, id, *cell, *value),
    }
}
