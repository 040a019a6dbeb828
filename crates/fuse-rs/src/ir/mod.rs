//! Functional tensor IR: expression arena, operator registry, visitors.

pub mod expr;
pub mod op;
pub mod topology;
pub mod visit;

pub use expr::{Clause, Expr, ExprId, Module};
pub use op::{OpDecl, OpId, OpPattern};
pub use topology::TopologyError;
pub use visit::ExprVisitor;
