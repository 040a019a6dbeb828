//! Structural preflight checks for expression arenas.
//!
//! The analyses assume an acyclic IR and do not detect cycles themselves, so
//! callers validate first. Because child handles must refer to slots allocated
//! before their parent, a module that passes validation cannot contain a
//! reference cycle.

use thiserror::Error;

use crate::ir::expr::{Expr, ExprId, Module};

/// Errors surfaced when validating a module before analysis.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("expression {parent:?} references {child:?}, which is outside the module")]
    ChildOutOfRange { parent: ExprId, child: ExprId },
    #[error("expression {parent:?} references {child:?}, which is not allocated before it")]
    ForwardReference { parent: ExprId, child: ExprId },
    #[error("let binder {var:?} is not a variable")]
    BinderNotVar { var: ExprId },
    #[error("function parameter {param:?} is not a variable")]
    ParamNotVar { param: ExprId },
    #[error("analyzed body {body:?} is outside the module")]
    BodyOutOfRange { body: ExprId },
}

/// Validates every expression of `module` and the analyzed `body` handle.
pub fn validate_body(module: &Module, body: ExprId) -> Result<(), TopologyError> {
    if !module.contains(body) {
        return Err(TopologyError::BodyOutOfRange { body });
    }

    for slot in 0..module.len() {
        let parent = ExprId(slot as u32);
        let mut error = None;
        module.for_each_child(parent, |child| {
            if error.is_some() {
                return;
            }
            if !module.contains(child) {
                error = Some(TopologyError::ChildOutOfRange { parent, child });
            } else if child >= parent {
                error = Some(TopologyError::ForwardReference { parent, child });
            }
        });
        if let Some(error) = error {
            return Err(error);
        }

        match module.expr(parent) {
            Expr::Let { var, .. } => {
                if !matches!(module.expr(*var), Expr::Var { .. }) {
                    return Err(TopologyError::BinderNotVar { var: *var });
                }
            }
            Expr::Function { params, .. } => {
                for param in params {
                    if !matches!(module.expr(*param), Expr::Var { .. }) {
                        return Err(TopologyError::ParamNotVar { param: *param });
                    }
                }
            }
            _ => {}
        }
    }

    Ok(())
}
