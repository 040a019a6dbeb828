use fuse_rs::ir::topology::{validate_body, TopologyError};
use fuse_rs::ir::{Expr, ExprId, Module, OpPattern};

#[test]
fn builder_constructed_modules_validate() {
    let mut module = Module::new();
    let relu = module.register_op("relu", OpPattern::Elemwise);
    let sigmoid = module.register_op("sigmoid", OpPattern::Elemwise);

    let x = module.var("x");
    let y = module.call(relu, &[x]);
    let z = module.call(sigmoid, &[y]);

    assert!(validate_body(&module, z).is_ok());
}

#[test]
fn scoping_forms_validate() {
    let mut module = Module::new();
    let relu = module.register_op("relu", OpPattern::Elemwise);

    let x = module.var("x");
    let value = module.call(relu, &[x]);
    let v = module.var("v");
    let body = module.call(relu, &[v]);
    let bound = module.bind(v, value, body);

    let cond = module.var("c");
    let other = module.constant(0.0);
    let root = module.if_expr(cond, bound, other);

    assert!(validate_body(&module, root).is_ok());
}

#[test]
fn body_out_of_range_is_rejected() {
    let module = Module::new();
    assert_eq!(
        validate_body(&module, ExprId(0)),
        Err(TopologyError::BodyOutOfRange { body: ExprId(0) })
    );
}

#[test]
fn child_outside_module_is_rejected() {
    let mut module = Module::new();
    let x = module.var("x");
    let call = module.push(Expr::Call {
        callee: ExprId(17),
        args: vec![x],
    });

    assert_eq!(
        validate_body(&module, call),
        Err(TopologyError::ChildOutOfRange {
            parent: call,
            child: ExprId(17),
        })
    );
}

#[test]
fn forward_reference_is_rejected() {
    let mut module = Module::new();
    // Slot 0 referencing slot 0: representable by hand, never by builders.
    let cell = module.push(Expr::RefRead { cell: ExprId(0) });

    assert_eq!(
        validate_body(&module, cell),
        Err(TopologyError::ForwardReference {
            parent: cell,
            child: cell,
        })
    );
}

#[test]
fn non_var_binder_is_rejected() {
    let mut module = Module::new();
    let value = module.constant(1.0);
    let binder = module.constant(2.0);
    let body = module.constant(3.0);
    let bound = module.bind(binder, value, body);

    assert_eq!(
        validate_body(&module, bound),
        Err(TopologyError::BinderNotVar { var: binder })
    );
}

#[test]
fn non_var_function_parameter_is_rejected() {
    let mut module = Module::new();
    let param = module.constant(0.0);
    let body = module.constant(1.0);
    let function = module.function(&[param], body);

    assert_eq!(
        validate_body(&module, function),
        Err(TopologyError::ParamNotVar { param })
    );
}

#[test]
fn unregistered_ops_are_opaque() {
    let mut module = Module::new();
    let known = module.register_op("relu", OpPattern::Elemwise);
    assert_eq!(module.op_pattern(known), OpPattern::Elemwise);
    assert_eq!(
        module.op_pattern(fuse_rs::ir::OpId(42)),
        OpPattern::Opaque
    );
}
