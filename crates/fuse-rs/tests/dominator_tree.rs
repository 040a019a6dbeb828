use fuse_rs::analysis::{DominatorTree, IndexedForwardGraph};
use fuse_rs::ir::{Module, OpPattern};

#[test]
fn chain_parents_follow_the_dataflow() {
    let mut module = Module::new();
    let relu = module.register_op("relu", OpPattern::Elemwise);
    let sigmoid = module.register_op("sigmoid", OpPattern::Elemwise);
    let tanh = module.register_op("tanh", OpPattern::Elemwise);

    let x = module.var("x");
    let a = module.call(relu, &[x]);
    let b = module.call(sigmoid, &[a]);
    let c = module.call(tanh, &[b]);

    let graph = IndexedForwardGraph::build(&module, c);
    let tree = DominatorTree::post_dom(&graph);
    assert_eq!(tree.len(), graph.len());

    let a_idx = graph.node_of(a).expect("a is indexed");
    let b_idx = graph.node_of(b).expect("b is indexed");
    let c_idx = graph.node_of(c).expect("c is indexed");

    // The root sits under the implicit super-sink.
    assert_eq!(tree.node(c_idx).parent, None);
    assert_eq!(tree.node(c_idx).depth, 0);
    assert_eq!(tree.node(c_idx).pattern, OpPattern::Opaque);

    assert_eq!(tree.node(b_idx).parent, Some(c_idx));
    assert_eq!(tree.node(b_idx).depth, 1);
    assert_eq!(tree.node(b_idx).pattern, OpPattern::Elemwise);

    assert_eq!(tree.node(a_idx).parent, Some(b_idx));
    assert_eq!(tree.node(a_idx).depth, 2);
    assert_eq!(tree.node(a_idx).pattern, OpPattern::Elemwise);
}

#[test]
fn diamond_post_dominator_is_the_join() {
    let mut module = Module::new();
    let relu = module.register_op("relu", OpPattern::Elemwise);
    let sigmoid = module.register_op("sigmoid", OpPattern::Elemwise);
    let add = module.register_op("add", OpPattern::Broadcast);

    let x0 = module.var("x0");
    let x = module.call(relu, &[x0]);
    let left = module.call(relu, &[x]);
    let right = module.call(sigmoid, &[x]);
    let join = module.call(add, &[left, right]);

    let graph = IndexedForwardGraph::build(&module, join);
    let tree = DominatorTree::post_dom(&graph);

    let x_idx = graph.node_of(x).expect("x is indexed");
    let left_idx = graph.node_of(left).expect("left is indexed");
    let right_idx = graph.node_of(right).expect("right is indexed");
    let join_idx = graph.node_of(join).expect("join is indexed");

    assert_eq!(tree.node(left_idx).parent, Some(join_idx));
    assert_eq!(tree.node(right_idx).parent, Some(join_idx));

    // Neither branch alone post-dominates x; the join does. The aggregate
    // folds the branch edges (elemwise) and the climbed branch-to-join
    // patterns (broadcast edges into add).
    assert_eq!(tree.node(x_idx).parent, Some(join_idx));
    assert_eq!(tree.node(x_idx).pattern, OpPattern::Broadcast);
}

#[test]
fn opaque_consumer_poisons_the_aggregate() {
    let mut module = Module::new();
    let relu = module.register_op("relu", OpPattern::Elemwise);
    let custom = module.register_op("custom", OpPattern::Opaque);

    let x0 = module.var("x0");
    let x = module.call(relu, &[x0]);
    let y = module.call(custom, &[x]);

    let graph = IndexedForwardGraph::build(&module, y);
    let tree = DominatorTree::post_dom(&graph);

    let x_idx = graph.node_of(x).expect("x is indexed");
    let y_idx = graph.node_of(y).expect("y is indexed");
    assert_eq!(tree.node(x_idx).parent, Some(y_idx));
    assert_eq!(tree.node(x_idx).pattern, OpPattern::Opaque);
}

#[test]
fn extern_nodes_attach_to_the_super_sink() {
    let mut module = Module::new();
    let relu = module.register_op("relu", OpPattern::Elemwise);

    let x = module.var("x");
    let value = module.call(relu, &[x]);
    let v = module.var("v");
    let body = module.call(relu, &[v]);
    let bound = module.bind(v, value, body);

    let graph = IndexedForwardGraph::build(&module, bound);
    let tree = DominatorTree::post_dom(&graph);

    // The bound value is extern-referenced: it hangs off the super-sink even
    // though it has a dataflow consumer.
    let value_idx = graph.node_of(value).expect("value is indexed");
    assert!(graph.node(value_idx).extern_ref);
    assert!(!graph.node(value_idx).outputs.is_empty());
    assert_eq!(tree.node(value_idx).parent, None);
    assert_eq!(tree.node(value_idx).depth, 0);
    assert_eq!(tree.node(value_idx).pattern, OpPattern::Opaque);
}

#[test]
fn every_climb_reaches_the_super_sink() {
    // Invariant: walking parents from any node terminates at a root.
    let mut module = Module::new();
    let relu = module.register_op("relu", OpPattern::Elemwise);
    let add = module.register_op("add", OpPattern::Broadcast);

    let x0 = module.var("x0");
    let x = module.call(relu, &[x0]);
    let l = module.call(relu, &[x]);
    let r = module.call(relu, &[x]);
    let j = module.call(add, &[l, r]);
    let out = module.call(relu, &[j]);

    let graph = IndexedForwardGraph::build(&module, out);
    let tree = DominatorTree::post_dom(&graph);

    for index in 0..tree.len() {
        let mut cursor = Some(index);
        let mut hops = 0;
        while let Some(at) = cursor {
            cursor = tree.node(at).parent;
            hops += 1;
            assert!(hops <= tree.len(), "parent chain must be acyclic");
        }
    }
}
