use torq::host::HostValue;
use torq::ir::{Graph, GraphBuilder, TypeTag, ValueId};
use torq::lowering::{canonicalize_conv, lower_graph, remove_dropout};

fn count_kind(graph: &Graph, kind: &str) -> usize {
    graph.nodes.iter().filter(|n| n.kind == *kind).count()
}

fn dropout_graph() -> (Graph, ValueId) {
    let mut b = GraphBuilder::new();
    let x = b.input(TypeTag::Tensor, "input0");
    let p = b.constant(HostValue::Double(0.5));
    let train = b.constant(HostValue::Bool(true));
    let y = b.node("aten::dropout", None, [x, p, train], [TypeTag::Tensor])[0];
    let z = b.node("aten::relu", None, [y], [TypeTag::Tensor])[0];
    b.output(z);
    (b.finish(), x)
}

#[test]
fn dropout_is_removed_and_consumers_rewired() {
    let (mut graph, x) = dropout_graph();
    remove_dropout(&mut graph);

    assert_eq!(count_kind(&graph, "aten::dropout"), 0);
    let relu = graph
        .nodes
        .iter()
        .find(|n| n.kind == *"aten::relu")
        .expect("relu survives");
    assert_eq!(relu.inputs[0], x);
}

#[test]
fn dropout_feeding_a_graph_output_is_rewired() {
    let mut b = GraphBuilder::new();
    let x = b.input(TypeTag::Tensor, "input0");
    let p = b.constant(HostValue::Double(0.5));
    let train = b.constant(HostValue::Bool(true));
    let y = b.node("aten::dropout_", None, [x, p, train], [TypeTag::Tensor])[0];
    b.output(y);
    let mut graph = b.finish();

    remove_dropout(&mut graph);

    assert_eq!(count_kind(&graph, "aten::dropout_"), 0);
    assert_eq!(graph.outputs, vec![x]);
}

#[test]
fn repeated_dropout_is_removed_to_fixed_point() {
    let mut b = GraphBuilder::new();
    let x = b.input(TypeTag::Tensor, "input0");
    let p = b.constant(HostValue::Double(0.1));
    let train = b.constant(HostValue::Bool(true));
    let y1 = b.node("aten::dropout", None, [x, p, train], [TypeTag::Tensor])[0];
    let y2 = b.node("aten::dropout", None, [y1, p, train], [TypeTag::Tensor])[0];
    b.output(y2);
    let mut graph = b.finish();

    remove_dropout(&mut graph);

    assert_eq!(count_kind(&graph, "aten::dropout"), 0);
    assert_eq!(graph.outputs, vec![x]);
}

#[test]
fn conv2d_canonicalizes_to_the_general_convolution_form() {
    let mut b = GraphBuilder::new();
    let x = b.input(TypeTag::Tensor, "input0");
    let w = b.input(TypeTag::Tensor, "weight");
    let bias = b.none();
    let stride = b.constant(HostValue::IntList(vec![1, 1]));
    let padding = b.constant(HostValue::IntList(vec![0, 0]));
    let dilation = b.constant(HostValue::IntList(vec![1, 1]));
    let groups = b.constant(HostValue::Int(1));
    let y = b.node(
        "aten::conv2d",
        None,
        [x, w, bias, stride, padding, dilation, groups],
        [TypeTag::Tensor],
    )[0];
    b.output(y);
    let mut graph = b.finish();

    canonicalize_conv(&mut graph);

    assert_eq!(count_kind(&graph, "aten::conv2d"), 0);
    let conv = graph
        .nodes
        .iter()
        .find(|n| n.kind == *"aten::_convolution")
        .expect("general convolution node");
    assert_eq!(conv.inputs.len(), 12);
    assert!(conv.schema.is_some());
    // Original operands survive in position.
    assert_eq!(conv.inputs[0], x);
    assert_eq!(conv.inputs[1], w);
    assert_eq!(conv.inputs[2], bias);
    assert_eq!(conv.inputs[3], stride);
    assert_eq!(conv.inputs[8], groups);
    // Synthesized transposed flag and output padding.
    let transposed = graph.producer(conv.inputs[6]).expect("flag producer");
    assert_eq!(transposed.attribute("value"), Some(&HostValue::Bool(false)));
    let out_pad = graph.producer(conv.inputs[7]).expect("padding producer");
    assert_eq!(
        out_pad.attribute("value"),
        Some(&HostValue::IntList(vec![0, 0]))
    );
    assert_eq!(graph.outputs, conv.outputs);
}

#[test]
fn lower_graph_runs_all_passes() {
    let mut b = GraphBuilder::new();
    let x = b.input(TypeTag::Tensor, "input0");
    let w = b.input(TypeTag::Tensor, "weight");
    let bias = b.none();
    let stride = b.constant(HostValue::IntList(vec![1]));
    let padding = b.constant(HostValue::IntList(vec![0]));
    let dilation = b.constant(HostValue::IntList(vec![1]));
    let groups = b.constant(HostValue::Int(1));
    let p = b.constant(HostValue::Double(0.5));
    let train = b.constant(HostValue::Bool(true));
    let dropped = b.node("aten::dropout", None, [x, p, train], [TypeTag::Tensor])[0];
    let y = b.node(
        "aten::conv1d",
        None,
        [dropped, w, bias, stride, padding, dilation, groups],
        [TypeTag::Tensor],
    )[0];
    b.output(y);
    let mut graph = b.finish();

    lower_graph(&mut graph);

    assert_eq!(count_kind(&graph, "aten::dropout"), 0);
    assert_eq!(count_kind(&graph, "aten::conv1d"), 0);
    let conv = graph
        .nodes
        .iter()
        .find(|n| n.kind == *"aten::_convolution")
        .expect("general convolution node");
    assert_eq!(conv.inputs[0], x);
}

#[test]
fn lowering_is_idempotent() {
    let mut b = GraphBuilder::new();
    let x = b.input(TypeTag::Tensor, "input0");
    let w = b.input(TypeTag::Tensor, "weight");
    let bias = b.none();
    let stride = b.constant(HostValue::IntList(vec![1, 1]));
    let padding = b.constant(HostValue::IntList(vec![0, 0]));
    let dilation = b.constant(HostValue::IntList(vec![1, 1]));
    let groups = b.constant(HostValue::Int(1));
    let p = b.constant(HostValue::Double(0.5));
    let train = b.constant(HostValue::Bool(true));
    let dropped = b.node("aten::dropout", None, [x, p, train], [TypeTag::Tensor])[0];
    let y = b.node(
        "aten::conv2d",
        None,
        [dropped, w, bias, stride, padding, dilation, groups],
        [TypeTag::Tensor],
    )[0];
    b.output(y);
    let mut graph = b.finish();

    lower_graph(&mut graph);
    let nodes = graph.nodes.clone();
    let inputs = graph.inputs.clone();
    let outputs = graph.outputs.clone();

    lower_graph(&mut graph);

    assert_eq!(graph.nodes, nodes);
    assert_eq!(graph.inputs, inputs);
    assert_eq!(graph.outputs, outputs);
}

#[test]
fn unrelated_nodes_are_untouched() {
    let mut b = GraphBuilder::new();
    let x = b.input(TypeTag::Tensor, "input0");
    let y = b.node("aten::relu", None, [x], [TypeTag::Tensor])[0];
    b.output(y);
    let mut graph = b.finish();
    let before = graph.nodes.clone();

    lower_graph(&mut graph);

    assert_eq!(graph.nodes, before);
}
