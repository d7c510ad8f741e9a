use torq::conversion::{
    check_operator_support, ConverterRegistration, EvalOptions, EvalRegistration, Registries,
};
use torq::error::{ConversionError, ConversionResult};
use torq::host::HostValue;
use torq::ir::{Graph, GraphBuilder, Node, TypeTag};

fn noop_converter(
    _ctx: &mut torq::conversion::ConversionCtx,
    _graph: &Graph,
    _node: &Node,
    _args: &mut torq::conversion::Args,
) -> ConversionResult<()> {
    Ok(())
}

fn yes_evaluator(
    _ctx: &torq::conversion::ConversionCtx,
    _graph: &Graph,
    _node: &Node,
    _args: &torq::conversion::Args,
) -> ConversionResult<Option<HostValue>> {
    Ok(Some(HostValue::Bool(true)))
}

fn no_evaluator(
    _ctx: &torq::conversion::ConversionCtx,
    _graph: &Graph,
    _node: &Node,
    _args: &torq::conversion::Args,
) -> ConversionResult<Option<HostValue>> {
    Ok(Some(HostValue::Bool(false)))
}

#[test]
fn duplicate_converter_registration_is_rejected() {
    let mut registries = Registries::empty();
    registries
        .converters
        .register(ConverterRegistration {
            kind: "aten::tanh".into(),
            signatures: &[],
            converter: noop_converter,
        })
        .expect("first registration");

    let err = registries
        .converters
        .register(ConverterRegistration {
            kind: "aten::tanh".into(),
            signatures: &[],
            converter: noop_converter,
        })
        .expect_err("second registration for the same kind");
    assert!(matches!(err, ConversionError::Config(_)));
    assert!(err.to_string().contains("aten::tanh"));
}

#[test]
fn evaluator_filters_fall_through_in_registration_order() {
    let mut registries = Registries::empty();
    // First registration refuses tensor-typed outputs; second takes the rest.
    registries.evaluators.register(EvalRegistration {
        kind: "custom::pick".into(),
        options: EvalOptions::new().blacklist([TypeTag::Tensor]),
        evaluator: yes_evaluator,
    });
    registries.evaluators.register(EvalRegistration {
        kind: "custom::pick".into(),
        options: EvalOptions::new(),
        evaluator: no_evaluator,
    });

    let mut b = GraphBuilder::new();
    b.node("custom::pick", None, Vec::new(), [TypeTag::Int]);
    b.node("custom::pick", None, Vec::new(), [TypeTag::Tensor]);
    let graph = b.finish();

    let ctx = torq::conversion::ConversionCtx::new(
        Box::new(torq_backend_ref::RefNetworkBuilder::new()),
        torq::settings::BuilderSettings::default(),
    )
    .expect("default settings validate");

    let run = |node: &Node| {
        let picked = registries
            .evaluators
            .find(&graph, node)
            .expect("find")
            .expect("registration");
        let args = torq::conversion::Args::bind(&ctx, node).expect("bind");
        (picked.evaluator)(&ctx, &graph, node, &args).expect("evaluates")
    };

    // The int-typed node passes the first registration's blacklist; the
    // tensor-typed node falls through to the unfiltered one.
    assert_eq!(run(&graph.nodes[0]), Some(HostValue::Bool(true)));
    assert_eq!(run(&graph.nodes[1]), Some(HostValue::Bool(false)));
}

#[test]
fn schema_filtered_evaluator_skips_other_overloads() {
    let mut registries = Registries::empty();
    registries.evaluators.register(EvalRegistration {
        kind: "custom::sized".into(),
        options: EvalOptions::new()
            .valid_schemas(&["custom::sized.pair(int a, int b) -> (int)"])
            .expect("schemas parse"),
        evaluator: yes_evaluator,
    });

    let mut b = GraphBuilder::new();
    b.node(
        "custom::sized",
        Some("custom::sized.pair(int first, int second) -> (int)"),
        Vec::new(),
        [TypeTag::Int],
    );
    b.node(
        "custom::sized",
        Some("custom::sized.triple(int a, int b, int c) -> (int)"),
        Vec::new(),
        [TypeTag::Int],
    );
    let graph = b.finish();

    assert!(registries
        .evaluators
        .find(&graph, &graph.nodes[0])
        .expect("find")
        .is_some());
    assert!(registries
        .evaluators
        .find(&graph, &graph.nodes[1])
        .expect("find")
        .is_none());
}

fn passthrough_first_output(
    ctx: &mut torq::conversion::ConversionCtx,
    graph: &Graph,
    node: &Node,
    args: &mut torq::conversion::Args,
) -> ConversionResult<()> {
    let tensor = args.tensor(0)?;
    ctx.associate_tensor(graph, node.outputs[0], tensor);
    Ok(())
}

#[test]
fn unbound_auxiliary_outputs_are_tolerated() {
    let mut registries = Registries::empty();
    registries
        .converters
        .register(ConverterRegistration {
            kind: "custom::pass".into(),
            signatures: &[],
            converter: passthrough_first_output,
        })
        .expect("registration");

    // The second output never gets provenance; conversion still succeeds
    // because nothing downstream consumes it.
    let mut b = GraphBuilder::new();
    let x = b.input(TypeTag::Tensor, "input0");
    let outs = b.node(
        "custom::pass",
        None,
        [x],
        [TypeTag::Tensor, TypeTag::Tensor],
    );
    b.output(outs[0]);
    let graph = b.finish();

    let params = torq::conversion::named_params(&graph, Vec::new());
    let info = torq::conversion::ConversionInfo::new(vec![torq::conversion::InputSpec::new(
        vec![2, 2],
    )]);
    let blob = torq::conversion::convert_graph_with(
        &registries,
        &graph,
        &params,
        Box::new(torq_backend_ref::RefNetworkBuilder::new()),
        &info,
    )
    .expect("partial binding is a warning, not a failure");
    assert!(!blob.is_empty());
}

#[test]
fn operator_support_reports_unhandled_kinds_once() {
    let registries = Registries::builtin().expect("builtin registries");

    let mut b = GraphBuilder::new();
    let x = b.input(TypeTag::Tensor, "input0");
    let a = b.node("aten::tanh", None, [x], [TypeTag::Tensor])[0];
    let c = b.node("aten::tanh", None, [a], [TypeTag::Tensor])[0];
    let d = b.node("aten::erf", None, [c], [TypeTag::Tensor])[0];
    let dtype = b.constant(HostValue::None);
    let e = b.node(
        "aten::mean",
        Some("aten::mean(Tensor self, *, int? dtype=None) -> (Tensor)"),
        [d, dtype],
        [TypeTag::Tensor],
    )[0];
    b.output(e);
    let graph = b.finish();

    let unsupported = check_operator_support(&registries, &graph);
    let names: Vec<&str> = unsupported.iter().map(|k| k.as_str()).collect();
    assert_eq!(names, vec!["aten::tanh", "aten::erf"]);
}
