use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use torq::conversion::{
    convert_graph_with, named_params, ConversionInfo, InputSpec, Registries,
};
use torq::host::{HostValue, TensorLiteral};
use torq::ir::{Graph, GraphBuilder, TypeTag, ValueId};
use torq::lowering::lower_graph;
use torq_backend_ref::{Engine, Layer, RefNetworkBuilder};

const TOLERANCE: f32 = 2e-6;

fn random_tensor(rng: &mut StdRng, shape: &[usize]) -> TensorLiteral {
    let numel = shape.iter().product();
    let data = (0..numel).map(|_| rng.gen::<f32>() - 0.5).collect();
    TensorLiteral::new(shape.to_vec(), data)
}

fn assert_close(actual: &TensorLiteral, expected: &TensorLiteral) {
    assert_eq!(actual.shape, expected.shape);
    for (i, (a, e)) in actual.data.iter().zip(&expected.data).enumerate() {
        assert!(
            (a - e).abs() <= TOLERANCE,
            "element {i}: {a} vs {e}"
        );
    }
}

/// Direct dense 2-d convolution, stride 1, no padding, no groups.
fn conv2d_reference(
    input: &TensorLiteral,
    weight: &TensorLiteral,
    bias: Option<&[f32]>,
) -> TensorLiteral {
    let (n, cin, h, w) = (
        input.shape[0],
        input.shape[1],
        input.shape[2],
        input.shape[3],
    );
    let (cout, kh, kw) = (weight.shape[0], weight.shape[2], weight.shape[3]);
    let (oh, ow) = (h - kh + 1, w - kw + 1);
    let mut out = TensorLiteral::zeros(vec![n, cout, oh, ow]);
    for b in 0..n {
        for oc in 0..cout {
            for oy in 0..oh {
                for ox in 0..ow {
                    let mut acc = bias.map(|b| b[oc]).unwrap_or(0.0);
                    for ic in 0..cin {
                        for ky in 0..kh {
                            for kx in 0..kw {
                                let iv = input.data
                                    [((b * cin + ic) * h + oy + ky) * w + ox + kx];
                                let wv = weight.data
                                    [((oc * cin + ic) * kh + ky) * kw + kx];
                                acc += iv * wv;
                            }
                        }
                    }
                    out.data[((b * cout + oc) * oh + oy) * ow + ox] = acc;
                }
            }
        }
    }
    out
}

/// Traced `aten::conv2d` graph with unit stride and no padding. The weight
/// (and optional bias) are trailing graph inputs satisfied by named params.
fn conv2d_graph(with_bias: bool) -> (Graph, Vec<ValueId>) {
    let mut b = GraphBuilder::new();
    let x = b.input(TypeTag::Tensor, "input0");
    let w = b.input(TypeTag::Tensor, "weight");
    let mut param_values = vec![w];
    let bias = if with_bias {
        let bias = b.input(TypeTag::Tensor, "bias");
        param_values.push(bias);
        bias
    } else {
        b.none()
    };
    let one = b.constant(HostValue::Int(1));
    let zero = b.constant(HostValue::Int(0));
    let stride = b.node(
        "prim::ListConstruct",
        None,
        [one, one],
        [TypeTag::int_list()],
    )[0];
    let padding = b.node(
        "prim::ListConstruct",
        None,
        [zero, zero],
        [TypeTag::int_list()],
    )[0];
    let dilation = b.node(
        "prim::ListConstruct",
        None,
        [one, one],
        [TypeTag::int_list()],
    )[0];
    let groups = b.constant(HostValue::Int(1));
    let y = b.node(
        "aten::conv2d",
        None,
        [x, w, bias, stride, padding, dilation, groups],
        [TypeTag::Tensor],
    )[0];
    b.output(y);
    (b.finish(), param_values)
}

fn compile(
    graph: &mut Graph,
    params: Vec<TensorLiteral>,
    input_shape: &[usize],
) -> Engine {
    lower_graph(graph);
    let params = named_params(graph, params);
    let info = ConversionInfo::new(vec![InputSpec::new(input_shape.to_vec())]);
    let registries = Registries::builtin().expect("builtin registries");
    let blob = convert_graph_with(
        &registries,
        graph,
        &params,
        Box::new(RefNetworkBuilder::new()),
        &info,
    )
    .expect("conversion succeeds");
    Engine::deserialize(&blob).expect("valid engine blob")
}

#[test]
fn conv2d_matches_the_direct_computation() {
    let mut rng = StdRng::seed_from_u64(7);
    let input = random_tensor(&mut rng, &[1, 3, 10, 10]);
    let weight = random_tensor(&mut rng, &[8, 3, 5, 5]);
    let bias = random_tensor(&mut rng, &[8]);

    let (mut graph, _) = conv2d_graph(true);
    let engine = compile(&mut graph, vec![weight.clone(), bias.clone()], &[1, 3, 10, 10]);

    let outputs = engine.run(&[input.clone()]).expect("engine runs");
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].shape, vec![1, 8, 6, 6]);
    assert_close(
        &outputs[0],
        &conv2d_reference(&input, &weight, Some(&bias.data)),
    );
}

#[test]
fn conv2d_handles_batched_input() {
    let mut rng = StdRng::seed_from_u64(11);
    let input = random_tensor(&mut rng, &[4, 3, 10, 10]);
    let weight = random_tensor(&mut rng, &[8, 3, 5, 5]);

    let (mut graph, _) = conv2d_graph(false);
    let engine = compile(&mut graph, vec![weight.clone()], &[4, 3, 10, 10]);

    let outputs = engine.run(&[input.clone()]).expect("engine runs");
    assert_eq!(outputs[0].shape, vec![4, 8, 6, 6]);
    assert_close(&outputs[0], &conv2d_reference(&input, &weight, None));
}

#[test]
fn absent_bias_behaves_as_explicit_zeros() {
    let mut rng = StdRng::seed_from_u64(13);
    let input = random_tensor(&mut rng, &[1, 3, 10, 10]);
    let weight = random_tensor(&mut rng, &[8, 3, 5, 5]);
    let zero_bias = TensorLiteral::zeros(vec![8]);

    let (mut graph_none, _) = conv2d_graph(false);
    let engine_none = compile(&mut graph_none, vec![weight.clone()], &[1, 3, 10, 10]);

    let (mut graph_zeros, _) = conv2d_graph(true);
    let engine_zeros = compile(
        &mut graph_zeros,
        vec![weight.clone(), zero_bias],
        &[1, 3, 10, 10],
    );

    let out_none = engine_none.run(&[input.clone()]).expect("engine runs");
    let out_zeros = engine_zeros.run(&[input]).expect("engine runs");
    assert_close(&out_none[0], &out_zeros[0]);
}

#[test]
fn list_construct_folds_without_emitting_layers() {
    let mut rng = StdRng::seed_from_u64(17);
    let weight = random_tensor(&mut rng, &[8, 3, 5, 5]);

    let (mut graph, _) = conv2d_graph(false);
    let engine = compile(&mut graph, vec![weight], &[1, 3, 10, 10]);

    // Just the convolution; the stride, padding and dilation lists were
    // folded at compile time and the kernel rides inside the layer.
    assert_eq!(engine.layers().len(), 1);
    assert!(matches!(engine.layers()[0], Layer::Convolution { .. }));
}

#[test]
fn transposed_convolution_emits_a_deconvolution_layer() {
    let mut rng = StdRng::seed_from_u64(19);
    let input = random_tensor(&mut rng, &[1, 3, 10, 10]);
    // Transposed layout: [in_channels, out_channels, kh, kw].
    let weight = random_tensor(&mut rng, &[3, 8, 5, 5]);

    let mut b = GraphBuilder::new();
    let x = b.input(TypeTag::Tensor, "input0");
    let w = b.input(TypeTag::Tensor, "weight");
    let bias = b.none();
    let pair_one = b.constant(HostValue::IntList(vec![1, 1]));
    let pair_zero = b.constant(HostValue::IntList(vec![0, 0]));
    let transposed = b.constant(HostValue::Bool(true));
    let flag = b.constant(HostValue::Bool(false));
    let groups = b.constant(HostValue::Int(1));
    let y = b.node(
        "aten::_convolution",
        Some("aten::_convolution(Tensor input, Tensor weight, Tensor? bias, int[] stride, int[] padding, int[] dilation, bool transposed, int[] output_padding, int groups, bool benchmark, bool deterministic, bool cudnn_enabled) -> (Tensor)"),
        [x, w, bias, pair_one, pair_zero, pair_one, transposed, pair_zero, groups, flag, flag, flag],
        [TypeTag::Tensor],
    )[0];
    b.output(y);
    let mut graph = b.finish();

    let engine = compile(&mut graph, vec![weight.clone()], &[1, 3, 10, 10]);
    assert!(engine
        .layers()
        .iter()
        .any(|layer| matches!(layer, Layer::Deconvolution { .. })));

    let outputs = engine.run(&[input.clone()]).expect("engine runs");
    // (10 - 1) * 1 + (5 - 1) + 1 = 14 per spatial axis.
    assert_eq!(outputs[0].shape, vec![1, 8, 14, 14]);

    // With unit stride a deconvolution is a correlation with the kernel
    // flipped and the channel axes swapped, over a fully padded input.
    let mut padded = TensorLiteral::zeros(vec![1, 3, 18, 18]);
    for c in 0..3 {
        for y in 0..10 {
            for x in 0..10 {
                padded.data[(c * 18 + y + 4) * 18 + x + 4] =
                    input.data[(c * 10 + y) * 10 + x];
            }
        }
    }
    let mut flipped = TensorLiteral::zeros(vec![8, 3, 5, 5]);
    for ic in 0..3 {
        for oc in 0..8 {
            for ky in 0..5 {
                for kx in 0..5 {
                    flipped.data[((oc * 3 + ic) * 5 + 4 - ky) * 5 + 4 - kx] =
                        weight.data[((ic * 8 + oc) * 5 + ky) * 5 + kx];
                }
            }
        }
    }
    assert_close(&outputs[0], &conv2d_reference(&padded, &flipped, None));
}

#[test]
fn mean_reduction_matches_the_direct_computation() {
    let mut rng = StdRng::seed_from_u64(23);
    let input = random_tensor(&mut rng, &[2, 3, 4]);

    let mut b = GraphBuilder::new();
    let x = b.input(TypeTag::Tensor, "input0");
    let dtype = b.none();
    let y = b.node(
        "aten::mean",
        Some("aten::mean(Tensor self, *, int? dtype=None) -> (Tensor)"),
        [x, dtype],
        [TypeTag::Tensor],
    )[0];
    b.output(y);
    let mut graph = b.finish();

    let engine = compile(&mut graph, Vec::new(), &[2, 3, 4]);
    let outputs = engine.run(&[input.clone()]).expect("engine runs");

    let expected = input.data.iter().sum::<f32>() / input.numel() as f32;
    assert!(outputs[0].shape.is_empty());
    assert!((outputs[0].data[0] - expected).abs() <= 1e-4);
}

#[test]
fn dim_sum_reduction_respects_axis_list_and_keepdim() {
    let mut rng = StdRng::seed_from_u64(29);
    let input = random_tensor(&mut rng, &[2, 3, 4]);

    let mut b = GraphBuilder::new();
    let x = b.input(TypeTag::Tensor, "input0");
    let axis = b.constant(HostValue::Int(1));
    let dims = b.node("prim::ListConstruct", None, [axis], [TypeTag::int_list()])[0];
    let keep = b.constant(HostValue::Bool(true));
    let dtype = b.none();
    let y = b.node(
        "aten::sum",
        Some("aten::sum.dim_IntList(Tensor self, int[] dim, bool keepdim=False, *, int? dtype=None) -> (Tensor)"),
        [x, dims, keep, dtype],
        [TypeTag::Tensor],
    )[0];
    b.output(y);
    let mut graph = b.finish();

    let engine = compile(&mut graph, Vec::new(), &[2, 3, 4]);
    let outputs = engine.run(&[input.clone()]).expect("engine runs");
    assert_eq!(outputs[0].shape, vec![2, 1, 4]);

    let mut expected = TensorLiteral::zeros(vec![2, 1, 4]);
    for n in 0..2 {
        for c in 0..3 {
            for k in 0..4 {
                expected.data[n * 4 + k] += input.data[(n * 3 + c) * 4 + k];
            }
        }
    }
    assert_close(&outputs[0], &expected);
}

#[test]
fn input_shape_count_must_match_free_inputs() {
    let (mut graph, _) = conv2d_graph(false);
    lower_graph(&mut graph);
    let params = named_params(&graph, Vec::new());
    // Two free inputs now, but only one declared shape.
    let info = ConversionInfo::new(vec![InputSpec::new(vec![1, 3, 10, 10])]);
    let registries = Registries::builtin().expect("builtin registries");
    let err = convert_graph_with(
        &registries,
        &graph,
        &params,
        Box::new(RefNetworkBuilder::new()),
        &info,
    )
    .expect_err("shape count mismatch");
    assert!(err.to_string().contains("free inputs"));
}

#[test]
fn unknown_kind_reports_the_missing_converter() {
    let mut b = GraphBuilder::new();
    let x = b.input(TypeTag::Tensor, "input0");
    let y = b.node("aten::tanh", None, [x], [TypeTag::Tensor])[0];
    b.output(y);
    let graph = b.finish();

    let params = named_params(&graph, Vec::new());
    let info = ConversionInfo::new(vec![InputSpec::new(vec![2, 2])]);
    let registries = Registries::builtin().expect("builtin registries");
    let err = convert_graph_with(
        &registries,
        &graph,
        &params,
        Box::new(RefNetworkBuilder::new()),
        &info,
    )
    .expect_err("no converter for tanh");
    assert_eq!(
        err.to_string(),
        "unable to convert node of kind aten::tanh, no converter registered"
    );
}
