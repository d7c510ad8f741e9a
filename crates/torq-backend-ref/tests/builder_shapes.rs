use torq::host::TensorLiteral;
use torq::network::{ConvolutionSpec, NetworkBuilder, ReduceOp, Weights};
use torq::settings::BuilderSettings;
use torq_backend_ref::{Engine, RefNetworkBuilder};

fn unit_spec(spatial: usize) -> ConvolutionSpec {
    ConvolutionSpec {
        stride: std::iter::repeat(1).take(spatial).collect(),
        padding: std::iter::repeat(0).take(spatial).collect(),
        dilation: std::iter::repeat(1).take(spatial).collect(),
        output_padding: std::iter::repeat(0).take(spatial).collect(),
        groups: 1,
    }
}

fn weights(shape: &[usize]) -> Weights {
    let numel: usize = shape.iter().product();
    let data = (0..numel).map(|i| i as f32 * 0.01).collect();
    Weights::new(TensorLiteral::new(shape.to_vec(), data))
}

#[test]
fn convolution_shape_inference() {
    let mut net = RefNetworkBuilder::new();
    let input = net.add_input("input0", &[1, 3, 10, 10]).expect("input");
    let out = net
        .add_convolution(input, &unit_spec(2), weights(&[8, 3, 5, 5]), None)
        .expect("layer");
    assert_eq!(net.tensor_dims(out), &[1, 8, 6, 6]);

    let strided = ConvolutionSpec {
        stride: [2, 2].into_iter().collect(),
        padding: [1, 1].into_iter().collect(),
        ..unit_spec(2)
    };
    let out = net
        .add_convolution(input, &strided, weights(&[8, 3, 5, 5]), None)
        .expect("layer");
    // floor((10 + 2 - 5) / 2) + 1 = 4.
    assert_eq!(net.tensor_dims(out), &[1, 8, 4, 4]);
}

#[test]
fn deconvolution_shape_inference() {
    let mut net = RefNetworkBuilder::new();
    let input = net.add_input("input0", &[1, 3, 10, 10]).expect("input");
    let out = net
        .add_deconvolution(input, &unit_spec(2), weights(&[3, 8, 5, 5]), None)
        .expect("layer");
    // (10 - 1) * 1 + (5 - 1) + 1 = 14.
    assert_eq!(net.tensor_dims(out), &[1, 8, 14, 14]);
}

#[test]
fn channel_mismatch_is_rejected() {
    let mut net = RefNetworkBuilder::new();
    let input = net.add_input("input0", &[1, 4, 10, 10]).expect("input");
    let err = net
        .add_convolution(input, &unit_spec(2), weights(&[8, 3, 5, 5]), None)
        .expect_err("channel mismatch");
    assert!(err.to_string().contains("channels"));
}

#[test]
fn output_maps_must_split_evenly_over_groups() {
    let mut net = RefNetworkBuilder::new();
    let input = net.add_input("input0", &[1, 4, 8, 8]).expect("input");
    let spec = ConvolutionSpec {
        groups: 4,
        ..unit_spec(2)
    };
    // Four groups but only two output maps.
    let err = net
        .add_convolution(input, &spec, weights(&[2, 1, 3, 3]), None)
        .expect_err("uneven group split");
    assert!(err.to_string().contains("groups"));
}

#[test]
fn deconvolution_channels_must_split_evenly_over_groups() {
    let mut net = RefNetworkBuilder::new();
    let input = net.add_input("input0", &[1, 3, 10, 10]).expect("input");
    let spec = ConvolutionSpec {
        groups: 2,
        ..unit_spec(2)
    };
    let err = net
        .add_deconvolution(input, &spec, weights(&[3, 8, 5, 5]), None)
        .expect_err("uneven group split");
    assert!(err.to_string().contains("groups"));
}

#[test]
fn reduce_shape_inference() {
    let mut net = RefNetworkBuilder::new();
    let input = net.add_input("input0", &[2, 3, 4]).expect("input");

    let kept = net
        .add_reduce(input, ReduceOp::Sum, 0b010, true)
        .expect("layer");
    assert_eq!(net.tensor_dims(kept), &[2, 1, 4]);

    let dropped = net
        .add_reduce(input, ReduceOp::Max, 0b101, false)
        .expect("layer");
    assert_eq!(net.tensor_dims(dropped), &[3]);

    let scalar = net
        .add_reduce(input, ReduceOp::Avg, 0b111, false)
        .expect("layer");
    assert_eq!(net.tensor_dims(scalar), &[] as &[usize]);

    let err = net
        .add_reduce(input, ReduceOp::Min, 0b1000, false)
        .expect_err("axis beyond rank");
    assert!(err.to_string().contains("rank"));
}

#[test]
fn build_requires_a_marked_output() {
    let mut net = RefNetworkBuilder::new();
    net.add_input("input0", &[2, 2]).expect("input");
    let err = net
        .build(&BuilderSettings::default())
        .expect_err("no outputs marked");
    assert!(err.to_string().contains("output"));
}

#[test]
fn engine_round_trips_and_validates_input_shapes() {
    let mut net = RefNetworkBuilder::new();
    let input = net.add_input("input0", &[1, 2, 3, 3]).expect("input");
    let out = net
        .add_reduce(input, ReduceOp::Sum, 0b1111, false)
        .expect("layer");
    net.mark_output(out, "output0").expect("mark");
    let blob = net.build(&BuilderSettings::default()).expect("build");

    let engine = Engine::deserialize(&blob).expect("deserialize");
    assert_eq!(engine.num_inputs(), 1);
    assert_eq!(engine.output_names().collect::<Vec<_>>(), vec!["output0"]);

    let data: Vec<f32> = (0..18).map(|i| i as f32).collect();
    let outputs = engine
        .run(&[TensorLiteral::new(vec![1, 2, 3, 3], data)])
        .expect("runs");
    assert_eq!(outputs[0].data, vec![153.0]);

    let err = engine
        .run(&[TensorLiteral::zeros(vec![1, 2, 3])])
        .expect_err("wrong input shape");
    assert!(err.to_string().contains("shape"));
}

#[test]
fn grouped_convolution_runs_per_group() {
    let mut net = RefNetworkBuilder::new();
    let input = net.add_input("input0", &[1, 2, 3, 3]).expect("input");
    let spec = ConvolutionSpec {
        groups: 2,
        ..unit_spec(2)
    };
    // Two groups of one channel each; kernels are all-ones 3x3.
    let kernel = Weights::new(TensorLiteral::new(vec![2, 1, 3, 3], vec![1.0; 18]));
    let out = net
        .add_convolution(input, &spec, kernel, None)
        .expect("layer");
    net.mark_output(out, "output0").expect("mark");
    let blob = net.build(&BuilderSettings::default()).expect("build");

    let engine = Engine::deserialize(&blob).expect("deserialize");
    let data: Vec<f32> = (0..18).map(|i| i as f32).collect();
    let outputs = engine
        .run(&[TensorLiteral::new(vec![1, 2, 3, 3], data)])
        .expect("runs");
    // Each output channel sums only its own input channel.
    assert_eq!(outputs[0].shape, vec![1, 2, 1, 1]);
    assert_eq!(outputs[0].data, vec![36.0, 117.0]);
}
