use tracing::debug;

use crate::error::{ConversionError, ConversionResult};
use crate::ir::{Graph, Node};
use crate::network::{to_dims, ConvolutionSpec, Weights};

use super::{Args, ConversionCtx, ConverterRegistration, ConverterRegistry};

/// Canonical convolution schema every dimensional variant is lowered to
/// before conversion.
pub const CONVOLUTION_SIGNATURE: &str = "aten::_convolution(Tensor input, Tensor weight, Tensor? bias, int[] stride, int[] padding, int[] dilation, bool transposed, int[] output_padding, int groups, bool benchmark, bool deterministic, bool cudnn_enabled) -> (Tensor)";

/// Lowers `aten::_convolution` to a convolution or deconvolution layer. The
/// kernel and bias must be evaluated tensor literals; only the data input may
/// be a live network tensor.
fn convolution(
    ctx: &mut ConversionCtx,
    graph: &Graph,
    node: &Node,
    args: &mut Args,
) -> ConversionResult<()> {
    let input = args.tensor_or_freeze(0, ctx, graph)?;
    let kernel = Weights::new(args.unwrap_to_tensor(1)?);
    let num_output_maps = kernel.num_output_maps;

    let stride = to_dims(&args.unwrap_to_int_list(3)?);
    let padding = to_dims(&args.unwrap_to_int_list(4)?);
    let dilation = to_dims(&args.unwrap_to_int_list(5)?);
    let transposed = args.unwrap_to_bool(6)?;
    let output_padding = to_dims(&args.unwrap_to_int_list(7)?);
    let groups = args.unwrap_to_int(8)? as usize;

    debug!(
        node = %node.info(),
        ?stride,
        ?padding,
        ?dilation,
        ?output_padding,
        groups,
        transposed,
        kernel_shape = ?kernel.shape,
        "lowering convolution"
    );

    let spec = ConvolutionSpec {
        stride,
        padding,
        dilation,
        output_padding,
        groups,
    };

    let layer_err = |message: String| ConversionError::conversion(node.info(), message);

    let output = if transposed {
        // Deconvolution layers accept a genuinely absent bias.
        let bias = if args.is_none(2) {
            None
        } else {
            Some(Weights::new(args.unwrap_to_tensor(2)?))
        };
        ctx.net
            .add_deconvolution(input, &spec, kernel, bias)
            .map_err(|e| layer_err(format!("unable to create deconvolution layer: {e}")))?
    } else {
        // Convolution layers require a bias term, so an absent bias becomes
        // an explicit zero vector sized to the output channel count.
        let bias = if args.is_none(2) {
            Weights::zeros(&[num_output_maps])
        } else {
            Weights::new(args.unwrap_to_tensor(2)?)
        };
        ctx.net
            .add_convolution(input, &spec, kernel, Some(bias))
            .map_err(|e| layer_err(format!("unable to create convolution layer: {e}")))?
    };

    let output = ctx.associate_tensor(graph, node.outputs[0], output);
    debug!(shape = ?ctx.tensor_dims(output), "convolution output tensor");
    Ok(())
}

pub(super) fn register(registry: &mut ConverterRegistry) -> ConversionResult<()> {
    registry.register(ConverterRegistration {
        kind: "aten::_convolution".into(),
        signatures: &[CONVOLUTION_SIGNATURE],
        converter: convolution,
    })
}
