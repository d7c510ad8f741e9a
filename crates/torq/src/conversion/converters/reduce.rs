use tracing::{debug, warn};

use crate::error::{ConversionError, ConversionResult};
use crate::ir::{Graph, Node};
use crate::network::{ReduceOp, TensorRef};

use super::{Args, ConversionCtx, ConverterRegistration, ConverterRegistry};

const MEAN_SIGNATURES: &[&str] = &[
    "aten::mean(Tensor self, *, int? dtype=None) -> (Tensor)",
    "aten::mean.dim(Tensor self, int[] dim, bool keepdim=False, *, int? dtype=None) -> (Tensor)",
];

const SUM_SIGNATURES: &[&str] = &[
    "aten::sum(Tensor self, *, int? dtype=None) -> (Tensor)",
    "aten::sum.dim_IntList(Tensor self, int[] dim, bool keepdim=False, *, int? dtype=None) -> (Tensor)",
];

const MAX_SIGNATURES: &[&str] = &["aten::max(Tensor self) -> (Tensor)"];
const MIN_SIGNATURES: &[&str] = &["aten::min(Tensor self) -> (Tensor)"];

/// Bit mask selecting every axis of `tensor`.
fn full_axis_mask(ctx: &ConversionCtx, tensor: TensorRef) -> u32 {
    let rank = ctx.tensor_dims(tensor).len();
    ((1u64 << rank) - 1) as u32
}

fn axis_mask_from_dims(
    ctx: &ConversionCtx,
    tensor: TensorRef,
    dims: &[i64],
    node: &Node,
) -> ConversionResult<u32> {
    let rank = ctx.tensor_dims(tensor).len() as i64;
    let mut mask = 0u32;
    for &dim in dims {
        let dim = if dim < 0 { dim + rank } else { dim };
        if dim < 0 || dim >= rank {
            return Err(ConversionError::conversion(
                node.info(),
                format!("reduction dim {dim} is out of range for a rank {rank} tensor"),
            ));
        }
        mask |= 1 << dim;
    }
    Ok(mask)
}

/// Shared lowering for mean and sum, which both come in a whole-tensor form
/// and a `.dim` overload with an explicit axis list and keepdim flag. The
/// trailing dtype argument is accepted but not honored.
fn reduce_sum_like(
    op: ReduceOp,
    ctx: &mut ConversionCtx,
    graph: &Graph,
    node: &Node,
    args: &mut Args,
) -> ConversionResult<()> {
    let input = args.tensor_or_freeze(0, ctx, graph)?;
    let (axis_mask, keep_dims) = match args.len() {
        // (self, dtype)
        1 | 2 => (full_axis_mask(ctx, input), false),
        // (self, dim, keepdim, dtype)
        3 | 4 => {
            let dims = args.unwrap_to_int_list(1)?;
            let keep = args.unwrap_to_bool(2)?;
            (axis_mask_from_dims(ctx, input, &dims, node)?, keep)
        }
        n => {
            return Err(ConversionError::conversion(
                node.info(),
                format!("unsupported overload with {n} arguments"),
            ))
        }
    };
    if args.len() % 2 == 0 && !args.is_none(args.len() - 1) {
        warn!(node = %node.info(), "reduction converter disregards the dtype argument");
    }

    debug!(node = %node.info(), ?op, axis_mask, keep_dims, "lowering reduction");
    let output = ctx
        .net
        .add_reduce(input, op, axis_mask, keep_dims)
        .map_err(|e| {
            ConversionError::conversion(node.info(), format!("unable to create reduce layer: {e}"))
        })?;
    let output = ctx.associate_tensor(graph, node.outputs[0], output);
    debug!(shape = ?ctx.tensor_dims(output), "reduction output tensor");
    Ok(())
}

fn mean(
    ctx: &mut ConversionCtx,
    graph: &Graph,
    node: &Node,
    args: &mut Args,
) -> ConversionResult<()> {
    reduce_sum_like(ReduceOp::Avg, ctx, graph, node, args)
}

fn sum(
    ctx: &mut ConversionCtx,
    graph: &Graph,
    node: &Node,
    args: &mut Args,
) -> ConversionResult<()> {
    reduce_sum_like(ReduceOp::Sum, ctx, graph, node, args)
}

/// Whole-tensor max/min; the `.dim` overloads return index tensors as well
/// and are not expressible as a single reduce layer.
fn reduce_extremum(
    op: ReduceOp,
    ctx: &mut ConversionCtx,
    graph: &Graph,
    node: &Node,
    args: &mut Args,
) -> ConversionResult<()> {
    if args.len() != 1 {
        return Err(ConversionError::conversion(
            node.info(),
            format!("only the whole-tensor overload is supported, got {} arguments", args.len()),
        ));
    }
    let input = args.tensor_or_freeze(0, ctx, graph)?;
    let axis_mask = full_axis_mask(ctx, input);
    debug!(node = %node.info(), ?op, axis_mask, "lowering extremum reduction");
    let output = ctx
        .net
        .add_reduce(input, op, axis_mask, false)
        .map_err(|e| {
            ConversionError::conversion(node.info(), format!("unable to create reduce layer: {e}"))
        })?;
    ctx.associate_tensor(graph, node.outputs[0], output);
    Ok(())
}

fn max(
    ctx: &mut ConversionCtx,
    graph: &Graph,
    node: &Node,
    args: &mut Args,
) -> ConversionResult<()> {
    reduce_extremum(ReduceOp::Max, ctx, graph, node, args)
}

fn min(
    ctx: &mut ConversionCtx,
    graph: &Graph,
    node: &Node,
    args: &mut Args,
) -> ConversionResult<()> {
    reduce_extremum(ReduceOp::Min, ctx, graph, node, args)
}

pub(super) fn register(registry: &mut ConverterRegistry) -> ConversionResult<()> {
    registry.register(ConverterRegistration {
        kind: "aten::mean".into(),
        signatures: MEAN_SIGNATURES,
        converter: mean,
    })?;
    registry.register(ConverterRegistration {
        kind: "aten::sum".into(),
        signatures: SUM_SIGNATURES,
        converter: sum,
    })?;
    registry.register(ConverterRegistration {
        kind: "aten::max".into(),
        signatures: MAX_SIGNATURES,
        converter: max,
    })?;
    registry.register(ConverterRegistration {
        kind: "aten::min".into(),
        signatures: MIN_SIGNATURES,
        converter: min,
    })?;
    Ok(())
}
