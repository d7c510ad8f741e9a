//! Naive CPU kernels, rank-generic over the spatial axes. Correctness
//! oracles only; nothing here is vectorized or tiled.

use torq::host::TensorLiteral;
use torq::network::{ConvolutionSpec, ReduceOp, Weights};

fn strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    strides
}

fn offset(index: &[usize], strides: &[usize]) -> usize {
    index.iter().zip(strides).map(|(i, s)| i * s).sum()
}

/// Advances a multi-index through `shape` row-major; returns false on wrap.
fn step(index: &mut [usize], shape: &[usize]) -> bool {
    for axis in (0..shape.len()).rev() {
        index[axis] += 1;
        if index[axis] < shape[axis] {
            return true;
        }
        index[axis] = 0;
    }
    false
}

pub fn convolution(
    input: &TensorLiteral,
    spec: &ConvolutionSpec,
    kernel: &Weights,
    bias: Option<&Weights>,
) -> Result<TensorLiteral, String> {
    let in_shape = &input.shape;
    if in_shape.len() < 3 {
        return Err(format!("convolution input has shape {in_shape:?}"));
    }
    let spatial = in_shape.len() - 2;
    let batch = in_shape[0];
    let group_in = kernel.num_input_maps;
    let out_maps = kernel.num_output_maps;
    let group_out = out_maps / spec.groups;

    let mut out_shape = vec![batch, out_maps];
    for axis in 0..spatial {
        let extent = in_shape[2 + axis] + 2 * spec.padding[axis];
        let window = spec.dilation[axis] * (kernel.kernel_shape[axis] - 1) + 1;
        out_shape.push((extent - window) / spec.stride[axis] + 1);
    }

    let in_strides = strides(in_shape);
    let out_strides = strides(&out_shape);
    let kernel_full: Vec<usize> = kernel.shape.iter().copied().collect();
    let kernel_strides = strides(&kernel_full);

    let mut tap_shape = vec![group_in];
    tap_shape.extend_from_slice(&kernel.kernel_shape);

    let mut out = TensorLiteral::zeros(out_shape.clone());
    let mut out_index = vec![0usize; out_shape.len()];
    loop {
        let (n, oc) = (out_index[0], out_index[1]);
        let group = oc / group_out;
        let mut acc = bias.map(|b| b.data[oc]).unwrap_or(0.0);

        let mut tap = vec![0usize; 1 + spatial];
        loop {
            let ic = tap[0];
            let mut in_offset = n * in_strides[0] + (group * group_in + ic) * in_strides[1];
            let mut in_bounds = true;
            for axis in 0..spatial {
                let pos = (out_index[2 + axis] * spec.stride[axis]
                    + tap[1 + axis] * spec.dilation[axis]) as i64
                    - spec.padding[axis] as i64;
                if pos < 0 || pos as usize >= in_shape[2 + axis] {
                    in_bounds = false;
                    break;
                }
                in_offset += pos as usize * in_strides[2 + axis];
            }
            if in_bounds {
                let mut k_offset = oc * kernel_strides[0] + ic * kernel_strides[1];
                for axis in 0..spatial {
                    k_offset += tap[1 + axis] * kernel_strides[2 + axis];
                }
                acc += input.data[in_offset] * kernel.data[k_offset];
            }

            if !step(&mut tap, &tap_shape) {
                break;
            }
        }

        out.data[offset(&out_index, &out_strides)] = acc;
        if !step(&mut out_index, &out_shape) {
            break;
        }
    }
    Ok(out)
}

pub fn deconvolution(
    input: &TensorLiteral,
    spec: &ConvolutionSpec,
    kernel: &Weights,
    bias: Option<&Weights>,
) -> Result<TensorLiteral, String> {
    let in_shape = &input.shape;
    if in_shape.len() < 3 {
        return Err(format!("deconvolution input has shape {in_shape:?}"));
    }
    let spatial = in_shape.len() - 2;
    let batch = in_shape[0];
    let in_maps = kernel.num_output_maps;
    let group_out = kernel.num_input_maps;
    let out_channels = group_out * spec.groups;
    let group_in = in_maps / spec.groups;

    let mut out_shape = vec![batch, out_channels];
    for axis in 0..spatial {
        let extent = (in_shape[2 + axis] - 1) * spec.stride[axis]
            + spec.dilation[axis] * (kernel.kernel_shape[axis] - 1)
            + spec.output_padding[axis]
            + 1
            - 2 * spec.padding[axis];
        out_shape.push(extent);
    }

    let in_strides = strides(in_shape);
    let out_strides = strides(&out_shape);
    let kernel_full: Vec<usize> = kernel.shape.iter().copied().collect();
    let kernel_strides = strides(&kernel_full);

    let mut out = TensorLiteral::zeros(out_shape.clone());
    if let Some(bias) = bias {
        let mut out_index = vec![0usize; out_shape.len()];
        loop {
            out.data[offset(&out_index, &out_strides)] = bias.data[out_index[1]];
            if !step(&mut out_index, &out_shape) {
                break;
            }
        }
    }

    let mut tap_shape = vec![group_out];
    tap_shape.extend_from_slice(&kernel.kernel_shape);

    // Scatter every input element through the kernel.
    let mut in_index = vec![0usize; in_shape.len()];
    loop {
        let (n, ic) = (in_index[0], in_index[1]);
        let group = ic / group_in;
        let value = input.data[offset(&in_index, &in_strides)];

        let mut tap = vec![0usize; 1 + spatial];
        loop {
            let oc_local = tap[0];
            let oc = group * group_out + oc_local;
            let mut out_offset = n * out_strides[0] + oc * out_strides[1];
            let mut in_bounds = true;
            for axis in 0..spatial {
                let pos = (in_index[2 + axis] * spec.stride[axis]
                    + tap[1 + axis] * spec.dilation[axis]) as i64
                    - spec.padding[axis] as i64;
                if pos < 0 || pos as usize >= out_shape[2 + axis] {
                    in_bounds = false;
                    break;
                }
                out_offset += pos as usize * out_strides[2 + axis];
            }
            if in_bounds {
                let mut k_offset = ic * kernel_strides[0] + oc_local * kernel_strides[1];
                for axis in 0..spatial {
                    k_offset += tap[1 + axis] * kernel_strides[2 + axis];
                }
                out.data[out_offset] += value * kernel.data[k_offset];
            }

            if !step(&mut tap, &tap_shape) {
                break;
            }
        }

        if !step(&mut in_index, in_shape) {
            break;
        }
    }
    Ok(out)
}

pub fn reduce(
    input: &TensorLiteral,
    op: ReduceOp,
    axis_mask: u32,
    keep_dims: bool,
) -> Result<TensorLiteral, String> {
    let rank = input.shape.len();
    if axis_mask >> rank != 0 {
        return Err(format!(
            "axis mask {axis_mask:#b} addresses axes beyond rank {rank}"
        ));
    }

    let mut out_shape = Vec::with_capacity(rank);
    for (axis, &extent) in input.shape.iter().enumerate() {
        if axis_mask & (1 << axis) == 0 {
            out_shape.push(extent);
        } else if keep_dims {
            out_shape.push(1);
        }
    }
    let out_strides = strides(&out_shape);

    let init = match op {
        ReduceOp::Sum | ReduceOp::Avg => 0.0,
        ReduceOp::Prod => 1.0,
        ReduceOp::Max => f32::NEG_INFINITY,
        ReduceOp::Min => f32::INFINITY,
    };
    let numel: usize = out_shape.iter().product();
    let mut out = TensorLiteral::new(out_shape.clone(), vec![init; numel]);

    let reduced_count: usize = input
        .shape
        .iter()
        .enumerate()
        .filter(|(axis, _)| axis_mask & (1 << axis) != 0)
        .map(|(_, &extent)| extent)
        .product();

    let mut in_index = vec![0usize; rank];
    let in_strides = strides(&input.shape);
    loop {
        let mut out_index = Vec::with_capacity(out_shape.len());
        for (axis, &i) in in_index.iter().enumerate() {
            if axis_mask & (1 << axis) == 0 {
                out_index.push(i);
            } else if keep_dims {
                out_index.push(0);
            }
        }
        let slot = &mut out.data[offset(&out_index, &out_strides)];
        let value = input.data[offset(&in_index, &in_strides)];
        *slot = match op {
            ReduceOp::Sum | ReduceOp::Avg => *slot + value,
            ReduceOp::Prod => *slot * value,
            ReduceOp::Max => slot.max(value),
            ReduceOp::Min => slot.min(value),
        };
        if !step(&mut in_index, &input.shape) {
            break;
        }
    }

    if matches!(op, ReduceOp::Avg) && reduced_count > 0 {
        let scale = 1.0 / reduced_count as f32;
        for value in &mut out.data {
            *value *= scale;
        }
    }
    Ok(out)
}
