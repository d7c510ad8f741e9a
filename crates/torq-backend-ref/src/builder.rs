use tracing::{debug, info};

use torq::network::{
    BuildError, BuildResult, ConvolutionSpec, NetworkBuilder, ReduceOp, TensorRef, Weights,
};
use torq::settings::BuilderSettings;

use crate::engine::{EngineSpec, Layer, TensorMeta};

/// CPU-oracle implementation of the builder contract. Layers are recorded
/// with fully inferred static shapes and [`NetworkBuilder::build`] emits a
/// `bincode`-serialized [`EngineSpec`].
pub struct RefNetworkBuilder {
    tensors: Vec<TensorMeta>,
    layers: Vec<Layer>,
    inputs: Vec<TensorRef>,
    outputs: Vec<(TensorRef, String)>,
    fast_f16: bool,
    fast_i8: bool,
}

impl Default for RefNetworkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RefNetworkBuilder {
    pub fn new() -> Self {
        Self {
            tensors: Vec::new(),
            layers: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            fast_f16: true,
            fast_i8: true,
        }
    }

    /// Overrides the reported platform capabilities, for exercising the
    /// precision validation paths.
    pub fn with_platform(mut self, fast_f16: bool, fast_i8: bool) -> Self {
        self.fast_f16 = fast_f16;
        self.fast_i8 = fast_i8;
        self
    }

    fn alloc(&mut self, shape: Vec<usize>) -> TensorRef {
        let tensor = TensorRef(self.tensors.len() as u32);
        self.tensors.push(TensorMeta {
            name: format!("t{}", tensor.0),
            shape,
        });
        tensor
    }

    fn shape(&self, tensor: TensorRef) -> BuildResult<&[usize]> {
        self.tensors
            .get(tensor.0 as usize)
            .map(|meta| meta.shape.as_slice())
            .ok_or_else(|| BuildError::new(format!("unknown tensor handle {}", tensor.0)))
    }

    fn check_spatial(spec: &ConvolutionSpec, spatial: usize) -> BuildResult<()> {
        for (field, dims) in [
            ("stride", &spec.stride),
            ("padding", &spec.padding),
            ("dilation", &spec.dilation),
            ("output_padding", &spec.output_padding),
        ] {
            if dims.len() != spatial {
                return Err(BuildError::new(format!(
                    "{field} has {} entries but the input has {spatial} spatial axes",
                    dims.len()
                )));
            }
        }
        if spec.groups == 0 {
            return Err(BuildError::new("groups must be positive"));
        }
        Ok(())
    }
}

impl NetworkBuilder for RefNetworkBuilder {
    fn builder_name(&self) -> &str {
        "ref-cpu"
    }

    fn add_input(&mut self, name: &str, shape: &[usize]) -> BuildResult<TensorRef> {
        let tensor = self.alloc(shape.to_vec());
        self.tensors[tensor.0 as usize].name = name.to_owned();
        self.inputs.push(tensor);
        debug!(input = name, ?shape, "declared input");
        Ok(tensor)
    }

    fn add_constant(&mut self, weights: Weights) -> BuildResult<TensorRef> {
        let output = self.alloc(weights.shape.to_vec());
        self.layers.push(Layer::Constant { output, weights });
        Ok(output)
    }

    fn add_convolution(
        &mut self,
        input: TensorRef,
        spec: &ConvolutionSpec,
        kernel: Weights,
        bias: Option<Weights>,
    ) -> BuildResult<TensorRef> {
        let in_shape = self.shape(input)?.to_vec();
        if in_shape.len() < 3 {
            return Err(BuildError::new(format!(
                "convolution input must be batched with at least one spatial axis, got shape {in_shape:?}"
            )));
        }
        let spatial = in_shape.len() - 2;
        Self::check_spatial(spec, spatial)?;
        if kernel.kernel_shape.len() != spatial {
            return Err(BuildError::new(format!(
                "kernel has {} spatial axes but the input has {spatial}",
                kernel.kernel_shape.len()
            )));
        }
        if in_shape[1] != kernel.num_input_maps * spec.groups {
            return Err(BuildError::new(format!(
                "input has {} channels but the kernel expects {} per group over {} groups",
                in_shape[1], kernel.num_input_maps, spec.groups
            )));
        }
        if kernel.num_output_maps == 0 || kernel.num_output_maps % spec.groups != 0 {
            return Err(BuildError::new(format!(
                "kernel has {} output maps which cannot be split evenly over {} groups",
                kernel.num_output_maps, spec.groups
            )));
        }
        let bias = match bias {
            Some(bias) => {
                if bias.count() != kernel.num_output_maps {
                    return Err(BuildError::new(format!(
                        "bias has {} values but the kernel has {} output maps",
                        bias.count(),
                        kernel.num_output_maps
                    )));
                }
                bias
            }
            None => Weights::zeros(&[kernel.num_output_maps]),
        };

        let mut out_shape = vec![in_shape[0], kernel.num_output_maps];
        for axis in 0..spatial {
            let extent = in_shape[2 + axis] + 2 * spec.padding[axis];
            let window = spec.dilation[axis] * (kernel.kernel_shape[axis] - 1) + 1;
            if window > extent {
                return Err(BuildError::new(format!(
                    "kernel window exceeds padded input extent on axis {axis}"
                )));
            }
            out_shape.push((extent - window) / spec.stride[axis] + 1);
        }

        let output = self.alloc(out_shape);
        self.layers.push(Layer::Convolution {
            input,
            output,
            spec: spec.clone(),
            kernel,
            bias,
        });
        Ok(output)
    }

    fn add_deconvolution(
        &mut self,
        input: TensorRef,
        spec: &ConvolutionSpec,
        kernel: Weights,
        bias: Option<Weights>,
    ) -> BuildResult<TensorRef> {
        let in_shape = self.shape(input)?.to_vec();
        if in_shape.len() < 3 {
            return Err(BuildError::new(format!(
                "deconvolution input must be batched with at least one spatial axis, got shape {in_shape:?}"
            )));
        }
        let spatial = in_shape.len() - 2;
        Self::check_spatial(spec, spatial)?;
        // Transposed kernels are laid out [in_maps, out_maps / groups, spatial...].
        if in_shape[1] != kernel.num_output_maps {
            return Err(BuildError::new(format!(
                "input has {} channels but the transposed kernel leads with {}",
                in_shape[1], kernel.num_output_maps
            )));
        }
        if kernel.num_output_maps == 0 || kernel.num_output_maps % spec.groups != 0 {
            return Err(BuildError::new(format!(
                "{} input channels cannot be split evenly over {} groups",
                kernel.num_output_maps, spec.groups
            )));
        }
        let out_channels = kernel.num_input_maps * spec.groups;
        if let Some(bias) = &bias {
            if bias.count() != out_channels {
                return Err(BuildError::new(format!(
                    "bias has {} values but the layer produces {out_channels} channels",
                    bias.count()
                )));
            }
        }

        let mut out_shape = vec![in_shape[0], out_channels];
        for axis in 0..spatial {
            let extent = (in_shape[2 + axis] - 1) * spec.stride[axis]
                + spec.dilation[axis] * (kernel.kernel_shape[axis] - 1)
                + spec.output_padding[axis]
                + 1;
            let trimmed = extent.checked_sub(2 * spec.padding[axis]).ok_or_else(|| {
                BuildError::new(format!("padding swallows the whole output on axis {axis}"))
            })?;
            out_shape.push(trimmed);
        }

        let output = self.alloc(out_shape);
        self.layers.push(Layer::Deconvolution {
            input,
            output,
            spec: spec.clone(),
            kernel,
            bias,
        });
        Ok(output)
    }

    fn add_reduce(
        &mut self,
        input: TensorRef,
        op: ReduceOp,
        axis_mask: u32,
        keep_dims: bool,
    ) -> BuildResult<TensorRef> {
        let in_shape = self.shape(input)?.to_vec();
        if axis_mask == 0 {
            return Err(BuildError::new("reduce layer requires a non-empty axis mask"));
        }
        if axis_mask >> in_shape.len() != 0 {
            return Err(BuildError::new(format!(
                "axis mask {axis_mask:#b} addresses axes beyond rank {}",
                in_shape.len()
            )));
        }
        let mut out_shape = Vec::with_capacity(in_shape.len());
        for (axis, &extent) in in_shape.iter().enumerate() {
            if axis_mask & (1 << axis) == 0 {
                out_shape.push(extent);
            } else if keep_dims {
                out_shape.push(1);
            }
        }

        let output = self.alloc(out_shape);
        self.layers.push(Layer::Reduce {
            input,
            output,
            op,
            axis_mask,
            keep_dims,
        });
        Ok(output)
    }

    fn set_tensor_name(&mut self, tensor: TensorRef, name: &str) {
        if let Some(meta) = self.tensors.get_mut(tensor.0 as usize) {
            meta.name = name.to_owned();
        }
    }

    fn tensor_dims(&self, tensor: TensorRef) -> &[usize] {
        &self.tensors[tensor.0 as usize].shape
    }

    fn mark_output(&mut self, tensor: TensorRef, name: &str) -> BuildResult<()> {
        self.shape(tensor)?;
        self.outputs.push((tensor, name.to_owned()));
        Ok(())
    }

    fn num_layers(&self) -> usize {
        self.layers.len()
    }

    fn platform_has_fast_f16(&self) -> bool {
        self.fast_f16
    }

    fn platform_has_fast_i8(&self) -> bool {
        self.fast_i8
    }

    fn build(&mut self, settings: &BuilderSettings) -> BuildResult<Vec<u8>> {
        if self.outputs.is_empty() {
            return Err(BuildError::new("network has no marked outputs"));
        }
        info!(
            layers = self.layers.len(),
            precision = %settings.op_precision,
            "building reference engine"
        );
        let spec = EngineSpec {
            tensors: self.tensors.clone(),
            layers: self.layers.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
        };
        bincode::serialize(&spec)
            .map_err(|e| BuildError::new(format!("engine serialization failed: {e}")))
    }
}
