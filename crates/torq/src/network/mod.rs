//! Accelerator network builder contract.
//!
//! The builder's internal engine-build algorithm is an external collaborator;
//! torq only depends on this layer-emission surface. Converters call the
//! methods on [`NetworkBuilder`] through the conversion context, and
//! [`NetworkBuilder::build`] turns the accumulated network plus the builder
//! settings into an opaque serialized engine blob.

mod weights;

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

use crate::settings::BuilderSettings;

pub use weights::Weights;

/// Dimension vector; four axes cover the common NCHW case without spilling.
pub type Dims = SmallVec<[usize; 4]>;

/// Handle for a tensor owned by the network builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TensorRef(pub u32);

/// Reduction layer operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReduceOp {
    Sum,
    Prod,
    Max,
    Min,
    Avg,
}

/// Geometry shared by convolution and deconvolution layers. Channel counts
/// come from the kernel [`Weights`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvolutionSpec {
    pub stride: Dims,
    pub padding: Dims,
    pub dilation: Dims,
    pub output_padding: Dims,
    pub groups: usize,
}

/// Raised when the builder rejects a layer or the finalized network.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct BuildError {
    message: String,
}

impl BuildError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type BuildResult<T> = Result<T, BuildError>;

/// Layer-emission interface of the target accelerator builder.
///
/// Implementations own every tensor and weight buffer handed to them until
/// [`NetworkBuilder::build`] consumes the network. All tensors have static
/// shapes known at emission time.
pub trait NetworkBuilder: Send {
    fn builder_name(&self) -> &str;

    /// Declares a network input tensor.
    fn add_input(&mut self, name: &str, shape: &[usize]) -> BuildResult<TensorRef>;

    /// Emits a constant-weight layer.
    fn add_constant(&mut self, weights: Weights) -> BuildResult<TensorRef>;

    /// Emits a strided/dilated/grouped convolution layer. The kernel is laid
    /// out `[out_maps, in_maps / groups, spatial...]`; bias length equals the
    /// number of output maps.
    fn add_convolution(
        &mut self,
        input: TensorRef,
        spec: &ConvolutionSpec,
        kernel: Weights,
        bias: Option<Weights>,
    ) -> BuildResult<TensorRef>;

    /// Emits a deconvolution (transposed convolution) layer.
    fn add_deconvolution(
        &mut self,
        input: TensorRef,
        spec: &ConvolutionSpec,
        kernel: Weights,
        bias: Option<Weights>,
    ) -> BuildResult<TensorRef>;

    /// Emits a reduction layer over the axes set in `axis_mask`.
    fn add_reduce(
        &mut self,
        input: TensorRef,
        op: ReduceOp,
        axis_mask: u32,
        keep_dims: bool,
    ) -> BuildResult<TensorRef>;

    /// Assigns a debug name to a builder tensor.
    fn set_tensor_name(&mut self, tensor: TensorRef, name: &str);

    /// Static shape of a builder tensor.
    fn tensor_dims(&self, tensor: TensorRef) -> &[usize];

    /// Marks a tensor as a network output.
    fn mark_output(&mut self, tensor: TensorRef, name: &str) -> BuildResult<()>;

    /// Number of layers emitted so far (inputs excluded).
    fn num_layers(&self) -> usize;

    fn platform_has_fast_f16(&self) -> bool;

    fn platform_has_fast_i8(&self) -> bool;

    /// Builds and serializes the engine from the accumulated network.
    fn build(&mut self, settings: &BuilderSettings) -> BuildResult<Vec<u8>>;
}

impl fmt::Debug for dyn NetworkBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NetworkBuilder({})", self.builder_name())
    }
}

/// Converts a trace-time integer list into builder dimensions.
pub fn to_dims(values: &[i64]) -> Dims {
    values.iter().map(|v| *v as usize).collect()
}
