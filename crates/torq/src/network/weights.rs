use serde::{Deserialize, Serialize};

use crate::host::TensorLiteral;
use crate::network::Dims;

/// Host tensor marshalled into the builder's native weight layout.
///
/// For kernel tensors the leading two axes are the output and input feature
/// map counts and the remainder is the spatial kernel shape. The buffer is
/// owned here and moves into the builder with the layer that consumes it, so
/// it outlives engine construction without a separate arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub shape: Dims,
    pub num_output_maps: usize,
    pub num_input_maps: usize,
    pub kernel_shape: Dims,
    pub data: Vec<f32>,
}

impl Weights {
    pub fn new(literal: TensorLiteral) -> Self {
        let shape: Dims = literal.shape.iter().copied().collect();
        let num_output_maps = shape.first().copied().unwrap_or(1);
        let num_input_maps = shape.get(1).copied().unwrap_or(1);
        let kernel_shape: Dims = shape.iter().skip(2).copied().collect();
        Self {
            shape,
            num_output_maps,
            num_input_maps,
            kernel_shape,
            data: literal.data,
        }
    }

    /// Zero-filled weights, used to substitute absent biases.
    pub fn zeros(shape: &[usize]) -> Self {
        Self::new(TensorLiteral::zeros(shape.to_vec()))
    }

    pub fn count(&self) -> usize {
        self.data.len()
    }
}

impl From<TensorLiteral> for Weights {
    fn from(literal: TensorLiteral) -> Self {
        Weights::new(literal)
    }
}
