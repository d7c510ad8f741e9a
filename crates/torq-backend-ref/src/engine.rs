use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use torq::host::TensorLiteral;
use torq::network::{ConvolutionSpec, ReduceOp, TensorRef, Weights};

use crate::kernels;

/// Serialized form of a built reference network. The blob produced by
/// [`crate::RefNetworkBuilder::build`] is a `bincode` encoding of this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSpec {
    pub tensors: Vec<TensorMeta>,
    pub layers: Vec<Layer>,
    pub inputs: Vec<TensorRef>,
    pub outputs: Vec<(TensorRef, String)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorMeta {
    pub name: String,
    pub shape: Vec<usize>,
}

/// One executable layer. Inputs are not layers; they are seeded directly
/// into the tensor map at run time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Layer {
    Constant {
        output: TensorRef,
        weights: Weights,
    },
    Convolution {
        input: TensorRef,
        output: TensorRef,
        spec: ConvolutionSpec,
        kernel: Weights,
        bias: Weights,
    },
    Deconvolution {
        input: TensorRef,
        output: TensorRef,
        spec: ConvolutionSpec,
        kernel: Weights,
        bias: Option<Weights>,
    },
    Reduce {
        input: TensorRef,
        output: TensorRef,
        op: ReduceOp,
        axis_mask: u32,
        keep_dims: bool,
    },
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("engine blob is not a valid reference engine: {0}")]
    Deserialize(String),

    #[error("execution error: {0}")]
    Execution(String),
}

/// Deserialized reference engine, executable on the CPU.
pub struct Engine {
    spec: EngineSpec,
}

impl Engine {
    pub fn deserialize(blob: &[u8]) -> Result<Self, RunError> {
        let spec: EngineSpec =
            bincode::deserialize(blob).map_err(|e| RunError::Deserialize(e.to_string()))?;
        Ok(Self { spec })
    }

    pub fn layers(&self) -> &[Layer] {
        &self.spec.layers
    }

    pub fn num_inputs(&self) -> usize {
        self.spec.inputs.len()
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.spec.outputs.iter().map(|(_, name)| name.as_str())
    }

    pub fn tensor_shape(&self, tensor: TensorRef) -> &[usize] {
        &self.spec.tensors[tensor.0 as usize].shape
    }

    /// Runs the engine, returning one tensor per marked output in marking
    /// order. Input tensors must match the declared shapes exactly.
    pub fn run(&self, inputs: &[TensorLiteral]) -> Result<Vec<TensorLiteral>, RunError> {
        if inputs.len() != self.spec.inputs.len() {
            return Err(RunError::Execution(format!(
                "engine expects {} inputs, got {}",
                self.spec.inputs.len(),
                inputs.len()
            )));
        }
        let mut tensors: HashMap<TensorRef, TensorLiteral> = HashMap::new();
        for (tensor, literal) in self.spec.inputs.iter().zip(inputs) {
            let declared = self.tensor_shape(*tensor);
            if declared != literal.shape.as_slice() {
                return Err(RunError::Execution(format!(
                    "input {} expects shape {:?}, got {:?}",
                    self.spec.tensors[tensor.0 as usize].name, declared, literal.shape
                )));
            }
            tensors.insert(*tensor, literal.clone());
        }

        for layer in &self.spec.layers {
            self.execute(layer, &mut tensors)?;
        }

        let mut outputs = Vec::with_capacity(self.spec.outputs.len());
        for (tensor, name) in &self.spec.outputs {
            let literal = tensors.get(tensor).ok_or_else(|| {
                RunError::Execution(format!("output {name} was never produced"))
            })?;
            outputs.push(literal.clone());
        }
        Ok(outputs)
    }

    fn execute(
        &self,
        layer: &Layer,
        tensors: &mut HashMap<TensorRef, TensorLiteral>,
    ) -> Result<(), RunError> {
        let fetch = |tensors: &HashMap<TensorRef, TensorLiteral>, tensor: TensorRef| {
            tensors.get(&tensor).cloned().ok_or_else(|| {
                RunError::Execution(format!(
                    "layer input {} was never produced",
                    self.spec.tensors[tensor.0 as usize].name
                ))
            })
        };
        match layer {
            Layer::Constant { output, weights } => {
                let literal = TensorLiteral::new(
                    weights.shape.iter().copied().collect(),
                    weights.data.clone(),
                );
                tensors.insert(*output, literal);
            }
            Layer::Convolution {
                input,
                output,
                spec,
                kernel,
                bias,
            } => {
                let source = fetch(tensors, *input)?;
                let result = kernels::convolution(&source, spec, kernel, Some(bias))
                    .map_err(RunError::Execution)?;
                debug!(shape = ?result.shape, "convolution executed");
                tensors.insert(*output, result);
            }
            Layer::Deconvolution {
                input,
                output,
                spec,
                kernel,
                bias,
            } => {
                let source = fetch(tensors, *input)?;
                let result = kernels::deconvolution(&source, spec, kernel, bias.as_ref())
                    .map_err(RunError::Execution)?;
                debug!(shape = ?result.shape, "deconvolution executed");
                tensors.insert(*output, result);
            }
            Layer::Reduce {
                input,
                output,
                op,
                axis_mask,
                keep_dims,
            } => {
                let source = fetch(tensors, *input)?;
                let result = kernels::reduce(&source, *op, *axis_mask, *keep_dims)
                    .map_err(RunError::Execution)?;
                tensors.insert(*output, result);
            }
        }
        Ok(())
    }
}
