use crate::error::{ConversionError, ConversionResult};
use crate::host::{HostValue, TensorLiteral};
use crate::ir::{Graph, Node, ValueId};
use crate::network::TensorRef;

use super::ConversionCtx;

/// Resolved form of one node input: either a live network tensor or a
/// compile-time host value.
#[derive(Debug, Clone)]
pub enum Arg {
    Tensor(TensorRef),
    Const(HostValue),
}

/// Node inputs resolved against a [`ConversionCtx`] up front, so converters
/// and evaluators index positionally instead of chasing provenance maps.
#[derive(Debug)]
pub struct Args {
    node: String,
    values: Vec<ValueId>,
    slots: Vec<Arg>,
}

impl Args {
    /// Resolves every input of `node`. Fails if any input has no provenance,
    /// which means the graph was not processed in topological order or an
    /// upstream node was silently skipped.
    pub fn bind(ctx: &ConversionCtx, node: &Node) -> ConversionResult<Self> {
        let mut slots = Vec::with_capacity(node.inputs.len());
        for (index, value) in node.inputs.iter().enumerate() {
            if let Some(tensor) = ctx.tensor(*value) {
                slots.push(Arg::Tensor(tensor));
            } else if let Some(constant) = ctx.constant(*value) {
                slots.push(Arg::Const(constant.clone()));
            } else {
                return Err(ConversionError::Resolution {
                    node: node.info(),
                    index,
                    message: "input has neither a network tensor nor an evaluated constant"
                        .to_owned(),
                });
            }
        }
        Ok(Self {
            node: node.info(),
            values: node.inputs.clone(),
            slots,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, index: usize) -> ConversionResult<&Arg> {
        self.slots.get(index).ok_or_else(|| ConversionError::Resolution {
            node: self.node.clone(),
            index,
            message: format!("argument index out of range, node has {} inputs", self.len()),
        })
    }

    fn mismatch(&self, index: usize, expected: &str, found: &str) -> ConversionError {
        ConversionError::Resolution {
            node: self.node.clone(),
            index,
            message: format!("expected {expected}, found {found}"),
        }
    }

    pub fn is_tensor(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Arg::Tensor(_)))
    }

    pub fn is_boxed_tensor(&self, index: usize) -> bool {
        matches!(
            self.slots.get(index),
            Some(Arg::Const(HostValue::BoxedTensor(_)))
        )
    }

    pub fn is_none(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Arg::Const(HostValue::None)))
    }

    /// A live network tensor; fails on host values of any kind.
    pub fn tensor(&self, index: usize) -> ConversionResult<TensorRef> {
        match self.slot(index)? {
            Arg::Tensor(tensor) => Ok(*tensor),
            Arg::Const(HostValue::BoxedTensor(tensor)) => Ok(*tensor),
            Arg::Const(other) => {
                Err(self.mismatch(index, "a network tensor", other.kind_name()))
            }
        }
    }

    /// A network tensor, materializing a tensor literal as a constant layer
    /// on demand. The slot is rewritten in place so repeated access is cheap.
    pub fn tensor_or_freeze(
        &mut self,
        index: usize,
        ctx: &mut ConversionCtx,
        graph: &Graph,
    ) -> ConversionResult<TensorRef> {
        match self.slot(index)? {
            Arg::Tensor(tensor) => Ok(*tensor),
            Arg::Const(HostValue::BoxedTensor(tensor)) => Ok(*tensor),
            Arg::Const(HostValue::Tensor(_)) => {
                let value = self.values[index];
                let tensor = ctx.freeze(graph, value)?;
                self.slots[index] = Arg::Tensor(tensor);
                Ok(tensor)
            }
            Arg::Const(other) => {
                Err(self.mismatch(index, "a tensor or tensor literal", other.kind_name()))
            }
        }
    }

    /// The evaluated host value; fails on live network tensors.
    pub fn host(&self, index: usize) -> ConversionResult<&HostValue> {
        match self.slot(index)? {
            Arg::Const(value) => Ok(value),
            Arg::Tensor(_) => {
                Err(self.mismatch(index, "an evaluated constant", "a network tensor"))
            }
        }
    }

    pub fn unwrap_to_int(&self, index: usize) -> ConversionResult<i64> {
        let value = self.host(index)?;
        value
            .as_int()
            .ok_or_else(|| self.mismatch(index, "int", value.kind_name()))
    }

    pub fn unwrap_to_double(&self, index: usize) -> ConversionResult<f64> {
        let value = self.host(index)?;
        value
            .as_double()
            .ok_or_else(|| self.mismatch(index, "float", value.kind_name()))
    }

    pub fn unwrap_to_bool(&self, index: usize) -> ConversionResult<bool> {
        let value = self.host(index)?;
        value
            .as_bool()
            .ok_or_else(|| self.mismatch(index, "bool", value.kind_name()))
    }

    pub fn unwrap_to_int_list(&self, index: usize) -> ConversionResult<Vec<i64>> {
        let value = self.host(index)?;
        value
            .as_int_list()
            .map(<[i64]>::to_vec)
            .ok_or_else(|| self.mismatch(index, "int[]", value.kind_name()))
    }

    pub fn unwrap_to_tensor(&self, index: usize) -> ConversionResult<TensorLiteral> {
        let value = self.host(index)?;
        value
            .as_tensor()
            .cloned()
            .ok_or_else(|| self.mismatch(index, "a tensor literal", value.kind_name()))
    }
}
