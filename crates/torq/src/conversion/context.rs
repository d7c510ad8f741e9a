use std::collections::HashMap;
use std::fmt;

use tracing::{debug, info, warn};

use crate::error::{ConversionError, ConversionResult};
use crate::host::HostValue;
use crate::ir::{Graph, Node, ValueId};
use crate::network::{NetworkBuilder, TensorRef, Weights};
use crate::settings::{BuilderSettings, OpPrecision};

/// Shared state for one conversion run: the network under construction plus
/// the two provenance maps every value in the graph resolves through. A value
/// is either materialized in the network (`value_tensor_map`) or folded to a
/// host constant (`evaluated_value_map`); some start as constants and migrate
/// to tensors when a converter freezes them.
pub struct ConversionCtx {
    pub net: Box<dyn NetworkBuilder>,
    pub settings: BuilderSettings,
    /// Precision inputs are fed at. INT8 engines still take FP32 inputs and
    /// quantize internally, so this only diverges from `op_precision` there.
    pub input_precision: OpPrecision,
    value_tensor_map: HashMap<ValueId, TensorRef>,
    evaluated_value_map: HashMap<ValueId, HostValue>,
}

impl ConversionCtx {
    /// Validates the settings against the builder's platform capabilities
    /// before any graph work starts.
    pub fn new(
        net: Box<dyn NetworkBuilder>,
        settings: BuilderSettings,
    ) -> ConversionResult<Self> {
        debug!("{settings}");
        let input_precision = match settings.op_precision {
            OpPrecision::Float => OpPrecision::Float,
            OpPrecision::Half => {
                if !net.platform_has_fast_f16() {
                    return Err(ConversionError::config(
                        "requested inference in FP16 but the platform has no fast FP16 support",
                    ));
                }
                OpPrecision::Half
            }
            OpPrecision::Int8 => {
                if !net.platform_has_fast_i8() {
                    return Err(ConversionError::config(
                        "requested inference in INT8 but the platform has no fast INT8 support",
                    ));
                }
                if settings.calibrator.is_none() {
                    return Err(ConversionError::config(
                        "requested inference in INT8 but no calibrator was provided",
                    ));
                }
                if !settings.strict_types {
                    info!("INT8 kernel selection also considers FP16 kernels (set strict_types to disable)");
                }
                OpPrecision::Float
            }
        };
        Ok(Self {
            net,
            settings,
            input_precision,
            value_tensor_map: HashMap::new(),
            evaluated_value_map: HashMap::new(),
        })
    }

    /// Records that `value` is realized by `tensor` and names the tensor
    /// after the value for debuggability of the built network.
    pub fn associate_tensor(
        &mut self,
        graph: &Graph,
        value: ValueId,
        tensor: TensorRef,
    ) -> TensorRef {
        self.net.set_tensor_name(tensor, &graph.value(value).debug_name);
        self.value_tensor_map.insert(value, tensor);
        tensor
    }

    /// Records the compile-time value of `value`, replacing any earlier one.
    pub fn associate_constant(&mut self, value: ValueId, constant: HostValue) -> &HostValue {
        self.evaluated_value_map.insert(value, constant);
        &self.evaluated_value_map[&value]
    }

    pub fn tensor(&self, value: ValueId) -> Option<TensorRef> {
        self.value_tensor_map.get(&value).copied()
    }

    pub fn constant(&self, value: ValueId) -> Option<&HostValue> {
        self.evaluated_value_map.get(&value)
    }

    pub fn tensor_dims(&self, tensor: TensorRef) -> &[usize] {
        self.net.tensor_dims(tensor)
    }

    /// Resolves `value` to a network tensor, materializing an evaluated
    /// tensor literal as a constant layer on first demand.
    pub fn freeze(&mut self, graph: &Graph, value: ValueId) -> ConversionResult<TensorRef> {
        if let Some(tensor) = self.tensor(value) {
            return Ok(tensor);
        }
        let name = &graph.value(value).debug_name;
        match self.evaluated_value_map.get(&value) {
            Some(HostValue::Tensor(literal)) => {
                let weights = Weights::new(literal.clone());
                debug!(value = %name, shape = ?weights.shape, "freezing tensor literal into the network");
                let tensor = self.net.add_constant(weights)?;
                Ok(self.associate_tensor(graph, value, tensor))
            }
            Some(HostValue::BoxedTensor(tensor)) => Ok(*tensor),
            Some(other) => Err(ConversionError::Graph(format!(
                "value {name} evaluated to {} and cannot become a network tensor",
                other.kind_name()
            ))),
            None => Err(ConversionError::Graph(format!(
                "value {name} has neither a network tensor nor an evaluated constant"
            ))),
        }
    }

    /// True when every output of `node` has provenance. A missing output is
    /// reported but tolerated; converters may legitimately leave auxiliary
    /// outputs unbound when nothing downstream consumes them.
    pub fn check_all_outputs_bound(&self, graph: &Graph, node: &Node) -> bool {
        for output in &node.outputs {
            if self.tensor(*output).is_none() && self.constant(*output).is_none() {
                warn!(
                    node = %node.info(),
                    output = %graph.value(*output).debug_name,
                    "node output has no corresponding tensor or value, which may indicate a defective evaluator or converter"
                );
                return false;
            }
        }
        true
    }

    /// Serializes the finished network under the run's settings.
    pub fn finalize(&mut self) -> ConversionResult<Vec<u8>> {
        let blob = self.net.build(&self.settings)?;
        Ok(blob)
    }
}

impl fmt::Debug for ConversionCtx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionCtx")
            .field("net", &self.net.builder_name())
            .field("settings", &self.settings)
            .field("tensors", &self.value_tensor_map.len())
            .field("constants", &self.evaluated_value_map.len())
            .finish()
    }
}
