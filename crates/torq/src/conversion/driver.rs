use std::collections::BTreeMap;

use tracing::{debug, error, info, trace};

use crate::error::{ConversionError, ConversionResult};
use crate::host::{HostValue, TensorLiteral};
use crate::ir::{Graph, Node, OpKind, ValueId};
use crate::network::NetworkBuilder;

use super::{registries, Args, ConversionCtx, ConversionInfo, Registries};

/// Tensor literals bound to graph inputs ahead of conversion, keyed by the
/// input value they satisfy.
pub type NamedParams = BTreeMap<ValueId, TensorLiteral>;

/// Pairs the trailing graph inputs with `tensors`, mirroring the calling
/// convention where data inputs come first and learned parameters last.
pub fn named_params(
    graph: &Graph,
    tensors: impl IntoIterator<Item = TensorLiteral>,
) -> NamedParams {
    let tensors: Vec<TensorLiteral> = tensors.into_iter().collect();
    let skip = graph.inputs.len().saturating_sub(tensors.len());
    graph.inputs.iter().skip(skip).copied().zip(tensors).collect()
}

/// Phases of a conversion run, tracked for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Pending,
    PerNode,
    Verifying,
    Finalized,
    Failed,
}

/// Converts `graph` into a serialized engine using the process-wide
/// registries.
pub fn convert_graph(
    graph: &Graph,
    params: &NamedParams,
    net: Box<dyn NetworkBuilder>,
    info: &ConversionInfo,
) -> ConversionResult<Vec<u8>> {
    convert_graph_with(registries(), graph, params, net, info)
}

/// Same as [`convert_graph`] but with caller-supplied registries.
pub fn convert_graph_with(
    registries: &Registries,
    graph: &Graph,
    params: &NamedParams,
    net: Box<dyn NetworkBuilder>,
    info: &ConversionInfo,
) -> ConversionResult<Vec<u8>> {
    let mut driver = Driver::new();
    match driver.run(registries, graph, params, net, info) {
        Ok(blob) => Ok(blob),
        Err(err) => {
            driver.advance(DriverState::Failed);
            error!("conversion aborted: {err}");
            Err(err)
        }
    }
}

/// Kinds appearing in `graph` that neither registry can handle, deduplicated
/// in first-appearance order.
pub fn check_operator_support(registries: &Registries, graph: &Graph) -> Vec<OpKind> {
    let mut unsupported = Vec::new();
    for node in &graph.nodes {
        let kind = node.kind.as_str();
        if registries.converters.contains(kind) || registries.evaluators.contains_kind(kind) {
            continue;
        }
        if !unsupported.iter().any(|k: &OpKind| k == &node.kind) {
            unsupported.push(node.kind.clone());
        }
    }
    unsupported
}

struct Driver {
    state: DriverState,
}

impl Driver {
    fn new() -> Self {
        Self {
            state: DriverState::Pending,
        }
    }

    fn advance(&mut self, next: DriverState) {
        trace!(from = ?self.state, to = ?next, "driver state transition");
        self.state = next;
    }

    fn run(
        &mut self,
        registries: &Registries,
        graph: &Graph,
        params: &NamedParams,
        net: Box<dyn NetworkBuilder>,
        info: &ConversionInfo,
    ) -> ConversionResult<Vec<u8>> {
        info!(nodes = graph.nodes.len(), "converting graph");
        let mut ctx = ConversionCtx::new(net, info.settings.clone())?;

        // Named parameters enter as evaluated tensor literals and are frozen
        // into constant layers only if a converter demands a network tensor.
        for (value, literal) in params {
            ctx.associate_constant(*value, HostValue::Tensor(literal.clone()));
        }

        let free: Vec<ValueId> = graph
            .inputs
            .iter()
            .copied()
            .filter(|value| !params.contains_key(value))
            .collect();
        if free.len() != info.inputs.len() {
            return Err(ConversionError::config(format!(
                "graph has {} free inputs but {} input shapes were provided",
                free.len(),
                info.inputs.len()
            )));
        }
        for (value, spec) in free.iter().zip(&info.inputs) {
            let name = graph.value(*value).debug_name.clone();
            let tensor = ctx.net.add_input(&name, &spec.shape)?;
            ctx.associate_tensor(graph, *value, tensor);
            debug!(input = %name, shape = ?spec.shape, "bound network input");
        }

        self.advance(DriverState::PerNode);
        for node in &graph.nodes {
            dispatch_node(registries, graph, node, &mut ctx)?;
            ctx.check_all_outputs_bound(graph, node);
        }

        self.advance(DriverState::Verifying);
        for value in &graph.outputs {
            let tensor = ctx.freeze(graph, *value)?;
            let name = graph.value(*value).debug_name.clone();
            ctx.net.mark_output(tensor, &name)?;
            debug!(output = %name, "marked network output");
        }

        let blob = ctx.finalize()?;
        self.advance(DriverState::Finalized);
        info!(bytes = blob.len(), layers = ctx.net.num_layers(), "engine serialized");
        Ok(blob)
    }
}

fn dispatch_node(
    registries: &Registries,
    graph: &Graph,
    node: &Node,
    ctx: &mut ConversionCtx,
) -> ConversionResult<()> {
    if let Some(registration) = registries.evaluators.find(graph, node)? {
        let args = Args::bind(ctx, node)?;
        if let Some(value) = (registration.evaluator)(ctx, graph, node, &args)? {
            debug!(node = %node.info(), result = value.kind_name(), "evaluated node");
            if let Some(output) = node.outputs.first() {
                ctx.associate_constant(*output, value);
            }
            return Ok(());
        }
        // The evaluator declined; fall through to converter dispatch.
    }

    let Some(registration) = registries.converters.get(node.kind.as_str()) else {
        return Err(ConversionError::NoConverter(node.kind.to_string()));
    };
    debug!(node = %node.info(), "converting node");
    let mut args = Args::bind(ctx, node)?;
    (registration.converter)(ctx, graph, node, &mut args)
}
