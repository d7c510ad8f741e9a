use std::collections::BTreeMap;

use crate::host::HostValue;
use crate::ir::{Graph, NodeId, OpKind, TypeTag, ValueId};

/// Incremental graph constructor used by tracers and tests.
pub struct GraphBuilder {
    graph: Graph,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            graph: Graph::new(),
        }
    }

    /// Declares a graph input value.
    pub fn input(&mut self, ty: TypeTag, debug_name: &str) -> ValueId {
        let value = self.graph.add_value(ty, debug_name);
        self.graph.inputs.push(value);
        value
    }

    /// Emits a `prim::Constant` node carrying `value` as a baked attribute.
    pub fn constant(&mut self, value: HostValue) -> ValueId {
        let ty = value.type_tag();
        let mut attributes = BTreeMap::new();
        attributes.insert("value".to_string(), value);
        let id = self.graph.append_node(
            OpKind::new("prim::Constant"),
            None,
            Vec::new(),
            vec![ty],
            attributes,
        );
        self.outputs_of(id)[0]
    }

    /// Convenience for `prim::Constant` with an untyped `None` payload.
    pub fn none(&mut self) -> ValueId {
        self.constant(HostValue::None)
    }

    /// Appends an operation node and returns its output values.
    pub fn node(
        &mut self,
        kind: &str,
        schema: Option<&str>,
        inputs: impl Into<Vec<ValueId>>,
        output_types: impl Into<Vec<TypeTag>>,
    ) -> Vec<ValueId> {
        let id = self.graph.append_node(
            OpKind::new(kind),
            schema.map(str::to_string),
            inputs.into(),
            output_types.into(),
            BTreeMap::new(),
        );
        self.outputs_of(id)
    }

    /// Marks a value as a graph output.
    pub fn output(&mut self, value: ValueId) {
        self.graph.outputs.push(value);
    }

    pub fn finish(self) -> Graph {
        self.graph
    }

    fn outputs_of(&self, id: NodeId) -> Vec<ValueId> {
        self.graph
            .node(id)
            .map(|n| n.outputs.clone())
            .unwrap_or_default()
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}
