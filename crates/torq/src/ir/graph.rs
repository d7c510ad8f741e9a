use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::host::HostValue;

/// Qualified operator kind, e.g. `aten::_convolution` or `prim::ListConstruct`.
///
/// Identifies an operation type independent of overload; overloads are
/// distinguished by the node's runtime schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpKind(Box<str>);

impl OpKind {
    pub fn new(qualified: impl Into<String>) -> Self {
        OpKind(qualified.into().into_boxed_str())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespace portion (`aten` in `aten::conv2d`), empty if unqualified.
    pub fn namespace(&self) -> &str {
        self.0.split_once("::").map_or("", |(ns, _)| ns)
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OpKind {
    fn from(value: &str) -> Self {
        OpKind::new(value)
    }
}

impl Borrow<str> for OpKind {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for OpKind {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

/// Static type tag carried by every SSA value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    Tensor,
    Int,
    Float,
    Bool,
    Str,
    NoneType,
    List(Box<TypeTag>),
    Optional(Box<TypeTag>),
}

impl TypeTag {
    pub fn int_list() -> Self {
        TypeTag::List(Box::new(TypeTag::Int))
    }

    pub fn tensor_list() -> Self {
        TypeTag::List(Box::new(TypeTag::Tensor))
    }

    /// Element type when this tag is a list.
    pub fn element(&self) -> Option<&TypeTag> {
        match self {
            TypeTag::List(elem) => Some(elem),
            _ => None,
        }
    }
}

/// Identifies one SSA value. Values carry no data; provenance maps in the
/// conversion context attach tensors or evaluated constants externally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub u32);

impl ValueId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifies one operation node. Stable across edits to the node order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueInfo {
    pub ty: TypeTag,
    pub debug_name: String,
}

/// One traced operation: a kind, the runtime signature the tracer resolved
/// (when one exists), attributes baked at trace time, and the SSA values it
/// consumes and produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: OpKind,
    pub schema: Option<String>,
    pub inputs: Vec<ValueId>,
    pub outputs: Vec<ValueId>,
    pub attributes: BTreeMap<String, HostValue>,
}

impl Node {
    /// `kind(%a, %b)` rendering used in diagnostics.
    pub fn info(&self) -> String {
        let inputs: Vec<String> = self.inputs.iter().map(|v| format!("%{}", v.0)).collect();
        format!("{}({})", self.kind, inputs.join(", "))
    }

    pub fn attribute(&self, name: &str) -> Option<&HostValue> {
        self.attributes.get(name)
    }
}

/// Traced dataflow graph. `nodes` is kept in topological order; every value
/// is produced by exactly one node or listed in `inputs`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub inputs: Vec<ValueId>,
    pub outputs: Vec<ValueId>,
    values: Vec<ValueInfo>,
    next_node: u32,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self, id: ValueId) -> &ValueInfo {
        &self.values[id.index()]
    }

    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    pub fn add_value(&mut self, ty: TypeTag, debug_name: impl Into<String>) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ValueInfo {
            ty,
            debug_name: debug_name.into(),
        });
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Appends a node producing fresh output values of the given types.
    pub fn append_node(
        &mut self,
        kind: OpKind,
        schema: Option<String>,
        inputs: Vec<ValueId>,
        output_types: Vec<TypeTag>,
        attributes: BTreeMap<String, HostValue>,
    ) -> NodeId {
        let id = self.allocate_node_id();
        let outputs = output_types
            .into_iter()
            .map(|ty| {
                let name = format!("{}.{}", kind.as_str().replace("::", "_"), self.values.len());
                self.add_value(ty, name)
            })
            .collect();
        self.nodes.push(Node {
            id,
            kind,
            schema,
            inputs,
            outputs,
            attributes,
        });
        id
    }

    pub(crate) fn allocate_node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    /// Node producing `value`, if any (graph inputs have no producer).
    pub fn producer(&self, value: ValueId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.outputs.contains(&value))
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inputs: Vec<String> = self.inputs.iter().map(|v| format!("%{}", v.0)).collect();
        writeln!(f, "graph({}):", inputs.join(", "))?;
        for node in &self.nodes {
            let outs: Vec<String> = node.outputs.iter().map(|v| format!("%{}", v.0)).collect();
            writeln!(f, "  {} = {}", outs.join(", "), node.info())?;
        }
        let outs: Vec<String> = self.outputs.iter().map(|v| format!("%{}", v.0)).collect();
        write!(f, "  return ({})", outs.join(", "))
    }
}
