use std::collections::{BTreeMap, HashMap};

use crate::error::{ConversionError, ConversionResult};
use crate::host::HostValue;
use crate::ir::{Graph, Node, NodeId, OpKind, TypeTag, ValueId};

/// Mutable graph editor with SSA accounting.
///
/// Tracks use lists and producers so rewrites can rewire and splice without
/// rescanning the whole graph after every edit. Holds the graph exclusively
/// for the duration of one editing session.
pub struct GraphEditor<'a> {
    pub graph: &'a mut Graph,
    users: HashMap<ValueId, Vec<NodeId>>,
    producers: HashMap<ValueId, NodeId>,
}

impl<'a> GraphEditor<'a> {
    pub fn new(graph: &'a mut Graph) -> Self {
        let mut users: HashMap<ValueId, Vec<NodeId>> = HashMap::new();
        let mut producers = HashMap::new();
        for node in &graph.nodes {
            for input in &node.inputs {
                users.entry(*input).or_default().push(node.id);
            }
            for output in &node.outputs {
                producers.insert(*output, node.id);
            }
        }
        Self {
            graph,
            users,
            producers,
        }
    }

    pub fn users_of(&self, value: ValueId) -> &[NodeId] {
        self.users.get(&value).map_or(&[], Vec::as_slice)
    }

    pub fn producer_of(&self, value: ValueId) -> Option<NodeId> {
        self.producers.get(&value).copied()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.graph.nodes.iter().find(|n| n.id == id)
    }

    fn position(&self, id: NodeId) -> Option<usize> {
        self.graph.nodes.iter().position(|n| n.id == id)
    }

    /// True when no node and no graph output consumes `value`.
    pub fn is_dead(&self, value: ValueId) -> bool {
        self.users_of(value).is_empty() && !self.graph.outputs.contains(&value)
    }

    /// Replaces every use of `from` with `to`, including graph outputs.
    pub fn replace_all_uses(&mut self, from: ValueId, to: ValueId) {
        if from == to {
            return;
        }
        let consumers = self.users.remove(&from).unwrap_or_default();
        for id in &consumers {
            if let Some(pos) = self.position(*id) {
                for input in &mut self.graph.nodes[pos].inputs {
                    if *input == from {
                        *input = to;
                    }
                }
            }
        }
        let to_users = self.users.entry(to).or_default();
        for id in consumers {
            if !to_users.contains(&id) {
                to_users.push(id);
            }
        }
        for output in &mut self.graph.outputs {
            if *output == from {
                *output = to;
            }
        }
    }

    /// Removes the node. Fails if any of its outputs still has uses.
    pub fn erase_node(&mut self, id: NodeId) -> ConversionResult<()> {
        let pos = self
            .position(id)
            .ok_or_else(|| ConversionError::Graph(format!("no node {id:?} to erase")))?;
        for output in self.graph.nodes[pos].outputs.clone() {
            if !self.is_dead(output) {
                return Err(ConversionError::Graph(format!(
                    "erasing node {} whose output %{} still has uses",
                    self.graph.nodes[pos].info(),
                    output.0
                )));
            }
        }
        let node = self.graph.nodes.remove(pos);
        for input in &node.inputs {
            if let Some(list) = self.users.get_mut(input) {
                list.retain(|u| *u != id);
            }
        }
        for output in &node.outputs {
            self.producers.remove(output);
        }
        Ok(())
    }

    /// Inserts a new node before `at`, allocating fresh output values.
    pub fn insert_before(
        &mut self,
        at: NodeId,
        kind: OpKind,
        schema: Option<String>,
        inputs: Vec<ValueId>,
        output_types: Vec<TypeTag>,
        attributes: BTreeMap<String, HostValue>,
    ) -> ConversionResult<(NodeId, Vec<ValueId>)> {
        let pos = self
            .position(at)
            .ok_or_else(|| ConversionError::Graph(format!("insertion point {at:?} not found")))?;
        let id = self.graph.allocate_node_id();
        let outputs: Vec<ValueId> = output_types
            .into_iter()
            .map(|ty| {
                let name = format!("{}.{}", kind.as_str().replace("::", "_"), self.graph.num_values());
                self.graph.add_value(ty, name)
            })
            .collect();
        for input in &inputs {
            self.users.entry(*input).or_default().push(id);
        }
        for output in &outputs {
            self.producers.insert(*output, id);
        }
        self.graph.nodes.insert(
            pos,
            Node {
                id,
                kind,
                schema,
                inputs,
                outputs: outputs.clone(),
                attributes,
            },
        );
        Ok((id, outputs))
    }
}
