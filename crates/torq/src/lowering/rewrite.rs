use std::collections::{BTreeMap, HashSet};

use tracing::trace;

use crate::host::HostValue;
use crate::ir::{Graph, GraphEditor, NodeId, OpKind, TypeTag, ValueId};

/// Reference to a value inside a template graph: either a placeholder bound
/// during matching or the output of another template node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternRef {
    Hole(u32),
    Out { op: u32, index: u32 },
}

#[derive(Debug, Clone)]
struct PatternOp {
    kind: OpKind,
    schema: Option<&'static str>,
    inputs: Vec<PatternRef>,
    output_types: Vec<TypeTag>,
    attributes: BTreeMap<String, HostValue>,
}

/// Small template graph with named placeholders. Used both as the pattern to
/// find and as the replacement to splice in; pattern and replacement of one
/// rule share placeholder numbering.
#[derive(Debug, Clone)]
pub struct PatternGraph {
    ops: Vec<PatternOp>,
    num_holes: u32,
    outputs: Vec<PatternRef>,
}

impl PatternGraph {
    pub fn builder() -> PatternGraphBuilder {
        PatternGraphBuilder {
            ops: Vec::new(),
            num_holes: 0,
        }
    }

    /// Template node producing the first pattern output; matching anchors
    /// there.
    fn root(&self) -> Option<u32> {
        match self.outputs.first() {
            Some(PatternRef::Out { op, .. }) => Some(*op),
            _ => None,
        }
    }
}

pub struct PatternGraphBuilder {
    ops: Vec<PatternOp>,
    num_holes: u32,
}

impl PatternGraphBuilder {
    pub fn hole(&mut self) -> PatternRef {
        let hole = PatternRef::Hole(self.num_holes);
        self.num_holes += 1;
        hole
    }

    pub fn op(
        &mut self,
        kind: &str,
        inputs: impl Into<Vec<PatternRef>>,
        output_types: impl Into<Vec<TypeTag>>,
    ) -> PatternRef {
        self.op_full(kind, None, inputs, output_types, BTreeMap::new())
    }

    pub fn op_with_schema(
        &mut self,
        kind: &str,
        schema: &'static str,
        inputs: impl Into<Vec<PatternRef>>,
        output_types: impl Into<Vec<TypeTag>>,
    ) -> PatternRef {
        self.op_full(kind, Some(schema), inputs, output_types, BTreeMap::new())
    }

    /// Emits a `prim::Constant` template node carrying a baked value, for
    /// replacements that introduce default-valued parameters.
    pub fn constant(&mut self, value: HostValue) -> PatternRef {
        let ty = value.type_tag();
        let mut attributes = BTreeMap::new();
        attributes.insert("value".to_string(), value);
        self.op_full("prim::Constant", None, Vec::new(), vec![ty], attributes)
    }

    fn op_full(
        &mut self,
        kind: &str,
        schema: Option<&'static str>,
        inputs: impl Into<Vec<PatternRef>>,
        output_types: impl Into<Vec<TypeTag>>,
        attributes: BTreeMap<String, HostValue>,
    ) -> PatternRef {
        let op = self.ops.len() as u32;
        self.ops.push(PatternOp {
            kind: OpKind::new(kind),
            schema,
            inputs: inputs.into(),
            output_types: output_types.into(),
            attributes,
        });
        PatternRef::Out { op, index: 0 }
    }

    pub fn finish(self, outputs: impl Into<Vec<PatternRef>>) -> PatternGraph {
        PatternGraph {
            ops: self.ops,
            num_holes: self.num_holes,
            outputs: outputs.into(),
        }
    }
}

/// One pattern-to-replacement rewrite.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    pub name: &'static str,
    pub pattern: PatternGraph,
    pub replacement: PatternGraph,
}

/// Applies a set of rewrite rules to a graph until no rule matches.
pub struct SubgraphRewriter {
    rules: Vec<RewriteRule>,
}

impl SubgraphRewriter {
    pub fn new(rules: Vec<RewriteRule>) -> Self {
        Self { rules }
    }

    /// Runs every rule to fixed point; returns the number of rewrites applied.
    pub fn run_on_graph(&self, graph: &mut Graph) -> usize {
        let mut applied = 0;
        loop {
            let mut changed = false;
            for rule in &self.rules {
                while apply_rule_once(rule, graph) {
                    trace!(rule = rule.name, "applied rewrite");
                    applied += 1;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        applied
    }
}

#[derive(Debug, Clone)]
struct Binding {
    holes: Vec<Option<ValueId>>,
    ops: Vec<Option<NodeId>>,
}

fn apply_rule_once(rule: &RewriteRule, graph: &mut Graph) -> bool {
    let Some(root) = rule.pattern.root() else {
        return false;
    };
    let candidates: Vec<NodeId> = graph.nodes.iter().map(|n| n.id).collect();
    for candidate in candidates {
        let mut editor = GraphEditor::new(graph);
        let mut binding = Binding {
            holes: vec![None; rule.pattern.num_holes as usize],
            ops: vec![None; rule.pattern.ops.len()],
        };
        if !match_op(&rule.pattern, root, candidate, &editor, &mut binding) {
            continue;
        }
        if !match_is_closed(&rule.pattern, &binding, &editor) {
            continue;
        }
        splice(rule, &mut editor, &binding);
        return true;
    }
    false
}

fn match_op(
    pattern: &PatternGraph,
    op_index: u32,
    node_id: NodeId,
    editor: &GraphEditor<'_>,
    binding: &mut Binding,
) -> bool {
    let template = &pattern.ops[op_index as usize];
    if let Some(bound) = binding.ops[op_index as usize] {
        return bound == node_id;
    }
    let Some(node) = editor.node(node_id) else {
        return false;
    };
    if node.kind != template.kind
        || node.inputs.len() != template.inputs.len()
        || node.outputs.len() != template.output_types.len()
    {
        return false;
    }
    binding.ops[op_index as usize] = Some(node_id);
    let inputs = node.inputs.clone();
    for (template_ref, value) in template.inputs.clone().iter().zip(inputs) {
        if !match_ref(pattern, *template_ref, value, editor, binding) {
            return false;
        }
    }
    true
}

fn match_ref(
    pattern: &PatternGraph,
    template_ref: PatternRef,
    value: ValueId,
    editor: &GraphEditor<'_>,
    binding: &mut Binding,
) -> bool {
    match template_ref {
        PatternRef::Hole(hole) => {
            let slot = &mut binding.holes[hole as usize];
            match slot {
                Some(bound) => *bound == value,
                None => {
                    *slot = Some(value);
                    true
                }
            }
        }
        PatternRef::Out { op, index } => {
            let Some(producer) = editor.producer_of(value) else {
                return false;
            };
            let Some(node) = editor.node(producer) else {
                return false;
            };
            if node.outputs.get(index as usize) != Some(&value) {
                return false;
            }
            match_op(pattern, op, producer, editor, binding)
        }
    }
}

/// Every value a matched node produces must either be one of the pattern's
/// declared outputs or be consumed only inside the match; otherwise splicing
/// would orphan a live value.
fn match_is_closed(pattern: &PatternGraph, binding: &Binding, editor: &GraphEditor<'_>) -> bool {
    let matched: HashSet<NodeId> = binding.ops.iter().copied().flatten().collect();
    let replaced: HashSet<ValueId> = pattern
        .outputs
        .iter()
        .filter_map(|out| resolve_matched(pattern, *out, binding, editor))
        .collect();

    for node_id in &matched {
        let Some(node) = editor.node(*node_id) else {
            return false;
        };
        for output in &node.outputs {
            if replaced.contains(output) {
                continue;
            }
            if editor.graph.outputs.contains(output) {
                return false;
            }
            if editor
                .users_of(*output)
                .iter()
                .any(|user| !matched.contains(user))
            {
                return false;
            }
        }
    }
    true
}

fn resolve_matched(
    pattern: &PatternGraph,
    template_ref: PatternRef,
    binding: &Binding,
    editor: &GraphEditor<'_>,
) -> Option<ValueId> {
    match template_ref {
        PatternRef::Hole(hole) => binding.holes[hole as usize],
        PatternRef::Out { op, index } => {
            let node_id = binding.ops.get(op as usize).copied().flatten()?;
            editor.node(node_id)?.outputs.get(index as usize).copied()
        }
    }
}

fn splice(rule: &RewriteRule, editor: &mut GraphEditor<'_>, binding: &Binding) {
    let root = rule
        .pattern
        .root()
        .and_then(|op| binding.ops[op as usize])
        .expect("splice requires a matched root");

    // Materialize replacement nodes in declaration order, mapping template
    // refs to real values as we go.
    let mut created: Vec<Vec<ValueId>> = Vec::with_capacity(rule.replacement.ops.len());
    for op in &rule.replacement.ops {
        let inputs: Vec<ValueId> = op
            .inputs
            .iter()
            .map(|r| resolve_replacement(*r, binding, &created))
            .collect();
        let (_, outputs) = editor
            .insert_before(
                root,
                op.kind.clone(),
                op.schema.map(str::to_string),
                inputs,
                op.output_types.clone(),
                op.attributes.clone(),
            )
            .expect("replacement insertion point must exist");
        created.push(outputs);
    }

    for (pattern_out, replacement_out) in rule
        .pattern
        .outputs
        .iter()
        .zip(rule.replacement.outputs.iter())
    {
        let old = resolve_matched(&rule.pattern, *pattern_out, binding, editor)
            .expect("matched pattern output must resolve");
        let new = resolve_replacement(*replacement_out, binding, &created);
        editor.replace_all_uses(old, new);
    }

    // Matched nodes are now dead; erase consumers-first until none remain.
    let mut pending: Vec<NodeId> = binding.ops.iter().copied().flatten().collect();
    while !pending.is_empty() {
        let before = pending.len();
        pending.retain(|id| editor.erase_node(*id).is_err());
        assert!(
            pending.len() < before,
            "matched subgraph must become erasable after rewiring"
        );
    }
}

fn resolve_replacement(
    template_ref: PatternRef,
    binding: &Binding,
    created: &[Vec<ValueId>],
) -> ValueId {
    match template_ref {
        PatternRef::Hole(hole) => binding.holes[hole as usize]
            .expect("replacement placeholder must be bound by the pattern"),
        PatternRef::Out { op, index } => created[op as usize][index as usize],
    }
}
