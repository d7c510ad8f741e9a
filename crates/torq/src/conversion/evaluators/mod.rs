//! Evaluators fold nodes to host values at compile time instead of emitting
//! network layers. Several evaluators may share a kind; each carries filter
//! options and the first whose filters accept the node wins.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{ConversionError, ConversionResult};
use crate::host::HostValue;
use crate::ir::{Graph, Node, OpKind, TypeTag};
use crate::schema::Schema;

use super::{Args, ConversionCtx};

mod prim;

/// Returns `Ok(None)` when the evaluator declines the node at runtime, in
/// which case the driver falls through to converter dispatch.
pub type Evaluator =
    fn(&ConversionCtx, &Graph, &Node, &Args) -> ConversionResult<Option<HostValue>>;

/// Static applicability filters checked before an evaluator runs.
#[derive(Debug, Default, Clone)]
pub struct EvalOptions {
    /// The evaluator is skipped when any node output carries one of these
    /// types.
    pub blacklisted_output_types: Vec<TypeTag>,
    /// When non-empty, the node's schema must canonically match one of
    /// these. A node without a retrievable schema is then a hard error.
    pub valid_schemas: Vec<Schema>,
}

impl EvalOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blacklist(mut self, types: impl IntoIterator<Item = TypeTag>) -> Self {
        self.blacklisted_output_types.extend(types);
        self
    }

    pub fn valid_schemas(mut self, signatures: &[&str]) -> ConversionResult<Self> {
        for signature in signatures {
            self.valid_schemas.push(Schema::parse(signature)?);
        }
        Ok(self)
    }
}

pub struct EvalRegistration {
    pub kind: OpKind,
    pub options: EvalOptions,
    pub evaluator: Evaluator,
}

#[derive(Default)]
pub struct EvaluatorRegistry {
    lut: HashMap<OpKind, Vec<EvalRegistration>>,
}

impl EvaluatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, registration: EvalRegistration) {
        debug!(kind = %registration.kind, "registering evaluator");
        self.lut
            .entry(registration.kind.clone())
            .or_default()
            .push(registration);
    }

    pub fn contains_kind(&self, kind: &str) -> bool {
        self.lut.contains_key(kind)
    }

    /// First registration for the node's kind whose filters accept the node,
    /// in registration order.
    pub fn find(
        &self,
        graph: &Graph,
        node: &Node,
    ) -> ConversionResult<Option<&EvalRegistration>> {
        let Some(registrations) = self.lut.get(node.kind.as_str()) else {
            return Ok(None);
        };
        'registrations: for registration in registrations {
            for output in &node.outputs {
                if registration
                    .options
                    .blacklisted_output_types
                    .contains(&graph.value(*output).ty)
                {
                    continue 'registrations;
                }
            }
            if !registration.options.valid_schemas.is_empty() {
                let Some(text) = node.schema.as_deref() else {
                    return Err(ConversionError::SchemaUnavailable(node.kind.to_string()));
                };
                let schema = Schema::parse(text)?;
                if !registration
                    .options
                    .valid_schemas
                    .iter()
                    .any(|candidate| *candidate == schema)
                {
                    continue 'registrations;
                }
            }
            return Ok(Some(registration));
        }
        Ok(None)
    }
}

pub(crate) fn register_all(registry: &mut EvaluatorRegistry) -> ConversionResult<()> {
    prim::register(registry)
}
