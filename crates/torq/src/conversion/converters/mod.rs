//! Converters lower one graph node into network layers. One converter is
//! registered per operation kind and dispatches internally across overloads.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{ConversionError, ConversionResult};
use crate::ir::{Graph, Node, OpKind};

use super::{Args, ConversionCtx};

mod conv_deconv;
mod reduce;

pub use conv_deconv::CONVOLUTION_SIGNATURE;

pub type Converter =
    fn(&mut ConversionCtx, &Graph, &Node, &mut Args) -> ConversionResult<()>;

pub struct ConverterRegistration {
    pub kind: OpKind,
    /// Schemas this converter accepts, for support queries and docs.
    pub signatures: &'static [&'static str],
    pub converter: Converter,
}

#[derive(Default)]
pub struct ConverterRegistry {
    lut: HashMap<OpKind, ConverterRegistration>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registration is exclusive per kind; a second registration for the
    /// same kind is a programming error surfaced at registry construction.
    pub fn register(&mut self, registration: ConverterRegistration) -> ConversionResult<()> {
        debug!(kind = %registration.kind, "registering converter");
        if self.lut.contains_key(&registration.kind) {
            return Err(ConversionError::config(format!(
                "attempting to override an already registered converter for {}, merge the implementations instead",
                registration.kind
            )));
        }
        self.lut.insert(registration.kind.clone(), registration);
        Ok(())
    }

    pub fn get(&self, kind: &str) -> Option<&ConverterRegistration> {
        self.lut.get(kind)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.lut.contains_key(kind)
    }
}

pub(crate) fn register_all(registry: &mut ConverterRegistry) -> ConversionResult<()> {
    conv_deconv::register(registry)?;
    reduce::register(registry)?;
    Ok(())
}
