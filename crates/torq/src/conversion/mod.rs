//! Graph-to-network conversion: context, value resolution, dispatch, driver.

mod args;
mod context;
mod driver;

pub mod converters;
pub mod evaluators;

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::ConversionResult;
use crate::settings::BuilderSettings;

pub use args::{Arg, Args};
pub use context::ConversionCtx;
pub use converters::{Converter, ConverterRegistration, ConverterRegistry};
pub use driver::{
    check_operator_support, convert_graph, convert_graph_with, named_params, DriverState,
    NamedParams,
};
pub use evaluators::{EvalOptions, EvalRegistration, Evaluator, EvaluatorRegistry};

/// Static shape declared for one free graph input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpec {
    pub shape: Vec<usize>,
}

impl InputSpec {
    pub fn new(shape: impl Into<Vec<usize>>) -> Self {
        Self {
            shape: shape.into(),
        }
    }
}

impl From<Vec<usize>> for InputSpec {
    fn from(shape: Vec<usize>) -> Self {
        Self { shape }
    }
}

/// Everything the driver needs besides the graph itself: one shape per free
/// input (named parameters excluded) and the builder settings.
#[derive(Debug, Clone, Default)]
pub struct ConversionInfo {
    pub inputs: Vec<InputSpec>,
    pub settings: BuilderSettings,
}

impl ConversionInfo {
    pub fn new(inputs: Vec<InputSpec>) -> Self {
        Self {
            inputs,
            settings: BuilderSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: BuilderSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// Converter and evaluator lookup tables for one dispatch configuration.
///
/// The process-wide instance returned by [`registries`] is populated exactly
/// once with the builtin registrations; tests build private instances to
/// exercise registration rules.
pub struct Registries {
    pub converters: ConverterRegistry,
    pub evaluators: EvaluatorRegistry,
}

impl Registries {
    pub fn empty() -> Self {
        Self {
            converters: ConverterRegistry::new(),
            evaluators: EvaluatorRegistry::new(),
        }
    }

    /// Registry with every builtin converter and evaluator installed.
    pub fn builtin() -> ConversionResult<Self> {
        let mut registries = Self::empty();
        converters::register_all(&mut registries.converters)?;
        evaluators::register_all(&mut registries.evaluators)?;
        Ok(registries)
    }
}

static REGISTRIES: OnceLock<Registries> = OnceLock::new();

/// Process-wide registries, built on first use. Registration after this
/// point is not supported; dynamic setups should carry their own
/// [`Registries`] value.
pub fn registries() -> &'static Registries {
    REGISTRIES.get_or_init(|| Registries::builtin().expect("builtin registrations are consistent"))
}
