//! Graph-to-engine lowering for traced dataflow programs.
//!
//! `torq` takes a typed, SSA-form graph of operator nodes produced by an
//! upstream tracer and lowers it into a serialized accelerator inference
//! engine. The pipeline is: lowering passes canonicalize the graph, then a
//! single-pass driver walks the nodes in topological order and dispatches each
//! one either to a compile-time evaluator (constant folding) or to a converter
//! that emits layers into an accelerator network builder. All compilation
//! state lives in a [`conversion::ConversionCtx`].

pub mod conversion;
pub mod error;
pub mod host;
pub mod ir;
pub mod lowering;
pub mod network;
pub mod schema;
pub mod settings;

pub use conversion::{convert_graph, convert_graph_with, ConversionInfo, InputSpec};
pub use error::{ConversionError, ConversionResult};
