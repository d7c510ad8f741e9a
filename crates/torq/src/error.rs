use thiserror::Error;

use crate::network::BuildError;

/// Errors surfaced by graph conversion.
///
/// Everything here is fatal to the compilation that raised it; the only
/// tolerated degradation (a node output without provenance) is reported as a
/// warning by the context instead of an error.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// Invalid builder settings or registry setup. Raised at context
    /// construction or registration time, before any node is visited.
    #[error("configuration error: {0}")]
    Config(String),

    /// No converter is registered for a node kind that no evaluator claimed.
    #[error("unable to convert node of kind {0}, no converter registered")]
    NoConverter(String),

    /// An evaluator registration filters on schemas but the node carries none.
    #[error("evaluator for {0} only runs on certain schemas, but schema for node is not retrievable")]
    SchemaUnavailable(String),

    /// An operator signature string failed to parse.
    #[error("invalid schema `{text}`: {message}")]
    Schema { text: String, message: String },

    /// A converter or evaluator requested a typed constant that is absent or
    /// of the wrong kind.
    #[error("node {node} argument {index}: {message}")]
    Resolution {
        node: String,
        index: usize,
        message: String,
    },

    /// An evaluator hit an unsupported input configuration.
    #[error("evaluating {node}: {message}")]
    Evaluation { node: String, message: String },

    /// A converter hit an unsupported input configuration.
    #[error("converting {node}: {message}")]
    Conversion { node: String, message: String },

    /// Structural graph violation (dangling value, bad insertion point).
    #[error("graph error: {0}")]
    Graph(String),

    /// The target builder rejected a layer or the finalized network.
    #[error(transparent)]
    Build(#[from] BuildError),
}

impl ConversionError {
    pub fn config(message: impl Into<String>) -> Self {
        ConversionError::Config(message.into())
    }

    pub fn evaluation(node: impl Into<String>, message: impl Into<String>) -> Self {
        ConversionError::Evaluation {
            node: node.into(),
            message: message.into(),
        }
    }

    pub fn conversion(node: impl Into<String>, message: impl Into<String>) -> Self {
        ConversionError::Conversion {
            node: node.into(),
            message: message.into(),
        }
    }
}

pub type ConversionResult<T> = Result<T, ConversionError>;
