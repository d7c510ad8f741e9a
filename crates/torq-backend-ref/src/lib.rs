//! Reference CPU backend for `torq`.
//!
//! [`RefNetworkBuilder`] implements the builder contract with straightforward
//! shape inference and serializes the accumulated network with `bincode`.
//! [`Engine`] deserializes such a blob and executes it with naive CPU kernels,
//! which makes it the oracle the conversion pipeline is tested against. No
//! attempt is made at performance.

mod builder;
mod engine;
mod kernels;

pub use builder::RefNetworkBuilder;
pub use engine::{Engine, EngineSpec, Layer, RunError};
