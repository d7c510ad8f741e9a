//! SSA dataflow graph produced by the upstream tracer.

mod builder;
mod editor;
mod graph;

pub use builder::GraphBuilder;
pub use editor::GraphEditor;
pub use graph::{Graph, Node, NodeId, OpKind, TypeTag, ValueId, ValueInfo};
