//! Graph-to-graph lowering passes applied before conversion.
//!
//! Each pass is a pure rewrite built on the subgraph rewriter: a template
//! pattern graph with placeholders is matched structurally and spliced out
//! for an equivalent replacement, repeated to fixed point. Passes never touch
//! the conversion context and are independent of one another.

mod passes;
mod rewrite;

pub use passes::{canonicalize_conv, lower_graph, remove_dropout};
pub use rewrite::{
    PatternGraph, PatternGraphBuilder, PatternRef, RewriteRule, SubgraphRewriter,
};
