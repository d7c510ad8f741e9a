use tracing::debug;

use crate::conversion::converters::CONVOLUTION_SIGNATURE;
use crate::host::HostValue;
use crate::ir::{Graph, TypeTag};
use crate::lowering::rewrite::{PatternGraph, RewriteRule, SubgraphRewriter};

/// Runs the full lowering pipeline. Pass order does not matter; the rewriter
/// drives each rule to fixed point on its own.
pub fn lower_graph(graph: &mut Graph) {
    remove_dropout(graph);
    canonicalize_conv(graph);
    debug!("post lowering:\n{graph}");
}

/// Deletes dropout nodes (inference engines never apply them) and rewires
/// their consumers to the dropout input, in both the value-returning and
/// in-place-mutating forms.
pub fn remove_dropout(graph: &mut Graph) {
    let rewriter = SubgraphRewriter::new(vec![
        dropout_rule("remove-dropout", "aten::dropout"),
        dropout_rule("remove-dropout-inplace", "aten::dropout_"),
    ]);
    let applied = rewriter.run_on_graph(graph);
    if applied > 0 {
        debug!(applied, "removed dropout nodes");
    }
}

fn dropout_rule(name: &'static str, kind: &str) -> RewriteRule {
    let mut pattern = PatternGraph::builder();
    let input = pattern.hole();
    let p = pattern.hole();
    let train = pattern.hole();
    let out = pattern.op(kind, [input, p, train], [TypeTag::Tensor]);
    let pattern = pattern.finish([out]);

    // No replacement nodes: consumers take the dropout input directly.
    let replacement = PatternGraph::builder().finish([input]);

    RewriteRule {
        name,
        pattern,
        replacement,
    }
}

/// Folds the specialized `aten::conv1d/2d/3d` calls into the general
/// `aten::_convolution` form, inserting constants for the parameters the
/// specialized form fixes (`transposed=false`, zero output padding, and the
/// benchmark/deterministic/cudnn flags).
pub fn canonicalize_conv(graph: &mut Graph) {
    let rewriter = SubgraphRewriter::new(vec![
        conv_rule("conv1d-to-convolution", "aten::conv1d", 1),
        conv_rule("conv2d-to-convolution", "aten::conv2d", 2),
        conv_rule("conv3d-to-convolution", "aten::conv3d", 3),
    ]);
    let applied = rewriter.run_on_graph(graph);
    if applied > 0 {
        debug!(applied, "canonicalized convolution nodes");
    }
}

fn conv_rule(name: &'static str, kind: &str, spatial_dims: usize) -> RewriteRule {
    let mut pattern = PatternGraph::builder();
    let x = pattern.hole();
    let w = pattern.hole();
    let b = pattern.hole();
    let stride = pattern.hole();
    let padding = pattern.hole();
    let dilation = pattern.hole();
    let groups = pattern.hole();
    let out = pattern.op(
        kind,
        [x, w, b, stride, padding, dilation, groups],
        [TypeTag::Tensor],
    );
    let pattern = pattern.finish([out]);

    let mut replacement = PatternGraph::builder();
    let flag = replacement.constant(HostValue::Bool(false));
    let output_padding = replacement.constant(HostValue::IntList(vec![0; spatial_dims]));
    let conv = replacement.op_with_schema(
        "aten::_convolution",
        CONVOLUTION_SIGNATURE,
        [
            x,
            w,
            b,
            stride,
            padding,
            dilation,
            flag,
            output_padding,
            groups,
            flag,
            flag,
            flag,
        ],
        [TypeTag::Tensor],
    );
    let replacement = replacement.finish([conv]);

    RewriteRule {
        name,
        pattern,
        replacement,
    }
}
