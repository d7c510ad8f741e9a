use tracing::warn;

use crate::error::{ConversionError, ConversionResult};
use crate::host::{HostValue, TensorLiteral};
use crate::ir::{Graph, Node, TypeTag};

use super::{Args, ConversionCtx, EvalOptions, EvalRegistration, EvaluatorRegistry};

fn constant(
    _ctx: &ConversionCtx,
    _graph: &Graph,
    node: &Node,
    _args: &Args,
) -> ConversionResult<Option<HostValue>> {
    Ok(Some(
        node.attribute("value").cloned().unwrap_or(HostValue::None),
    ))
}

/// Folds `prim::ListConstruct`. When every element is a compile-time value
/// the result is a homogeneous typed list; when any element is a live network
/// tensor the result is a generic list with tensor references boxed so later
/// consumers can still reach them.
fn list_construct(
    _ctx: &ConversionCtx,
    graph: &Graph,
    node: &Node,
    args: &Args,
) -> ConversionResult<Option<HostValue>> {
    let output = *node.outputs.first().ok_or_else(|| {
        ConversionError::evaluation(node.info(), "list construction has no output value")
    })?;
    let element = graph
        .value(output)
        .ty
        .element()
        .cloned()
        .ok_or_else(|| {
            ConversionError::evaluation(node.info(), "list construction output is not list-typed")
        })?;

    let all_const =
        (0..args.len()).all(|i| !args.is_tensor(i) && !args.is_boxed_tensor(i));
    if all_const {
        let list = match element {
            TypeTag::Int => HostValue::IntList(
                (0..args.len())
                    .map(|i| args.unwrap_to_int(i))
                    .collect::<ConversionResult<_>>()?,
            ),
            TypeTag::Float => HostValue::DoubleList(
                (0..args.len())
                    .map(|i| args.unwrap_to_double(i))
                    .collect::<ConversionResult<_>>()?,
            ),
            TypeTag::Bool => HostValue::BoolList(
                (0..args.len())
                    .map(|i| args.unwrap_to_bool(i))
                    .collect::<ConversionResult<_>>()?,
            ),
            TypeTag::Tensor => HostValue::TensorList(
                (0..args.len())
                    .map(|i| args.unwrap_to_tensor(i))
                    .collect::<ConversionResult<_>>()?,
            ),
            _ => HostValue::GenericList(
                (0..args.len())
                    .map(|i| args.host(i).cloned())
                    .collect::<ConversionResult<_>>()?,
            ),
        };
        return Ok(Some(list));
    }

    let mut list = Vec::with_capacity(args.len());
    for i in 0..args.len() {
        if args.is_tensor(i) {
            list.push(HostValue::BoxedTensor(args.tensor(i)?));
        } else {
            list.push(args.host(i)?.clone());
        }
    }
    Ok(Some(HostValue::GenericList(list)))
}

#[derive(Clone, Copy)]
enum Extremum {
    Min,
    Max,
}

#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Double(f64),
}

impl Num {
    fn parse(args: &Args, node: &Node, index: usize) -> ConversionResult<Num> {
        match args.host(index)? {
            HostValue::Int(v) => Ok(Num::Int(*v)),
            HostValue::Double(v) => Ok(Num::Double(*v)),
            other => Err(ConversionError::evaluation(
                node.info(),
                format!(
                    "unimplemented data type {} for extremum evaluator argument {index}",
                    other.kind_name()
                ),
            )),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(v) => v as f64,
            Num::Double(v) => v,
        }
    }

    fn into_host(self) -> HostValue {
        match self {
            Num::Int(v) => HostValue::Int(v),
            Num::Double(v) => HostValue::Double(v),
        }
    }
}

/// `prim::min`/`prim::max`: a one-argument list fold over an int list, or a
/// two-argument scalar comparison. A mixed int/float comparison promotes the
/// result to float, matching the declared `.int_float`/`.float_int` returns.
fn extremum(
    which: Extremum,
    node: &Node,
    args: &Args,
) -> ConversionResult<Option<HostValue>> {
    match args.len() {
        1 => {
            let list = args.unwrap_to_int_list(0)?;
            let folded = match which {
                Extremum::Min => list.iter().fold(i64::MAX, |acc, &v| acc.min(v)),
                Extremum::Max => list.iter().fold(i64::MIN, |acc, &v| acc.max(v)),
            };
            Ok(Some(HostValue::Int(folded)))
        }
        2 => {
            let a = Num::parse(args, node, 0)?;
            let b = Num::parse(args, node, 1)?;
            let pick_a = match which {
                Extremum::Min => a.as_f64() < b.as_f64(),
                Extremum::Max => a.as_f64() > b.as_f64(),
            };
            let chosen = if pick_a { a } else { b };
            let promote = matches!(a, Num::Double(_)) || matches!(b, Num::Double(_));
            Ok(Some(if promote {
                HostValue::Double(chosen.as_f64())
            } else {
                chosen.into_host()
            }))
        }
        n => Err(ConversionError::evaluation(
            node.info(),
            format!("unimplemented extremum evaluator case with {n} arguments"),
        )),
    }
}

fn prim_min(
    _ctx: &ConversionCtx,
    _graph: &Graph,
    node: &Node,
    args: &Args,
) -> ConversionResult<Option<HostValue>> {
    extremum(Extremum::Min, node, args)
}

fn prim_max(
    _ctx: &ConversionCtx,
    _graph: &Graph,
    node: &Node,
    args: &Args,
) -> ConversionResult<Option<HostValue>> {
    extremum(Extremum::Max, node, args)
}

/// `prim::NumToTensor` wraps a host scalar into a 0-d tensor literal.
fn num_to_tensor(
    _ctx: &ConversionCtx,
    _graph: &Graph,
    node: &Node,
    args: &Args,
) -> ConversionResult<Option<HostValue>> {
    let value = match args.host(0)? {
        HostValue::Int(v) => *v as f32,
        HostValue::Double(v) => *v as f32,
        HostValue::Bool(v) => {
            if *v {
                1.0
            } else {
                0.0
            }
        }
        other => {
            return Err(ConversionError::evaluation(
                node.info(),
                format!(
                    "unimplemented data type {} for scalar to tensor conversion",
                    other.kind_name()
                ),
            ))
        }
    };
    Ok(Some(HostValue::Tensor(TensorLiteral::scalar(value))))
}

/// `prim::Uninitialized` placeholders only ever feed dead branches in a
/// traced graph, so a none value stands in for them.
fn uninitialized(
    _ctx: &ConversionCtx,
    _graph: &Graph,
    _node: &Node,
    _args: &Args,
) -> ConversionResult<Option<HostValue>> {
    Ok(Some(HostValue::None))
}

fn shape(
    ctx: &ConversionCtx,
    _graph: &Graph,
    node: &Node,
    args: &Args,
) -> ConversionResult<Option<HostValue>> {
    warn!(node = %node.info(), "prim::shape folds the shape known at build time, dynamic shapes will not be reflected");
    let dims: Vec<i64> = if args.is_tensor(0) || args.is_boxed_tensor(0) {
        ctx.tensor_dims(args.tensor(0)?)
            .iter()
            .map(|&d| d as i64)
            .collect()
    } else {
        args.unwrap_to_tensor(0)?
            .shape
            .iter()
            .map(|&d| d as i64)
            .collect()
    };
    Ok(Some(HostValue::IntList(dims)))
}

fn unchecked_cast(
    _ctx: &ConversionCtx,
    _graph: &Graph,
    _node: &Node,
    args: &Args,
) -> ConversionResult<Option<HostValue>> {
    Ok(Some(args.host(0)?.clone()))
}

/// An exception reached at compile time is unconditionally fatal; there is
/// no runtime control flow that could skip it in a traced graph.
fn raise_exception(
    _ctx: &ConversionCtx,
    _graph: &Graph,
    node: &Node,
    args: &Args,
) -> ConversionResult<Option<HostValue>> {
    let message = match args.host(0)? {
        HostValue::Str(text) => text.clone(),
        other => format!("exception payload of kind {}", other.kind_name()),
    };
    Err(ConversionError::evaluation(
        node.info(),
        format!("error from traced program: {message}"),
    ))
}

const MIN_SCHEMAS: &[&str] = &[
    "prim::min.self_int(int[] self) -> (int)",
    "prim::min.int(int a, int b) -> (int)",
    "prim::min.float(float a, float b) -> (float)",
    "prim::min.int_float(int a, float b) -> (float)",
    "prim::min.float_int(float a, int b) -> (float)",
    "prim::min(int a, int b) -> (int)",
];

const MAX_SCHEMAS: &[&str] = &[
    "prim::max.self_int(int[] self) -> (int)",
    "prim::max.int(int a, int b) -> (int)",
    "prim::max.float(float a, float b) -> (float)",
    "prim::max.int_float(int a, float b) -> (float)",
    "prim::max.float_int(float a, int b) -> (float)",
    "prim::max(int a, int b) -> (int)",
];

const SHAPE_SCHEMAS: &[&str] = &["prim::shape(Tensor a) -> (int[])"];

pub(super) fn register(registry: &mut EvaluatorRegistry) -> ConversionResult<()> {
    registry.register(EvalRegistration {
        kind: "prim::Constant".into(),
        options: EvalOptions::new(),
        evaluator: constant,
    });
    registry.register(EvalRegistration {
        kind: "prim::ListConstruct".into(),
        options: EvalOptions::new(),
        evaluator: list_construct,
    });
    registry.register(EvalRegistration {
        kind: "prim::min".into(),
        options: EvalOptions::new().valid_schemas(MIN_SCHEMAS)?,
        evaluator: prim_min,
    });
    registry.register(EvalRegistration {
        kind: "prim::max".into(),
        options: EvalOptions::new().valid_schemas(MAX_SCHEMAS)?,
        evaluator: prim_max,
    });
    registry.register(EvalRegistration {
        kind: "prim::NumToTensor".into(),
        options: EvalOptions::new(),
        evaluator: num_to_tensor,
    });
    registry.register(EvalRegistration {
        kind: "prim::Uninitialized".into(),
        options: EvalOptions::new(),
        evaluator: uninitialized,
    });
    registry.register(EvalRegistration {
        kind: "prim::shape".into(),
        options: EvalOptions::new().valid_schemas(SHAPE_SCHEMAS)?,
        evaluator: shape,
    });
    registry.register(EvalRegistration {
        kind: "prim::unchecked_cast".into(),
        options: EvalOptions::new(),
        evaluator: unchecked_cast,
    });
    registry.register(EvalRegistration {
        kind: "prim::RaiseException".into(),
        options: EvalOptions::new(),
        evaluator: raise_exception,
    });
    Ok(())
}
