//! Host-side evaluated constants.
//!
//! Evaluators run at compile time and produce [`HostValue`]s that live in the
//! conversion context until they are either consumed by another evaluator or
//! frozen into constant layers. Tensors that are still live in the target
//! network appear inside evaluated lists as [`HostValue::BoxedTensor`], a
//! tagged handle rather than an opaque container, so later evaluators can
//! pattern-match on them without losing the layer output.

use serde::{Deserialize, Serialize};

use crate::ir::TypeTag;
use crate::network::TensorRef;

/// Dense host tensor literal. Weight and constant payloads are single
/// precision; reduced-precision conversion happens inside the target builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorLiteral {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl TensorLiteral {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        Self { shape, data }
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        let numel = shape.iter().product();
        Self {
            shape,
            data: vec![0.0; numel],
        }
    }

    pub fn scalar(value: f32) -> Self {
        Self {
            shape: Vec::new(),
            data: vec![value],
        }
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }
}

/// Compile-time evaluated value attached to an SSA register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HostValue {
    None,
    Int(i64),
    Double(f64),
    Bool(bool),
    Str(String),
    Tensor(TensorLiteral),
    IntList(Vec<i64>),
    DoubleList(Vec<f64>),
    BoolList(Vec<bool>),
    TensorList(Vec<TensorLiteral>),
    /// Heterogeneous list; elements may be live tensor handles.
    GenericList(Vec<HostValue>),
    /// Live target-network tensor wrapped so it can flow through evaluated
    /// lists without being materialized.
    BoxedTensor(TensorRef),
}

impl HostValue {
    /// Short name used in type-mismatch diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            HostValue::None => "None",
            HostValue::Int(_) => "int",
            HostValue::Double(_) => "float",
            HostValue::Bool(_) => "bool",
            HostValue::Str(_) => "str",
            HostValue::Tensor(_) => "Tensor",
            HostValue::IntList(_) => "int[]",
            HostValue::DoubleList(_) => "float[]",
            HostValue::BoolList(_) => "bool[]",
            HostValue::TensorList(_) => "Tensor[]",
            HostValue::GenericList(_) => "list",
            HostValue::BoxedTensor(_) => "boxed Tensor",
        }
    }

    /// Static type tag a tracer would assign to this value.
    pub fn type_tag(&self) -> TypeTag {
        match self {
            HostValue::None => TypeTag::NoneType,
            HostValue::Int(_) => TypeTag::Int,
            HostValue::Double(_) => TypeTag::Float,
            HostValue::Bool(_) => TypeTag::Bool,
            HostValue::Str(_) => TypeTag::Str,
            HostValue::Tensor(_) | HostValue::BoxedTensor(_) => TypeTag::Tensor,
            HostValue::IntList(_) => TypeTag::List(Box::new(TypeTag::Int)),
            HostValue::DoubleList(_) => TypeTag::List(Box::new(TypeTag::Float)),
            HostValue::BoolList(_) => TypeTag::List(Box::new(TypeTag::Bool)),
            HostValue::TensorList(_) | HostValue::GenericList(_) => {
                TypeTag::List(Box::new(TypeTag::Tensor))
            }
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, HostValue::None)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            HostValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            HostValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int_list(&self) -> Option<&[i64]> {
        match self {
            HostValue::IntList(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_tensor(&self) -> Option<&TensorLiteral> {
        match self {
            HostValue::Tensor(v) => Some(v),
            _ => None,
        }
    }
}
