use std::fmt;

use crate::shape::Shape;
use crate::types::{BinaryOp, ConvArgs, MovementOp, OpType, ProcessingOp, ReduceOp, UnaryOp};

/// An operation together with its argument.
///
/// This is the closed set of node kinds a [`crate::LazyOp`] can carry. Rewrite
/// rules match on the variant instead of inspecting node types at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Op {
    /// Leaf load of data that already exists (host data or a device buffer).
    Load,
    Unary(UnaryOp),
    Binary(BinaryOp),
    /// Reduce the source into `new_shape` (same rank, reduced dims are 1).
    Reduce { op: ReduceOp, new_shape: Shape },
    Movement(MovementOp),
    Processing { op: ProcessingOp, args: ConvArgs },
}

impl Op {
    /// Category of this operation, `None` for leaf loads.
    pub fn optype(&self) -> Option<OpType> {
        match self {
            Self::Load => None,
            Self::Unary(_) | Self::Binary(_) => Some(OpType::Elementwise),
            Self::Reduce { .. } => Some(OpType::Reduce),
            Self::Movement(_) => Some(OpType::Movement),
            Self::Processing { .. } => Some(OpType::Processing),
        }
    }

    pub fn is_elementwise(&self) -> bool {
        matches!(self, Self::Unary(_) | Self::Binary(_))
    }

    /// Number of sources the operation expects.
    pub fn arity(&self) -> usize {
        match self {
            Self::Load => 0,
            Self::Unary(_) | Self::Reduce { .. } | Self::Movement(_) => 1,
            Self::Binary(_) | Self::Processing { .. } => 2,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load => write!(f, "LOAD"),
            Self::Unary(op) => write!(f, "{op:?}"),
            Self::Binary(op) => write!(f, "{op:?}"),
            Self::Reduce { op, new_shape } => write!(f, "{op:?}{:?}", new_shape.as_slice()),
            Self::Movement(op) => write!(f, "{op:?}"),
            Self::Processing { op, args } => write!(f, "{op:?}{:?}", args.out_shape.as_slice()),
        }
    }
}
