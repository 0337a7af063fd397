//! Operation kinds of the lazy graph.
//!
//! Each family of operations is its own closed enum. [`crate::Op`] wraps them
//! together with their arguments.

use std::fmt;

use smallvec::SmallVec;

use crate::shape::Shape;

// ============================================================================
// Operation categories
// ============================================================================

/// Category of the operation that produces a lazy buffer.
///
/// Fusion decisions are made on this category, never on the concrete op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpType {
    /// Unary and binary pointwise math.
    Elementwise,
    /// Shape-only relabelling (reshape, permute, ...).
    Movement,
    /// Reductions. These block fusion into their input.
    Reduce,
    /// Convolution-like ops whose output epilogue can be fused.
    Processing,
}

// ============================================================================
// Elementwise operations
// ============================================================================

/// Unary operation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Identity: x
    Noop,
    /// Negation: -x
    Neg,
    /// Rectifier: max(x, 0)
    Relu,
    /// Natural exponential: e^x
    Exp,
    /// Natural logarithm: ln(x)
    Log,
    /// Sign: -1, 0 or 1
    Sign,
    /// Reciprocal: 1/x
    Reciprocal,
}

impl UnaryOp {
    /// Evaluate on the host.
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Self::Noop => x,
            Self::Neg => -x,
            Self::Relu => x.max(0.0),
            Self::Exp => x.exp(),
            Self::Log => x.ln(),
            Self::Sign => {
                if x > 0.0 {
                    1.0
                } else if x < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            }
            Self::Reciprocal => 1.0 / x,
        }
    }
}

/// Binary operation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// Addition: a + b
    Add,
    /// Subtraction: a - b
    Sub,
    /// Multiplication: a * b
    Mul,
    /// Division: a / b
    Div,
    /// Power: a^b
    Pow,
    /// Equality as float: 1.0 if a == b else 0.0
    CmpEq,
}

impl BinaryOp {
    /// Evaluate on the host.
    pub fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div => a / b,
            Self::Pow => a.powf(b),
            Self::CmpEq => f32::from(u8::from(a == b)),
        }
    }
}

// ============================================================================
// Reductions
// ============================================================================

/// Reduction operation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    /// Sum reduction (a + b).
    Sum,
    /// Maximum reduction (max(a, b)).
    Max,
}

impl ReduceOp {
    /// Identity element the accumulator starts from.
    pub fn identity(self) -> f32 {
        match self {
            Self::Sum => 0.0,
            Self::Max => f32::NEG_INFINITY,
        }
    }

    /// Fold one value into the accumulator.
    pub fn combine(self, acc: f32, value: f32) -> f32 {
        match self {
            Self::Sum => acc + value,
            Self::Max => acc.max(value),
        }
    }
}

// ============================================================================
// Movement operations
// ============================================================================

/// Per-dimension `(begin, end)` pairs for pad and shrink.
pub type Bounds = SmallVec<[(usize, usize); 4]>;

/// Shape-transforming operations, each carrying its argument.
///
/// None of them copy data: they are applied to a [`crate::ShapeTracker`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MovementOp {
    /// Reinterpret as a shape with the same element count.
    Reshape(Shape),
    /// Reorder axes; the argument is a permutation of `0..ndim`.
    Permute(SmallVec<[usize; 4]>),
    /// Broadcast size-1 dimensions.
    Expand(Shape),
    /// Zero-fill `(before, after)` elements per dimension.
    Pad(Bounds),
    /// Keep `[begin, end)` per dimension.
    Shrink(Bounds),
    /// Take every n-th element; negative values also reverse.
    Stride(SmallVec<[isize; 4]>),
}

impl MovementOp {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Reshape(_) => "reshape",
            Self::Permute(_) => "permute",
            Self::Expand(_) => "expand",
            Self::Pad(_) => "pad",
            Self::Shrink(_) => "shrink",
            Self::Stride(_) => "stride",
        }
    }
}

// ============================================================================
// Processing operations
// ============================================================================

/// Processing (convolution-like) operation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingOp {
    Conv,
}

/// Opaque convolution configuration.
///
/// Only compared for equality by fusion; the execution backend interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConvArgs {
    pub groups: usize,
    pub stride: (usize, usize),
    pub dilation: (usize, usize),
    /// Padding as (left, right, top, bottom).
    pub padding: (usize, usize, usize, usize),
    /// Shape of the convolution output.
    pub out_shape: Shape,
}

impl ConvArgs {
    pub fn new(out_shape: Shape) -> Self {
        Self { groups: 1, stride: (1, 1), dilation: (1, 1), padding: (0, 0, 0, 0), out_shape }
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Elementwise => write!(f, "Elementwise"),
            Self::Movement => write!(f, "Movement"),
            Self::Reduce => write!(f, "Reduce"),
            Self::Processing => write!(f, "Processing"),
        }
    }
}
