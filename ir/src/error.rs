use snafu::Snafu;

use crate::shape::Shape;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Construction-time errors of the IR.
///
/// Every variant signals a caller bug: the requested shape transformation is
/// not expressible over the current shape. None of them are retried.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Reshape to a shape with a different element count.
    #[snafu(display("shape mismatch: cannot reshape {from:?} ({from_size} elements) into {to:?} ({to_size} elements)"))]
    ShapeMismatch { from: Shape, to: Shape, from_size: usize, to_size: usize },

    /// Permute argument is not a permutation of `0..ndim`.
    #[snafu(display("invalid permutation {axes:?}: expected permutation of 0..{ndim}"))]
    InvalidPermutation { axes: Vec<usize>, ndim: usize },

    /// Shapes must not contain zero-sized dimensions.
    #[snafu(display("zero-sized dimension in shape {shape:?}"))]
    ZeroDimension { shape: Shape },

    /// Per-dimension argument has the wrong rank.
    #[snafu(display("{operation}: argument has {actual} dimensions but shape has {expected}"))]
    DimensionMismatch { operation: &'static str, expected: usize, actual: usize },

    /// Strides and shape disagree in length.
    #[snafu(display("view has {shape_dims} shape dimensions but {stride_dims} strides"))]
    StrideRankMismatch { shape_dims: usize, stride_dims: usize },

    /// Expand can only broadcast dimensions of size 1.
    #[snafu(display("expand invalid: dimension {dim} has size {input} but needs to expand to {output}"))]
    ExpandInvalidDimension { dim: usize, input: usize, output: usize },

    /// Shrink range outside of the dimension.
    #[snafu(display("shrink bounds violation: dimension {dim} has range [{begin}, {end}) but size is {size}"))]
    ShrinkOutOfBounds { dim: usize, begin: usize, end: usize, size: usize },

    /// Stride argument of zero.
    #[snafu(display("stride of zero on dimension {dim}"))]
    ZeroStride { dim: usize },

    /// Reduce target shape incompatible with the source shape.
    #[snafu(display("cannot reduce {input:?} into {output:?}"))]
    ReduceShapeMismatch { input: Shape, output: Shape },
}
