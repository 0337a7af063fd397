//! Shape utilities.
//!
//! Shapes here are always concrete: every dimension is a positive integer.
//! Strides and offsets are signed because padding and reversal move the base
//! offset below zero.

use smallvec::SmallVec;
use snafu::ensure;

use crate::{Result, error::*};

/// Shape type - sequence of dimension sizes.
///
/// Uses SmallVec with inline capacity of 4 to avoid heap allocation for
/// common tensor ranks.
pub type Shape = SmallVec<[usize; 4]>;

/// Element strides, one per dimension.
pub type Strides = SmallVec<[isize; 4]>;

/// Total number of elements.
///
/// # Examples
///
/// ```rust
/// # use tessel_ir::shape::prod;
/// assert_eq!(prod(&[2, 3, 4]), 24);
/// assert_eq!(prod(&[]), 1);
/// ```
pub fn prod(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Reject shapes containing a zero-sized dimension.
pub fn validate_shape(shape: &[usize]) -> Result<()> {
    ensure!(shape.iter().all(|&d| d > 0), ZeroDimensionSnafu { shape: Shape::from_slice(shape) });
    Ok(())
}

/// Row-major strides for a contiguous buffer of `shape`.
///
/// Size-1 dimensions get stride 0 so that two contiguous views of shapes that
/// differ only in unit dimensions compare equal after canonicalization.
///
/// # Examples
///
/// ```rust
/// # use tessel_ir::shape::strides_for_shape;
/// assert_eq!(strides_for_shape(&[3, 4, 5]).as_slice(), &[20, 5, 1]);
/// assert_eq!(strides_for_shape(&[3, 1, 5]).as_slice(), &[5, 0, 1]);
/// ```
pub fn strides_for_shape(shape: &[usize]) -> Strides {
    let mut strides: Strides = SmallVec::from_elem(0, shape.len());
    let mut acc = 1isize;
    for (i, &dim) in shape.iter().enumerate().rev() {
        strides[i] = if dim == 1 { 0 } else { acc };
        acc *= dim as isize;
    }
    strides
}

/// Split a flat row-major index into per-dimension indices.
pub fn unravel(mut flat: usize, shape: &[usize]) -> Shape {
    let mut idx: Shape = SmallVec::from_elem(0, shape.len());
    for (i, &dim) in shape.iter().enumerate().rev() {
        idx[i] = flat % dim;
        flat /= dim;
    }
    idx
}

/// Advance `idx` to the next row-major index within `shape`.
///
/// Returns `false` once every index has been visited.
pub fn next_index(idx: &mut [usize], shape: &[usize]) -> bool {
    for i in (0..shape.len()).rev() {
        idx[i] += 1;
        if idx[i] < shape[i] {
            return true;
        }
        idx[i] = 0;
    }
    false
}
