//! Movement dispatchers.
//!
//! Thin wrappers over [`GraphSession::movement_op`] taking plain slices.

use std::rc::Rc;

use tessel_ir::{MovementOp, Shape};

use crate::{GraphSession, LazyBuffer, Result};

impl GraphSession {
    /// Reshape to a shape with the same element count.
    pub fn reshape(&mut self, x: &Rc<LazyBuffer>, shape: &[usize]) -> Result<Rc<LazyBuffer>> {
        self.movement_op(MovementOp::Reshape(Shape::from_slice(shape)), x)
    }

    /// Reorder dimensions; `axes` must be a permutation of `0..ndim`.
    pub fn permute(&mut self, x: &Rc<LazyBuffer>, axes: &[usize]) -> Result<Rc<LazyBuffer>> {
        self.movement_op(MovementOp::Permute(axes.into()), x)
    }

    /// Broadcast size-1 dimensions to `shape`.
    pub fn expand(&mut self, x: &Rc<LazyBuffer>, shape: &[usize]) -> Result<Rc<LazyBuffer>> {
        self.movement_op(MovementOp::Expand(Shape::from_slice(shape)), x)
    }

    /// Zero-fill `(before, after)` elements per dimension.
    pub fn pad(&mut self, x: &Rc<LazyBuffer>, padding: &[(usize, usize)]) -> Result<Rc<LazyBuffer>> {
        self.movement_op(MovementOp::Pad(padding.into()), x)
    }

    /// Keep `[begin, end)` per dimension.
    pub fn shrink(&mut self, x: &Rc<LazyBuffer>, bounds: &[(usize, usize)]) -> Result<Rc<LazyBuffer>> {
        self.movement_op(MovementOp::Shrink(bounds.into()), x)
    }

    /// Take every n-th element per dimension; negative steps reverse.
    pub fn stride(&mut self, x: &Rc<LazyBuffer>, steps: &[isize]) -> Result<Rc<LazyBuffer>> {
        self.movement_op(MovementOp::Stride(steps.into()), x)
    }
}
