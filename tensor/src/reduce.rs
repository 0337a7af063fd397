//! Reduction dispatchers.

use std::rc::Rc;

use tessel_ir::ReduceOp;

use crate::{GraphSession, LazyBuffer, Result};

impl GraphSession {
    /// Sum over every dimension where `new_shape` is 1.
    pub fn sum(&mut self, x: &Rc<LazyBuffer>, new_shape: &[usize]) -> Result<Rc<LazyBuffer>> {
        self.reduce_op(ReduceOp::Sum, x, new_shape)
    }

    /// Maximum over every dimension where `new_shape` is 1.
    pub fn max(&mut self, x: &Rc<LazyBuffer>, new_shape: &[usize]) -> Result<Rc<LazyBuffer>> {
        self.reduce_op(ReduceOp::Max, x, new_shape)
    }
}
