//! Elementwise and processing dispatchers.

use std::rc::Rc;

use tessel_ir::{BinaryOp, ConvArgs, Op, ProcessingOp, UnaryOp};

use crate::{GraphSession, LazyBuffer, Result};

impl GraphSession {
    pub fn unary(&mut self, op: UnaryOp, x: &Rc<LazyBuffer>) -> Result<Rc<LazyBuffer>> {
        self.elementwise_op(Op::Unary(op), &[Rc::clone(x)])
    }

    pub fn binary(&mut self, op: BinaryOp, x: &Rc<LazyBuffer>, y: &Rc<LazyBuffer>) -> Result<Rc<LazyBuffer>> {
        self.elementwise_op(Op::Binary(op), &[Rc::clone(x), Rc::clone(y)])
    }

    pub fn add(&mut self, x: &Rc<LazyBuffer>, y: &Rc<LazyBuffer>) -> Result<Rc<LazyBuffer>> {
        self.binary(BinaryOp::Add, x, y)
    }

    pub fn mul(&mut self, x: &Rc<LazyBuffer>, y: &Rc<LazyBuffer>) -> Result<Rc<LazyBuffer>> {
        self.binary(BinaryOp::Mul, x, y)
    }

    pub fn relu(&mut self, x: &Rc<LazyBuffer>) -> Result<Rc<LazyBuffer>> {
        self.unary(UnaryOp::Relu, x)
    }

    /// Convolve `x` with weights `w`.
    pub fn conv(&mut self, x: &Rc<LazyBuffer>, w: &Rc<LazyBuffer>, args: ConvArgs) -> Result<Rc<LazyBuffer>> {
        self.processing_op(ProcessingOp::Conv, x, w, args)
    }
}
