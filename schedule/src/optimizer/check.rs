//! Final correctness check of a tuned kernel.

use std::rc::Rc;

use tessel_device::Device;

use crate::kernel::{Ast, Kernel};

/// Validates a transformed kernel against the AST it was built from.
///
/// Runs once after search. A mismatch means the search produced a layout that
/// changes results, so implementations panic instead of returning an error.
pub trait KernelCheck {
    fn check(&self, kernel: &Kernel, ast: &Rc<Ast>);
}

/// Accepts every kernel.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCheck;

impl KernelCheck for NoCheck {
    fn check(&self, _: &Kernel, _: &Rc<Ast>) {}
}

/// Compares the transformed kernel with a freshly built one on host copies of
/// the inputs.
pub struct ReferenceCheck<'d> {
    device: &'d dyn Device,
    tolerance: f32,
}

impl<'d> ReferenceCheck<'d> {
    pub fn new(device: &'d dyn Device) -> Self {
        Self { device, tolerance: 1e-4 }
    }

    /// Relative tolerance; reordered reductions round differently.
    pub fn with_tolerance(mut self, tolerance: f32) -> Self {
        self.tolerance = tolerance;
        self
    }

    fn close(&self, actual: f32, expected: f32) -> bool {
        (actual.is_nan() && expected.is_nan())
            || actual == expected
            || (actual - expected).abs() <= self.tolerance * expected.abs().max(1.0)
    }
}

impl KernelCheck for ReferenceCheck<'_> {
    fn check(&self, kernel: &Kernel, ast: &Rc<Ast>) {
        let inputs: Vec<Vec<f32>> = kernel.bufs()[1..]
            .iter()
            .map(|buffer| self.device.read(buffer))
            .collect::<Result<_, _>>()
            .expect("kernel inputs must be readable from the device");
        let reference = Kernel::new(ast, kernel.output().clone()).expect("AST lowered once already");

        let expected = reference.interpret(&inputs).expect("reference kernel evaluates");
        let actual = kernel.interpret(&inputs).expect("tuned kernel evaluates");
        assert_eq!(actual.len(), expected.len(), "kernel {} changed its output size", kernel.name());
        for (i, (&a, &e)) in actual.iter().zip(&expected).enumerate() {
            assert!(self.close(a, e), "kernel {} differs at output {i}: got {a}, expected {e}", kernel.name());
        }
    }
}
