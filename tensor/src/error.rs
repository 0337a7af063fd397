use snafu::Snafu;
use tessel_ir::{Op, Shape};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("IR operation error"))]
    Ir { source: tessel_ir::Error },

    #[snafu(display("{op} takes {expected} sources, got {actual}"))]
    ElementwiseArity { op: Op, expected: usize, actual: usize },

    #[snafu(display("{op} is not an elementwise operation"))]
    NotElementwise { op: Op },

    #[snafu(display("elementwise sources disagree in shape: expected {expected:?}, got {actual:?}"))]
    SourceShapeMismatch { expected: Shape, actual: Shape },

    #[snafu(display("host data has {actual} elements but shape needs {expected}"))]
    HostDataMismatch { expected: usize, actual: usize },

    #[snafu(display("failed to materialize: {reason}"))]
    Materialize { reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
