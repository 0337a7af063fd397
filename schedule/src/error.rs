use snafu::Snafu;
use tessel_ir::Op;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("shape tracker error"))]
    Ir { source: tessel_ir::Error },

    #[snafu(display("device error"))]
    Device { source: tessel_device::Error },

    #[snafu(display("kernel AST reads no buffers"))]
    EmptyAst,

    #[snafu(display("kernel AST has {count} reduce nodes, at most one is supported"))]
    MultipleReduce { count: usize },

    #[snafu(display("{op} cannot appear inside a kernel AST"))]
    UnsupportedOp { op: Op },

    #[snafu(display("axis {axis} out of bounds for {shape_len} loop axes"))]
    AxisOutOfBounds { axis: usize, shape_len: usize },

    #[snafu(display("{order:?} is not a permutation of {rank} axes"))]
    InvalidAxisOrder { order: Vec<usize>, rank: usize },
}
