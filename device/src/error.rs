use snafu::Snafu;

use crate::buffer::BufferId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Local work size does not evenly divide the global work size.
    #[snafu(display("invalid launch shape: global {global:?}, local {local:?}"))]
    InvalidLaunchShape { global: Vec<usize>, local: Vec<usize> },

    /// Buffer was not allocated on this device.
    #[snafu(display("unknown buffer {id}"))]
    UnknownBuffer { id: BufferId },

    #[snafu(display("size mismatch: expected {expected}, got {actual}"))]
    SizeMismatch { expected: usize, actual: usize },

    /// Kernel source was rejected by the compiler.
    #[snafu(display("failed to compile {name}: {reason}"))]
    Compile { name: String, reason: String },

    /// Kernel launch failed on the device.
    #[snafu(display("failed to execute {name}: {reason}"))]
    Execution { name: String, reason: String },
}
