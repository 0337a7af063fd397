//! Compile-and-run contract of a compute target.
//!
//! The search only ever needs four things from a backend: turn kernel source
//! into a launchable [`Program`], launch it over buffers, drain the queue, and
//! convert the device clock to nanoseconds.

use crate::allocator::Allocator;
use crate::buffer::Buffer;
use crate::error::Result;
use crate::launch::LaunchShape;

/// Start and end timestamps of one launch, in device clock ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub start: u64,
    pub end: u64,
}

impl Event {
    /// Elapsed time in nanoseconds given the device's tick length.
    ///
    /// Only meaningful after [`Device::synchronize`].
    pub fn elapsed(&self, timing_scale: f64) -> f64 {
        self.end.saturating_sub(self.start) as f64 * timing_scale
    }
}

/// A compiled, launchable kernel.
pub trait Program {
    /// Enqueue the kernel over `buffers` (positional arguments).
    fn launch(&self, shape: &LaunchShape, buffers: &[Buffer]) -> Result<Event>;

    /// Kernel entry name.
    fn name(&self) -> &str;
}

/// Turns kernel source into programs.
pub trait Compiler {
    fn compile(&self, name: &str, src: &str) -> Result<Box<dyn Program>>;
}

/// A complete compute target.
pub trait Device: Allocator + Compiler {
    fn name(&self) -> &str;

    /// Block until all enqueued work has finished.
    fn synchronize(&self) -> Result<()>;

    /// Nanoseconds per device clock tick.
    fn timing_scale(&self) -> f64;
}
