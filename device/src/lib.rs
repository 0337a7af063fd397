//! Device contract consumed by kernel lowering and search.
//!
//! A device allocates flat `f32` buffers, compiles kernel source into
//! [`Program`]s and launches them with a [`LaunchShape`], reporting start and
//! end timestamps on its own clock as an [`Event`]. [`sim::SimDevice`] is a
//! host-memory implementation with a pluggable cost model.

pub mod allocator;
pub mod buffer;
pub mod device;
pub mod error;
pub mod launch;
pub mod sim;


pub use allocator::Allocator;
pub use buffer::{Buffer, BufferId};
pub use device::{Compiler, Device, Event, Program};
pub use error::{Error, Result};
pub use launch::LaunchShape;
pub use sim::SimDevice;
