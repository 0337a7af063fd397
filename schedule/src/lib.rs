//! Kernel lowering and layout search for tessel.
//!
//! A finalized operation tree (an [`Ast`]) is lowered to a [`Kernel`]: one
//! shape tracker per buffer over a shared iteration space. The
//! [`optimizer`] rewrites that iteration space with [`Intervention`]s, times
//! every candidate on a [`Device`](tessel_device::Device) and keeps the
//! fastest layout.

pub mod error;
pub mod kernel;
pub mod optimizer;


pub use error::{Error, Result};
pub use kernel::{Ast, CompiledKernel, Kernel, KernelBuffer};
pub use optimizer::{Intervention, KernelCheck, ReferenceCheck, SearchConfig, SearchResult, search};
