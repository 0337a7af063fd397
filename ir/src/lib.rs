//! Intermediate representation for the tessel lazy tensor compiler.
//!
//! # Module Organization
//!
//! - [`types`] - Operation kinds grouped by category
//! - [`op`] - [`Op`], an operation together with its argument
//! - [`lazy`] - [`LazyOp`] operation trees over shared leaves
//! - [`shape`] - Shape helpers
//! - [`view`] - Strided (and masked) views over a flat buffer
//! - [`shape_tracker`] - Stacks of views for zero-copy movement ops
//! - [`error`] - Error types and result handling

pub mod error;
pub mod lazy;
pub mod op;
pub mod shape;
pub mod shape_tracker;
pub mod types;
pub mod view;


pub use error::{Error, Result};
pub use lazy::{LazyOp, Src};
pub use op::Op;
pub use shape::{Shape, Strides};
pub use shape_tracker::ShapeTracker;
pub use types::{BinaryOp, Bounds, ConvArgs, MovementOp, OpType, ProcessingOp, ReduceOp, UnaryOp};
pub use view::View;
