//! Lazy tensor graphs.
//!
//! Tensor-level calls on a [`GraphSession`] return [`LazyBuffer`]s: deferred
//! results whose operation trees are fused and simplified as they are built.
//! Nothing is computed until [`LazyBuffer::realize`] hands each buffer to a
//! [`Materializer`].
//!
//! # Examples
//!
//! ```
//! # use tessel_tensor::GraphSession;
//! # use tessel_ir::{BinaryOp, UnaryOp};
//! let mut session = GraphSession::new();
//! let a = session.from_host(&[4], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
//! let b = session.from_host(&[4], vec![4.0, 3.0, 2.0, 1.0]).unwrap();
//! let c = session.binary(BinaryOp::Mul, &a, &b).unwrap();
//! let d = session.unary(UnaryOp::Relu, &c).unwrap();
//! // Both ops live in one fused tree over the two host buffers.
//! assert_eq!(d.op().to_string(), format!("Relu(Mul({a}, {b}))"));
//! ```

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tessel_ir::{LazyOp, OpType, Shape, Src};

pub mod error;
pub mod arithmetic;
pub mod realize;
pub mod reduce;
pub mod session;
pub mod shape_ops;


pub use error::{Error, Result};
pub use realize::{Materializer, OpLog, OpLogEntry};
pub use session::{FusionConfig, GraphSession};

/// Operation tree whose leaves are lazy buffers.
pub type LazyNode = LazyOp<Rc<LazyBuffer>>;

/// Source of a [`LazyNode`].
pub type LazySrc = Src<Rc<LazyBuffer>>;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(0);

/// Generation stamp identifying a lazy buffer for memoization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

impl BufferId {
    fn fresh() -> Self {
        Self(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lb{}", self.0)
    }
}

/// Deferred result of a tensor operation.
///
/// A lazy buffer owns its operation tree down to (not including) the lazy
/// buffers at its leaves, which are shared with other buffers. The only state
/// that changes after construction is the realized flag, and it flips once.
pub struct LazyBuffer {
    id: BufferId,
    shape: Shape,
    optype: Option<OpType>,
    op: Rc<LazyNode>,
    host: Option<Rc<[f32]>>,
    realized: Cell<bool>,
}

impl LazyBuffer {
    pub(crate) fn new(shape: &[usize], optype: OpType, op: Rc<LazyNode>) -> Rc<Self> {
        Rc::new(Self {
            id: BufferId::fresh(),
            shape: Shape::from_slice(shape),
            optype: Some(optype),
            op,
            host: None,
            realized: Cell::new(false),
        })
    }

    pub(crate) fn host(shape: &[usize], data: Rc<[f32]>) -> Rc<Self> {
        Rc::new(Self {
            id: BufferId::fresh(),
            shape: Shape::from_slice(shape),
            optype: None,
            op: LazyOp::new(tessel_ir::Op::Load, Vec::new()),
            host: Some(data),
            realized: Cell::new(false),
        })
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Category of the producing op, `None` for host data.
    pub fn optype(&self) -> Option<OpType> {
        self.optype
    }

    pub fn op(&self) -> &Rc<LazyNode> {
        &self.op
    }

    /// Host data of a leaf created from host memory.
    pub fn host_data(&self) -> Option<&[f32]> {
        self.host.as_deref()
    }

    pub fn is_realized(&self) -> bool {
        self.realized.get()
    }

    /// Whether this buffer's tree is still open for splicing into consumers.
    pub(crate) fn is_lazy(&self, optype: OpType) -> bool {
        self.optype == Some(optype) && !self.is_realized()
    }

    /// Lazy buffers at the leaves of this buffer's tree, first occurrence order.
    pub fn sources(&self) -> Vec<&LazyBuffer> {
        let mut seen = std::collections::HashSet::new();
        self.op.leaves().into_iter().map(Rc::as_ref).filter(|b| seen.insert(b.id)).collect()
    }
}

impl fmt::Display for LazyBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl fmt::Debug for LazyBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyBuffer")
            .field("id", &self.id)
            .field("shape", &self.shape.as_slice())
            .field("optype", &self.optype)
            .field("realized", &self.realized.get())
            .finish_non_exhaustive()
    }
}
