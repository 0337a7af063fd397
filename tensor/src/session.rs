//! Graph construction with fusion.
//!
//! Four constructors build every non-host lazy buffer. Each applies its
//! fusion policy by matching on the op category of its sources:
//!
//! - [`GraphSession::elementwise_op`] splices elementwise sources into one
//!   tree and folds elementwise epilogues into processing (convolution) nodes.
//! - [`GraphSession::movement_op`] drops identity movements, pushes movements
//!   below elementwise trees onto their leaves, and chains consecutive
//!   movements into one node tree.
//! - [`GraphSession::reduce_op`] and [`GraphSession::processing_op`] never
//!   fuse their inputs.
//!
//! Elementwise and movement constructors are memoized per session by operator
//! and source identity: asking twice returns the same `Rc`.

use std::collections::HashMap;
use std::rc::Rc;

use bon::bon;
use smallvec::SmallVec;
use snafu::{ResultExt, ensure};
use tessel_ir::error::ReduceShapeMismatchSnafu;
use tessel_ir::shape::{prod, validate_shape};
use tessel_ir::{ConvArgs, LazyOp, MovementOp, Op, OpType, ProcessingOp, ReduceOp, Shape, ShapeTracker, Src};
use tracing::trace;

use crate::error::*;
use crate::{BufferId, LazyBuffer, LazyNode, LazySrc};

// ============================================================================
// FUSION POLICY
// ============================================================================

/// Switches for the individual rewrite rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FusionConfig {
    /// Push movement ops below elementwise trees onto their leaves.
    pub shuffle_movement_ops: bool,
    /// Also push pads below elementwise trees. Only sound when every op in the
    /// tree maps zero to zero.
    pub shuffle_pad_ops: bool,
    /// Chain a movement onto a movement-typed source instead of nesting buffers.
    pub merge_movement_ops: bool,
    /// Splice elementwise sources into one tree.
    pub merge_elementwise_ops: bool,
    /// Fold elementwise ops over a processing result into its node.
    pub merge_elementwise_into_processing: bool,
}

#[bon]
impl FusionConfig {
    #[builder]
    pub fn new(
        #[builder(default = true)] shuffle_movement_ops: bool,
        #[builder(default = false)] shuffle_pad_ops: bool,
        #[builder(default = true)] merge_movement_ops: bool,
        #[builder(default = true)] merge_elementwise_ops: bool,
        #[builder(default = true)] merge_elementwise_into_processing: bool,
    ) -> Self {
        Self {
            shuffle_movement_ops,
            shuffle_pad_ops,
            merge_movement_ops,
            merge_elementwise_ops,
            merge_elementwise_into_processing,
        }
    }

    /// Every rule disabled.
    pub fn unfused() -> Self {
        Self::builder()
            .shuffle_movement_ops(false)
            .merge_movement_ops(false)
            .merge_elementwise_ops(false)
            .merge_elementwise_into_processing(false)
            .build()
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

// ============================================================================
// SESSION
// ============================================================================

type ElementwiseKey = (Op, SmallVec<[BufferId; 2]>);

/// Memo scope of one graph build.
///
/// Caches live as long as the session and are keyed by buffer identity, so
/// unrelated graph builds never share (or leak) entries.
#[derive(Debug, Default)]
pub struct GraphSession {
    config: FusionConfig,
    elementwise_cache: HashMap<ElementwiseKey, Rc<LazyBuffer>>,
    movement_cache: HashMap<(MovementOp, BufferId), Rc<LazyBuffer>>,
}

impl GraphSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FusionConfig) -> Self {
        Self { config, ..Self::default() }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Number of memoized `(elementwise, movement)` results.
    pub fn cache_len(&self) -> (usize, usize) {
        (self.elementwise_cache.len(), self.movement_cache.len())
    }

    /// Wrap host data as a leaf buffer.
    pub fn from_host(&mut self, shape: &[usize], data: impl Into<Rc<[f32]>>) -> Result<Rc<LazyBuffer>> {
        validate_shape(shape).context(IrSnafu)?;
        let data = data.into();
        ensure!(data.len() == prod(shape), HostDataMismatchSnafu { expected: prod(shape), actual: data.len() });
        Ok(LazyBuffer::host(shape, data))
    }

    /// Apply a unary or binary op to same-shaped sources.
    pub fn elementwise_op(&mut self, op: Op, srcs: &[Rc<LazyBuffer>]) -> Result<Rc<LazyBuffer>> {
        ensure!(op.is_elementwise(), NotElementwiseSnafu { op: op.clone() });
        ensure!(
            srcs.len() == op.arity(),
            ElementwiseAritySnafu { op: op.clone(), expected: op.arity(), actual: srcs.len() }
        );
        let out_shape = Shape::from_slice(srcs[0].shape());
        if let Some(bad) = srcs.iter().find(|s| s.shape() != out_shape.as_slice()) {
            return SourceShapeMismatchSnafu { expected: out_shape, actual: Shape::from_slice(bad.shape()) }.fail();
        }

        let key: ElementwiseKey = (op.clone(), srcs.iter().map(|s| s.id()).collect());
        if let Some(hit) = self.elementwise_cache.get(&key) {
            return Ok(Rc::clone(hit));
        }
        let out = self.fuse_elementwise(op, srcs, &out_shape);
        trace!(id = %out.id(), optype = ?out.optype(), tree = %out.op(), "elementwise");
        self.elementwise_cache.insert(key, Rc::clone(&out));
        Ok(out)
    }

    fn fuse_elementwise(&self, op: Op, srcs: &[Rc<LazyBuffer>], out_shape: &[usize]) -> Rc<LazyBuffer> {
        let splice = |category: OpType| -> Vec<LazySrc> {
            srcs.iter()
                .map(|s| if s.is_lazy(category) { Src::Op(Rc::clone(s.op())) } else { Src::Leaf(Rc::clone(s)) })
                .collect()
        };

        if self.config.merge_elementwise_into_processing {
            let processing: Vec<_> = srcs.iter().filter(|s| s.is_lazy(OpType::Processing)).collect();
            let fusable = match processing.as_slice() {
                [_] => true,
                [a, b] => same_processing(a, b),
                _ => false,
            };
            if fusable {
                return LazyBuffer::new(out_shape, OpType::Processing, LazyOp::new(op, splice(OpType::Processing)));
            }
        }

        let src = if self.config.merge_elementwise_ops {
            splice(OpType::Elementwise)
        } else {
            srcs.iter().map(|s| Src::Leaf(Rc::clone(s))).collect()
        };
        LazyBuffer::new(out_shape, OpType::Elementwise, LazyOp::new(op, src))
    }

    /// Apply a movement op.
    ///
    /// Returns `x` itself when the movement leaves its shape and layout
    /// untouched.
    pub fn movement_op(&mut self, op: MovementOp, x: &Rc<LazyBuffer>) -> Result<Rc<LazyBuffer>> {
        let key = (op, x.id());
        if let Some(hit) = self.movement_cache.get(&key) {
            return Ok(Rc::clone(hit));
        }
        let op = &key.0;

        let st = ShapeTracker::new(x.shape()).and_then(|st| st.movement_op(op)).context(IrSnafu)?;
        let out = if st.is_identity(x.shape()) {
            Rc::clone(x)
        } else if self.config.shuffle_movement_ops
            && x.is_lazy(OpType::Elementwise)
            && (self.config.shuffle_pad_ops || !matches!(op, MovementOp::Pad(_)))
        {
            let tree = x.op().map_leaves(&mut |leaf: &Rc<LazyBuffer>| self.movement_op(op.clone(), leaf))?;
            LazyBuffer::new(st.shape(), OpType::Elementwise, tree)
        } else {
            let src = if self.config.merge_movement_ops && x.is_lazy(OpType::Movement) {
                Src::Op(Rc::clone(x.op()))
            } else {
                Src::Leaf(Rc::clone(x))
            };
            LazyBuffer::new(st.shape(), OpType::Movement, LazyOp::new(Op::Movement(op.clone()), vec![src]))
        };
        trace!(id = %out.id(), op = op.name(), shape = ?out.shape(), "movement");
        self.movement_cache.insert(key, Rc::clone(&out));
        Ok(out)
    }

    /// Reduce `x` into `new_shape`: same rank, every dim either kept or 1.
    pub fn reduce_op(&mut self, op: ReduceOp, x: &Rc<LazyBuffer>, new_shape: &[usize]) -> Result<Rc<LazyBuffer>> {
        let valid = new_shape.len() == x.shape().len()
            && x.shape().iter().zip(new_shape).all(|(&input, &output)| output == input || output == 1);
        if !valid {
            let source =
                ReduceShapeMismatchSnafu { input: Shape::from_slice(x.shape()), output: Shape::from_slice(new_shape) }
                    .build();
            return Err(Error::Ir { source });
        }
        let node = LazyOp::new(Op::Reduce { op, new_shape: Shape::from_slice(new_shape) }, vec![Src::Leaf(Rc::clone(x))]);
        Ok(LazyBuffer::new(new_shape, OpType::Reduce, node))
    }

    /// Wrap a convolution-like op; its shape is `args.out_shape`.
    pub fn processing_op(
        &mut self,
        op: ProcessingOp,
        x: &Rc<LazyBuffer>,
        w: &Rc<LazyBuffer>,
        args: ConvArgs,
    ) -> Result<Rc<LazyBuffer>> {
        validate_shape(&args.out_shape).context(IrSnafu)?;
        let out_shape = args.out_shape.clone();
        let node = LazyOp::new(Op::Processing { op, args }, vec![Src::Leaf(Rc::clone(x)), Src::Leaf(Rc::clone(w))]);
        Ok(LazyBuffer::new(&out_shape, OpType::Processing, node))
    }
}

/// First processing node in a buffer's tree.
pub fn find_processing(buffer: &LazyBuffer) -> Option<&LazyNode> {
    buffer.op().find(|op| op.optype() == Some(OpType::Processing))
}

/// Whether two processing-typed buffers trace back to the same invocation:
/// equal op and config over identical operands.
fn same_processing(a: &LazyBuffer, b: &LazyBuffer) -> bool {
    let (Some(pa), Some(pb)) = (find_processing(a), find_processing(b)) else {
        return false;
    };
    pa.op() == pb.op() && pa.src().len() == pb.src().len() && pa.src().iter().zip(pb.src()).all(|(x, y)| same_src(x, y))
}

fn same_src(a: &LazySrc, b: &LazySrc) -> bool {
    match (a, b) {
        (Src::Leaf(x), Src::Leaf(y)) => x.id() == y.id(),
        (Src::Op(x), Src::Op(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}
