//! Lowering of one operation tree to a device kernel.
//!
//! A [`Kernel`] owns one shape tracker per buffer it touches: `sts[0]` for the
//! output, `sts[i]` for `bufs[i]`. All trackers share a rank. An axis where
//! the output tracker is 1 but an input is not is a reduce axis. Construction
//! drops axes that are 1 everywhere and moves reduce axes behind the output
//! axes, so `[0, first_reduce)` are output axes and `[first_reduce, shape_len)`
//! are reduce axes. Upcasted axes trail the loop axes.
//!
//! Layout transformations only touch the trackers. The operation tree itself
//! is fixed at construction, with leaves relabeled to buffer slots.

mod interpret;
mod render;

use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;
use snafu::{ResultExt, ensure};
use tessel_device::{Buffer, Device, Event, LaunchShape, Program};
use tessel_ir::error::{DimensionMismatchSnafu, ExpandInvalidDimensionSnafu, ShapeMismatchSnafu};
use tessel_ir::shape::prod;
use tessel_ir::{LazyOp, MovementOp, Op, ReduceOp, Shape, ShapeTracker, Src};
use tracing::trace;

use crate::error::*;

/// A device buffer together with the view a kernel reads it through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelBuffer {
    pub buffer: Buffer,
    pub st: ShapeTracker,
}

impl KernelBuffer {
    pub fn new(buffer: Buffer, st: ShapeTracker) -> Self {
        Self { buffer, st }
    }
}

impl fmt::Display for KernelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.buffer.id(), self.st.shape())
    }
}

/// Operation tree handed to kernel lowering.
pub type Ast = LazyOp<KernelBuffer>;

/// Mutable lowering state for one AST.
#[derive(Debug, Clone)]
pub struct Kernel {
    ast: Rc<LazyOp<usize>>,
    bufs: Vec<Buffer>,
    sts: Vec<ShapeTracker>,
    upcasted: usize,
}

/// Root with a trailing output reshape removed.
fn strip_reshape(ast: &Rc<Ast>) -> (Rc<Ast>, Option<&Shape>) {
    if let Op::Movement(MovementOp::Reshape(shape)) = ast.op()
        && let [src] = ast.src()
    {
        let root = match src {
            Src::Op(op) => Rc::clone(op),
            Src::Leaf(leaf) => LazyOp::new(Op::Unary(tessel_ir::UnaryOp::Noop), vec![Src::Leaf(leaf.clone())]),
        };
        return (root, Some(shape));
    }
    (Rc::clone(ast), None)
}

/// Shape of the output in the iteration space.
fn output_shape(root: &Ast, full: &[usize]) -> Shape {
    match root.find(|op| matches!(op, Op::Reduce { .. })).map(|node| node.op()) {
        Some(Op::Reduce { new_shape, .. }) => new_shape.clone(),
        _ => Shape::from_slice(full),
    }
}

fn validate(root: &Ast) -> Result<()> {
    let mut reduces = 0usize;
    for op in root.ops() {
        match op {
            Op::Unary(_) | Op::Binary(_) => {}
            Op::Reduce { .. } => reduces += 1,
            Op::Movement(_) | Op::Processing { .. } | Op::Load => return UnsupportedOpSnafu { op: op.clone() }.fail(),
        }
    }
    ensure!(reduces <= 1, MultipleReduceSnafu { count: reduces });
    Ok(())
}

/// Per-axis maximum over leaf shapes, checking every leaf is full or 1 on each axis.
fn full_shape_of(leaves: &[&KernelBuffer]) -> Result<Shape> {
    let Some(first) = leaves.first() else {
        return EmptyAstSnafu.fail();
    };
    let rank = first.st.shape().len();
    let mut full = Shape::from_elem(1, rank);
    for leaf in leaves {
        let shape = leaf.st.shape();
        if shape.len() != rank {
            let source = DimensionMismatchSnafu { operation: "kernel leaf", expected: rank, actual: shape.len() }.build();
            return Err(Error::Ir { source });
        }
        for (f, &d) in full.iter_mut().zip(shape) {
            *f = (*f).max(d);
        }
    }
    check_broadcast(leaves.iter().map(|leaf| leaf.st.shape()), &full)?;
    Ok(full)
}

fn check_broadcast<'a>(shapes: impl IntoIterator<Item = &'a [usize]>, full: &[usize]) -> Result<()> {
    for shape in shapes {
        if shape.len() != full.len() {
            let source =
                DimensionMismatchSnafu { operation: "kernel output", expected: full.len(), actual: shape.len() }.build();
            return Err(Error::Ir { source });
        }
        if let Some(dim) = shape.iter().zip(full).position(|(&d, &f)| d != f && d != 1) {
            return Err(Error::Ir {
                source: ExpandInvalidDimensionSnafu { dim, input: shape[dim], output: full[dim] }.build(),
            });
        }
    }
    Ok(())
}

impl Kernel {
    /// Number of elements the kernel for `ast` writes.
    pub fn output_len(ast: &Rc<Ast>) -> Result<usize> {
        let (root, reshape) = strip_reshape(ast);
        validate(&root)?;
        let full = full_shape_of(&root.leaves())?;
        let out = output_shape(&root, &full);
        check_broadcast([out.as_slice()], &full)?;
        if let Some(reshape) = reshape
            && prod(reshape) != prod(&out)
        {
            let source =
                ShapeMismatchSnafu { from: out.clone(), to: reshape.clone(), from_size: prod(&out), to_size: prod(reshape) }
                    .build();
            return Err(Error::Ir { source });
        }
        Ok(prod(&out))
    }

    /// Build the kernel for `ast`, writing into `output`.
    ///
    /// Leaves equal in both buffer and tracker share a slot in `bufs`.
    pub fn new(ast: &Rc<Ast>, output: Buffer) -> Result<Self> {
        let out_len = Self::output_len(ast)?;
        if output.len() != out_len {
            let source = tessel_device::error::SizeMismatchSnafu { expected: out_len, actual: output.len() }.build();
            return Err(Error::Device { source });
        }

        let (root, _) = strip_reshape(ast);
        let leaves = root.leaves();
        let full = full_shape_of(&leaves)?;
        let out_shape = output_shape(&root, &full);

        let mut unique: Vec<&KernelBuffer> = Vec::new();
        for leaf in leaves {
            if !unique.contains(&leaf) {
                unique.push(leaf);
            }
        }
        let slots = root.map_leaves(&mut |leaf: &KernelBuffer| {
            Ok::<_, std::convert::Infallible>(1 + unique.iter().position(|u| *u == leaf).unwrap_or_default())
        });
        let ast = match slots {
            Ok(ast) => ast,
            Err(never) => match never {},
        };

        let mut sts = Vec::with_capacity(unique.len() + 1);
        sts.push(ShapeTracker::new(&out_shape).context(IrSnafu)?);
        sts.extend(unique.iter().map(|leaf| leaf.st.clone()));
        let mut bufs = Vec::with_capacity(sts.len());
        bufs.push(output);
        bufs.extend(unique.iter().map(|leaf| leaf.buffer.clone()));

        let mut kernel = Self { ast, bufs, sts, upcasted: 0 };
        kernel.simplify_ones()?;
        kernel.reduce_axes_last()?;
        trace!(name = %kernel.name(), bufs = kernel.bufs.len(), first_reduce = kernel.first_reduce(), "kernel built");
        Ok(kernel)
    }

    /// Drop axes that are 1 in every tracker, keeping at least one axis.
    fn simplify_ones(&mut self) -> Result<()> {
        let full = self.full_shape();
        let keep: Vec<usize> = (0..full.len()).filter(|&i| full[i] != 1).collect();
        if keep.len() == full.len() {
            return Ok(());
        }
        let squeeze = |shape: &[usize]| -> Vec<usize> {
            let out: Vec<usize> = keep.iter().map(|&i| shape[i]).collect();
            if out.is_empty() { vec![1] } else { out }
        };
        let rank = keep.len().max(1);
        self.reshape_and_permute(Some(&squeeze), &(0..rank).collect::<Vec<_>>())
    }

    fn reduce_axes_last(&mut self) -> Result<()> {
        let full = self.full_shape();
        let out = self.sts[0].shape();
        let (reduce, keep): (Vec<usize>, Vec<usize>) = (0..full.len()).partition(|&i| out[i] == 1 && full[i] != 1);
        if reduce.is_empty() {
            return Ok(());
        }
        let order: Vec<usize> = keep.into_iter().chain(reduce).collect();
        self.reshape_and_permute(None, &order)
    }

    /// Leaves are indices into [`Kernel::bufs`].
    pub fn ast(&self) -> &Rc<LazyOp<usize>> {
        &self.ast
    }

    /// Buffers to pass to the program, output first.
    pub fn bufs(&self) -> &[Buffer] {
        &self.bufs
    }

    pub fn output(&self) -> &Buffer {
        &self.bufs[0]
    }

    pub fn sts(&self) -> &[ShapeTracker] {
        &self.sts
    }

    pub fn upcasted(&self) -> usize {
        self.upcasted
    }

    /// Number of loop axes; upcasted axes are not counted.
    pub fn shape_len(&self) -> usize {
        self.sts[0].shape().len() - self.upcasted
    }

    /// Per-axis maximum over all trackers.
    pub fn full_shape(&self) -> Shape {
        let mut full = Shape::from_slice(self.sts[0].shape());
        for st in &self.sts[1..] {
            for (f, &d) in full.iter_mut().zip(st.shape()) {
                *f = (*f).max(d);
            }
        }
        full
    }

    /// First loop axis the output does not span, or `shape_len` without one.
    pub fn first_reduce(&self) -> usize {
        let full = self.full_shape();
        let out = self.sts[0].shape();
        (0..self.shape_len()).find(|&i| out[i] != full[i]).unwrap_or(self.shape_len())
    }

    pub fn reduce_op(&self) -> Option<ReduceOp> {
        match self.ast.find(|op| matches!(op, Op::Reduce { .. }))?.op() {
            Op::Reduce { op, .. } => Some(*op),
            _ => None,
        }
    }

    /// Entry point name: `r_` for reducing kernels, `E_` otherwise, then the
    /// loop axis sizes.
    pub fn name(&self) -> String {
        let prefix = if self.reduce_op().is_some() { "r" } else { "E" };
        let full = self.full_shape();
        let mut name = String::from(prefix);
        for d in &full[..self.shape_len()] {
            name.push_str(&format!("_{d}"));
        }
        name
    }

    /// Reshape every tracker with `reshape` (if given), then permute the loop
    /// axes by `order`. Upcasted axes stay at the end.
    ///
    /// Either every tracker is updated or none is.
    pub fn reshape_and_permute(
        &mut self,
        reshape: Option<&dyn Fn(&[usize]) -> Vec<usize>>,
        order: &[usize],
    ) -> Result<()> {
        let mut sts: Vec<ShapeTracker> = match reshape {
            Some(f) => self
                .sts
                .iter()
                .map(|st| st.movement_op(&MovementOp::Reshape(Shape::from_vec(f(st.shape())))))
                .collect::<tessel_ir::Result<_>>()
                .context(IrSnafu)?,
            None => self.sts.clone(),
        };

        let rank = sts[0].shape().len();
        ensure!(sts.iter().all(|st| st.shape().len() == rank), InvalidAxisOrderSnafu { order: order.to_vec(), rank });
        let loop_len = rank.checked_sub(self.upcasted).unwrap_or_default();
        let mut seen = vec![false; loop_len];
        let is_permutation = order.len() == loop_len
            && order.iter().all(|&a| a < loop_len && !std::mem::replace(&mut seen[a], true));
        ensure!(is_permutation, InvalidAxisOrderSnafu { order: order.to_vec(), rank: loop_len });

        if order.iter().enumerate().any(|(i, &a)| i != a) {
            let axes: SmallVec<[usize; 4]> = order.iter().copied().chain(loop_len..rank).collect();
            let permute = MovementOp::Permute(axes);
            sts = sts.iter().map(|st| st.movement_op(&permute)).collect::<tessel_ir::Result<_>>().context(IrSnafu)?;
        }
        self.sts = sts;
        Ok(())
    }

    /// Turn the last loop axis into an upcasted axis.
    pub fn upcast(&mut self) -> Result<()> {
        ensure!(self.shape_len() > 0, AxisOutOfBoundsSnafu { axis: 0usize, shape_len: 0usize });
        self.upcasted += 1;
        Ok(())
    }

    /// Render and compile this kernel for `device`.
    pub fn codegen(&self, device: &dyn Device) -> Result<CompiledKernel> {
        let rendered = render::render(self);
        let launch = LaunchShape::new(&rendered.global_size, None).context(DeviceSnafu)?;
        let program = device.compile(&rendered.name, &rendered.src).context(DeviceSnafu)?;
        trace!(name = %rendered.name, global = ?launch.global_size, "kernel compiled");
        Ok(CompiledKernel { program, launch, src: rendered.src })
    }
}

/// A compiled kernel ready to launch.
pub struct CompiledKernel {
    program: Box<dyn Program>,
    launch: LaunchShape,
    src: String,
}

impl CompiledKernel {
    pub fn name(&self) -> &str {
        self.program.name()
    }

    pub fn src(&self) -> &str {
        &self.src
    }

    pub fn launch_shape(&self) -> &LaunchShape {
        &self.launch
    }

    /// Enqueue one launch. The returned event is only final after the device
    /// is synchronized.
    pub fn run(&self, bufs: &[Buffer]) -> Result<Event> {
        self.program.launch(&self.launch, bufs).context(DeviceSnafu)
    }
}

impl fmt::Debug for CompiledKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledKernel").field("name", &self.name()).field("launch", &self.launch).finish()
    }
}
