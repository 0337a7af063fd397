//! Zero-copy shape transformations.
//!
//! A [`ShapeTracker`] is a stack of [`View`]s. The first view addresses the
//! base buffer; every later view addresses the row-major layout of the view
//! below it. Movement operations fold into the top view whenever the result is
//! expressible as a single strided (and possibly masked) mapping, and push a
//! new view otherwise.
//!
//! Collapsing views is purely an optimization: [`ShapeTracker::index`] gives
//! the same answer whether or not two views were merged.

use smallvec::{SmallVec, smallvec};
use snafu::ensure;
use tracing::trace;

use crate::shape::{Shape, prod, unravel, validate_shape};
use crate::types::MovementOp;
use crate::view::{View, full_mask};
use crate::{Result, error::*};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShapeTracker {
    views: SmallVec<[View; 2]>,
}

impl ShapeTracker {
    /// Tracker over a contiguous buffer of `shape`.
    pub fn new(shape: &[usize]) -> Result<Self> {
        Ok(Self { views: smallvec![View::contiguous(shape)?] })
    }

    /// Tracker from explicit views, first view addressing the base buffer.
    pub fn from_views(views: impl IntoIterator<Item = View>) -> Result<Self> {
        let views: SmallVec<[View; 2]> = views.into_iter().collect();
        ensure!(!views.is_empty(), ZeroDimensionSnafu { shape: Shape::new() });
        Ok(Self { views })
    }

    /// Externally observed shape.
    pub fn shape(&self) -> &[usize] {
        self.top().shape()
    }

    pub fn views(&self) -> &[View] {
        &self.views
    }

    pub fn size(&self) -> usize {
        prod(self.shape())
    }

    /// Single view addressing the base buffer row-major.
    pub fn is_contiguous(&self) -> bool {
        self.views.len() == 1 && self.top().is_contiguous()
    }

    /// Whether this tracker leaves a buffer of `shape` untouched.
    pub fn is_identity(&self, shape: &[usize]) -> bool {
        self.is_contiguous() && self.shape() == shape
    }

    /// Return a new tracker with `op` applied.
    pub fn movement_op(&self, op: &MovementOp) -> Result<Self> {
        let mut st = self.clone();
        match op {
            MovementOp::Reshape(shape) => st.reshape(shape)?,
            MovementOp::Permute(axes) => st.permute(axes)?,
            MovementOp::Expand(shape) => st.expand(shape)?,
            MovementOp::Pad(arg) => st.pad(arg)?,
            MovementOp::Shrink(arg) => st.shrink(arg)?,
            MovementOp::Stride(arg) => st.stride(arg)?,
        }
        st.simplify();
        Ok(st)
    }

    /// Buffer offset of a logical index, `None` if it reads the zero fill.
    pub fn index(&self, idx: &[usize]) -> Option<usize> {
        let mut cur = Shape::from_slice(idx);
        let mut views = self.views.iter().rev().peekable();
        while let Some(view) = views.next() {
            let flat = view.index(&cur)?;
            match views.peek() {
                Some(prev) => {
                    let flat = usize::try_from(flat).ok().filter(|&f| f < prev.size())?;
                    cur = unravel(flat, prev.shape());
                }
                None => return usize::try_from(flat).ok(),
            }
        }
        None
    }

    /// Render the buffer offset of symbolic indices as a C expression.
    ///
    /// The second element lists conditions that must all hold for the load to
    /// be valid; a failing condition reads as zero.
    pub fn expr_idxs(&self, idxs: &[String]) -> (String, Vec<String>) {
        let mut cur = idxs.to_vec();
        let mut valid = Vec::new();
        let mut expr = String::from("0");
        let mut views = self.views.iter().rev().peekable();
        while let Some(view) = views.next() {
            let (e, v) = view.expr(&cur);
            valid.extend(v);
            match views.peek() {
                Some(prev) => cur = unravel_expr(&e, prev.shape()),
                None => expr = e,
            }
        }
        (expr, valid)
    }

    fn top(&self) -> &View {
        &self.views[self.views.len() - 1]
    }

    fn top_mut(&mut self) -> &mut View {
        let last = self.views.len() - 1;
        &mut self.views[last]
    }

    fn reshape(&mut self, new_shape: &[usize]) -> Result<()> {
        validate_shape(new_shape)?;
        let shape = self.shape();
        ensure!(
            prod(shape) == prod(new_shape),
            ShapeMismatchSnafu {
                from: Shape::from_slice(shape),
                to: Shape::from_slice(new_shape),
                from_size: prod(shape),
                to_size: prod(new_shape),
            }
        );
        if shape == new_shape {
            return Ok(());
        }

        if self.top().is_contiguous() {
            *self.top_mut() = View::contiguous(new_shape)?;
        } else if let Some(view) = reshape_unit_dims(self.top(), new_shape) {
            *self.top_mut() = view;
        } else {
            trace!(from = ?shape, to = ?new_shape, views = self.views.len() + 1, "reshape pushes a view");
            self.views.push(View::contiguous(new_shape)?);
        }
        Ok(())
    }

    fn permute(&mut self, axes: &[usize]) -> Result<()> {
        let ndim = self.shape().len();
        ensure!(is_permutation(axes, ndim), InvalidPermutationSnafu { axes: axes.to_vec(), ndim });

        let view = self.top_mut();
        view.shape = axes.iter().map(|&a| view.shape[a]).collect();
        view.strides = axes.iter().map(|&a| view.strides[a]).collect();
        if let Some(mask) = view.mask.take() {
            view.mask = Some(axes.iter().map(|&a| mask[a]).collect());
        }
        Ok(())
    }

    fn expand(&mut self, new_shape: &[usize]) -> Result<()> {
        let ndim = self.shape().len();
        ensure!(
            new_shape.len() == ndim,
            DimensionMismatchSnafu { operation: "expand", expected: ndim, actual: new_shape.len() }
        );
        validate_shape(new_shape)?;
        for (dim, (&input, &output)) in self.shape().iter().zip(new_shape).enumerate() {
            ensure!(input == output || input == 1, ExpandInvalidDimensionSnafu { dim, input, output });
        }

        let view = self.top_mut();
        for (i, &output) in new_shape.iter().enumerate() {
            if view.shape[i] == output {
                continue;
            }
            view.shape[i] = output;
            view.strides[i] = 0;
            if let Some(mask) = &mut view.mask
                && mask[i] == (0, 1)
            {
                mask[i] = (0, output);
            }
        }
        let canonical = view.clone().canonical();
        *view = canonical;
        Ok(())
    }

    fn pad(&mut self, arg: &[(usize, usize)]) -> Result<()> {
        let ndim = self.shape().len();
        ensure!(arg.len() == ndim, DimensionMismatchSnafu { operation: "pad", expected: ndim, actual: arg.len() });
        if arg.iter().all(|&(b, a)| b == 0 && a == 0) {
            return Ok(());
        }

        let view = self.top_mut();
        let mut mask = view.mask.take().unwrap_or_else(|| full_mask(&view.shape));
        for (i, &(before, after)) in arg.iter().enumerate() {
            view.offset -= before as isize * view.strides[i];
            mask[i] = (mask[i].0 + before, mask[i].1 + before);
            view.shape[i] += before + after;
        }
        view.mask = Some(mask);
        let canonical = view.clone().canonical();
        *view = canonical;
        Ok(())
    }

    fn shrink(&mut self, arg: &[(usize, usize)]) -> Result<()> {
        let ndim = self.shape().len();
        ensure!(arg.len() == ndim, DimensionMismatchSnafu { operation: "shrink", expected: ndim, actual: arg.len() });
        for (dim, (&(begin, end), &size)) in arg.iter().zip(self.shape()).enumerate() {
            ensure!(begin < end && end <= size, ShrinkOutOfBoundsSnafu { dim, begin, end, size });
        }

        let view = self.top_mut();
        for (i, &(begin, end)) in arg.iter().enumerate() {
            let len = end - begin;
            view.offset += begin as isize * view.strides[i];
            view.shape[i] = len;
            if let Some(mask) = &mut view.mask {
                let (lo, hi) = mask[i];
                let lo = lo.saturating_sub(begin).min(len);
                let hi = hi.saturating_sub(begin).min(len);
                mask[i] = if lo < hi { (lo, hi) } else { (0, 0) };
            }
        }
        let canonical = view.clone().canonical();
        *view = canonical;
        Ok(())
    }

    fn stride(&mut self, arg: &[isize]) -> Result<()> {
        let ndim = self.shape().len();
        ensure!(arg.len() == ndim, DimensionMismatchSnafu { operation: "stride", expected: ndim, actual: arg.len() });
        if let Some(dim) = arg.iter().position(|&s| s == 0) {
            return ZeroStrideSnafu { dim }.fail();
        }
        // Strided masks are not representable, start from a clean view.
        if self.top().is_masked() {
            let shape = Shape::from_slice(self.shape());
            self.views.push(View::contiguous(&shape)?);
        }

        let view = self.top_mut();
        for (i, &step) in arg.iter().enumerate() {
            let dim = view.shape[i];
            if step < 0 {
                view.offset += (dim as isize - 1) * view.strides[i];
            }
            view.shape[i] = dim.div_ceil(step.unsigned_abs());
            view.strides[i] *= step;
        }
        let canonical = view.clone().canonical();
        *view = canonical;
        Ok(())
    }

    /// Drop views that are provably identity mappings.
    fn simplify(&mut self) {
        while self.views.len() > 1 {
            let n = self.views.len();
            if self.views[n - 2].is_contiguous() {
                self.views.remove(n - 2);
            } else if self.views[n - 1].is_contiguous() && self.views[n - 1].shape == self.views[n - 2].shape {
                self.views.pop();
            } else {
                break;
            }
        }
    }
}

/// Fold a reshape that only inserts or removes unit dimensions into `view`.
fn reshape_unit_dims(view: &View, new_shape: &[usize]) -> Option<View> {
    let old_dims: Vec<usize> = (0..view.shape.len()).filter(|&i| view.shape[i] != 1).collect();
    let new_sizes: Vec<usize> = new_shape.iter().copied().filter(|&d| d != 1).collect();
    if old_dims.len() != new_sizes.len() || old_dims.iter().zip(&new_sizes).any(|(&i, &d)| view.shape[i] != d) {
        return None;
    }
    // A removed unit dimension must not hide an empty mask.
    if let Some(mask) = &view.mask
        && (0..view.shape.len()).any(|i| view.shape[i] == 1 && mask[i] != (0, 1))
    {
        return None;
    }

    let mut old = old_dims.into_iter();
    let mut strides = SmallVec::with_capacity(new_shape.len());
    let mut mask = SmallVec::<[(usize, usize); 4]>::with_capacity(new_shape.len());
    for &dim in new_shape {
        if dim == 1 {
            strides.push(0);
            mask.push((0, 1));
        } else {
            let i = old.next()?;
            strides.push(view.strides[i]);
            mask.push(view.mask.as_ref().map_or((0, dim), |m| m[i]));
        }
    }
    let mask = view.mask.as_ref().map(|_| mask);
    Some(View { shape: Shape::from_slice(new_shape), strides, offset: view.offset, mask }.canonical())
}

fn is_permutation(axes: &[usize], ndim: usize) -> bool {
    let mut seen = vec![false; ndim];
    axes.len() == ndim && axes.iter().all(|&a| a < ndim && !std::mem::replace(&mut seen[a], true))
}

/// Split a rendered flat offset into per-dimension index expressions.
fn unravel_expr(expr: &str, shape: &[usize]) -> Vec<String> {
    let mut out = vec![String::new(); shape.len()];
    let mut acc = 1usize;
    for (i, &dim) in shape.iter().enumerate().rev() {
        out[i] = if dim == 1 {
            "0".to_string()
        } else {
            let div = if acc == 1 { expr.to_string() } else { format!("({expr}/{acc})") };
            if i == 0 { div } else { format!("({div}%{dim})") }
        };
        acc *= dim;
    }
    out
}
