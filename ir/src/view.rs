//! Strided views over a flat buffer.

use smallvec::SmallVec;
use snafu::ensure;

use crate::shape::{Shape, Strides, prod, strides_for_shape, validate_shape};
use crate::types::Bounds;
use crate::{Result, error::*};

/// Maps a logical multi-dimensional index to a flat buffer offset.
///
/// `offset + sum(idx[i] * strides[i])`. A view with a `mask` is a zero view:
/// an index outside `mask[i] = (lo, hi)` on any dimension reads as zero and
/// never dereferences the buffer. Zero views implement padding without
/// materializing the padded buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct View {
    pub(crate) shape: Shape,
    pub(crate) strides: Strides,
    pub(crate) offset: isize,
    pub(crate) mask: Option<Bounds>,
}

impl View {
    /// Create a view, validating rank agreement and dimension sizes.
    pub fn new(shape: Shape, strides: Strides, offset: isize) -> Result<Self> {
        validate_shape(&shape)?;
        ensure!(
            shape.len() == strides.len(),
            StrideRankMismatchSnafu { shape_dims: shape.len(), stride_dims: strides.len() }
        );
        Ok(Self { shape, strides, offset, mask: None }.canonical())
    }

    /// Create a zero view: like [`View::new`] plus a validity mask.
    pub fn masked(shape: Shape, strides: Strides, offset: isize, mask: Bounds) -> Result<Self> {
        let mut view = Self::new(shape, strides, offset)?;
        ensure!(
            mask.len() == view.shape.len(),
            DimensionMismatchSnafu { operation: "mask", expected: view.shape.len(), actual: mask.len() }
        );
        view.mask = Some(mask);
        Ok(view.canonical())
    }

    /// Contiguous row-major view of `shape` starting at offset 0.
    pub fn contiguous(shape: &[usize]) -> Result<Self> {
        validate_shape(shape)?;
        Ok(Self { shape: Shape::from_slice(shape), strides: strides_for_shape(shape), offset: 0, mask: None })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    pub fn offset(&self) -> isize {
        self.offset
    }

    pub fn mask(&self) -> Option<&[(usize, usize)]> {
        self.mask.as_deref()
    }

    pub fn is_masked(&self) -> bool {
        self.mask.is_some()
    }

    pub fn size(&self) -> usize {
        prod(&self.shape)
    }

    /// Whether this view is the identity mapping over a row-major buffer.
    pub fn is_contiguous(&self) -> bool {
        self.offset == 0 && self.mask.is_none() && self.strides == strides_for_shape(&self.shape)
    }

    /// Flat offset of `idx`, or `None` when it falls outside the mask.
    pub fn index(&self, idx: &[usize]) -> Option<isize> {
        if let Some(mask) = &self.mask
            && !idx.iter().zip(mask).all(|(&i, &(lo, hi))| lo <= i && i < hi)
        {
            return None;
        }
        Some(self.offset + idx.iter().zip(&self.strides).map(|(&i, &s)| i as isize * s).sum::<isize>())
    }

    /// Render the flat offset for symbolic indices as a C expression.
    ///
    /// Returns the expression and the validity conditions contributed by the
    /// mask (empty when every index is valid).
    pub fn expr(&self, idxs: &[String]) -> (String, Vec<String>) {
        let mut terms: Vec<String> = idxs
            .iter()
            .zip(&self.strides)
            .filter(|(_, s)| **s != 0)
            .map(|(idx, &s)| if s == 1 { idx.clone() } else { format!("{idx}*{s}") })
            .collect();
        if self.offset != 0 || terms.is_empty() {
            terms.push(self.offset.to_string());
        }

        let mut valid = Vec::new();
        if let Some(mask) = &self.mask {
            for ((idx, &(lo, hi)), &dim) in idxs.iter().zip(mask).zip(&self.shape) {
                if lo >= hi {
                    valid.push("0".to_string());
                    continue;
                }
                if lo > 0 {
                    valid.push(format!("({idx}>={lo})"));
                }
                if hi < dim {
                    valid.push(format!("({idx}<{hi})"));
                }
            }
        }
        (format!("({})", terms.join("+")), valid)
    }

    /// Normalize strides of unit dimensions and drop masks that cover everything.
    pub(crate) fn canonical(mut self) -> Self {
        for (stride, &dim) in self.strides.iter_mut().zip(&self.shape) {
            if dim == 1 {
                *stride = 0;
            }
        }
        if let Some(mask) = &self.mask
            && mask.iter().zip(&self.shape).all(|(&(lo, hi), &dim)| lo == 0 && hi >= dim)
        {
            self.mask = None;
        }
        self
    }
}

/// Mask bounds covering an unmasked view.
pub(crate) fn full_mask(shape: &[usize]) -> Bounds {
    shape.iter().map(|&d| (0, d)).collect::<SmallVec<_>>()
}
