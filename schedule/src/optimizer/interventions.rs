//! Candidate enumeration and application.

use itertools::Itertools;
use snafu::ensure;

use super::types::{Intervention, UPCAST_AMOUNTS};
use crate::error::*;
use crate::kernel::Kernel;

/// Every intervention worth timing on `kernel`.
///
/// Swaps pair output axes with output axes and reduce axes with reduce axes.
/// An upcast is offered only when some tracker is wider than 1 on the axis
/// and every tracker is 1 or a multiple of the amount there.
pub fn get_interventions(kernel: &Kernel) -> Vec<Intervention> {
    let first_reduce = kernel.first_reduce();
    let shape_len = kernel.shape_len();

    let output_swaps = (0..first_reduce).tuple_combinations().map(|(a, b)| Intervention::swap(a, b));
    let reduce_swaps = (first_reduce..shape_len).tuple_combinations().map(|(a, b)| Intervention::swap(a, b));
    let upcasts = (0..shape_len)
        .cartesian_product(UPCAST_AMOUNTS)
        .filter(|&(axis, amount)| {
            let sizes = || kernel.sts().iter().map(move |st| st.shape()[axis]);
            !sizes().all(|d| d == 1) && sizes().all(|d| d == 1 || d % amount == 0)
        })
        .map(|(axis, amount)| Intervention::upcast(axis, amount));

    output_swaps.chain(reduce_swaps).chain(upcasts).collect()
}

/// Apply one intervention in place.
pub fn apply_intervention(kernel: &mut Kernel, intervention: &Intervention) -> Result<()> {
    let shape_len = kernel.shape_len();
    match *intervention {
        Intervention::Swap(a, b) => {
            for axis in [a, b] {
                ensure!(axis < shape_len, AxisOutOfBoundsSnafu { axis, shape_len });
            }
            let mut order: Vec<usize> = (0..shape_len).collect();
            order.swap(a, b);
            kernel.reshape_and_permute(None, &order)
        }
        Intervention::Upcast { axis, amount } => {
            ensure!(axis < shape_len, AxisOutOfBoundsSnafu { axis, shape_len });
            let split = move |shape: &[usize]| -> Vec<usize> {
                let inner = if shape[axis] > 1 { [shape[axis] / amount, amount] } else { [1, 1] };
                shape[..axis].iter().copied().chain(inner).chain(shape[axis + 1..].iter().copied()).collect()
            };
            // The inner part becomes the last loop axis, then leaves the loop.
            let order: Vec<usize> = (0..=shape_len).filter(|&i| i != axis + 1).chain([axis + 1]).collect();
            kernel.reshape_and_permute(Some(&split), &order)?;
            kernel.upcast()
        }
    }
}
