use smallvec::smallvec;
use tessel_device::SimDevice;
use tessel_ir::{BinaryOp, Op, ReduceOp};
use test_case::test_case;

use crate::error::Error;
use crate::optimizer::{Intervention, apply_intervention, get_interventions};
use crate::test::helpers::*;

#[test]
fn test_upcasts_need_divisible_axes() {
    let device = SimDevice::default();
    let candidates = get_interventions(&kernel(&device, &add_relu(&device, &[7, 8])));

    assert_eq!(candidates, vec![
        Intervention::swap(0, 1),
        Intervention::upcast(1, 2),
        Intervention::upcast(1, 4),
        Intervention::upcast(1, 8),
    ]);
}

#[test]
fn test_broadcast_axis_allows_upcast() {
    let device = SimDevice::default();
    let a = upload(&device, &iota(24));
    let b = upload(&device, &iota(6));
    let add = node(Op::Binary(BinaryOp::Add), vec![leaf(&a, tracker(&[4, 6], &[])), leaf(&b, tracker(&[1, 6], &[]))]);
    let candidates = get_interventions(&kernel(&device, &root(add)));

    assert!(candidates.contains(&Intervention::upcast(0, 4)));
    assert!(!candidates.contains(&Intervention::upcast(0, 8)));
    assert!(candidates.contains(&Intervention::upcast(1, 2)));
    assert!(!candidates.contains(&Intervention::upcast(1, 4)));
}

#[test]
fn test_swaps_stay_within_their_range() {
    let device = SimDevice::default();
    let x = upload(&device, &iota(120));
    let sum = node(Op::Reduce { op: ReduceOp::Sum, new_shape: smallvec![2, 3, 1, 1] }, vec![leaf(
        &x,
        tracker(&[2, 3, 4, 5], &[]),
    )]);
    let swaps: Vec<_> = get_interventions(&kernel(&device, &root(sum)))
        .into_iter()
        .filter(|i| matches!(i, Intervention::Swap(..)))
        .collect();

    assert_eq!(swaps, vec![Intervention::swap(0, 1), Intervention::swap(2, 3)]);
}

#[test]
fn test_upcasted_axes_are_not_offered() {
    let device = SimDevice::default();
    let mut kernel = kernel(&device, &add_relu(&device, &[4, 8]));
    apply_intervention(&mut kernel, &Intervention::upcast(1, 8)).unwrap();

    assert_eq!(kernel.shape_len(), 2);
    assert_eq!(get_interventions(&kernel), vec![
        Intervention::swap(0, 1),
        Intervention::upcast(0, 2),
        Intervention::upcast(0, 4),
    ]);
}

#[test]
fn test_upcast_moves_inner_part_out_of_the_loop() {
    let device = SimDevice::default();
    let mut kernel = kernel(&device, &add_relu(&device, &[4, 8]));
    apply_intervention(&mut kernel, &Intervention::upcast(0, 2)).unwrap();

    assert_eq!(kernel.upcasted(), 1);
    assert_eq!(kernel.shape_len(), 2);
    assert_eq!(kernel.full_shape().as_slice(), &[2, 8, 2]);
}

#[test]
fn test_swap_permutes_every_tracker() {
    let device = SimDevice::default();
    let mut kernel = kernel(&device, &matmul(&device, 4, 3, 8));
    apply_intervention(&mut kernel, &Intervention::swap(0, 1)).unwrap();

    assert!(kernel.sts().iter().all(|st| st.shape()[..2] == [3, 4]));
    assert_eq!(kernel.name(), "r_3_4_8");
}

#[test_case(Intervention::swap(0, 3) ; "swap")]
#[test_case(Intervention::upcast(2, 2) ; "upcast")]
fn test_out_of_range_axis(intervention: Intervention) {
    let device = SimDevice::default();
    let mut kernel = kernel(&device, &add_relu(&device, &[4, 8]));

    assert!(matches!(apply_intervention(&mut kernel, &intervention), Err(Error::AxisOutOfBounds { .. })));
}

#[test]
fn test_sequence_preserves_matmul() {
    let device = SimDevice::default();
    let mut kernel = kernel(&device, &matmul(&device, 4, 6, 8));
    let inputs = inputs(&device, &kernel);
    for intervention in [Intervention::swap(0, 1), Intervention::upcast(2, 4), Intervention::upcast(0, 2)] {
        apply_intervention(&mut kernel, &intervention).unwrap();
        assert_eq!(kernel.interpret(&inputs).unwrap(), matmul_reference(4, 6, 8), "after {intervention}");
    }
    assert_eq!(kernel.upcasted(), 2);
    assert_eq!(kernel.full_shape().as_slice(), &[3, 4, 2, 2, 4]);
}

#[test_case(Intervention::swap(0, 1), "SWAP(0, 1)")]
#[test_case(Intervention::upcast(2, 4), "UPCAST(2, 4)")]
fn test_display(intervention: Intervention, expected: &str) {
    assert_eq!(intervention.to_string(), expected);
}
