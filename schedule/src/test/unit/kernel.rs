use smallvec::smallvec;
use tessel_device::{Allocator, SimDevice};
use tessel_ir::{BinaryOp, MovementOp, Op, ReduceOp, UnaryOp};
use test_case::test_case;

use crate::error::Error;
use crate::kernel::Kernel;
use crate::test::helpers::*;

#[test]
fn test_matmul_layout() {
    let device = SimDevice::default();
    let kernel = kernel(&device, &matmul(&device, 4, 3, 8));

    assert_eq!(kernel.bufs().len(), 3);
    assert_eq!(kernel.full_shape().as_slice(), &[4, 3, 8]);
    assert_eq!(kernel.sts()[0].shape(), &[4, 3, 1]);
    assert_eq!(kernel.shape_len(), 3);
    assert_eq!(kernel.first_reduce(), 2);
    assert_eq!(kernel.reduce_op(), Some(ReduceOp::Sum));
    assert_eq!(kernel.name(), "r_4_3_8");
}

#[test]
fn test_matmul_interprets() {
    let device = SimDevice::default();
    let kernel = kernel(&device, &matmul(&device, 3, 5, 4));
    assert_eq!(kernel.interpret(&inputs(&device, &kernel)).unwrap(), matmul_reference(3, 5, 4));
}

#[test]
fn test_reduce_axes_move_last() {
    let device = SimDevice::default();
    let x = upload(&device, &iota(12));
    let sum = node(Op::Reduce { op: ReduceOp::Max, new_shape: smallvec![1, 3] }, vec![leaf(&x, tracker(&[4, 3], &[]))]);
    let kernel = kernel(&device, &root(sum));

    assert_eq!(kernel.full_shape().as_slice(), &[3, 4]);
    assert_eq!(kernel.first_reduce(), 1);
    let data = iota(12);
    let expected: Vec<f32> =
        (0..3).map(|c| (0..4).map(|r| data[r * 3 + c]).fold(f32::NEG_INFINITY, f32::max)).collect();
    assert_eq!(kernel.interpret(&[data]).unwrap(), expected);
}

#[test]
fn test_unit_axes_are_dropped() {
    let device = SimDevice::default();
    let x = upload(&device, &iota(12));
    let neg = node(Op::Unary(UnaryOp::Neg), vec![leaf(&x, tracker(&[1, 4, 1, 3], &[]))]);
    let kernel = kernel(&device, &root(neg));

    assert_eq!(kernel.full_shape().as_slice(), &[4, 3]);
    assert_eq!(kernel.name(), "E_4_3");
}

#[test]
fn test_scalar_keeps_one_axis() {
    let device = SimDevice::default();
    let x = upload(&device, &[2.0]);
    let kernel = kernel(&device, &root(node(Op::Unary(UnaryOp::Neg), vec![leaf(&x, tracker(&[1, 1], &[]))])));

    assert_eq!(kernel.full_shape().as_slice(), &[1]);
    assert_eq!(kernel.interpret(&[vec![2.0]]).unwrap(), vec![-2.0]);
}

#[test]
fn test_shared_leaf_uses_one_slot() {
    let device = SimDevice::default();
    let x = upload(&device, &iota(6));
    let st = tracker(&[2, 3], &[]);
    let mul = node(Op::Binary(BinaryOp::Mul), vec![leaf(&x, st.clone()), leaf(&x, st)]);
    let kernel = kernel(&device, &root(mul));

    assert_eq!(kernel.bufs().len(), 2);
    let expected: Vec<f32> = iota(6).iter().map(|v| v * v).collect();
    assert_eq!(kernel.interpret(&inputs(&device, &kernel)).unwrap(), expected);
}

#[test]
fn test_same_buffer_through_two_views_uses_two_slots() {
    let device = SimDevice::default();
    let x = upload(&device, &iota(9));
    let transposed = tracker(&[3, 3], &[MovementOp::Permute(smallvec![1, 0])]);
    let add = node(Op::Binary(BinaryOp::Add), vec![leaf(&x, tracker(&[3, 3], &[])), leaf(&x, transposed)]);
    let kernel = kernel(&device, &root(add));

    assert_eq!(kernel.bufs().len(), 3);
    assert_eq!(kernel.bufs()[1].id(), kernel.bufs()[2].id());
    let data = iota(9);
    let expected: Vec<f32> = (0..9).map(|i| data[i] + data[(i % 3) * 3 + i / 3]).collect();
    assert_eq!(kernel.interpret(&inputs(&device, &kernel)).unwrap(), expected);
}

#[test]
fn test_padded_leaf_reads_zero_outside() {
    let device = SimDevice::default();
    let x = upload(&device, &[1.0, 2.0, 3.0, 4.0]);
    let padded = tracker(&[4], &[MovementOp::Pad(smallvec![(1, 1)])]);
    let kernel = kernel(&device, &root(node(Op::Unary(UnaryOp::Neg), vec![leaf(&x, padded)])));

    assert_eq!(kernel.interpret(&inputs(&device, &kernel)).unwrap(), vec![-0.0, -1.0, -2.0, -3.0, -4.0, -0.0]);
}

#[test]
fn test_multiple_reduces_rejected() {
    let device = SimDevice::default();
    let x = upload(&device, &iota(12));
    let inner = node(Op::Reduce { op: ReduceOp::Sum, new_shape: smallvec![4, 1] }, vec![leaf(&x, tracker(&[4, 3], &[]))]);
    let outer = root(node(Op::Reduce { op: ReduceOp::Sum, new_shape: smallvec![1, 1] }, vec![inner]));

    assert!(matches!(Kernel::output_len(&outer), Err(Error::MultipleReduce { count: 2 })));
}

#[test_case(Op::Movement(MovementOp::Permute(smallvec![1, 0])) ; "movement")]
#[test_case(Op::Load ; "load")]
fn test_unsupported_inner_op(op: Op) {
    let device = SimDevice::default();
    let x = upload(&device, &iota(4));
    let inner = node(op, vec![leaf(&x, tracker(&[2, 2], &[]))]);
    let ast = root(node(Op::Unary(UnaryOp::Neg), vec![inner]));

    assert!(matches!(Kernel::output_len(&ast), Err(Error::UnsupportedOp { .. })));
}

#[test]
fn test_no_leaves_is_empty() {
    let ast = root(node(Op::Unary(UnaryOp::Neg), vec![]));
    assert!(matches!(Kernel::output_len(&ast), Err(Error::EmptyAst)));
}

#[test]
fn test_rank_mismatch_rejected() {
    let device = SimDevice::default();
    let a = upload(&device, &iota(4));
    let add = node(Op::Binary(BinaryOp::Add), vec![leaf(&a, tracker(&[4], &[])), leaf(&a, tracker(&[2, 2], &[]))]);

    assert!(matches!(Kernel::output_len(&root(add)), Err(Error::Ir { .. })));
}

#[test]
fn test_bad_output_reshape_rejected() {
    let device = SimDevice::default();
    let x = upload(&device, &iota(6));
    let neg = node(Op::Unary(UnaryOp::Neg), vec![leaf(&x, tracker(&[2, 3], &[]))]);
    let ast = root(node(Op::Movement(MovementOp::Reshape(smallvec![4])), vec![neg]));

    assert!(matches!(Kernel::output_len(&ast), Err(Error::Ir { .. })));
}

#[test]
fn test_output_size_checked() {
    let device = SimDevice::default();
    let ast = add_relu(&device, &[4, 8]);
    let output = device.alloc(31).unwrap();

    assert!(matches!(Kernel::new(&ast, output), Err(Error::Device { .. })));
}

#[test]
fn test_root_reshape_over_leaf_is_copied() {
    let device = SimDevice::default();
    let x = upload(&device, &iota(6));
    let ast = root(node(Op::Movement(MovementOp::Reshape(smallvec![3, 2])), vec![leaf(&x, tracker(&[2, 3], &[]))]));
    let kernel = kernel(&device, &ast);

    assert_eq!(kernel.output().len(), 6);
    assert_eq!(kernel.interpret(&inputs(&device, &kernel)).unwrap(), iota(6));
}

#[test_case(&[1, 0, 2] ; "reduce axis excluded")]
#[test_case(&[0, 0] ; "repeated axis")]
#[test_case(&[0] ; "too short")]
fn test_invalid_order_leaves_kernel_unchanged(order: &[usize]) {
    let device = SimDevice::default();
    let mut kernel = kernel(&device, &add_relu(&device, &[4, 8]));
    let before = kernel.sts().to_vec();

    assert!(matches!(kernel.reshape_and_permute(None, order), Err(Error::InvalidAxisOrder { .. })));
    assert_eq!(kernel.sts(), before.as_slice());
}

#[test]
fn test_invalid_reshape_leaves_kernel_unchanged() {
    let device = SimDevice::default();
    let mut kernel = kernel(&device, &add_relu(&device, &[4, 8]));
    let before = kernel.sts().to_vec();
    let bad = |shape: &[usize]| vec![shape[0] + 1, shape[1]];

    assert!(matches!(kernel.reshape_and_permute(Some(&bad), &[0, 1]), Err(Error::Ir { .. })));
    assert_eq!(kernel.sts(), before.as_slice());
}

#[test]
fn test_upcast_needs_a_loop_axis() {
    let device = SimDevice::default();
    let mut kernel = kernel(&device, &add_relu(&device, &[4]));
    kernel.upcast().unwrap();

    assert_eq!(kernel.shape_len(), 0);
    assert!(matches!(kernel.upcast(), Err(Error::AxisOutOfBounds { .. })));
}
