use std::rc::Rc;

use tessel_ir::{MovementOp, Op, OpType, UnaryOp};

use crate::test::helpers::*;
use crate::{Error, FusionConfig, GraphSession, LazyBuffer};

fn iota(session: &mut GraphSession, shape: &[usize]) -> Rc<LazyBuffer> {
    let n = shape.iter().product::<usize>();
    session.from_host(shape, (0..n).map(|i| i as f32 - 2.0).collect::<Vec<_>>()).unwrap()
}

#[test]
fn test_identity_movements_return_input() {
    let mut session = GraphSession::new();
    let a = iota(&mut session, &[2, 3]);
    assert!(Rc::ptr_eq(&session.permute(&a, &[0, 1]).unwrap(), &a));
    assert!(Rc::ptr_eq(&session.reshape(&a, &[2, 3]).unwrap(), &a));
    assert!(Rc::ptr_eq(&session.pad(&a, &[(0, 0), (0, 0)]).unwrap(), &a));
    assert!(Rc::ptr_eq(&session.shrink(&a, &[(0, 2), (0, 3)]).unwrap(), &a));
    assert!(Rc::ptr_eq(&session.stride(&a, &[1, 1]).unwrap(), &a));
}

#[test]
fn test_reshape_creates_movement_buffer() {
    let mut session = GraphSession::new();
    let a = iota(&mut session, &[2, 3]);
    let flat = session.reshape(&a, &[6]).unwrap();
    assert_eq!(flat.optype(), Some(OpType::Movement));
    assert_eq!(flat.shape(), &[6]);
    assert_eq!(flat.sources()[0].id(), a.id());
}

#[test]
fn test_movement_memoized() {
    let mut session = GraphSession::new();
    let a = iota(&mut session, &[2, 3]);
    let first = session.permute(&a, &[1, 0]).unwrap();
    let second = session.movement_op(MovementOp::Permute([1, 0].as_slice().into()), &a).unwrap();
    assert!(Rc::ptr_eq(&first, &second));
}

#[test]
fn test_movement_shuffled_below_elementwise() {
    let mut session = GraphSession::new();
    let a = iota(&mut session, &[2, 3]);
    let relu = session.relu(&a).unwrap();
    let out = session.permute(&relu, &[1, 0]).unwrap();

    assert_eq!(out.optype(), Some(OpType::Elementwise));
    assert_eq!(out.shape(), &[3, 2]);
    assert_eq!(out.op().op(), &Op::Unary(UnaryOp::Relu));
    let leaf = out.op().src()[0].as_leaf().expect("moved leaf");
    assert_eq!(leaf.optype(), Some(OpType::Movement));
    assert_eq!(leaf.sources()[0].id(), a.id());

    let mut unfused = GraphSession::with_config(FusionConfig::unfused());
    let b = iota(&mut unfused, &[2, 3]);
    let relu = unfused.relu(&b).unwrap();
    let reference = unfused.permute(&relu, &[1, 0]).unwrap();
    assert_eq!(eval(&out), eval(&reference));
}

#[test]
fn test_shuffle_reuses_moved_leaf() {
    let mut session = GraphSession::new();
    let a = iota(&mut session, &[2, 3]);
    let sq = session.mul(&a, &a).unwrap();
    let out = session.reshape(&sq, &[3, 2]).unwrap();

    let lhs = out.op().src()[0].as_leaf().unwrap();
    let rhs = out.op().src()[1].as_leaf().unwrap();
    assert!(Rc::ptr_eq(lhs, rhs));
}

#[test]
fn test_pad_not_shuffled_by_default() {
    let mut session = GraphSession::new();
    let a = iota(&mut session, &[3]);
    let exp = session.unary(UnaryOp::Exp, &a).unwrap();
    let padded = session.pad(&exp, &[(1, 1)]).unwrap();
    assert_eq!(padded.optype(), Some(OpType::Movement));
    assert_eq!(eval(&padded)[0], 0.0);

    let mut shuffling = GraphSession::with_config(FusionConfig::builder().shuffle_pad_ops(true).build());
    let b = iota(&mut shuffling, &[3]);
    let relu = shuffling.relu(&b).unwrap();
    let padded = shuffling.pad(&relu, &[(1, 1)]).unwrap();
    assert_eq!(padded.optype(), Some(OpType::Elementwise));
    assert_eq!(eval(&padded), vec![0.0, 0.0, 0.0, 0.0, 0.0]);
}

#[test]
fn test_movements_chain_into_one_buffer() {
    let mut session = GraphSession::new();
    let a = iota(&mut session, &[2, 3]);
    let flat = session.reshape(&a, &[6]).unwrap();
    let back = session.reshape(&flat, &[3, 2]).unwrap();
    let out = session.permute(&back, &[1, 0]).unwrap();

    assert_eq!(count_buffers(&out), 2);
    assert_eq!(out.op().ops().len(), 3);
    assert_eq!(eval(&out), vec![-2.0, 0.0, 2.0, -1.0, 1.0, 3.0]);
}

#[test]
fn test_invalid_reshape() {
    let mut session = GraphSession::new();
    let a = iota(&mut session, &[2, 3]);
    let result = session.reshape(&a, &[5]);
    assert!(matches!(result, Err(Error::Ir { source: tessel_ir::Error::ShapeMismatch { .. } })));
}

#[test]
fn test_shuffle_through_deep_chain() {
    let mut session = GraphSession::new();
    let x = iota(&mut session, &[2, 3]);
    let mut y = Rc::clone(&x);
    for _ in 0..10_000 {
        y = session.unary(UnaryOp::Neg, &y).unwrap();
    }
    let out = session.permute(&y, &[1, 0]).unwrap();

    assert_eq!(out.shape(), &[3, 2]);
    assert_eq!(out.optype(), Some(OpType::Elementwise));
    assert_eq!(out.op().nodes().len(), 10_000);
    let srcs = out.sources();
    assert_eq!(srcs.len(), 1);
    assert_eq!(srcs[0].optype(), Some(OpType::Movement));
    assert_eq!(srcs[0].sources()[0].id(), x.id());
}

#[test]
fn test_shuffle_switch_off_keeps_movement_buffer() {
    let mut session = GraphSession::with_config(FusionConfig::builder().shuffle_movement_ops(false).build());
    let a = iota(&mut session, &[2, 3]);
    let relu = session.relu(&a).unwrap();
    let out = session.permute(&relu, &[1, 0]).unwrap();

    assert_eq!(out.optype(), Some(OpType::Movement));
    assert_eq!(out.sources()[0].id(), relu.id());
    assert_eq!(eval(&out), vec![0.0, 1.0, 0.0, 2.0, 0.0, 3.0]);
}

#[test]
fn test_merge_switch_off_nests_movement_buffers() {
    let mut session = GraphSession::with_config(FusionConfig::builder().merge_movement_ops(false).build());
    let a = iota(&mut session, &[2, 3]);
    let flat = session.reshape(&a, &[6]).unwrap();
    let back = session.reshape(&flat, &[3, 2]).unwrap();
    let out = session.permute(&back, &[1, 0]).unwrap();

    assert_eq!(count_buffers(&out), 4);
    assert_eq!(out.op().ops().len(), 1);
    assert_eq!(eval(&out), vec![-2.0, 0.0, 2.0, -1.0, 1.0, 3.0]);
}
