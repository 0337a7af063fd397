use std::rc::Rc;

use smallvec::smallvec;
use tessel_device::SimDevice;
use tessel_ir::{MovementOp, Op, UnaryOp};

use crate::error::Error;
use crate::optimizer::{Intervention, apply_intervention};
use crate::test::helpers::*;

#[test]
fn test_elementwise_source() {
    let device = SimDevice::default();
    let compiled = kernel(&device, &add_relu(&device, &[4, 8])).codegen(&device).unwrap();

    let expected = "\
__kernel void E_4_8(__global float* data0, const __global float* data1, const __global float* data2) {
  int gidx0 = get_global_id(0);
  int gidx1 = get_global_id(1);
  data0[(gidx0*8+gidx1)] = max((data1[(gidx0*8+gidx1)]+data2[(gidx0*8+gidx1)]), 0.0f);
}";
    assert_eq!(compiled.src(), expected);
    assert_eq!(compiled.name(), "E_4_8");
    assert_eq!(compiled.launch_shape().global_size, [4, 8, 1]);
    assert_eq!(device.compiled(), vec![("E_4_8".to_string(), expected.to_string())]);
}

#[test]
fn test_reduce_source_has_loop_and_accumulator() {
    let device = SimDevice::default();
    let compiled = kernel(&device, &matmul(&device, 4, 3, 8)).codegen(&device).unwrap();
    let src = compiled.src();

    assert!(src.starts_with("__kernel void r_4_3_8("));
    assert!(src.contains("  float acc0 = 0.0f;"));
    assert!(src.contains("  for (int ridx2 = 0; ridx2 < 8; ridx2++) {"));
    assert!(src.contains("    acc0 = acc0 + ("));
    assert!(src.contains("  } /* ridx2 */"));
    assert!(src.contains("] = acc0;"));
    assert_eq!(compiled.launch_shape().global_size, [4, 3, 1]);
}

#[test]
fn test_upcast_unrolls_stores() {
    let device = SimDevice::default();
    let mut kernel = kernel(&device, &add_relu(&device, &[4, 8]));
    apply_intervention(&mut kernel, &Intervention::upcast(1, 4)).unwrap();
    let compiled = kernel.codegen(&device).unwrap();

    assert_eq!(compiled.name(), "E_4_2");
    assert_eq!(compiled.src().matches("data0[").count(), 4);
    assert_eq!(compiled.launch_shape().global_size, [4, 2, 1]);
}

#[test]
fn test_reduce_upcast_unrolls_accumulation() {
    let device = SimDevice::default();
    let mut kernel = kernel(&device, &matmul(&device, 4, 3, 8));
    apply_intervention(&mut kernel, &Intervention::upcast(2, 4)).unwrap();
    let src = kernel.codegen(&device).unwrap().src().to_string();

    assert!(src.contains("for (int ridx2 = 0; ridx2 < 2; ridx2++)"));
    assert_eq!(src.matches("acc0 = acc0 +").count(), 4);
    assert!(!src.contains("acc1"));
}

#[test]
fn test_output_upcast_splits_accumulators() {
    let device = SimDevice::default();
    let mut kernel = kernel(&device, &matmul(&device, 4, 3, 8));
    apply_intervention(&mut kernel, &Intervention::upcast(0, 2)).unwrap();
    let src = kernel.codegen(&device).unwrap().src().to_string();

    assert!(src.contains("float acc0 = 0.0f;"));
    assert!(src.contains("float acc1 = 0.0f;"));
    assert_eq!(src.matches("data0[").count(), 2);
}

#[test]
fn test_max_reduce_uses_max() {
    let device = SimDevice::default();
    let x = upload(&device, &iota(12));
    let ast = root(node(
        Op::Reduce { op: tessel_ir::ReduceOp::Max, new_shape: smallvec![3, 1] },
        vec![leaf(&x, tracker(&[3, 4], &[]))],
    ));
    let src = kernel(&device, &ast).codegen(&device).unwrap().src().to_string();

    assert!(src.contains("float acc0 = -INFINITY;"));
    assert!(src.contains("acc0 = max(acc0, "));
}

#[test]
fn test_extra_output_axes_share_dim_zero() {
    let device = SimDevice::default();
    let compiled = kernel(&device, &add_relu(&device, &[2, 3, 4, 5])).codegen(&device).unwrap();

    assert_eq!(compiled.launch_shape().global_size, [6, 4, 5]);
    assert!(compiled.src().contains("int idx0 = (gidx0/3);"));
    assert!(compiled.src().contains("int idx1 = (gidx0%3);"));
}

#[test]
fn test_masked_load_is_guarded() {
    let device = SimDevice::default();
    let x = upload(&device, &iota(4));
    let padded = tracker(&[4], &[MovementOp::Pad(smallvec![(1, 1)])]);
    let ast = root(node(Op::Unary(UnaryOp::Neg), vec![leaf(&x, padded)]));
    let src = kernel(&device, &ast).codegen(&device).unwrap().src().to_string();

    assert!(src.contains("(gidx0>=1) && (gidx0<5)"));
    assert!(src.contains("? data1["));
    assert!(src.contains(": 0.0f)"));
}

#[test]
fn test_rejected_source_fails_codegen() {
    let device = SimDevice::builder().reject(Rc::new(|src: &str| src.contains("for ("))).build();
    let elementwise = kernel(&device, &add_relu(&device, &[4, 8]));
    let reduce = kernel(&device, &matmul(&device, 2, 2, 2));

    assert!(elementwise.codegen(&device).is_ok());
    assert!(matches!(reduce.codegen(&device), Err(Error::Device { .. })));
}

#[test]
fn test_compiled_kernel_runs() {
    let device = SimDevice::default();
    let kernel = kernel(&device, &add_relu(&device, &[4, 8]));
    let compiled = kernel.codegen(&device).unwrap();
    let event = compiled.run(kernel.bufs()).unwrap();

    assert_eq!(event.elapsed(1.0), compiled.src().len() as f64);
    assert_eq!(device.launches(), 1);
}
