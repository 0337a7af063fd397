use tessel_ir::{OpType, UnaryOp};

use crate::{Error, GraphSession, LazyBuffer, Materializer, OpLog};

struct Failing;

impl Materializer for Failing {
    fn materialize(&mut self, _: &LazyBuffer, _: &[&tessel_ir::Op], _: &[&LazyBuffer]) -> crate::Result<()> {
        Err(Error::Materialize { reason: "device lost".to_string() })
    }
}

#[test]
fn test_host_buffer_needs_nothing() {
    let mut session = GraphSession::new();
    let a = session.from_host(&[2], vec![1.0, 2.0]).unwrap();
    let mut log = OpLog::new();
    a.realize(&mut log).unwrap();
    assert!(log.is_empty());
}

#[test]
fn test_fused_tree_is_one_entry() {
    let mut session = GraphSession::new();
    let a = session.from_host(&[2], vec![1.0, 2.0]).unwrap();
    let b = session.from_host(&[2], vec![3.0, 4.0]).unwrap();
    let sum = session.add(&a, &b).unwrap();
    let out = session.relu(&sum).unwrap();

    let mut log = OpLog::new();
    out.realize(&mut log).unwrap();
    assert_eq!(log.len(), 1);
    let entry = &log.entries()[0];
    assert_eq!(entry.buffer, out.id());
    assert_eq!(entry.optype, OpType::Elementwise);
    assert_eq!(entry.ops.len(), 2);
    assert_eq!(entry.srcs, vec![a.id(), b.id()]);
    assert!(out.is_realized());
}

#[test]
fn test_realize_is_idempotent() {
    let mut session = GraphSession::new();
    let a = session.from_host(&[3], vec![1.0, 2.0, 3.0]).unwrap();
    let r = session.sum(&a, &[1]).unwrap();
    let out = session.unary(UnaryOp::Exp, &r).unwrap();

    let mut log = OpLog::new();
    out.realize(&mut log).unwrap();
    assert_eq!(log.len(), 2);
    out.realize(&mut log).unwrap();
    r.realize(&mut log).unwrap();
    assert_eq!(log.len(), 2);
}

#[test]
fn test_shared_source_materialized_once() {
    let mut session = GraphSession::new();
    let a = session.from_host(&[2, 3], vec![1.0; 6]).unwrap();
    let r = session.sum(&a, &[2, 1]).unwrap();
    let p = session.max(&r, &[1, 1]).unwrap();
    let q = session.sum(&r, &[1, 1]).unwrap();
    let out = session.add(&p, &q).unwrap();

    let mut log = OpLog::new();
    out.realize(&mut log).unwrap();
    let order: Vec<_> = log.entries().iter().map(|e| e.buffer).collect();
    assert_eq!(order, vec![r.id(), p.id(), q.id(), out.id()]);
}

#[test]
fn test_sources_precede_consumers() {
    let mut session = GraphSession::new();
    let a = session.from_host(&[4], vec![1.0, -1.0, 2.0, -2.0]).unwrap();
    let r = session.sum(&a, &[1]).unwrap();
    let e = session.expand(&r, &[4]).unwrap();
    let out = session.mul(&e, &a).unwrap();

    let mut log = OpLog::new();
    out.realize(&mut log).unwrap();
    for (i, entry) in log.entries().iter().enumerate() {
        for src in &entry.srcs {
            if *src == a.id() {
                continue;
            }
            assert!(log.entries()[..i].iter().any(|earlier| earlier.buffer == *src), "{src} not realized before use");
        }
    }
    assert_eq!(log.entries().last().unwrap().buffer, out.id());
}

#[test]
fn test_failure_leaves_buffer_lazy() {
    let mut session = GraphSession::new();
    let a = session.from_host(&[2], vec![1.0, 2.0]).unwrap();
    let out = session.relu(&a).unwrap();

    assert!(matches!(out.realize(&mut Failing), Err(Error::Materialize { .. })));
    assert!(!out.is_realized());

    let mut log = OpLog::new();
    out.realize(&mut log).unwrap();
    assert_eq!(log.len(), 1);
}
