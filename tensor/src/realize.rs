//! Realization of lazy buffers.
//!
//! Realizing a buffer first realizes every lazy buffer at the leaves of its
//! tree, then hands the buffer itself to a [`Materializer`]. The traversal is
//! an explicit post-order worklist keyed by buffer id, so a buffer shared by
//! many consumers is materialized once per graph, not once per path.

use std::collections::HashSet;

use tessel_ir::{Op, OpType};
use tracing::debug;

use crate::{BufferId, LazyBuffer, Result};

/// Backend that computes one lazy buffer whose sources are already realized.
pub trait Materializer {
    /// `ops` is the buffer's tree in preorder, `srcs` its distinct leaf buffers.
    fn materialize(&mut self, buffer: &LazyBuffer, ops: &[&Op], srcs: &[&LazyBuffer]) -> Result<()>;
}

impl LazyBuffer {
    /// Materialize this buffer and everything it depends on.
    ///
    /// Host leaves and already realized buffers are skipped, so calling this
    /// twice materializes nothing the second time.
    pub fn realize(&self, materializer: &mut dyn Materializer) -> Result<()> {
        if self.is_realized() || self.optype().is_none() {
            return Ok(());
        }

        let mut visited = HashSet::new();
        let mut stack = vec![(self, false)];
        while let Some((buffer, expanded)) = stack.pop() {
            if buffer.is_realized() || buffer.optype().is_none() {
                continue;
            }
            if expanded {
                let srcs = buffer.sources();
                let ops = buffer.op().ops();
                materializer.materialize(buffer, &ops, &srcs)?;
                buffer.realized.set(true);
                debug!(id = %buffer.id(), optype = ?buffer.optype(), ops = ops.len(), srcs = srcs.len(), "realized");
                continue;
            }
            if !visited.insert(buffer.id()) {
                continue;
            }
            stack.push((buffer, true));
            stack.extend(buffer.sources().into_iter().rev().map(|src| (src, false)));
        }
        Ok(())
    }
}

/// One materialization recorded by [`OpLog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpLogEntry {
    pub buffer: BufferId,
    pub optype: OpType,
    pub ops: Vec<Op>,
    pub srcs: Vec<BufferId>,
}

/// Materializer that only records what it was asked to compute.
#[derive(Debug, Default)]
pub struct OpLog {
    entries: Vec<OpLogEntry>,
}

impl OpLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[OpLogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Materializer for OpLog {
    fn materialize(&mut self, buffer: &LazyBuffer, ops: &[&Op], srcs: &[&LazyBuffer]) -> Result<()> {
        let Some(optype) = buffer.optype() else {
            return Ok(());
        };
        debug!(
            optype = %optype,
            ops = ?ops.iter().map(|op| op.to_string()).collect::<Vec<_>>(),
            out = %buffer.id(),
            srcs = ?srcs.iter().map(|s| s.id()).collect::<Vec<_>>(),
            "op"
        );
        self.entries.push(OpLogEntry {
            buffer: buffer.id(),
            optype,
            ops: ops.iter().map(|&op| op.clone()).collect(),
            srcs: srcs.iter().map(|s| s.id()).collect(),
        });
        Ok(())
    }
}
