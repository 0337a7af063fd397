//! Host evaluation of a kernel in its current layout.

use tessel_ir::shape::next_index;
use tessel_ir::{LazyOp, Op, Src};

use super::Kernel;
use crate::error::*;

/// Clamp `idx` to the unit dims of `shape`.
fn project(idx: &[usize], shape: &[usize]) -> Vec<usize> {
    idx.iter().zip(shape).map(|(&i, &d)| if d == 1 { 0 } else { i }).collect()
}

impl Kernel {
    /// Evaluate the kernel on the host.
    ///
    /// `inputs[i]` holds the contents of `bufs()[i + 1]`. Every element is read
    /// through the kernel's current trackers, so a layout transformation that
    /// breaks the index mapping shows up as a different result.
    pub fn interpret(&self, inputs: &[Vec<f32>]) -> Result<Vec<f32>> {
        let expected = self.bufs.len() - 1;
        if inputs.len() != expected {
            let source = tessel_device::error::SizeMismatchSnafu { expected, actual: inputs.len() }.build();
            return Err(Error::Device { source });
        }
        for (buffer, data) in self.bufs[1..].iter().zip(inputs) {
            if buffer.len() != data.len() {
                let source = tessel_device::error::SizeMismatchSnafu { expected: buffer.len(), actual: data.len() }.build();
                return Err(Error::Device { source });
            }
        }

        let out_st = &self.sts[0];
        let mut out = vec![0.0; self.bufs[0].len()];

        let reduce = self.ast.find(|op| matches!(op, Op::Reduce { .. })).and_then(|node| match (node.op(), node.src()) {
            (Op::Reduce { op, .. }, [src]) => Some((*op, src)),
            _ => None,
        });
        let acc = reduce.map(|(op, src)| {
            let full = self.full_shape();
            let mut acc = vec![op.identity(); out.len()];
            let mut idx = vec![0; full.len()];
            loop {
                let value = self.eval_src(src, &idx, inputs, 0.0);
                if let Some(o) = out_st.index(&project(&idx, out_st.shape())) {
                    acc[o] = op.combine(acc[o], value);
                }
                if !next_index(&mut idx, &full) {
                    break acc;
                }
            }
        });

        let mut idx = vec![0; out_st.shape().len()];
        loop {
            if let Some(o) = out_st.index(&idx) {
                let reduced = acc.as_ref().map_or(0.0, |acc| acc[o]);
                out[o] = self.eval_node(&self.ast, &idx, inputs, reduced);
            }
            if !next_index(&mut idx, out_st.shape()) {
                return Ok(out);
            }
        }
    }

    fn eval_src(&self, src: &Src<usize>, idx: &[usize], inputs: &[Vec<f32>], reduced: f32) -> f32 {
        match src {
            Src::Leaf(slot) => {
                let st = &self.sts[*slot];
                st.index(&project(idx, st.shape())).and_then(|i| inputs[*slot - 1].get(i)).copied().unwrap_or(0.0)
            }
            Src::Op(node) => self.eval_node(node, idx, inputs, reduced),
        }
    }

    fn eval_node(&self, node: &LazyOp<usize>, idx: &[usize], inputs: &[Vec<f32>], reduced: f32) -> f32 {
        match (node.op(), node.src()) {
            (Op::Unary(op), [x]) => op.apply(self.eval_src(x, idx, inputs, reduced)),
            (Op::Binary(op), [a, b]) => {
                op.apply(self.eval_src(a, idx, inputs, reduced), self.eval_src(b, idx, inputs, reduced))
            }
            _ => reduced,
        }
    }
}
