//! OpenCL-style C source for a [`Kernel`].
//!
//! Output axes map to global ids, reduce axes to `for` loops, and upcasted
//! axes are unrolled with constant indices. Loads through masked views are
//! guarded with a ternary that reads zero outside the mask.

use itertools::Itertools;
use tessel_ir::shape::{next_index, prod};
use tessel_ir::{BinaryOp, LazyOp, Op, ReduceOp, Src, UnaryOp};

use super::Kernel;

pub(super) struct Rendered {
    pub name: String,
    pub src: String,
    pub global_size: Vec<usize>,
}

/// Every index tuple of `sizes` in row-major order; one empty tuple for no sizes.
fn combos(sizes: &[usize]) -> Vec<Vec<usize>> {
    let mut out = Vec::with_capacity(prod(sizes));
    let mut idx = vec![0; sizes.len()];
    loop {
        out.push(idx.clone());
        if !next_index(&mut idx, sizes) {
            return out;
        }
    }
}

/// Global work sizes and per-axis index expressions for the output axes.
///
/// At most three axes get their own global dimension; any leading extra axes
/// share dimension 0 and are recovered with division and modulo.
fn global_dims(sizes: &[usize], lines: &mut Vec<String>) -> (Vec<usize>, Vec<String>) {
    let n = sizes.len();
    if n == 0 {
        return (vec![1], Vec::new());
    }
    if n <= 3 {
        for i in 0..n {
            lines.push(format!("  int gidx{i} = get_global_id({i});"));
        }
        return (sizes.to_vec(), (0..n).map(|i| format!("gidx{i}")).collect());
    }

    let merged = n - 2;
    let mut names = Vec::with_capacity(n);
    lines.push("  int gidx0 = get_global_id(0);".to_string());
    for i in 0..merged {
        let stride = prod(&sizes[i + 1..merged]);
        let mut expr = if stride == 1 { "gidx0".to_string() } else { format!("(gidx0/{stride})") };
        if i > 0 {
            expr = format!("({expr}%{})", sizes[i]);
        }
        lines.push(format!("  int idx{i} = {expr};"));
        names.push(format!("idx{i}"));
    }
    for dim in 1..=2 {
        lines.push(format!("  int gidx{dim} = get_global_id({dim});"));
        names.push(format!("gidx{dim}"));
    }
    (vec![prod(&sizes[..merged]), sizes[n - 2], sizes[n - 1]], names)
}

fn reduce_identity(op: ReduceOp) -> &'static str {
    match op {
        ReduceOp::Sum => "0.0f",
        ReduceOp::Max => "-INFINITY",
    }
}

fn reduce_combine(op: ReduceOp, acc: &str, value: &str) -> String {
    match op {
        ReduceOp::Sum => format!("{acc} + {value}"),
        ReduceOp::Max => format!("max({acc}, {value})"),
    }
}

fn unary(op: UnaryOp, x: &str) -> String {
    match op {
        UnaryOp::Noop => x.to_string(),
        UnaryOp::Neg => format!("(-{x})"),
        UnaryOp::Relu => format!("max({x}, 0.0f)"),
        UnaryOp::Exp => format!("exp({x})"),
        UnaryOp::Log => format!("log({x})"),
        UnaryOp::Sign => format!("sign({x})"),
        UnaryOp::Reciprocal => format!("(1.0f/{x})"),
    }
}

fn binary(op: BinaryOp, a: &str, b: &str) -> String {
    match op {
        BinaryOp::Add => format!("({a}+{b})"),
        BinaryOp::Sub => format!("({a}-{b})"),
        BinaryOp::Mul => format!("({a}*{b})"),
        BinaryOp::Div => format!("({a}/{b})"),
        BinaryOp::Pow => format!("pow({a}, {b})"),
        BinaryOp::CmpEq => format!("(float)({a}=={b})"),
    }
}

struct Expr<'k> {
    kernel: &'k Kernel,
    idxs: &'k [String],
    acc: Option<&'k str>,
}

impl Expr<'_> {
    fn load(&self, slot: usize) -> String {
        let (idx, valid) = self.kernel.sts[slot].expr_idxs(self.idxs);
        if valid.iter().any(|v| v == "0") {
            "0.0f".to_string()
        } else if valid.is_empty() {
            format!("data{slot}[{idx}]")
        } else {
            format!("(({}) ? data{slot}[{idx}] : 0.0f)", valid.join(" && "))
        }
    }

    fn src(&self, src: &Src<usize>) -> String {
        match src {
            Src::Leaf(slot) => self.load(*slot),
            Src::Op(node) => self.node(node),
        }
    }

    fn node(&self, node: &LazyOp<usize>) -> String {
        match (node.op(), node.src()) {
            (Op::Unary(op), [x]) => unary(*op, &self.src(x)),
            (Op::Binary(op), [a, b]) => binary(*op, &self.src(a), &self.src(b)),
            (Op::Reduce { .. }, _) => self.acc.unwrap_or("0.0f").to_string(),
            // Lowering rejects every other op.
            _ => "0.0f".to_string(),
        }
    }
}

pub(super) fn render(kernel: &Kernel) -> Rendered {
    let name = kernel.name();
    let full = kernel.full_shape();
    let rank = full.len();
    let shape_len = kernel.shape_len();
    let first_reduce = kernel.first_reduce();
    let out_shape = kernel.sts[0].shape();

    let args = (0..kernel.bufs.len())
        .map(|i| if i == 0 { "__global float* data0".to_string() } else { format!("const __global float* data{i}") })
        .join(", ");
    let mut lines = vec![format!("__kernel void {name}({args}) {{")];

    let (global_size, global_names) = global_dims(&full[..first_reduce], &mut lines);
    let mut base: Vec<String> = global_names;
    base.extend((first_reduce..shape_len).map(|i| format!("ridx{i}")));
    base.extend((shape_len..rank).map(|_| "0".to_string()));

    let upcast_axes: Vec<usize> = (shape_len..rank).collect();
    let output_upcasts: Vec<usize> = upcast_axes.iter().copied().filter(|&i| out_shape[i] > 1).collect();
    let with_values = |idxs: &mut Vec<String>, axes: &[usize], values: &[usize]| {
        for (&axis, value) in axes.iter().zip(values) {
            idxs[axis] = value.to_string();
        }
    };
    let output_combos = combos(&output_upcasts.iter().map(|&i| full[i]).collect::<Vec<_>>());

    let reduce = kernel.ast.find(|op| matches!(op, Op::Reduce { .. })).and_then(|node| match (node.op(), node.src()) {
        (Op::Reduce { op, .. }, [src]) => Some((*op, src)),
        _ => None,
    });
    match reduce {
        Some((op, reduce_src)) => {
            for k in 0..output_combos.len() {
                lines.push(format!("  float acc{k} = {};", reduce_identity(op)));
            }
            let mut indent = String::from("  ");
            for i in first_reduce..shape_len {
                lines.push(format!("{indent}for (int ridx{i} = 0; ridx{i} < {}; ridx{i}++) {{", full[i]));
                indent.push_str("  ");
            }
            let upcast_sizes: Vec<usize> = upcast_axes.iter().map(|&i| full[i]).collect();
            for combo in combos(&upcast_sizes) {
                let mut idxs = base.clone();
                with_values(&mut idxs, &upcast_axes, &combo);
                let out_key: Vec<usize> = upcast_axes
                    .iter()
                    .zip(&combo)
                    .filter(|(axis, _)| output_upcasts.contains(axis))
                    .map(|(_, &v)| v)
                    .collect();
                let k = output_combos.iter().position(|c| *c == out_key).unwrap_or_default();
                let value = Expr { kernel, idxs: &idxs, acc: None }.src(reduce_src);
                lines.push(format!("{indent}acc{k} = {};", reduce_combine(op, &format!("acc{k}"), &value)));
            }
            for i in (first_reduce..shape_len).rev() {
                indent.truncate(indent.len() - 2);
                lines.push(format!("{indent}}} /* ridx{i} */"));
            }
            for (k, combo) in output_combos.iter().enumerate() {
                let mut idxs = base.clone();
                for idx in &mut idxs[first_reduce..shape_len] {
                    *idx = "0".to_string();
                }
                with_values(&mut idxs, &output_upcasts, combo);
                let acc = format!("acc{k}");
                let value = Expr { kernel, idxs: &idxs, acc: Some(&acc) }.node(&kernel.ast);
                let (out_idx, _) = kernel.sts[0].expr_idxs(&idxs);
                lines.push(format!("  data0[{out_idx}] = {value};"));
            }
        }
        None => {
            let upcast_sizes: Vec<usize> = upcast_axes.iter().map(|&i| full[i]).collect();
            for combo in combos(&upcast_sizes) {
                let mut idxs = base.clone();
                with_values(&mut idxs, &upcast_axes, &combo);
                let value = Expr { kernel, idxs: &idxs, acc: None }.node(&kernel.ast);
                let (out_idx, _) = kernel.sts[0].expr_idxs(&idxs);
                lines.push(format!("  data0[{out_idx}] = {value};"));
            }
        }
    }
    lines.push("}".to_string());

    Rendered { name, src: lines.join("\n"), global_size }
}
