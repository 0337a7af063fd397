//! Operation trees over shared leaves.
//!
//! A [`LazyOp`] is an immutable node holding one [`Op`] and its ordered
//! sources. Sources are either other nodes or leaves of type `L`; the leaf type
//! is whatever the current stage uses to name existing data (a lazy buffer while
//! the graph is built, a device buffer with its tracker during lowering).
//!
//! Subtrees are shared through `Rc`, so every traversal here keys visited nodes
//! by address and handles each node once no matter how many parents it has.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use crate::op::Op;

/// One source of a [`LazyOp`].
#[derive(Debug)]
pub enum Src<L> {
    Op(Rc<LazyOp<L>>),
    Leaf(L),
}

impl<L: Clone> Clone for Src<L> {
    fn clone(&self) -> Self {
        match self {
            Self::Op(op) => Self::Op(Rc::clone(op)),
            Self::Leaf(leaf) => Self::Leaf(leaf.clone()),
        }
    }
}

impl<L> Src<L> {
    pub fn as_op(&self) -> Option<&Rc<LazyOp<L>>> {
        match self {
            Self::Op(op) => Some(op),
            Self::Leaf(_) => None,
        }
    }

    pub fn as_leaf(&self) -> Option<&L> {
        match self {
            Self::Leaf(leaf) => Some(leaf),
            Self::Op(_) => None,
        }
    }
}

#[derive(Debug)]
pub struct LazyOp<L> {
    op: Op,
    src: Vec<Src<L>>,
}

impl<L> LazyOp<L> {
    pub fn new(op: Op, src: Vec<Src<L>>) -> Rc<Self> {
        Rc::new(Self { op, src })
    }

    pub fn op(&self) -> &Op {
        &self.op
    }

    pub fn src(&self) -> &[Src<L>] {
        &self.src
    }

    /// Every distinct node reachable from `self`, in preorder.
    pub fn nodes(&self) -> Vec<&Self> {
        self.walk().0
    }

    /// Ops of every distinct node, in preorder.
    pub fn ops(&self) -> Vec<&Op> {
        self.nodes().into_iter().map(|n| &n.op).collect()
    }

    /// Leaves in preorder. A leaf reachable through two distinct nodes appears
    /// twice; callers deduplicate by their own identity.
    pub fn leaves(&self) -> Vec<&L> {
        self.walk().1
    }

    /// First node (preorder) whose op satisfies `pred`.
    pub fn find(&self, pred: impl Fn(&Op) -> bool) -> Option<&Self> {
        self.nodes().into_iter().find(|n| pred(&n.op))
    }

    fn walk(&self) -> (Vec<&Self>, Vec<&L>) {
        let mut nodes = vec![self];
        let mut leaves = Vec::new();
        let mut seen = HashSet::new();
        seen.insert(self as *const Self);

        let mut stack: Vec<&Src<L>> = self.src.iter().rev().collect();
        while let Some(src) = stack.pop() {
            match src {
                Src::Leaf(leaf) => leaves.push(leaf),
                Src::Op(op) => {
                    if seen.insert(Rc::as_ptr(op)) {
                        nodes.push(op.as_ref());
                        stack.extend(op.src.iter().rev());
                    }
                }
            }
        }
        (nodes, leaves)
    }

    /// Rebuild the tree with every leaf replaced by `f(leaf)`.
    ///
    /// Shared subtrees stay shared in the result: each distinct node is rebuilt
    /// once. Leaves are visited in preorder and the first error from `f` aborts
    /// the rewrite. The walk keeps its own stack, so tree depth is bounded by
    /// memory only.
    pub fn map_leaves<M, E>(self: &Rc<Self>, f: &mut impl FnMut(&L) -> Result<M, E>) -> Result<Rc<LazyOp<M>>, E> {
        let mut memo: HashMap<*const Self, Rc<LazyOp<M>>> = HashMap::new();
        let mut current = MapFrame::new(self.as_ref());
        let mut parents = Vec::new();
        loop {
            let node = current.node;
            if let Some(src) = node.src.get(current.next) {
                current.next += 1;
                match src {
                    Src::Leaf(leaf) => current.src.push(Src::Leaf(f(leaf)?)),
                    Src::Op(op) => match memo.get(&Rc::as_ptr(op)) {
                        Some(done) => current.src.push(Src::Op(Rc::clone(done))),
                        None => parents.push(std::mem::replace(&mut current, MapFrame::new(op))),
                    },
                }
                continue;
            }

            let out = LazyOp::new(node.op.clone(), std::mem::take(&mut current.src));
            memo.insert(node as *const Self, Rc::clone(&out));
            match parents.pop() {
                Some(parent) => {
                    current = parent;
                    current.src.push(Src::Op(out));
                }
                None => return Ok(out),
            }
        }
    }
}

// Deep chains would otherwise drop recursively, one frame per level.
impl<L> Drop for LazyOp<L> {
    fn drop(&mut self) {
        let mut stack: Vec<Rc<Self>> = self.src.drain(..).filter_map(into_op).collect();
        while let Some(op) = stack.pop() {
            if let Ok(mut node) = Rc::try_unwrap(op) {
                stack.extend(node.src.drain(..).filter_map(into_op));
            }
        }
    }
}

fn into_op<L>(src: Src<L>) -> Option<Rc<LazyOp<L>>> {
    match src {
        Src::Op(op) => Some(op),
        Src::Leaf(_) => None,
    }
}

/// A node being rebuilt by [`LazyOp::map_leaves`]: its next source to visit
/// and the rebuilt sources so far.
struct MapFrame<'a, L, M> {
    node: &'a LazyOp<L>,
    next: usize,
    src: Vec<Src<M>>,
}

impl<'a, L, M> MapFrame<'a, L, M> {
    fn new(node: &'a LazyOp<L>) -> Self {
        Self { node, next: 0, src: Vec::with_capacity(node.src.len()) }
    }
}

enum Token<'a, L> {
    Node(&'a LazyOp<L>),
    Leaf(&'a L),
    Text(&'static str),
}

/// Prints the tree in preorder. A node already printed is written as `#k`,
/// where `k` is its index in [`LazyOp::nodes`].
impl<L: fmt::Display> fmt::Display for LazyOp<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut index: HashMap<*const Self, usize> = HashMap::new();
        let mut stack = vec![Token::Node(self)];
        while let Some(token) = stack.pop() {
            match token {
                Token::Text(text) => f.write_str(text)?,
                Token::Leaf(leaf) => write!(f, "{leaf}")?,
                Token::Node(node) => {
                    if let Some(k) = index.get(&(node as *const Self)) {
                        write!(f, "#{k}")?;
                        continue;
                    }
                    index.insert(node as *const Self, index.len());
                    write!(f, "{}(", node.op)?;
                    stack.push(Token::Text(")"));
                    for (i, src) in node.src.iter().enumerate().rev() {
                        stack.push(match src {
                            Src::Op(op) => Token::Node(op.as_ref()),
                            Src::Leaf(leaf) => Token::Leaf(leaf),
                        });
                        if i > 0 {
                            stack.push(Token::Text(", "));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
