//! Maximally shared expression graph.
//!
//! The DAG holds the union of all constraint expressions with common
//! subexpression sharing: inserting a term either finds a structurally equal
//! node (hash lookup, then equality on bucket collisions) or creates a new
//! one. Node indices are dense and topologically ordered, so every child
//! index is smaller than its parent's.
//!
//! The graph structure is immutable once built. All per-pass state (interval
//! values, projection domains, derivatives, real values) lives in a
//! [`DagContext`] passed explicitly into every pass, so search nodes can
//! carry their own overlay and the shared graph is reused without
//! cross-node interference.

pub mod affine;

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::Proof;
use crate::boxes::IntervalBox;
use crate::interval::projections::*;
use crate::interval::Interval;
use crate::scope::Scope;
use crate::term::{BinOp, LinForm, Term, TermKind, UnOp};
use crate::variable::Variable;

pub type NodeId = usize;
pub type FunId = usize;

/// A small growable bitset over variable ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bitset {
    words: Vec<u64>,
}

impl Bitset {
    pub fn set(&mut self, i: u32) {
        let w = (i / 64) as usize;
        if w >= self.words.len() {
            self.words.resize(w + 1, 0);
        }
        self.words[w] |= 1 << (i % 64);
    }

    pub fn get(&self, i: u32) -> bool {
        let w = (i / 64) as usize;
        w < self.words.len() && self.words[w] & (1 << (i % 64)) != 0
    }

    pub fn union_with(&mut self, other: &Bitset) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a |= *b;
        }
    }

    pub fn intersects(&self, other: &Bitset) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| a & b != 0)
    }
}

/// Operation carried by a DAG node.
#[derive(Debug, Clone)]
pub enum DagOp {
    Cst(Interval),
    Var(Variable),
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
    Neg,
    Abs,
    Sgn,
    Sqr,
    Sqrt,
    Exp,
    Log,
    Sin,
    Cos,
    Tan,
    Pow(i32),
    /// Linear form; the children are the variable nodes, aligned with the
    /// coefficients.
    Lin {
        cst: Interval,
        coefs: Vec<Interval>,
    },
}

#[derive(Debug)]
pub struct DagNode {
    pub op: DagOp,
    pub sub: Vec<NodeId>,
    pub par: Vec<NodeId>,
    /// Support set over variable ids.
    pub support: Bitset,
}

/// One constraint expression in the DAG: a root node, the image interval the
/// root must meet, and the reachable node set in topological order.
#[derive(Debug)]
pub struct DagFun {
    root: NodeId,
    image: Interval,
    nodes: Vec<NodeId>,
    var_nodes: Vec<NodeId>,
    scope: Scope,
}

impl DagFun {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn image(&self) -> Interval {
        self.image
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn var_nodes(&self) -> &[NodeId] {
        &self.var_nodes
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }
}

/// Per-pass mutable overlay: evaluation values, projection domains and
/// derivatives for every node. Cloneable so each search node can snapshot
/// its own copy.
#[derive(Debug, Clone)]
pub struct DagContext {
    pub val: Vec<Interval>,
    pub dom: Vec<Interval>,
    pub dv: Vec<Interval>,
    pub rval: Vec<f64>,
    pub rdv: Vec<f64>,
}

impl DagContext {
    fn new(n: usize) -> Self {
        Self {
            val: vec![Interval::UNIVERSE; n],
            dom: vec![Interval::UNIVERSE; n],
            dv: vec![Interval::ZERO; n],
            rval: vec![0.0; n],
            rdv: vec![0.0; n],
        }
    }
}

#[derive(Debug, Default)]
pub struct Dag {
    nodes: Vec<DagNode>,
    funs: Vec<DagFun>,
    var_map: HashMap<u32, NodeId>,
    hash_index: HashMap<u64, Vec<NodeId>>,
    node_hash: Vec<u64>,
    scope: Scope,
}

impl Dag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nb_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn nb_funs(&self) -> usize {
        self.funs.len()
    }

    pub fn node(&self, i: NodeId) -> &DagNode {
        &self.nodes[i]
    }

    pub fn fun(&self, f: FunId) -> &DagFun {
        &self.funs[f]
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn var_node(&self, v: &Variable) -> Option<NodeId> {
        self.var_map.get(&v.id()).copied()
    }

    pub fn new_context(&self) -> DagContext {
        DagContext::new(self.nodes.len())
    }

    /// Counts the occurrences of a variable in the expression tree rooted at
    /// a node (shared subtrees count once per path).
    pub fn nb_occurrences(&self, root: NodeId, v: &Variable) -> usize {
        fn rec(dag: &Dag, i: NodeId, v: &Variable, memo: &mut [Option<usize>]) -> usize {
            if let Some(m) = memo[i] {
                return m;
            }
            let node = &dag.nodes[i];
            let n = match &node.op {
                DagOp::Cst(_) => 0,
                DagOp::Var(w) => (w == v) as usize,
                DagOp::Lin { .. } => {
                    if node.support.get(v.id()) {
                        1
                    } else {
                        0
                    }
                }
                _ => node
                    .sub
                    .iter()
                    .map(|&c| rec(dag, c, v, memo))
                    .sum(),
            };
            memo[i] = Some(n);
            n
        }
        let mut memo = vec![None; self.nodes.len()];
        rec(self, root, v, &mut memo)
    }

    /// Inserts a function given by a root term and its image, deduplicating
    /// every subterm against the existing graph. Returns the function index.
    pub fn insert(&mut self, root: &Term, image: Interval) -> FunId {
        let r = self.insert_term(root);
        // reachable set, ascending ids = topological order
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![r];
        while let Some(i) = stack.pop() {
            if seen[i] {
                continue;
            }
            seen[i] = true;
            stack.extend(self.nodes[i].sub.iter().copied());
        }
        let nodes: Vec<NodeId> = (0..self.nodes.len()).filter(|&i| seen[i]).collect();
        let var_nodes: Vec<NodeId> = nodes
            .iter()
            .copied()
            .filter(|&i| matches!(self.nodes[i].op, DagOp::Var(_)))
            .collect();
        let scope = Scope::from_vars(var_nodes.iter().map(|&i| match &self.nodes[i].op {
            DagOp::Var(v) => v.clone(),
            _ => unreachable!(),
        }));
        self.funs.push(DagFun {
            root: r,
            image,
            nodes,
            var_nodes,
            scope,
        });
        self.funs.len() - 1
    }

    fn insert_term(&mut self, t: &Term) -> NodeId {
        match t.kind() {
            TermKind::Cst(x) => self.insert_node(DagOp::Cst(*x), Vec::new()),
            TermKind::Var(v) => self.insert_var(v),
            TermKind::Unary { op, sub } => {
                let c = self.insert_term(sub);
                let op = match op {
                    UnOp::Neg => DagOp::Neg,
                    UnOp::Abs => DagOp::Abs,
                    UnOp::Sgn => DagOp::Sgn,
                    UnOp::Sqr => DagOp::Sqr,
                    UnOp::Sqrt => DagOp::Sqrt,
                    UnOp::Exp => DagOp::Exp,
                    UnOp::Log => DagOp::Log,
                    UnOp::Cos => DagOp::Cos,
                    UnOp::Sin => DagOp::Sin,
                    UnOp::Tan => DagOp::Tan,
                };
                self.insert_node(op, vec![c])
            }
            TermKind::Binary { op, left, right } => {
                let l = self.insert_term(left);
                let r = self.insert_term(right);
                let op = match op {
                    BinOp::Add => DagOp::Add,
                    BinOp::Sub => DagOp::Sub,
                    BinOp::Mul => DagOp::Mul,
                    BinOp::Div => DagOp::Div,
                    BinOp::Min => DagOp::Min,
                    BinOp::Max => DagOp::Max,
                };
                self.insert_node(op, vec![l, r])
            }
            TermKind::Pow { sub, n } => {
                let c = self.insert_term(sub);
                self.insert_node(DagOp::Pow(*n), vec![c])
            }
            TermKind::Lin(l) => self.insert_lin(l),
        }
    }

    fn insert_var(&mut self, v: &Variable) -> NodeId {
        if let Some(&i) = self.var_map.get(&v.id()) {
            return i;
        }
        let mut support = Bitset::default();
        support.set(v.id());
        let i = self.push_node(DagNode {
            op: DagOp::Var(v.clone()),
            sub: Vec::new(),
            par: Vec::new(),
            support,
        });
        self.var_map.insert(v.id(), i);
        self.scope = self.scope.inserted(v.clone());
        i
    }

    fn insert_lin(&mut self, l: &LinForm) -> NodeId {
        let sub: Vec<NodeId> = l.terms.iter().map(|(_, v)| self.insert_var(v)).collect();
        let coefs: Vec<Interval> = l.terms.iter().map(|(a, _)| *a).collect();
        self.insert_node(
            DagOp::Lin {
                cst: l.cst,
                coefs,
            },
            sub,
        )
    }

    fn insert_node(&mut self, op: DagOp, sub: Vec<NodeId>) -> NodeId {
        let h = hash_op(&op, &sub);
        if let Some(bucket) = self.hash_index.get(&h) {
            for &i in bucket {
                if self.node_hash[i] == h && self.node_eq(i, &op, &sub) {
                    return i;
                }
            }
        }
        let mut support = Bitset::default();
        for &c in &sub {
            let s = self.nodes[c].support.clone();
            support.union_with(&s);
        }
        let i = self.push_node(DagNode {
            op,
            sub: sub.clone(),
            par: Vec::new(),
            support,
        });
        for &c in &sub {
            self.nodes[c].par.push(i);
        }
        self.hash_index.entry(h).or_default().push(i);
        i
    }

    fn push_node(&mut self, node: DagNode) -> NodeId {
        let h = hash_op(&node.op, &node.sub);
        self.nodes.push(node);
        self.node_hash.push(h);
        self.nodes.len() - 1
    }

    fn node_eq(&self, i: NodeId, op: &DagOp, sub: &[NodeId]) -> bool {
        let n = &self.nodes[i];
        if n.sub != sub {
            return false;
        }
        match (&n.op, op) {
            (DagOp::Cst(a), DagOp::Cst(b)) => a.is_set_eq(b),
            (DagOp::Var(a), DagOp::Var(b)) => a == b,
            (DagOp::Pow(a), DagOp::Pow(b)) => a == b,
            (
                DagOp::Lin { cst: c1, coefs: k1 },
                DagOp::Lin { cst: c2, coefs: k2 },
            ) => {
                c1.is_set_eq(c2)
                    && k1.len() == k2.len()
                    && k1.iter().zip(k2.iter()).all(|(a, b)| a.is_set_eq(b))
            }
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }

    fn eval_node(&self, i: NodeId, ctx: &mut DagContext, bx: &IntervalBox) {
        let node = &self.nodes[i];
        let v = match &node.op {
            DagOp::Cst(x) => *x,
            DagOp::Var(v) => bx.get(v),
            DagOp::Add => ctx.val[node.sub[0]] + ctx.val[node.sub[1]],
            DagOp::Sub => ctx.val[node.sub[0]] - ctx.val[node.sub[1]],
            DagOp::Mul => ctx.val[node.sub[0]] * ctx.val[node.sub[1]],
            DagOp::Div => ctx.val[node.sub[0]] / ctx.val[node.sub[1]],
            DagOp::Min => ctx.val[node.sub[0]].min(ctx.val[node.sub[1]]),
            DagOp::Max => ctx.val[node.sub[0]].max(ctx.val[node.sub[1]]),
            DagOp::Neg => -ctx.val[node.sub[0]],
            DagOp::Abs => ctx.val[node.sub[0]].abs(),
            DagOp::Sgn => ctx.val[node.sub[0]].sgn(),
            DagOp::Sqr => ctx.val[node.sub[0]].sqr(),
            DagOp::Sqrt => ctx.val[node.sub[0]].sqrt(),
            DagOp::Exp => ctx.val[node.sub[0]].exp(),
            DagOp::Log => ctx.val[node.sub[0]].log(),
            DagOp::Sin => ctx.val[node.sub[0]].sin(),
            DagOp::Cos => ctx.val[node.sub[0]].cos(),
            DagOp::Tan => ctx.val[node.sub[0]].tan(),
            DagOp::Pow(n) => ctx.val[node.sub[0]].powi(*n),
            DagOp::Lin { cst, coefs } => {
                let mut e = *cst;
                for (k, &c) in node.sub.iter().enumerate() {
                    e += coefs[k] * ctx.val[c];
                }
                e
            }
        };
        ctx.val[i] = v;
    }

    /// Forward interval evaluation of one function. Returns the root value.
    pub fn interval_eval(&self, f: FunId, bx: &IntervalBox, ctx: &mut DagContext) -> Interval {
        for &i in &self.funs[f].nodes {
            self.eval_node(i, ctx, bx);
        }
        ctx.val[self.funs[f].root]
    }

    /// Forward interval evaluation of the whole graph. Returns false when
    /// some function root evaluates to the empty set.
    pub fn interval_eval_all(&self, bx: &IntervalBox, ctx: &mut DagContext) -> bool {
        for i in 0..self.nodes.len() {
            self.eval_node(i, ctx, bx);
        }
        self.funs.iter().all(|f| !ctx.val[f.root].is_empty())
    }

    /// Re-evaluates only the nodes whose support contains `v`, reading `x`
    /// for the variable. This is the thick univariate function used by BC3:
    /// the previous pass's values are reused for every other node.
    pub fn interval_eval_only(
        &self,
        f: FunId,
        v: &Variable,
        x: Interval,
        ctx: &mut DagContext,
    ) -> Interval {
        for &i in &self.funs[f].nodes {
            if !self.nodes[i].support.get(v.id()) {
                continue;
            }
            if let DagOp::Var(_) = &self.nodes[i].op {
                ctx.val[i] = x;
            } else {
                // children are already up to date: smaller indices come first
                let node = &self.nodes[i];
                let val = match &node.op {
                    DagOp::Add => ctx.val[node.sub[0]] + ctx.val[node.sub[1]],
                    DagOp::Sub => ctx.val[node.sub[0]] - ctx.val[node.sub[1]],
                    DagOp::Mul => ctx.val[node.sub[0]] * ctx.val[node.sub[1]],
                    DagOp::Div => ctx.val[node.sub[0]] / ctx.val[node.sub[1]],
                    DagOp::Min => ctx.val[node.sub[0]].min(ctx.val[node.sub[1]]),
                    DagOp::Max => ctx.val[node.sub[0]].max(ctx.val[node.sub[1]]),
                    DagOp::Neg => -ctx.val[node.sub[0]],
                    DagOp::Abs => ctx.val[node.sub[0]].abs(),
                    DagOp::Sgn => ctx.val[node.sub[0]].sgn(),
                    DagOp::Sqr => ctx.val[node.sub[0]].sqr(),
                    DagOp::Sqrt => ctx.val[node.sub[0]].sqrt(),
                    DagOp::Exp => ctx.val[node.sub[0]].exp(),
                    DagOp::Log => ctx.val[node.sub[0]].log(),
                    DagOp::Sin => ctx.val[node.sub[0]].sin(),
                    DagOp::Cos => ctx.val[node.sub[0]].cos(),
                    DagOp::Tan => ctx.val[node.sub[0]].tan(),
                    DagOp::Pow(n) => ctx.val[node.sub[0]].powi(*n),
                    DagOp::Lin { cst, coefs } => {
                        let mut e = *cst;
                        for (k, &c) in node.sub.iter().enumerate() {
                            e += coefs[k] * ctx.val[c];
                        }
                        e
                    }
                    DagOp::Cst(_) | DagOp::Var(_) => unreachable!(),
                };
                ctx.val[i] = val;
            }
        }
        ctx.val[self.funs[f].root]
    }

    fn reduce_dom(&self, ctx: &mut DagContext, i: NodeId, x: Interval) {
        if self.nodes[i].par.len() > 1 {
            ctx.dom[i] = ctx.dom[i] & x;
        } else {
            ctx.dom[i] = x;
        }
    }

    // Backward projection of one node onto its children (and onto the box
    // for variable nodes).
    fn proj_node(&self, i: NodeId, ctx: &mut DagContext, bx: &mut IntervalBox) {
        let node = &self.nodes[i];
        let dom = ctx.dom[i];
        match &node.op {
            DagOp::Cst(_) => {}
            DagOp::Var(v) => {
                bx.set(v, bx.get(v) & dom);
            }
            DagOp::Add => {
                let (l, r) = (node.sub[0], node.sub[1]);
                let (lv, rv) = (ctx.val[l], ctx.val[r]);
                self.reduce_dom(ctx, l, add_px(lv, rv, dom));
                self.reduce_dom(ctx, r, add_py(lv, rv, dom));
            }
            DagOp::Sub => {
                let (l, r) = (node.sub[0], node.sub[1]);
                let (lv, rv) = (ctx.val[l], ctx.val[r]);
                self.reduce_dom(ctx, l, sub_px(lv, rv, dom));
                self.reduce_dom(ctx, r, sub_py(lv, rv, dom));
            }
            DagOp::Mul => {
                let (l, r) = (node.sub[0], node.sub[1]);
                let (lv, rv) = (ctx.val[l], ctx.val[r]);
                self.reduce_dom(ctx, l, mul_px(lv, rv, dom));
                self.reduce_dom(ctx, r, mul_py(lv, rv, dom));
            }
            DagOp::Div => {
                let (l, r) = (node.sub[0], node.sub[1]);
                let (lv, rv) = (ctx.val[l], ctx.val[r]);
                self.reduce_dom(ctx, l, div_px(lv, rv, dom));
                self.reduce_dom(ctx, r, div_py(lv, rv, dom));
            }
            DagOp::Min => {
                let (l, r) = (node.sub[0], node.sub[1]);
                let (lv, rv) = (ctx.val[l], ctx.val[r]);
                self.reduce_dom(ctx, l, min_px(lv, rv, dom));
                self.reduce_dom(ctx, r, min_py(lv, rv, dom));
            }
            DagOp::Max => {
                let (l, r) = (node.sub[0], node.sub[1]);
                let (lv, rv) = (ctx.val[l], ctx.val[r]);
                self.reduce_dom(ctx, l, max_px(lv, rv, dom));
                self.reduce_dom(ctx, r, max_py(lv, rv, dom));
            }
            DagOp::Neg => {
                let c = node.sub[0];
                let cv = ctx.val[c];
                self.reduce_dom(ctx, c, usub_px(cv, dom));
            }
            DagOp::Abs => {
                let c = node.sub[0];
                let cv = ctx.val[c];
                self.reduce_dom(ctx, c, abs_px(cv, dom));
            }
            DagOp::Sgn => {
                let c = node.sub[0];
                let cv = ctx.val[c];
                self.reduce_dom(ctx, c, sgn_px(cv, dom));
            }
            DagOp::Sqr => {
                let c = node.sub[0];
                let cv = ctx.val[c];
                self.reduce_dom(ctx, c, sqr_px(cv, dom));
            }
            DagOp::Sqrt => {
                let c = node.sub[0];
                let cv = ctx.val[c];
                self.reduce_dom(ctx, c, sqrt_px(cv, dom));
            }
            DagOp::Exp => {
                let c = node.sub[0];
                let cv = ctx.val[c];
                self.reduce_dom(ctx, c, exp_px(cv, dom));
            }
            DagOp::Log => {
                let c = node.sub[0];
                let cv = ctx.val[c];
                self.reduce_dom(ctx, c, log_px(cv, dom));
            }
            DagOp::Sin => {
                let c = node.sub[0];
                let cv = ctx.val[c];
                self.reduce_dom(ctx, c, sin_px(cv, dom));
            }
            DagOp::Cos => {
                let c = node.sub[0];
                let cv = ctx.val[c];
                self.reduce_dom(ctx, c, cos_px(cv, dom));
            }
            DagOp::Tan => {
                let c = node.sub[0];
                let cv = ctx.val[c];
                self.reduce_dom(ctx, c, tan_px(cv, dom));
            }
            DagOp::Pow(n) => {
                let c = node.sub[0];
                let cv = ctx.val[c];
                self.reduce_dom(ctx, c, pow_px(cv, *n, dom));
            }
            DagOp::Lin { cst, coefs } => {
                // project onto each variable in turn: the right-hand side is
                // the node domain minus every other contribution
                for (k, &c) in node.sub.iter().enumerate() {
                    let mut rhs = dom - *cst;
                    for (j, &o) in node.sub.iter().enumerate() {
                        if j != k {
                            rhs -= coefs[j] * ctx.val[o];
                        }
                    }
                    // the current variable domain comes from the box, not
                    // from a possibly stale projection slot
                    let var_dom = match &self.nodes[c].op {
                        DagOp::Var(v) => bx.get(v),
                        _ => ctx.val[c],
                    };
                    self.reduce_dom(ctx, c, mul_py(coefs[k], var_dom, rhs));
                }
            }
        }
    }

    fn hc4_revise_back(&self, f: FunId, bx: &mut IntervalBox, ctx: &mut DagContext) -> Proof {
        let fun = &self.funs[f];
        for &i in fun.nodes.iter().rev() {
            self.proj_node(i, ctx, bx);
        }
        for &i in &fun.var_nodes {
            if let DagOp::Var(v) = &self.nodes[i].op {
                if bx.get(v).is_empty() {
                    return Proof::Empty;
                }
            }
        }
        Proof::Maybe
    }

    fn shared_hc4_revise(&self, f: FunId, bx: &mut IntervalBox, ctx: &mut DagContext) -> Proof {
        let e = self.interval_eval(f, bx, ctx);
        let image = self.funs[f].image;
        if e.is_empty() {
            return Proof::Empty;
        }
        if image.contains_interval(&e) {
            return Proof::Inner;
        }
        if !image.overlaps(&e) {
            return Proof::Empty;
        }
        ctx.dom[self.funs[f].root] = e & image;
        self.hc4_revise_back(f, bx, ctx)
    }

    /// Constraint-level projection: forward evaluation, image check, then a
    /// backward pass applying the inverse projectors down to the variables.
    pub fn hc4_revise(&self, f: FunId, bx: &mut IntervalBox, ctx: &mut DagContext) -> Proof {
        // shared nodes accumulate the intersection of all their parents'
        // projections, starting from the universe
        for &i in &self.funs[f].nodes {
            if self.nodes[i].par.len() > 1 {
                ctx.dom[i] = Interval::UNIVERSE;
            }
        }
        self.shared_hc4_revise(f, bx, ctx)
    }

    /// Projection of the negated constraint: the image is replaced by its
    /// complement pieces, each projected on a cloned box, and the results
    /// are hulled per variable.
    pub fn hc4_revise_neg(&self, f: FunId, bx: &mut IntervalBox, ctx: &mut DagContext) -> Proof {
        let e = self.interval_eval(f, bx, ctx);
        let image = self.funs[f].image;
        if e.is_empty() {
            return Proof::Empty;
        }
        if image.contains_interval(&e) {
            return Proof::Empty;
        }
        if !image.overlaps(&e) {
            return Proof::Inner;
        }
        if image.is_singleton() || image.is_universe() {
            return Proof::Maybe;
        }
        let fun = &self.funs[f];
        let reset = |ctx: &mut DagContext, dag: &Dag| {
            for &i in &dag.funs[f].nodes {
                ctx.dom[i] = Interval::UNIVERSE;
            }
        };
        if image.is_inf_left() {
            reset(ctx, self);
            ctx.dom[fun.root] = e & Interval::more_than(image.right());
            return self.hc4_revise_back(f, bx, ctx);
        }
        if image.is_inf_right() {
            reset(ctx, self);
            ctx.dom[fun.root] = e & Interval::less_than(image.left());
            return self.hc4_revise_back(f, bx, ctx);
        }
        // bounded image: project both complement pieces and hull
        let mut bl = bx.clone();
        reset(ctx, self);
        ctx.dom[fun.root] = e & Interval::less_than(image.left());
        let pl = self.hc4_revise_back(f, &mut bl, ctx);

        let mut br = bx.clone();
        reset(ctx, self);
        ctx.dom[fun.root] = e & Interval::more_than(image.right());
        let pr = self.hc4_revise_back(f, &mut br, ctx);

        let proof = match (pl, pr) {
            (Proof::Empty, p) => p,
            (p, Proof::Empty) => p,
            (a, b) => a.min(b),
        };
        if proof != Proof::Empty {
            for v in self.funs[f].scope.clone().iter() {
                let merged = match (pl, pr) {
                    (Proof::Empty, _) => br.get(v),
                    (_, Proof::Empty) => bl.get(v),
                    _ => bl.get(v) | br.get(v),
                };
                bx.set(v, merged);
            }
        }
        proof
    }

    /// One-sided distance from the root value to the image, zero when they
    /// overlap.
    pub fn interval_violation(&self, f: FunId, ctx: &DagContext) -> f64 {
        let e = ctx.val[self.funs[f].root];
        let image = self.funs[f].image;
        if e.is_empty() {
            return f64::INFINITY;
        }
        if e.overlaps(&image) {
            return 0.0;
        }
        if e.is_certainly_lt(&image) {
            image.left() - e.right()
        } else {
            e.left() - image.right()
        }
    }

    /// Reverse-mode interval differentiation of one function; the forward
    /// pass must have run. Returns false when a derivative crossed a
    /// singularity (the enclosures are still sound).
    pub fn interval_diff(&self, f: FunId, ctx: &mut DagContext) -> bool {
        let fun = &self.funs[f];
        for &i in &fun.nodes {
            ctx.dv[i] = Interval::ZERO;
        }
        ctx.dv[fun.root] = Interval::ONE;
        let mut ok = true;
        for &i in fun.nodes.iter().rev() {
            ok &= self.diff_node(i, ctx);
        }
        for &i in &fun.var_nodes {
            if ctx.dv[i].is_empty() || ctx.dv[i].is_inf() {
                ok = false;
            }
        }
        ok
    }

    fn diff_node(&self, i: NodeId, ctx: &mut DagContext) -> bool {
        let node = &self.nodes[i];
        let dv = ctx.dv[i];
        match &node.op {
            DagOp::Cst(_) | DagOp::Var(_) => true,
            DagOp::Add => {
                ctx.dv[node.sub[0]] += dv;
                ctx.dv[node.sub[1]] += dv;
                true
            }
            DagOp::Sub => {
                ctx.dv[node.sub[0]] += dv;
                ctx.dv[node.sub[1]] += -dv;
                true
            }
            DagOp::Mul => {
                let (l, r) = (node.sub[0], node.sub[1]);
                let (lv, rv) = (ctx.val[l], ctx.val[r]);
                ctx.dv[l] += dv * rv;
                ctx.dv[r] += dv * lv;
                true
            }
            DagOp::Div => {
                let (l, r) = (node.sub[0], node.sub[1]);
                let (lv, rv) = (ctx.val[l], ctx.val[r]);
                ctx.dv[l] += dv / rv;
                ctx.dv[r] += dv * (-lv / rv.sqr());
                !rv.contains_zero()
            }
            DagOp::Min => {
                let (l, r) = (node.sub[0], node.sub[1]);
                let (lv, rv) = (ctx.val[l], ctx.val[r]);
                if lv.is_certainly_lt(&rv) {
                    ctx.dv[l] += dv;
                } else if rv.is_certainly_lt(&lv) {
                    ctx.dv[r] += dv;
                } else {
                    ctx.dv[l] += dv * Interval::ZERO_PLUS_ONE;
                    ctx.dv[r] += dv * Interval::ZERO_PLUS_ONE;
                }
                true
            }
            DagOp::Max => {
                let (l, r) = (node.sub[0], node.sub[1]);
                let (lv, rv) = (ctx.val[l], ctx.val[r]);
                if lv.is_certainly_gt(&rv) {
                    ctx.dv[l] += dv;
                } else if rv.is_certainly_gt(&lv) {
                    ctx.dv[r] += dv;
                } else {
                    ctx.dv[l] += dv * Interval::ZERO_PLUS_ONE;
                    ctx.dv[r] += dv * Interval::ZERO_PLUS_ONE;
                }
                true
            }
            DagOp::Neg => {
                ctx.dv[node.sub[0]] += -dv;
                true
            }
            DagOp::Abs => {
                let c = node.sub[0];
                let cv = ctx.val[c];
                let s = if cv.is_strictly_positive() {
                    Interval::ONE
                } else if cv.is_strictly_negative() {
                    Interval::MINUS_ONE
                } else {
                    Interval::MINUS_ONE_PLUS_ONE
                };
                ctx.dv[c] += dv * s;
                true
            }
            DagOp::Sgn => {
                // zero derivative away from the origin
                !ctx.val[node.sub[0]].contains_zero()
            }
            DagOp::Sqr => {
                let c = node.sub[0];
                let cv = ctx.val[c];
                ctx.dv[c] += dv * Interval::point(2.0) * cv;
                true
            }
            DagOp::Sqrt => {
                let c = node.sub[0];
                let sv = ctx.val[i];
                ctx.dv[c] += dv / (Interval::point(2.0) * sv);
                !ctx.val[c].contains_zero()
            }
            DagOp::Exp => {
                let c = node.sub[0];
                ctx.dv[c] += dv * ctx.val[i];
                true
            }
            DagOp::Log => {
                let c = node.sub[0];
                let cv = ctx.val[c];
                ctx.dv[c] += dv / cv;
                !cv.contains_zero()
            }
            DagOp::Sin => {
                let c = node.sub[0];
                ctx.dv[c] += dv * ctx.val[c].cos();
                true
            }
            DagOp::Cos => {
                let c = node.sub[0];
                ctx.dv[c] += dv * (-ctx.val[c].sin());
                true
            }
            DagOp::Tan => {
                let c = node.sub[0];
                ctx.dv[c] += dv * (Interval::ONE + ctx.val[i].sqr());
                ctx.val[i].is_finite()
            }
            DagOp::Pow(n) => {
                let c = node.sub[0];
                let cv = ctx.val[c];
                ctx.dv[c] += dv * Interval::point(*n as f64) * cv.powi(*n - 1);
                true
            }
            DagOp::Lin { coefs, .. } => {
                for (k, &c) in node.sub.iter().enumerate() {
                    ctx.dv[c] += dv * coefs[k];
                }
                true
            }
        }
    }

    /// Derivative of a function with respect to a variable, after a call to
    /// [`Dag::interval_diff`]. Zero for variables outside the scope.
    pub fn interval_deriv(&self, v: &Variable, ctx: &DagContext) -> Interval {
        match self.var_node(v) {
            Some(i) => ctx.dv[i],
            None => Interval::ZERO,
        }
    }

    /// Thick differentiation: re-evaluate with `x` substituted for `v`, then
    /// differentiate. Returns the universe on a singularity.
    pub fn interval_diff_only(
        &self,
        f: FunId,
        v: &Variable,
        x: Interval,
        ctx: &mut DagContext,
    ) -> Interval {
        self.interval_eval_only(f, v, x, ctx);
        if self.interval_diff(f, ctx) {
            self.interval_deriv(v, ctx)
        } else {
            Interval::UNIVERSE
        }
    }

    /// Real (f64) evaluation of one function at a point given in the scope
    /// order of the whole graph.
    pub fn real_eval(&self, f: FunId, pt: &[f64], ctx: &mut DagContext) -> f64 {
        for &i in &self.funs[f].nodes {
            let node = &self.nodes[i];
            let v = match &node.op {
                DagOp::Cst(x) => x.midpoint(),
                DagOp::Var(v) => pt[self.scope.index_of(v).expect("variable in scope")],
                DagOp::Add => ctx.rval[node.sub[0]] + ctx.rval[node.sub[1]],
                DagOp::Sub => ctx.rval[node.sub[0]] - ctx.rval[node.sub[1]],
                DagOp::Mul => ctx.rval[node.sub[0]] * ctx.rval[node.sub[1]],
                DagOp::Div => ctx.rval[node.sub[0]] / ctx.rval[node.sub[1]],
                DagOp::Min => ctx.rval[node.sub[0]].min(ctx.rval[node.sub[1]]),
                DagOp::Max => ctx.rval[node.sub[0]].max(ctx.rval[node.sub[1]]),
                DagOp::Neg => -ctx.rval[node.sub[0]],
                DagOp::Abs => ctx.rval[node.sub[0]].abs(),
                DagOp::Sgn => {
                    let x = ctx.rval[node.sub[0]];
                    if x > 0.0 {
                        1.0
                    } else if x < 0.0 {
                        -1.0
                    } else {
                        0.0
                    }
                }
                DagOp::Sqr => {
                    let x = ctx.rval[node.sub[0]];
                    x * x
                }
                DagOp::Sqrt => ctx.rval[node.sub[0]].sqrt(),
                DagOp::Exp => ctx.rval[node.sub[0]].exp(),
                DagOp::Log => ctx.rval[node.sub[0]].ln(),
                DagOp::Sin => ctx.rval[node.sub[0]].sin(),
                DagOp::Cos => ctx.rval[node.sub[0]].cos(),
                DagOp::Tan => ctx.rval[node.sub[0]].tan(),
                DagOp::Pow(n) => ctx.rval[node.sub[0]].powi(*n),
                DagOp::Lin { cst, coefs } => {
                    let mut e = cst.midpoint();
                    for (k, &c) in node.sub.iter().enumerate() {
                        e += coefs[k].midpoint() * ctx.rval[c];
                    }
                    e
                }
            };
            ctx.rval[i] = v;
        }
        ctx.rval[self.funs[f].root]
    }

    /// Reverse-mode real differentiation; the real forward pass must have
    /// run.
    pub fn real_diff(&self, f: FunId, ctx: &mut DagContext) {
        let fun = &self.funs[f];
        for &i in &fun.nodes {
            ctx.rdv[i] = 0.0;
        }
        ctx.rdv[fun.root] = 1.0;
        for &i in fun.nodes.iter().rev() {
            let node = &self.nodes[i];
            let dv = ctx.rdv[i];
            match &node.op {
                DagOp::Cst(_) | DagOp::Var(_) => {}
                DagOp::Add => {
                    ctx.rdv[node.sub[0]] += dv;
                    ctx.rdv[node.sub[1]] += dv;
                }
                DagOp::Sub => {
                    ctx.rdv[node.sub[0]] += dv;
                    ctx.rdv[node.sub[1]] -= dv;
                }
                DagOp::Mul => {
                    let (l, r) = (node.sub[0], node.sub[1]);
                    let (lv, rv) = (ctx.rval[l], ctx.rval[r]);
                    ctx.rdv[l] += dv * rv;
                    ctx.rdv[r] += dv * lv;
                }
                DagOp::Div => {
                    let (l, r) = (node.sub[0], node.sub[1]);
                    let (lv, rv) = (ctx.rval[l], ctx.rval[r]);
                    ctx.rdv[l] += dv / rv;
                    ctx.rdv[r] += dv * (-lv / (rv * rv));
                }
                DagOp::Min => {
                    let (l, r) = (node.sub[0], node.sub[1]);
                    if ctx.rval[l] <= ctx.rval[r] {
                        ctx.rdv[l] += dv;
                    } else {
                        ctx.rdv[r] += dv;
                    }
                }
                DagOp::Max => {
                    let (l, r) = (node.sub[0], node.sub[1]);
                    if ctx.rval[l] >= ctx.rval[r] {
                        ctx.rdv[l] += dv;
                    } else {
                        ctx.rdv[r] += dv;
                    }
                }
                DagOp::Neg => ctx.rdv[node.sub[0]] -= dv,
                DagOp::Abs => {
                    let c = node.sub[0];
                    ctx.rdv[c] += dv * if ctx.rval[c] >= 0.0 { 1.0 } else { -1.0 };
                }
                DagOp::Sgn => {}
                DagOp::Sqr => {
                    let c = node.sub[0];
                    ctx.rdv[c] += dv * 2.0 * ctx.rval[c];
                }
                DagOp::Sqrt => {
                    let c = node.sub[0];
                    ctx.rdv[c] += dv / (2.0 * ctx.rval[i]);
                }
                DagOp::Exp => {
                    let c = node.sub[0];
                    ctx.rdv[c] += dv * ctx.rval[i];
                }
                DagOp::Log => {
                    let c = node.sub[0];
                    ctx.rdv[c] += dv / ctx.rval[c];
                }
                DagOp::Sin => {
                    let c = node.sub[0];
                    ctx.rdv[c] += dv * ctx.rval[c].cos();
                }
                DagOp::Cos => {
                    let c = node.sub[0];
                    ctx.rdv[c] -= dv * ctx.rval[c].sin();
                }
                DagOp::Tan => {
                    let c = node.sub[0];
                    let t = ctx.rval[i];
                    ctx.rdv[c] += dv * (1.0 + t * t);
                }
                DagOp::Pow(n) => {
                    let c = node.sub[0];
                    ctx.rdv[c] += dv * (*n as f64) * ctx.rval[c].powi(*n - 1);
                }
                DagOp::Lin { coefs, .. } => {
                    for (k, &c) in node.sub.iter().enumerate() {
                        ctx.rdv[c] += dv * coefs[k].midpoint();
                    }
                }
            }
        }
    }

    pub fn real_deriv(&self, v: &Variable, ctx: &DagContext) -> f64 {
        match self.var_node(v) {
            Some(i) => ctx.rdv[i],
            None => 0.0,
        }
    }
}

fn hash_op(op: &DagOp, sub: &[NodeId]) -> u64 {
    let mut h = DefaultHasher::new();
    std::mem::discriminant(op).hash(&mut h);
    match op {
        DagOp::Cst(x) => x.hash(&mut h),
        DagOp::Var(v) => v.id().hash(&mut h),
        DagOp::Pow(n) => n.hash(&mut h),
        DagOp::Lin { cst, coefs } => {
            cst.hash(&mut h);
            for c in coefs {
                c.hash(&mut h);
            }
        }
        _ => {}
    }
    sub.hash(&mut h);
    h.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tolerance::Tolerance;
    use crate::variable::VarKind;

    fn setup() -> (Variable, Variable, Variable) {
        (
            Variable::new(0, "x", VarKind::Real, Tolerance::default()),
            Variable::new(1, "y", VarKind::Real, Tolerance::default()),
            Variable::new(2, "z", VarKind::Real, Tolerance::default()),
        )
    }

    fn bx(scope: Scope, doms: &[(f64, f64)]) -> IntervalBox {
        IntervalBox::new(
            scope,
            doms.iter().map(|&(a, b)| Interval::new(a, b)).collect(),
        )
    }

    #[test]
    fn test_cse_shares_common_subterm() {
        let (x, y, z) = setup();
        let mut dag = Dag::new();
        // (x + y) * z and (x + y) * x share the sum node
        let s1 = Term::var(&x) + Term::var(&y);
        let t1 = s1.clone() * Term::var(&z);
        let s2 = Term::var(&x) + Term::var(&y);
        let t2 = s2 * Term::var(&x);
        dag.insert(&t1, Interval::ZERO);
        let before = dag.nb_nodes();
        dag.insert(&t2, Interval::ZERO);
        // only the second product is new
        assert_eq!(dag.nb_nodes(), before + 1);
    }

    #[test]
    fn test_forward_eval() {
        let (x, y, _) = setup();
        let mut dag = Dag::new();
        let t = Term::var(&x).sqr() + Term::var(&y).sqr();
        let f = dag.insert(&t, Interval::ONE);
        let scope = dag.scope().clone();
        let b = bx(scope, &[(1.0, 2.0), (0.0, 1.0)]);
        let mut ctx = dag.new_context();
        let e = dag.interval_eval(f, &b, &mut ctx);
        assert_eq!(e, Interval::new(1.0, 5.0));
    }

    #[test]
    fn test_hc4_revise_circle() {
        let (x, y, _) = setup();
        let mut dag = Dag::new();
        // x^2 + y^2 = 1 on [-2, 2]^2 contracts both variables to [-1, 1]
        let t = Term::var(&x).sqr() + Term::var(&y).sqr();
        let f = dag.insert(&t, Interval::ONE);
        let scope = dag.scope().clone();
        let mut b = bx(scope, &[(-2.0, 2.0), (-2.0, 2.0)]);
        let mut ctx = dag.new_context();
        let proof = dag.hc4_revise(f, &mut b, &mut ctx);
        assert_eq!(proof, Proof::Maybe);
        assert_eq!(b.get(&x), Interval::new(-1.0, 1.0));
        assert_eq!(b.get(&y), Interval::new(-1.0, 1.0));
    }

    #[test]
    fn test_hc4_revise_inner_and_empty() {
        let (x, _, _) = setup();
        let mut dag = Dag::new();
        let f = dag.insert(&Term::var(&x).sqr(), Interval::new(0.0, 100.0));
        let scope = dag.scope().clone();
        let mut b = bx(scope.clone(), &[(0.0, 2.0)]);
        let mut ctx = dag.new_context();
        assert_eq!(dag.hc4_revise(f, &mut b, &mut ctx), Proof::Inner);

        let mut dag2 = Dag::new();
        let f2 = dag2.insert(&Term::var(&x).sqr(), Interval::new(-5.0, -1.0));
        let mut b2 = bx(dag2.scope().clone(), &[(0.0, 2.0)]);
        let mut ctx2 = dag2.new_context();
        assert_eq!(dag2.hc4_revise(f2, &mut b2, &mut ctx2), Proof::Empty);
    }

    #[test]
    fn test_shared_node_joint_contraction() {
        let (x, y, _) = setup();
        let mut dag = Dag::new();
        // (x + y)^2 = 1 and x + y >= 0 share the sum; revising both must
        // leave only the positive root
        let s = Term::var(&x) + Term::var(&y);
        let f1 = dag.insert(&s.clone().sqr(), Interval::ONE);
        let f2 = dag.insert(&s, Interval::POSITIVE);
        let scope = dag.scope().clone();
        let mut b = bx(scope.clone(), &[(-2.0, 2.0), (-2.0, 2.0)]);
        let mut ctx = dag.new_context();
        assert_ne!(dag.hc4_revise(f1, &mut b, &mut ctx), Proof::Empty);
        assert_ne!(dag.hc4_revise(f2, &mut b, &mut ctx), Proof::Empty);
        // now x + y in [0, 2] intersected with |x + y| = 1: re-revising f1
        // pins the sum near 1
        assert_ne!(dag.hc4_revise(f1, &mut b, &mut ctx), Proof::Empty);
        let sum = b.get(&x) + b.get(&y);
        assert!(sum.contains(1.0));
    }

    #[test]
    fn test_interval_diff_polynomial() {
        let (x, y, _) = setup();
        let mut dag = Dag::new();
        // f = x^3 + 2xy, df/dx = 3x^2 + 2y, df/dy = 2x
        let t = Term::var(&x).pow(3) + 2.0 * (Term::var(&x) * Term::var(&y));
        let f = dag.insert(&t, Interval::ZERO);
        let scope = dag.scope().clone();
        let b = bx(scope, &[(1.0, 1.0), (2.0, 2.0)]);
        let mut ctx = dag.new_context();
        dag.interval_eval(f, &b, &mut ctx);
        assert!(dag.interval_diff(f, &mut ctx));
        assert!(dag.interval_deriv(&x, &ctx).contains(7.0));
        assert!(dag.interval_deriv(&y, &ctx).contains(2.0));
        assert!(dag.interval_deriv(&x, &ctx).width() < 1e-10);
    }

    #[test]
    fn test_real_eval_and_diff_match_interval_at_points() {
        let (x, y, _) = setup();
        let mut dag = Dag::new();
        let t = (Term::var(&x) * Term::var(&y)).sqr() + Term::var(&x).exp();
        let f = dag.insert(&t, Interval::ZERO);
        let scope = dag.scope().clone();
        let pt = [0.5, 1.5];
        let b = bx(scope, &[(0.5, 0.5), (1.5, 1.5)]);
        let mut ctx = dag.new_context();
        let rv = dag.real_eval(f, &pt, &mut ctx);
        dag.real_diff(f, &mut ctx);
        let iv = dag.interval_eval(f, &b, &mut ctx);
        assert!(iv.contains(rv));
        assert!(dag.interval_diff(f, &mut ctx));
        assert!(dag.interval_deriv(&x, &ctx).contains(dag.real_deriv(&x, &ctx)));
    }

    #[test]
    fn test_eval_only_reuses_other_nodes() {
        let (x, y, _) = setup();
        let mut dag = Dag::new();
        let t = Term::var(&x).sqr() + Term::var(&y).sqr();
        let f = dag.insert(&t, Interval::ONE);
        let scope = dag.scope().clone();
        let b = bx(scope, &[(1.0, 2.0), (3.0, 4.0)]);
        let mut ctx = dag.new_context();
        dag.interval_eval(f, &b, &mut ctx);
        // substitute x := [0, 0]; y-part is reused from the previous pass
        let e = dag.interval_eval_only(f, &x, Interval::ZERO, &mut ctx);
        assert_eq!(e, Interval::new(9.0, 16.0));
    }

    #[test]
    fn test_interval_violation() {
        let (x, _, _) = setup();
        let mut dag = Dag::new();
        let f = dag.insert(&Term::var(&x).sqr(), Interval::new(4.0, 9.0));
        let scope = dag.scope().clone();
        let mut ctx = dag.new_context();
        // x in [0, 1]: x^2 in [0, 1], distance to [4, 9] is 3
        let b = bx(scope.clone(), &[(0.0, 1.0)]);
        dag.interval_eval(f, &b, &mut ctx);
        assert_eq!(dag.interval_violation(f, &ctx), 3.0);
        // overlapping image: no violation
        let b = bx(scope, &[(0.0, 3.0)]);
        dag.interval_eval(f, &b, &mut ctx);
        assert_eq!(dag.interval_violation(f, &ctx), 0.0);
    }

    #[test]
    fn test_nb_occurrences() {
        let (x, y, _) = setup();
        let mut dag = Dag::new();
        let t = Term::var(&x).sqr() * Term::var(&x).sqr().sqrt() + Term::var(&y);
        let f = dag.insert(&t, Interval::ZERO);
        // x^2 is shared by the product's two factors
        assert_eq!(dag.nb_occurrences(dag.fun(f).root(), &x), 2);
        assert_eq!(dag.nb_occurrences(dag.fun(f).root(), &y), 1);
    }
}
