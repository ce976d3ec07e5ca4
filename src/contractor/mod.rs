//! Contractor algebra.
//!
//! A contractor narrows an interval box without losing any solution and
//! reports a proof certificate. Infeasibility travels exclusively through
//! [`Proof::Empty`]; the error channel is reserved for configuration
//! faults. Contractors compose: fixed-order pools, dependency-driven
//! propagators, fixpoint loops and variable shaving all take other
//! contractors as operands.

pub mod bc3;
pub mod exclusion;
pub mod fixpoint;
pub mod gauss_seidel;
pub mod hc4;
pub mod newton;
pub mod newton_uni;
pub mod polytope;
pub mod reform;
pub mod var3b;

use std::collections::VecDeque;

use dyn_clone::DynClone;

use crate::Proof;
use crate::boxes::IntervalBox;
use crate::constraint::Constraint;
use crate::dag::DagContext;
use crate::interval::Interval;
use crate::scope::Scope;

/// An operator that contracts interval boxes in place.
pub trait Contractor: DynClone {
    /// Variables the contractor may narrow.
    fn scope(&self) -> Scope;

    /// Contracts the box; the box keeps every solution it contained.
    fn contract(&mut self, bx: &mut IntervalBox) -> Proof;

    /// Printable description.
    fn name(&self) -> String;

    /// Swaps the internal DAG overlay with the given one and reports
    /// whether the contractor took the binding. Composites forward the
    /// call to their first accepting child, so a second identical call
    /// restores the original state; [`ContextBinding`] relies on this to
    /// guarantee release on every exit path.
    fn swap_context(&mut self, _ctx: &mut DagContext) -> bool {
        false
    }
}

dyn_clone::clone_trait_object!(Contractor);

pub type SharedContractor = Box<dyn Contractor>;

/// Scoped binding of a search node's DAG overlay onto a contractor: the
/// overlay is swapped in on construction and swapped back on drop, whatever
/// the exit path.
pub struct ContextBinding<'a> {
    op: &'a mut dyn Contractor,
    ctx: &'a mut DagContext,
}

impl<'a> ContextBinding<'a> {
    pub fn new(op: &'a mut dyn Contractor, ctx: &'a mut DagContext) -> Self {
        op.swap_context(ctx);
        Self { op, ctx }
    }

    pub fn contract(&mut self, bx: &mut IntervalBox) -> Proof {
        self.op.contract(bx)
    }
}

impl Drop for ContextBinding<'_> {
    fn drop(&mut self) {
        self.op.swap_context(self.ctx);
    }
}

/// Adapts a constraint's own contraction (table, conditional, or any other
/// kind) to the contractor interface.
#[derive(Clone)]
pub struct ConstraintContractor {
    ctr: Constraint,
}

impl ConstraintContractor {
    pub fn new(ctr: Constraint) -> Self {
        Self { ctr }
    }
}

impl Contractor for ConstraintContractor {
    fn scope(&self) -> Scope {
        self.ctr.scope().clone()
    }

    fn contract(&mut self, bx: &mut IntervalBox) -> Proof {
        self.ctr.contract(bx)
    }

    fn name(&self) -> String {
        format!("constraint contractor on {}", self.ctr)
    }
}

/// Applies a sequence of contractors in a fixed order, once.
#[derive(Clone)]
pub struct ContractorPool {
    ops: Vec<SharedContractor>,
    scope: Scope,
}

impl ContractorPool {
    pub fn new(ops: Vec<SharedContractor>) -> Self {
        let scope = ops
            .iter()
            .fold(Scope::new(), |s, op| s.union(&op.scope()));
        Self { ops, scope }
    }

    pub fn push(&mut self, op: SharedContractor) {
        self.scope = self.scope.union(&op.scope());
        self.ops.push(op);
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl Contractor for ContractorPool {
    fn scope(&self) -> Scope {
        self.scope.clone()
    }

    fn contract(&mut self, bx: &mut IntervalBox) -> Proof {
        // the pool certifies the conjunction: inner only when every
        // operand is inner
        let mut all_inner = true;
        for op in &mut self.ops {
            match op.contract(bx) {
                Proof::Empty => return Proof::Empty,
                p => all_inner &= p == Proof::Inner,
            }
        }
        if all_inner { Proof::Inner } else { Proof::Maybe }
    }

    fn name(&self) -> String {
        format!("pool of {} contractors", self.ops.len())
    }

    fn swap_context(&mut self, ctx: &mut DagContext) -> bool {
        self.ops.iter_mut().any(|op| op.swap_context(ctx))
    }
}

/// Dependency-driven propagation to a fixpoint.
///
/// A queue holds the contractors to run. After each application, the
/// variables whose domain improved by more than the tolerance requeue every
/// contractor depending on them. The queue order is deterministic.
#[derive(Clone)]
pub struct Propagator {
    ops: Vec<SharedContractor>,
    scope: Scope,
    tol: f64,
    max_iter: usize,
}

impl Propagator {
    pub fn new(ops: Vec<SharedContractor>, tol: f64, max_iter: usize) -> Self {
        let scope = ops
            .iter()
            .fold(Scope::new(), |s, op| s.union(&op.scope()));
        Self {
            ops,
            scope,
            tol,
            max_iter,
        }
    }
}

impl Contractor for Propagator {
    fn scope(&self) -> Scope {
        self.scope.clone()
    }

    fn contract(&mut self, bx: &mut IntervalBox) -> Proof {
        let n = self.ops.len();
        if n == 0 {
            return Proof::Maybe;
        }
        let mut queue: VecDeque<usize> = (0..n).collect();
        let mut queued = vec![true; n];
        let mut rounds = 0usize;
        let budget = self.max_iter.saturating_mul(n).max(n);

        while let Some(k) = queue.pop_front() {
            queued[k] = false;
            let before = bx.clone();
            match self.ops[k].contract(bx) {
                Proof::Empty => return Proof::Empty,
                _ => {}
            }
            rounds += 1;
            if rounds >= budget {
                tracing::debug!(rounds, "propagation stopped on its iteration cap");
                break;
            }
            // requeue the contractors that watch an improved variable
            for v in self.scope.clone().iter() {
                let (old, new) = (before.get(v), bx.get(v));
                if new == old {
                    continue;
                }
                let improved = new.is_empty()
                    || old.width().is_infinite() && new.width().is_finite()
                    || old.width() > 0.0 && (old.width() - new.width()) / old.width() > self.tol;
                if !improved {
                    continue;
                }
                for (j, op) in self.ops.iter().enumerate() {
                    if j != k && !queued[j] && op.scope().contains(v) {
                        queued[j] = true;
                        queue.push_back(j);
                    }
                }
            }
        }
        Proof::Maybe
    }

    fn name(&self) -> String {
        format!("propagator over {} contractors", self.ops.len())
    }

    fn swap_context(&mut self, ctx: &mut DagContext) -> bool {
        self.ops.iter_mut().any(|op| op.swap_context(ctx))
    }
}

/// An inflator expands a box around its midpoint: `m + delta*(x - m) +
/// chi*[-1, 1]`. Used by the certification loops.
#[derive(Debug, Clone, Copy)]
pub struct Inflator {
    delta: f64,
    chi: f64,
}

impl Inflator {
    pub fn new(delta: f64, chi: f64) -> Self {
        debug_assert!(delta > 1.0 && chi > 0.0);
        Self { delta, chi }
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn chi(&self) -> f64 {
        self.chi
    }

    pub fn inflate(&self, x: &Interval) -> Interval {
        x.inflate(self.delta, self.chi)
    }

    pub fn inflate_box(&self, bx: &mut IntervalBox) {
        for i in 0..bx.size() {
            bx.set_at(i, bx.at(i).inflate(self.delta, self.chi));
        }
    }
}

impl Default for Inflator {
    fn default() -> Self {
        Self::new(1.125, 1.0e-12)
    }
}
