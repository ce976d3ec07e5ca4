//! Fixpoint loop around a contractor.

use crate::Proof;
use crate::boxes::IntervalBox;
use crate::contractor::{Contractor, SharedContractor};
use crate::dag::DagContext;
use crate::scope::Scope;

/// Applies an operator until the box stops improving relatively by the
/// tolerance on every coordinate.
#[derive(Clone)]
pub struct ContractorLoop {
    op: SharedContractor,
    tol: f64,
}

impl ContractorLoop {
    pub fn new(op: SharedContractor, tol: f64) -> Self {
        debug_assert!((0.0..=1.0).contains(&tol));
        Self { op, tol }
    }

    pub fn tol(&self) -> f64 {
        self.tol
    }
}

impl Contractor for ContractorLoop {
    fn scope(&self) -> Scope {
        self.op.scope()
    }

    fn contract(&mut self, bx: &mut IntervalBox) -> Proof {
        loop {
            let prev = bx.clone();
            if self.op.contract(bx) == Proof::Empty {
                return Proof::Empty;
            }
            if !bx.improves(&prev, self.tol) {
                return Proof::Maybe;
            }
        }
    }

    fn name(&self) -> String {
        format!("loop contractor on [{}]", self.op.name())
    }

    fn swap_context(&mut self, ctx: &mut DagContext) -> bool {
        self.op.swap_context(ctx)
    }
}
