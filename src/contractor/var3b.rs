//! Variable-wise 3B shaving.

use crate::Proof;
use crate::boxes::IntervalBox;
use crate::contractor::{Contractor, SharedContractor};
use crate::dag::DagContext;
use crate::interval::Interval;
use crate::scope::Scope;
use crate::search::slicer::IntervalSlicer;
use crate::variable::Variable;

/// Slices a variable's domain and drops the boundary slices the operator
/// refutes, from the left then from the right; the domain becomes the hull
/// of the surviving facets.
#[derive(Clone)]
pub struct ContractorVar3B {
    op: SharedContractor,
    var: Variable,
    slicer: Box<dyn IntervalSlicer>,
    var_min_width: f64,
}

impl ContractorVar3B {
    pub fn new(
        op: SharedContractor,
        var: Variable,
        slicer: Box<dyn IntervalSlicer>,
        var_min_width: f64,
    ) -> Self {
        debug_assert!(op.scope().contains(&var));
        Self {
            op,
            var,
            slicer,
            var_min_width,
        }
    }

    pub fn var(&self) -> &Variable {
        &self.var
    }
}

impl Contractor for ContractorVar3B {
    fn scope(&self) -> Scope {
        self.op.scope()
    }

    fn contract(&mut self, bx: &mut IntervalBox) -> Proof {
        let dom = bx.get(&self.var);

        // small or unbounded domains are not worth shaving
        if dom.width() < self.var_min_width || dom.is_inf() {
            return Proof::Maybe;
        }

        let slices = self.slicer.slice(&dom);
        let nbs = slices.len();
        if nbs == 1 {
            return self.op.contract(bx);
        }

        // left to right: count refuted facets, keep the first survivor
        let mut nbl = 0usize;
        let mut lslice = Interval::EMPTY;
        for s in &slices {
            let mut facet = bx.clone();
            facet.set(&self.var, *s);
            if self.op.contract(&mut facet) == Proof::Empty {
                nbl += 1;
            } else {
                lslice = facet.get(&self.var);
                break;
            }
        }
        if nbl == nbs {
            return Proof::Empty;
        }

        // right to left, stopping before the left survivor
        let mut nbr = 0usize;
        let mut rslice = lslice;
        for s in slices.iter().rev() {
            let mut facet = bx.clone();
            facet.set(&self.var, *s);
            if self.op.contract(&mut facet) == Proof::Empty {
                nbr += 1;
                if nbr == nbs - nbl - 1 {
                    // a single consistent facet remains
                    break;
                }
            } else {
                rslice = facet.get(&self.var);
                break;
            }
        }

        bx.set(&self.var, Interval::new(lslice.left(), rslice.right()));
        Proof::Maybe
    }

    fn name(&self) -> String {
        format!("var3B contractor on {}", self.var)
    }

    fn swap_context(&mut self, ctx: &mut DagContext) -> bool {
        self.op.swap_context(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::Constraint;
    use crate::contractor::ConstraintContractor;
    use crate::scope::Scope;
    use crate::search::slicer::PartitionSlicer;
    use crate::term::Term;
    use crate::tolerance::Tolerance;
    use crate::variable::VarKind;

    #[test]
    fn test_var3b_shaves_both_sides() {
        // x^2 <= 1 on [-4, 4]: outer slices are refuted
        let x = Variable::new(0, "x", VarKind::Real, Tolerance::default());
        let c = Constraint::le(Term::var(&x).sqr(), 1.0);
        let mut op = ContractorVar3B::new(
            Box::new(ConstraintContractor::new(c)),
            x.clone(),
            Box::new(PartitionSlicer::new(8)),
            1e-6,
        );
        let mut b = IntervalBox::new(
            Scope::singleton(x.clone()),
            vec![Interval::new(-4.0, 4.0)],
        );
        assert_ne!(op.contract(&mut b), Proof::Empty);
        let d = b.get(&x);
        assert!(d.contains(0.0));
        assert!(d.left() >= -1.0 - 1e-9 && d.right() <= 1.0 + 1e-9);
    }

    #[test]
    fn test_var3b_detects_empty() {
        let x = Variable::new(0, "x", VarKind::Real, Tolerance::default());
        let c = Constraint::le(Term::var(&x).sqr(), -1.0);
        let mut op = ContractorVar3B::new(
            Box::new(ConstraintContractor::new(c)),
            x.clone(),
            Box::new(PartitionSlicer::new(4)),
            1e-6,
        );
        let mut b = IntervalBox::new(
            Scope::singleton(x.clone()),
            vec![Interval::new(-4.0, 4.0)],
        );
        assert_eq!(op.contract(&mut b), Proof::Empty);
    }
}
