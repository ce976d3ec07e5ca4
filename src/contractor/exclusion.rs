//! Exclusion regions around certified solutions.
//!
//! Once the Newton operator has proven that a region contains a unique
//! solution, any later box falling inside that region duplicates a solution
//! that is already recorded and can be pruned. The contractor accumulates
//! such regions as the search certifies solutions.

use crate::Proof;
use crate::boxes::IntervalBox;
use crate::contractor::newton::IntervalNewton;
use crate::contractor::Contractor;
use crate::scope::Scope;

#[derive(Clone)]
pub struct ContractorExclusionRegion {
    newton: IntervalNewton,
    exclusion: Vec<IntervalBox>,
    inflate_coefficient: f64,
    max_growth: usize,
}

impl ContractorExclusionRegion {
    pub fn new(newton: IntervalNewton) -> Self {
        Self {
            newton,
            exclusion: Vec::new(),
            inflate_coefficient: 10.0,
            max_growth: 20,
        }
    }

    pub fn nb_regions(&self) -> usize {
        self.exclusion.len()
    }

    pub fn regions(&self) -> &[IntervalBox] {
        &self.exclusion
    }

    /// Tries to certify a uniqueness region inside the box and grows it
    /// while uniqueness still holds. The largest proven region is recorded
    /// for pruning; the returned box is the tight initial enclosure of the
    /// certified solution, which the caller can fold into the reported
    /// solution so the proven point stays inside it.
    pub fn compute_new_region(&mut self, bx: &IntervalBox) -> Option<IntervalBox> {
        let seed = self.newton.certify_region(bx)?;
        let mut region = seed.clone();
        for _ in 0..self.max_growth {
            let grown = scale_box(&region, self.inflate_coefficient);
            if self.newton.proves_unique(&grown) {
                region = grown;
            } else {
                break;
            }
        }
        tracing::debug!("new exclusion region recorded");
        self.exclusion.push(region);
        Some(seed)
    }
}

// Scales a box around its midpoint.
fn scale_box(bx: &IntervalBox, factor: f64) -> IntervalBox {
    let mut out = bx.clone();
    for i in 0..bx.size() {
        let x = bx.at(i);
        let m = crate::interval::Interval::point(x.midpoint());
        out.set_at(i, m + crate::interval::Interval::point(factor) * (x - m));
    }
    out
}

impl Contractor for ContractorExclusionRegion {
    fn scope(&self) -> Scope {
        self.newton.scope()
    }

    fn contract(&mut self, bx: &mut IntervalBox) -> Proof {
        let scope = self.newton.scope();
        for region in &self.exclusion {
            let covered = scope
                .iter()
                .all(|v| region.get(v).contains_interval(&bx.get(v)));
            if covered {
                // the box only holds the solution already certified there
                return Proof::Empty;
            }
        }
        Proof::Maybe
    }

    fn name(&self) -> String {
        format!("exclusion region contractor ({} regions)", self.exclusion.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use crate::contractor::gauss_seidel::IntervalGaussSeidel;
    use crate::contractor::Inflator;
    use crate::dag::Dag;
    use crate::interval::Interval;
    use crate::term::Term;
    use crate::tolerance::Tolerance;
    use crate::variable::{VarKind, Variable};

    #[test]
    fn test_certified_region_prunes_duplicates() {
        let x = Variable::new(0, "x", VarKind::Real, Tolerance::default());
        let y = Variable::new(1, "y", VarKind::Real, Tolerance::default());
        let mut dag = Dag::new();
        dag.insert(
            &(Term::var(&x).sqr() + Term::var(&y).sqr() - 1.0),
            Interval::ZERO,
        );
        dag.insert(&(Term::var(&x) - Term::var(&y)), Interval::ZERO);
        let dag = Rc::new(dag);
        let newton = IntervalNewton::new(
            dag.clone(),
            vec![0, 1],
            IntervalGaussSeidel::new(50, Tolerance::rel(1e-6), Tolerance::rel(1e-6), 1e-8),
            30,
            1e-4,
            20,
            1e-4,
            Inflator::default(),
        )
        .unwrap();
        let mut op = ContractorExclusionRegion::new(newton);

        let r = 0.5_f64.sqrt();
        let solution_box = IntervalBox::new(
            dag.scope().clone(),
            vec![
                Interval::new(r - 1e-6, r + 1e-6),
                Interval::new(r - 1e-6, r + 1e-6),
            ],
        );
        let seed = op.compute_new_region(&solution_box).unwrap();
        // the returned enclosure holds the certified solution
        assert!(seed.scope().iter().all(|v| seed.get(v).contains(r)));

        // a box strictly inside the certified region is a duplicate
        let mut dup = solution_box.clone();
        assert_eq!(op.contract(&mut dup), Proof::Empty);

        // a distant box is untouched
        let mut far = IntervalBox::new(
            dag.scope().clone(),
            vec![Interval::new(-0.9, -0.5), Interval::new(-0.9, -0.5)],
        );
        assert_eq!(op.contract(&mut far), Proof::Maybe);
    }
}
