//! Box consistency on one variable of one function.
//!
//! BC3 finds the outermost sub-interval of a variable's domain whose bounds
//! are consistent with the constraint image, peeling thin boundary slices
//! and refining the remainder with the univariate Newton operator, under a
//! bisection stack.

use std::rc::Rc;

use crate::Proof;
use crate::boxes::IntervalBox;
use crate::contractor::newton_uni::{IntervalNewtonUni, ThickFun, UniFn};
use crate::contractor::Contractor;
use crate::dag::{Dag, FunId};
use crate::interval::Interval;
use crate::scope::Scope;
use crate::variable::Variable;

/// Peels a thin boundary slice whose width is a percentage of the whole.
#[derive(Debug, Clone, Copy)]
pub struct IntervalPeeler {
    factor: f64,
}

impl IntervalPeeler {
    pub fn new(factor: f64) -> Self {
        debug_assert!((0.0..=100.0).contains(&factor));
        Self { factor }
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn peel_left(&self, x: &Interval) -> Interval {
        let w = x.width() * self.factor / 100.0;
        let r = (x.left() + w).min(x.right());
        if r.is_finite() {
            Interval::new(x.left(), r)
        } else {
            Interval::point(x.left())
        }
    }

    pub fn peel_right(&self, x: &Interval) -> Interval {
        let w = x.width() * self.factor / 100.0;
        let l = (x.right() - w).max(x.left());
        if l.is_finite() {
            Interval::new(l, x.right())
        } else {
            Interval::point(x.right())
        }
    }
}

/// The BC3 contractor on one (function, variable) pair.
#[derive(Clone)]
pub struct ContractorBc3 {
    f: ThickFun,
    peeler: IntervalPeeler,
    max_iter: usize,
    newton: IntervalNewtonUni,
}

impl ContractorBc3 {
    pub fn new(
        dag: Rc<Dag>,
        fun: FunId,
        var: Variable,
        peel_factor: f64,
        max_iter: usize,
        newton: IntervalNewtonUni,
    ) -> Self {
        Self {
            f: ThickFun::new(dag, fun, var),
            peeler: IntervalPeeler::new(peel_factor),
            max_iter,
            newton,
        }
    }

    pub fn var(&self) -> &Variable {
        self.f.var()
    }

    // Consistency of a bound slice against the constraint image.
    fn is_consistent(&mut self, b: &Interval) -> Proof {
        let e = self.f.eval_raw(*b);
        let image = self.f.image();
        if e.is_empty() || !image.overlaps(&e) {
            Proof::Empty
        } else if image.contains_interval(&e) {
            Proof::Inner
        } else {
            Proof::Maybe
        }
    }

    fn shrink(&mut self, x: &Interval, res: &mut Interval, left: bool) -> Proof {
        let mut stack = vec![*x];
        let mut nb_iter = 0usize;

        while let Some(y) = stack.pop() {
            nb_iter += 1;
            if nb_iter > self.max_iter {
                *res = y;
                return Proof::Maybe;
            }

            // is the bound slice of y consistent?
            let (b, mut z) = if left {
                let b = self.peeler.peel_left(&y);
                (b, Interval::new(b.right(), y.right()))
            } else {
                let b = self.peeler.peel_right(&y);
                (b, Interval::new(y.left(), b.left()))
            };
            let proof = self.is_consistent(&b);
            if proof != Proof::Empty {
                *res = b;
                return proof;
            }

            let proof = self.newton.contract(&mut self.f, &mut z);
            if proof == Proof::Feasible {
                *res = z;
                return proof;
            }
            if proof != Proof::Empty {
                let c = z.midpoint();
                if z.strictly_contains(c) {
                    if left {
                        stack.push(Interval::new(c, z.right()));
                        stack.push(Interval::new(z.left(), c));
                    } else {
                        stack.push(Interval::new(z.left(), c));
                        stack.push(Interval::new(c, z.right()));
                    }
                } else {
                    *res = z;
                    return Proof::Maybe;
                }
            }
        }

        *res = Interval::EMPTY;
        Proof::Empty
    }
}

impl Contractor for ContractorBc3 {
    fn scope(&self) -> Scope {
        self.f.dag().fun(self.f.fun()).scope().clone()
    }

    fn contract(&mut self, bx: &mut IntervalBox) -> Proof {
        let v = self.f.var().clone();
        let image = self.f.image();

        // first evaluation also thickens the function
        let e = self.f.update(bx);
        if e.is_empty() || !e.overlaps(&image) {
            return Proof::Empty;
        }
        if image.contains_interval(&e) {
            return Proof::Inner;
        }

        let mut lsol = Interval::EMPTY;
        let proof = self.shrink(&bx.get(&v), &mut lsol, true);
        if proof == Proof::Empty {
            return Proof::Empty;
        }

        let mut rsol = Interval::EMPTY;
        let y = Interval::new(lsol.left(), bx.get(&v).right());
        let certif = self.shrink(&y, &mut rsol, false);

        bx.set(&v, lsol | rsol);
        proof.max(certif)
    }

    fn name(&self) -> String {
        format!("BC3 contractor #{} on {}", self.f.fun(), self.f.var())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contractor::Inflator;
    use crate::scope::Scope;
    use crate::term::Term;
    use crate::tolerance::Tolerance;
    use crate::variable::VarKind;

    fn newton() -> IntervalNewtonUni {
        IntervalNewtonUni::new(20, 1e-4, 1e-4, Inflator::default())
    }

    #[test]
    fn test_bc3_single_root() {
        // x^3 - 8 = 0 on [0, 5]: single root at 2
        let x = Variable::new(0, "x", VarKind::Real, Tolerance::default());
        let mut dag = Dag::new();
        let f = dag.insert(&(Term::var(&x).pow(3) - 8.0), Interval::ZERO);
        let dag = Rc::new(dag);
        let mut op = ContractorBc3::new(dag.clone(), f, x.clone(), 2.0, 30, newton());
        let mut bx = IntervalBox::new(
            Scope::singleton(x.clone()),
            vec![Interval::new(0.0, 5.0)],
        );
        let proof = op.contract(&mut bx);
        assert_ne!(proof, Proof::Empty);
        let d = bx.get(&x);
        assert!(d.contains(2.0));
        assert!(d.width() < 1e-6);
    }

    #[test]
    fn test_bc3_empty_and_inner() {
        let x = Variable::new(0, "x", VarKind::Real, Tolerance::default());
        let mut dag = Dag::new();
        let f = dag.insert(&(Term::var(&x).sqr() + 1.0), Interval::ZERO);
        let dag = Rc::new(dag);
        let mut op = ContractorBc3::new(dag, f, x.clone(), 2.0, 30, newton());
        let mut bx = IntervalBox::new(
            Scope::singleton(x.clone()),
            vec![Interval::new(-3.0, 3.0)],
        );
        assert_eq!(op.contract(&mut bx), Proof::Empty);

        let mut dag2 = Dag::new();
        let f2 = dag2.insert(&Term::var(&x).sqr(), Interval::new(-1.0, 100.0));
        let dag2 = Rc::new(dag2);
        let mut op2 = ContractorBc3::new(dag2, f2, x.clone(), 2.0, 30, newton());
        let mut bx2 = IntervalBox::new(
            Scope::singleton(x.clone()),
            vec![Interval::new(-3.0, 3.0)],
        );
        assert_eq!(op2.contract(&mut bx2), Proof::Inner);
    }

    #[test]
    fn test_bc3_two_roots_keeps_hull() {
        // x^2 = 4 on [-10, 10]: bounds contract to the outermost roots
        let x = Variable::new(0, "x", VarKind::Real, Tolerance::default());
        let mut dag = Dag::new();
        let f = dag.insert(&(Term::var(&x).sqr() - 4.0), Interval::ZERO);
        let dag = Rc::new(dag);
        let mut op = ContractorBc3::new(dag, f, x.clone(), 2.0, 30, newton());
        let mut bx = IntervalBox::new(
            Scope::singleton(x.clone()),
            vec![Interval::new(-10.0, 10.0)],
        );
        let proof = op.contract(&mut bx);
        assert_ne!(proof, Proof::Empty);
        let d = bx.get(&x);
        assert!(d.contains(2.0) && d.contains(-2.0));
        assert!(d.left() >= -2.0 - 1e-6 && d.right() <= 2.0 + 1e-6);
    }
}
