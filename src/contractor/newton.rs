//! Multivariate interval Newton on square systems of equations.
//!
//! One step solves `J(x) * (x - m) = -F(m)` approximately with the
//! preconditioned interval Gauss-Seidel and intersects the result with the
//! box. The Jacobian uses Hansen's refinement: column j is evaluated with
//! the variables before j collapsed to their midpoints. Certification
//! inflates an iterate until its Newton image is strictly absorbed, which
//! proves the existence of a solution.

use std::rc::Rc;

use crate::boxes::IntervalBox;
use crate::contractor::gauss_seidel::IntervalGaussSeidel;
use crate::contractor::{Contractor, Inflator};
use crate::dag::{Dag, DagContext, FunId};
use crate::interval::Interval;
use crate::linalg::{IntervalMatrix, IntervalVector};
use crate::scope::Scope;
use crate::{Error, Proof, Result};

#[derive(Clone)]
pub struct IntervalNewton {
    dag: Rc<Dag>,
    funs: Vec<FunId>,
    scope: Scope,
    gs: IntervalGaussSeidel,
    max_iter: usize,
    rel_tol: f64,
    certify_max_iter: usize,
    certify_rel_tol: f64,
    inflator: Inflator,
    ctx: DagContext,
}

impl IntervalNewton {
    /// Builds the operator for a set of DAG functions with singleton
    /// images. The system must be square.
    pub fn new(
        dag: Rc<Dag>,
        funs: Vec<FunId>,
        gs: IntervalGaussSeidel,
        max_iter: usize,
        rel_tol: f64,
        certify_max_iter: usize,
        certify_rel_tol: f64,
        inflator: Inflator,
    ) -> Result<Self> {
        let scope = funs
            .iter()
            .fold(Scope::new(), |s, &f| s.union(dag.fun(f).scope()));
        if scope.size() != funs.len() || funs.is_empty() {
            return Err(Error::NonSquareSystem);
        }
        let ctx = dag.new_context();
        Ok(Self {
            dag,
            funs,
            scope,
            gs,
            max_iter,
            rel_tol,
            certify_max_iter,
            certify_rel_tol,
            inflator,
            ctx,
        })
    }

    fn dim(&self) -> usize {
        self.funs.len()
    }

    // Residual vector F(m) - image, evaluated rigorously at a point box.
    fn eval_residual(&mut self, at: &IntervalBox) -> Option<IntervalVector> {
        let mut out = IntervalVector::new(self.dim(), Interval::ZERO);
        for (i, &f) in self.funs.iter().enumerate() {
            let e = self.dag.interval_eval(f, at, &mut self.ctx);
            if e.is_empty() {
                return None;
            }
            out.set(i, e - self.dag.fun(f).image());
        }
        Some(out)
    }

    // Hansen's Jacobian: for column j, the variables before j are swept to
    // their midpoints before differentiating.
    fn hansen_jacobian(&mut self, bx: &IntervalBox) -> Option<IntervalMatrix> {
        let n = self.dim();
        let mut jac = IntervalMatrix::new(n, n, Interval::ZERO);
        let mut sweep = bx.clone();
        for j in 0..n {
            let vj = self.scope.var(j).clone();
            for (i, &f) in self.funs.iter().enumerate() {
                let e = self.dag.interval_eval(f, &sweep, &mut self.ctx);
                if e.is_empty() {
                    return None;
                }
                self.dag.interval_diff(f, &mut self.ctx);
                let d = self.dag.interval_deriv(&vj, &self.ctx);
                if d.is_empty() {
                    return None;
                }
                jac.set(i, j, d);
            }
            sweep.set(&vj, Interval::point(bx.get(&vj).midpoint()));
        }
        Some(jac)
    }

    fn sub_box(&self, bx: &IntervalBox) -> IntervalBox {
        IntervalBox::new(
            self.scope.clone(),
            self.scope.iter().map(|v| bx.get(v)).collect(),
        )
    }

    // One contraction step on the system scope. Returns the proof and
    // whether the box improved enough to iterate.
    fn step(&mut self, bx: &mut IntervalBox) -> (Proof, bool) {
        let sub = self.sub_box(bx);
        let mid = IntervalBox::new(
            self.scope.clone(),
            self.scope
                .iter()
                .map(|v| Interval::point(sub.get(v).midpoint()))
                .collect(),
        );
        let Some(fm) = self.eval_residual(&mid) else {
            return (Proof::Maybe, false);
        };
        let Some(jac) = self.hansen_jacobian(&sub) else {
            return (Proof::Maybe, false);
        };

        let n = self.dim();
        let mut d = IntervalVector::from_fn(n, |i| {
            sub.at(i) - Interval::point(sub.at(i).midpoint())
        });
        let rhs = IntervalVector::from_fn(n, |i| -fm.get(i));
        if self.gs.contract_precond(&jac, &mut d, &rhs) == Proof::Empty {
            return (Proof::Empty, false);
        }

        let mut improved = false;
        for (i, v) in self.scope.clone().iter().enumerate() {
            let m = Interval::point(sub.at(i).midpoint());
            let nx = (m + d.get(i)) & bx.get(v);
            if nx.is_empty() {
                return (Proof::Empty, false);
            }
            let old = bx.get(v);
            if old.width() > 0.0 && (old.width() - nx.width()) / old.width() > self.rel_tol {
                improved = true;
            }
            bx.set(v, nx);
        }
        (Proof::Maybe, improved)
    }

    /// Existence certification by inflation. On success the system is
    /// proven to admit a solution inside the inflated iterate, and the
    /// proof is upgraded to FEASIBLE.
    pub fn certify(&mut self, bx: &IntervalBox) -> Proof {
        match self.certify_region(bx) {
            Some(_) => Proof::Feasible,
            None => Proof::Maybe,
        }
    }

    /// One Newton image test on the box itself: strict containment of the
    /// image proves existence and uniqueness of a solution in the box.
    pub fn proves_unique(&mut self, bx: &IntervalBox) -> bool {
        let sub = self.sub_box(bx);
        let mid = IntervalBox::new(
            self.scope.clone(),
            self.scope
                .iter()
                .map(|v| Interval::point(sub.get(v).midpoint()))
                .collect(),
        );
        let Some(fm) = self.eval_residual(&mid) else {
            return false;
        };
        let Some(jac) = self.hansen_jacobian(&sub) else {
            return false;
        };
        let n = self.dim();
        let mut d = IntervalVector::from_fn(n, |i| {
            sub.at(i) - Interval::point(sub.at(i).midpoint())
        });
        let rhs = IntervalVector::from_fn(n, |i| -fm.get(i));
        if self.gs.contract_precond(&jac, &mut d, &rhs) == Proof::Empty {
            return false;
        }
        let ny = IntervalBox::new(
            self.scope.clone(),
            (0..n)
                .map(|i| Interval::point(sub.at(i).midpoint()) + d.get(i))
                .collect(),
        );
        !ny.is_empty() && sub.strictly_contains_box(&ny)
    }

    /// Certification that also returns the region in which the Newton
    /// operator proved the solution to exist and be unique.
    pub fn certify_region(&mut self, bx: &IntervalBox) -> Option<IntervalBox> {
        let sub = self.sub_box(bx);
        let mut y = IntervalBox::new(
            self.scope.clone(),
            self.scope
                .iter()
                .map(|v| Interval::point(sub.get(v).midpoint()))
                .collect(),
        );

        for _ in 0..self.certify_max_iter {
            let mut iy = y.clone();
            self.inflator.inflate_box(&mut iy);

            let mid = IntervalBox::new(
                self.scope.clone(),
                self.scope
                    .iter()
                    .map(|v| Interval::point(iy.get(v).midpoint()))
                    .collect(),
            );
            let fm = self.eval_residual(&mid)?;
            let jac = self.hansen_jacobian(&iy)?;

            let n = self.dim();
            let mut d = IntervalVector::from_fn(n, |i| {
                iy.at(i) - Interval::point(iy.at(i).midpoint())
            });
            let rhs = IntervalVector::from_fn(n, |i| -fm.get(i));
            if self.gs.contract_precond(&jac, &mut d, &rhs) == Proof::Empty {
                return None;
            }

            let ny = IntervalBox::new(
                self.scope.clone(),
                (0..n)
                    .map(|i| Interval::point(iy.at(i).midpoint()) + d.get(i))
                    .collect(),
            );
            if ny.is_empty() {
                return None;
            }
            if iy.strictly_contains_box(&ny) {
                tracing::debug!("existence certified by the inflated Newton step");
                return Some(iy);
            }
            // insufficient progress between successive iterates ends the loop
            let mut moved = false;
            for i in 0..n {
                if ny.at(i).distance(&y.at(i))
                    > self.certify_rel_tol * y.at(i).mag().max(1.0)
                {
                    moved = true;
                }
            }
            y = ny;
            if !moved {
                return None;
            }
        }
        None
    }
}

impl Contractor for IntervalNewton {
    fn scope(&self) -> Scope {
        self.scope.clone()
    }

    fn contract(&mut self, bx: &mut IntervalBox) -> Proof {
        for _ in 0..self.max_iter {
            let (proof, improved) = self.step(bx);
            if proof == Proof::Empty {
                return Proof::Empty;
            }
            if !improved {
                break;
            }
        }
        Proof::Maybe
    }

    fn name(&self) -> String {
        format!("interval Newton on {} equations", self.funs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Term;
    use crate::tolerance::Tolerance;
    use crate::variable::{VarKind, Variable};

    fn gs() -> IntervalGaussSeidel {
        IntervalGaussSeidel::new(50, Tolerance::rel(1e-6), Tolerance::rel(1e-6), 1e-8)
    }

    fn circle_line() -> (Rc<Dag>, Variable, Variable) {
        let x = Variable::new(0, "x", VarKind::Real, Tolerance::default());
        let y = Variable::new(1, "y", VarKind::Real, Tolerance::default());
        let mut dag = Dag::new();
        dag.insert(
            &(Term::var(&x).sqr() + Term::var(&y).sqr() - 1.0),
            Interval::ZERO,
        );
        dag.insert(&(Term::var(&x) - Term::var(&y)), Interval::ZERO);
        (Rc::new(dag), x, y)
    }

    #[test]
    fn test_newton_contracts_circle_line() {
        let (dag, x, y) = circle_line();
        let mut newton = IntervalNewton::new(
            dag.clone(),
            vec![0, 1],
            gs(),
            30,
            1e-4,
            20,
            1e-4,
            Inflator::default(),
        )
        .unwrap();
        // a box around the positive intersection (sqrt(1/2), sqrt(1/2))
        let mut bx = IntervalBox::new(
            dag.scope().clone(),
            vec![Interval::new(0.5, 0.9), Interval::new(0.5, 0.9)],
        );
        assert_ne!(newton.contract(&mut bx), Proof::Empty);
        let r = 0.5_f64.sqrt();
        assert!(bx.get(&x).contains(r));
        assert!(bx.get(&y).contains(r));
        assert!(bx.get(&x).width() < 0.01);
    }

    #[test]
    fn test_newton_certifies_solution() {
        let (dag, _, _) = circle_line();
        let mut newton = IntervalNewton::new(
            dag.clone(),
            vec![0, 1],
            gs(),
            30,
            1e-4,
            20,
            1e-4,
            Inflator::default(),
        )
        .unwrap();
        let r = 0.5_f64.sqrt();
        let bx = IntervalBox::new(
            dag.scope().clone(),
            vec![
                Interval::new(r - 1e-4, r + 1e-4),
                Interval::new(r - 1e-4, r + 1e-4),
            ],
        );
        assert_eq!(newton.certify(&bx), Proof::Feasible);
    }

    #[test]
    fn test_non_square_system_rejected() {
        let (dag, _, _) = circle_line();
        let r = IntervalNewton::new(
            dag,
            vec![0],
            gs(),
            30,
            1e-4,
            20,
            1e-4,
            Inflator::default(),
        );
        assert!(matches!(r, Err(Error::NonSquareSystem)));
    }
}
