//! Univariate interval Newton operator.
//!
//! Works on a thick univariate function: one DAG function with every
//! variable but one frozen at its current domain. A Newton step intersects
//! the domain with `c - f(c)/f'(x)`; when the derivative straddles zero the
//! extended division may open a gap, and strict containment of the Newton
//! image proves existence of a root.

use std::rc::Rc;

use crate::Proof;
use crate::boxes::IntervalBox;
use crate::contractor::Inflator;
use crate::dag::{Dag, DagContext, FunId};
use crate::interval::{DivisionResult, Interval};
use crate::variable::Variable;

/// A univariate interval function with its derivative.
pub trait UniFn {
    fn eval(&mut self, x: Interval) -> Interval;
    fn diff(&mut self, x: Interval) -> Interval;
}

/// A DAG function seen as a function of one variable, the others being
/// fixed at the domains of the last [`ThickFun::update`] call. The image of
/// the function is subtracted, so roots are membership points.
#[derive(Clone)]
pub struct ThickFun {
    dag: Rc<Dag>,
    fun: FunId,
    var: Variable,
    ctx: DagContext,
}

impl ThickFun {
    pub fn new(dag: Rc<Dag>, fun: FunId, var: Variable) -> Self {
        let ctx = dag.new_context();
        Self {
            dag,
            fun,
            var,
            ctx,
        }
    }

    pub fn var(&self) -> &Variable {
        &self.var
    }

    pub fn image(&self) -> Interval {
        self.dag.fun(self.fun).image()
    }

    pub fn fun(&self) -> FunId {
        self.fun
    }

    pub fn dag(&self) -> &Rc<Dag> {
        &self.dag
    }

    /// Thickens the function on a box: full forward evaluation, keeping the
    /// other variables' values for the subsequent univariate passes.
    pub fn update(&mut self, bx: &IntervalBox) -> Interval {
        self.dag.interval_eval(self.fun, bx, &mut self.ctx)
    }

    /// Raw function value (image not subtracted) at `x`.
    pub fn eval_raw(&mut self, x: Interval) -> Interval {
        self.dag
            .interval_eval_only(self.fun, &self.var, x, &mut self.ctx)
    }
}

impl UniFn for ThickFun {
    fn eval(&mut self, x: Interval) -> Interval {
        self.eval_raw(x) - self.image()
    }

    fn diff(&mut self, x: Interval) -> Interval {
        self.dag
            .interval_diff_only(self.fun, &self.var, x, &mut self.ctx)
    }
}

/// The univariate interval Newton operator.
#[derive(Clone)]
pub struct IntervalNewtonUni {
    max_iter: usize,
    rel_tol: f64,
    certify_rel_tol: f64,
    inflator: Inflator,
}

impl IntervalNewtonUni {
    pub fn new(max_iter: usize, rel_tol: f64, certify_rel_tol: f64, inflator: Inflator) -> Self {
        debug_assert!(max_iter > 0);
        Self {
            max_iter,
            rel_tol,
            certify_rel_tol,
            inflator,
        }
    }

    /// Iterates Newton steps until no sufficient reduction, an iteration
    /// cap, emptiness, or an existence proof.
    pub fn contract(&self, f: &mut dyn UniFn, x: &mut Interval) -> Proof {
        let mut proof = Proof::Maybe;
        let mut y = *x;
        let mut nb_iter = 0usize;

        loop {
            let prev = y;
            let p = self.step(f, &mut y);
            tracing::trace!(%p, ?y, "uni-newton step");
            if p == Proof::Empty {
                *x = Interval::EMPTY;
                return Proof::Empty;
            }
            if p == Proof::Feasible {
                proof = Proof::Feasible;
            }
            nb_iter += 1;
            if nb_iter >= self.max_iter || !reduced_enough(&prev, &y, self.rel_tol) {
                break;
            }
        }
        *x = y;
        proof
    }

    /// One Newton step: `x := x intersect (c - f(c)/f'(x))` with extended
    /// division when the derivative straddles zero.
    pub fn step(&self, f: &mut dyn UniFn, x: &mut Interval) -> Proof {
        let fx = f.eval(*x);
        let dx = f.diff(*x);

        if fx.is_empty() || !fx.contains_zero() {
            return Proof::Empty;
        }
        if dx.is_empty() || dx.is_inf() || dx.is_zero() {
            return Proof::Maybe;
        }

        let c = x.midpoint();
        let fc = f.eval(Interval::point(c));
        if fc.is_empty() {
            return Proof::Maybe;
        }
        let c = Interval::point(c);

        if dx.strictly_contains_zero() {
            let nx = match Interval::ext_div(fc, dx) {
                DivisionResult::TwoPieces(q1, q2) => {
                    (*x & (c - q2)) | (*x & (c - q1))
                }
                DivisionResult::Single(q) => *x & (c - q),
            };
            *x = nx;
            if nx.is_empty() {
                Proof::Empty
            } else {
                Proof::Maybe
            }
        } else {
            let xx = c - fc / dx;
            let nx = *x & xx;
            let proof = if nx.is_empty() {
                Proof::Empty
            } else if x.contains_interval(&xx) {
                Proof::Feasible
            } else {
                Proof::Maybe
            };
            *x = nx;
            proof
        }
    }

    /// Contraction followed by a bisection refinement of both bounds,
    /// returning the union of what survives.
    pub fn search(&self, f: &mut dyn UniFn, x: &mut Interval) -> Proof {
        let mut proof = self.contract(f, x);
        if proof != Proof::Maybe || x.is_canonical() {
            return proof;
        }
        let pl = self.shrink_left(f, x);
        if pl == Proof::Empty {
            return proof;
        }
        let pr = self.shrink_right(f, x);
        if pl == Proof::Feasible || pr == Proof::Feasible {
            proof = Proof::Feasible;
        }
        proof
    }

    fn shrink_left(&self, f: &mut dyn UniFn, x: &mut Interval) -> Proof {
        let mut stack = vec![*x];
        while let Some(mut y) = stack.pop() {
            let proof = self.contract(f, &mut y);
            if proof == Proof::Empty {
                continue;
            }
            if proof == Proof::Feasible {
                *x = x.with_left(y.left());
                return proof;
            }
            if y.is_canonical() {
                *x = x.with_left(y.left());
                return Proof::Maybe;
            }
            let c = y.midpoint();
            stack.push(Interval::new(c, y.right()));
            stack.push(Interval::new(y.left(), c));
        }
        Proof::Empty
    }

    fn shrink_right(&self, f: &mut dyn UniFn, x: &mut Interval) -> Proof {
        let mut stack = vec![*x];
        while let Some(mut y) = stack.pop() {
            let proof = self.contract(f, &mut y);
            if proof == Proof::Empty {
                continue;
            }
            if proof == Proof::Feasible {
                *x = x.with_right(y.right());
                return proof;
            }
            if y.is_canonical() {
                *x = x.with_right(y.right());
                return Proof::Maybe;
            }
            let c = y.midpoint();
            stack.push(Interval::new(y.left(), c));
            stack.push(Interval::new(c, y.right()));
        }
        Proof::Empty
    }

    /// Inflation-based local search from the midpoint, proving existence
    /// when an inflated iterate absorbs its Newton image.
    pub fn local_search(&self, f: &mut dyn UniFn, x: &mut Interval) -> Proof {
        let mut proof = Proof::Maybe;
        let mut y = Interval::point(x.midpoint());
        let mut nb_iter = 0usize;

        loop {
            let prev = y;
            let p = self.local_step(f, &mut y);
            if p == Proof::Empty {
                y = *x;
                break;
            }
            if p == Proof::Feasible {
                proof = Proof::Feasible;
                break;
            }
            nb_iter += 1;
            if nb_iter >= self.max_iter
                || prev.distance(&y) <= self.certify_rel_tol * prev.mag().max(1.0)
            {
                y = *x;
                break;
            }
        }
        *x = y;
        proof
    }

    fn local_step(&self, f: &mut dyn UniFn, x: &mut Interval) -> Proof {
        let ix = self.inflator.inflate(x);
        let fix = f.eval(ix);
        let dix = f.diff(ix);

        if fix.is_empty() {
            return Proof::Empty;
        }
        if dix.is_empty() || dix.is_inf() || dix.contains_zero() {
            return Proof::Maybe;
        }
        let ic = Interval::point(ix.midpoint());
        let fic = f.eval(ic);
        if fic.is_empty() {
            return Proof::Maybe;
        }
        let nix = ic - fic / dix;
        let proof = if ix.contains_interval(&nix) {
            Proof::Feasible
        } else {
            Proof::Maybe
        };
        *x = nix;
        proof
    }
}

// Reduction test driving the outer Newton loop: iterate only while the
// width shrank by more than the relative tolerance.
fn reduced_enough(prev: &Interval, new: &Interval, rel_tol: f64) -> bool {
    if new.is_empty() {
        return false;
    }
    let (wp, wn) = (prev.width(), new.width());
    if !wp.is_finite() {
        return wn.is_finite();
    }
    wp > 0.0 && (wp - wn) / wp > rel_tol
}
