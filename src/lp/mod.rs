//! Linear programming with rigorous bound recovery.
//!
//! The model is a list of ranged rows `L <= a'x <= U` over bounded
//! variables with a linear objective. The driver solves it with clarabel
//! and then *re-derives* every bound it reports with interval arithmetic
//! from the dual values, so a floating-point LP solution can never make the
//! surrounding contractor unsound: an unverifiable answer degrades to
//! nothing instead of a wrong bound.

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus, SupportedConeT,
};

use crate::interval::Interval;
use crate::{Error, Result};

/// Handle on a linear variable of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinVar {
    index: usize,
}

impl LinVar {
    pub fn index(&self) -> usize {
        self.index
    }
}

/// A sparse linear expression `sum coef_k * var_k`.
#[derive(Debug, Clone, Default)]
pub struct LinExpr {
    coefs: Vec<f64>,
    vars: Vec<usize>,
}

impl LinExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_terms(coefs: Vec<f64>, vars: Vec<LinVar>) -> Self {
        Self {
            coefs,
            vars: vars.into_iter().map(|v| v.index).collect(),
        }
    }

    pub fn add_term(&mut self, coef: f64, v: LinVar) {
        self.coefs.push(coef);
        self.vars.push(v.index);
    }

    pub fn nb_terms(&self) -> usize {
        self.coefs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, usize)> + '_ {
        self.coefs.iter().copied().zip(self.vars.iter().copied())
    }

    // Interval evaluation at a real point.
    fn eval_point(&self, x: &[f64]) -> Interval {
        let mut s = Interval::ZERO;
        for (a, j) in self.iter() {
            s += Interval::point(a) * Interval::point(x[j]);
        }
        s
    }
}

/// A ranged row `lb <= expr <= ub`; equalities have `lb == ub`.
#[derive(Debug, Clone)]
pub struct LinCtr {
    pub lb: f64,
    pub expr: LinExpr,
    pub ub: f64,
}

/// Outcome of the last optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationStatus {
    Optimal,
    Infeasible,
    IterationLimit,
    TimeLimit,
    Other,
}

/// A linear program together with the state of its last resolution.
#[derive(Debug, Clone)]
pub struct LpModel {
    lb: Vec<f64>,
    ub: Vec<f64>,
    ctrs: Vec<LinCtr>,
    obj: LinExpr,
    minimization: bool,
    max_iter: usize,
    max_seconds: f64,

    status: OptimizationStatus,
    primal: Vec<f64>,
    // signed multipliers per logical row, then per variable bound pair
    row_duals: Vec<f64>,
    obj_val: f64,
}

impl LpModel {
    pub fn new(max_iter: usize, max_seconds: f64) -> Self {
        Self {
            lb: Vec::new(),
            ub: Vec::new(),
            ctrs: Vec::new(),
            obj: LinExpr::new(),
            minimization: true,
            max_iter,
            max_seconds,
            status: OptimizationStatus::Other,
            primal: Vec::new(),
            row_duals: Vec::new(),
            obj_val: f64::NAN,
        }
    }

    /// Creates a bounded variable.
    pub fn make_var(&mut self, lb: f64, ub: f64) -> LinVar {
        self.lb.push(lb);
        self.ub.push(ub);
        LinVar {
            index: self.lb.len() - 1,
        }
    }

    pub fn nb_vars(&self) -> usize {
        self.lb.len()
    }

    pub fn nb_ctrs(&self) -> usize {
        self.ctrs.len()
    }

    pub fn var_domain(&self, v: LinVar) -> Interval {
        Interval::new(self.lb[v.index], self.ub[v.index])
    }

    /// Narrows a variable's bounds.
    pub fn set_var_domain(&mut self, v: LinVar, x: Interval) {
        self.lb[v.index] = x.left();
        self.ub[v.index] = x.right();
    }

    /// Adds `lb <= expr <= ub`.
    pub fn add_ctr(&mut self, lb: f64, expr: LinExpr, ub: f64) {
        self.ctrs.push(LinCtr { lb, expr, ub });
    }

    /// Adds `expr <= ub`.
    pub fn add_ctr_le(&mut self, expr: LinExpr, ub: f64) {
        self.add_ctr(f64::NEG_INFINITY, expr, ub);
    }

    /// Adds `lb <= expr`.
    pub fn add_ctr_ge(&mut self, lb: f64, expr: LinExpr) {
        self.add_ctr(lb, expr, f64::INFINITY);
    }

    pub fn set_obj(&mut self, obj: LinExpr) {
        self.obj = obj;
    }

    pub fn set_minimization(&mut self) {
        self.minimization = true;
    }

    pub fn set_maximization(&mut self) {
        self.minimization = false;
    }

    pub fn status(&self) -> OptimizationStatus {
        self.status
    }

    pub fn obj_val(&self) -> f64 {
        self.obj_val
    }

    pub fn primal(&self) -> &[f64] {
        &self.primal
    }

    /// Solves the model from scratch.
    pub fn optimize(&mut self) -> Result<bool> {
        self.run()
    }

    /// Re-solves after an objective change. The constraint matrix is
    /// rebuilt identically, so the solved form is reused at the modeling
    /// level even though the backend has no warm start.
    pub fn reoptimize(&mut self) -> Result<bool> {
        self.run()
    }

    fn run(&mut self) -> Result<bool> {
        let n = self.nb_vars();
        // conic assembly: equality rows first (Zero cone), then the
        // inequality rows (Nonnegative cone)
        let mut cols: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        let mut b: Vec<f64> = Vec::new();
        let mut n_eq = 0usize;

        for c in &self.ctrs {
            if c.lb == c.ub {
                let r = b.len();
                for (a, j) in c.expr.iter() {
                    cols[j].push((r, a));
                }
                b.push(c.ub);
                n_eq += 1;
            }
        }
        let mut ineq_plan: Vec<IneqRow> = Vec::new();
        for (k, c) in self.ctrs.iter().enumerate() {
            if c.lb == c.ub {
                continue;
            }
            if c.ub.is_finite() {
                ineq_plan.push(IneqRow::CtrUb(k));
            }
            if c.lb.is_finite() {
                ineq_plan.push(IneqRow::CtrLb(k));
            }
        }
        for j in 0..n {
            if self.ub[j].is_finite() {
                ineq_plan.push(IneqRow::VarUb(j));
            }
            if self.lb[j].is_finite() {
                ineq_plan.push(IneqRow::VarLb(j));
            }
        }
        for row in &ineq_plan {
            let r = b.len();
            match row {
                IneqRow::CtrUb(k) => {
                    for (a, j) in self.ctrs[*k].expr.iter() {
                        cols[j].push((r, a));
                    }
                    b.push(self.ctrs[*k].ub);
                }
                IneqRow::CtrLb(k) => {
                    for (a, j) in self.ctrs[*k].expr.iter() {
                        cols[j].push((r, -a));
                    }
                    b.push(-self.ctrs[*k].lb);
                }
                IneqRow::VarUb(j) => {
                    cols[*j].push((r, 1.0));
                    b.push(self.ub[*j]);
                }
                IneqRow::VarLb(j) => {
                    cols[*j].push((r, -1.0));
                    b.push(-self.lb[*j]);
                }
            }
        }

        let m = b.len();
        let mut col_ptr = Vec::with_capacity(n + 1);
        let mut row_idx = Vec::new();
        let mut values = Vec::new();
        let mut nnz = 0usize;
        for col in cols.iter_mut() {
            col_ptr.push(nnz);
            col.sort_by_key(|(r, _)| *r);
            for &(r, v) in col.iter() {
                row_idx.push(r);
                values.push(v);
                nnz += 1;
            }
        }
        col_ptr.push(nnz);

        let a_mat = CscMatrix::new(m, n, col_ptr, row_idx, values);
        let p_mat = CscMatrix::<f64>::zeros((n, n));

        let sign = if self.minimization { 1.0 } else { -1.0 };
        let mut q = vec![0.0; n];
        for (a, j) in self.obj.iter() {
            q[j] += sign * a;
        }

        let mut cones: Vec<SupportedConeT<f64>> = Vec::new();
        if n_eq > 0 {
            cones.push(SupportedConeT::ZeroConeT(n_eq));
        }
        if m > n_eq {
            cones.push(SupportedConeT::NonnegativeConeT(m - n_eq));
        }

        let settings = DefaultSettingsBuilder::default()
            .verbose(false)
            .max_iter(self.max_iter as u32)
            .time_limit(self.max_seconds)
            .build()
            .map_err(|e| Error::LinearSolver {
                reason: format!("settings: {:?}", e),
            })?;
        let mut solver =
            DefaultSolver::new(&p_mat, &q, &a_mat, &b, &cones, settings).map_err(|e| {
                Error::LinearSolver {
                    reason: format!("{:?}", e),
                }
            })?;
        solver.solve();
        let sol = &solver.solution;

        self.status = match sol.status {
            SolverStatus::Solved | SolverStatus::AlmostSolved => OptimizationStatus::Optimal,
            SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
                OptimizationStatus::Infeasible
            }
            SolverStatus::MaxIterations => OptimizationStatus::IterationLimit,
            SolverStatus::MaxTime => OptimizationStatus::TimeLimit,
            _ => OptimizationStatus::Other,
        };
        self.primal = sol.x.clone();
        self.obj_val = sign * sol.obj_val;

        // fold the conic duals back to one signed multiplier per logical
        // row, relative to the internal minimization objective; the
        // interval certificates revalidate them from scratch
        let z = &sol.z;
        let mut row_duals = vec![0.0; self.ctrs.len() + n];
        let mut r = 0usize;
        for (k, c) in self.ctrs.iter().enumerate() {
            if c.lb == c.ub {
                row_duals[k] = -z[r];
                r += 1;
            }
        }
        for row in &ineq_plan {
            let zr = z[r];
            r += 1;
            match row {
                IneqRow::CtrUb(k) => row_duals[*k] -= zr,
                IneqRow::CtrLb(k) => row_duals[*k] += zr,
                IneqRow::VarUb(j) => row_duals[self.ctrs.len() + *j] -= zr,
                IneqRow::VarLb(j) => row_duals[self.ctrs.len() + *j] += zr,
            }
        }
        self.row_duals = row_duals;

        Ok(self.status == OptimizationStatus::Optimal)
    }

    // Interval bound on the internal minimization objective derived from
    // the logical multipliers y:
    //   obj(x) = sum_j y_j (a_j' x) + r' x   with   r = c - A' y,
    // where each row value lies in [L_j, U_j] and x within its bounds.
    fn dual_bound(&self, y: &[f64]) -> Interval {
        let n = self.nb_vars();
        let sign = if self.minimization { 1.0 } else { -1.0 };
        let mut r: Vec<Interval> = vec![Interval::ZERO; n];
        for (a, j) in self.obj.iter() {
            r[j] += Interval::point(sign * a);
        }
        let mut total = Interval::ZERO;
        for (k, c) in self.ctrs.iter().enumerate() {
            let yk = y[k];
            if yk == 0.0 {
                continue;
            }
            for (a, j) in c.expr.iter() {
                r[j] += Interval::point(-yk) * Interval::point(a);
            }
            total += Interval::point(yk) * Interval::new(c.lb, c.ub);
        }
        for j in 0..n {
            let yk = y[self.ctrs.len() + j];
            if yk != 0.0 {
                r[j] += Interval::point(-yk);
                total += Interval::point(yk) * Interval::new(self.lb[j], self.ub[j]);
            }
        }
        for j in 0..n {
            total += r[j] * Interval::new(self.lb[j], self.ub[j]);
        }
        total
    }

    /// A certified bound on the optimum after a successful optimization: a
    /// lower bound for a minimization, an upper bound for a maximization.
    /// Infinite when the duals do not support a finite certificate, which
    /// simply yields no contraction.
    pub fn safe_obj_val(&self) -> f64 {
        let bound = self.dual_bound(&self.row_duals).left();
        if self.minimization { bound } else { -bound }
    }

    /// Rigorous Farkas check of an infeasible outcome: true only if the
    /// dual ray certifies, in interval arithmetic, that no point within the
    /// variable bounds satisfies every row.
    pub fn is_safe_infeasible(&self) -> bool {
        if self.status != OptimizationStatus::Infeasible {
            return false;
        }
        let check = |y: &[f64]| -> bool {
            let n = self.nb_vars();
            // w = A'y; compare the reachable range of w'x over the bounds
            // with what the row memberships impose
            let mut w: Vec<Interval> = vec![Interval::ZERO; n];
            let mut required = Interval::ZERO;
            for (k, c) in self.ctrs.iter().enumerate() {
                let yk = y[k];
                if yk == 0.0 {
                    continue;
                }
                for (a, j) in c.expr.iter() {
                    w[j] += Interval::point(yk) * Interval::point(a);
                }
                required += Interval::point(yk) * Interval::new(c.lb, c.ub);
            }
            for j in 0..n {
                let yk = y[self.ctrs.len() + j];
                if yk != 0.0 {
                    w[j] += Interval::point(yk);
                    required += Interval::point(yk) * Interval::new(self.lb[j], self.ub[j]);
                }
            }
            let mut reachable = Interval::ZERO;
            for j in 0..n {
                reachable += w[j] * Interval::new(self.lb[j], self.ub[j]);
            }
            // every point within the bounds would need to reach
            // required.left(), and provably cannot
            reachable.right() < required.left()
        };
        let neg: Vec<f64> = self.row_duals.iter().map(|v| -v).collect();
        check(&self.row_duals) || check(&neg)
    }

    /// Interval re-check of the returned primal point against every row
    /// and bound, within a small relative slack.
    pub fn is_primal_solution_feasible(&self) -> bool {
        if self.primal.len() != self.nb_vars() {
            return false;
        }
        let slack = 1.0e-6;
        for (j, &xj) in self.primal.iter().enumerate() {
            let width = (self.ub[j] - self.lb[j]).abs().max(1.0);
            if xj < self.lb[j] - slack * width || xj > self.ub[j] + slack * width {
                return false;
            }
        }
        for c in &self.ctrs {
            let e = c.expr.eval_point(&self.primal);
            let width = if (c.ub - c.lb).is_finite() {
                (c.ub - c.lb).abs().max(1.0)
            } else {
                1.0
            };
            if (c.lb.is_finite() && e.right() < c.lb - slack * width)
                || (c.ub.is_finite() && e.left() > c.ub + slack * width)
            {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy)]
enum IneqRow {
    CtrUb(usize),
    CtrLb(usize),
    VarUb(usize),
    VarLb(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    // min x + y subject to x + y >= 1, 0 <= x, y <= 2
    fn simple_model() -> LpModel {
        let mut lp = LpModel::new(100, 10.0);
        let x = lp.make_var(0.0, 2.0);
        let y = lp.make_var(0.0, 2.0);
        let mut e = LinExpr::new();
        e.add_term(1.0, x);
        e.add_term(1.0, y);
        lp.add_ctr_ge(1.0, e.clone());
        lp.set_obj(e);
        lp
    }

    #[test]
    fn test_minimize_with_safe_bound() {
        let mut lp = simple_model();
        assert!(lp.optimize().unwrap());
        assert_eq!(lp.status(), OptimizationStatus::Optimal);
        assert!((lp.obj_val() - 1.0).abs() < 1e-6);
        let safe = lp.safe_obj_val();
        // the certified bound is below the true optimum, and close to it
        assert!(safe <= 1.0 + 1e-9);
        assert!(safe > 0.99);
    }

    #[test]
    fn test_maximize() {
        let mut lp = simple_model();
        lp.set_maximization();
        assert!(lp.optimize().unwrap());
        assert!((lp.obj_val() - 4.0).abs() < 1e-6);
        let safe = lp.safe_obj_val();
        assert!(safe >= 4.0 - 1e-9);
        assert!(safe < 4.01);
    }

    #[test]
    fn test_infeasible_certified() {
        let mut lp = LpModel::new(100, 10.0);
        let x = lp.make_var(0.0, 1.0);
        let mut e = LinExpr::new();
        e.add_term(1.0, x);
        lp.add_ctr_ge(5.0, e.clone());
        lp.set_obj(e);
        let ok = lp.optimize().unwrap();
        assert!(!ok);
        assert_eq!(lp.status(), OptimizationStatus::Infeasible);
        assert!(lp.is_safe_infeasible());
    }

    #[test]
    fn test_primal_feasibility_check() {
        let mut lp = simple_model();
        lp.optimize().unwrap();
        assert!(lp.is_primal_solution_feasible());
    }
}
