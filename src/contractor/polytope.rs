//! Polytope hull contraction.
//!
//! A linear outer approximation of the feasible set is built from the DAG,
//! then each variable is minimized and maximized over the polytope to
//! shrink its interval. Two creators are available: RLT introduces one LP
//! variable per DAG node and relaxes every operation node with sound
//! envelope cuts; Taylor works on problem variables only, with first-order
//! cuts anchored at two opposite corners of the box. Only bounds that
//! survive the interval re-derivation from the LP duals are used.

use std::rc::Rc;

use crate::Proof;
use crate::boxes::IntervalBox;
use crate::contractor::reform::{
    over_concave, over_convex, over_line, relax_concavo_convex_cos_sin, under_concave,
    under_convex,
};
use crate::contractor::Contractor;
use crate::dag::{Dag, DagContext, DagOp};
use crate::interval::Interval;
use crate::lp::{LinExpr, LinVar, LpModel, OptimizationStatus};
use crate::scope::Scope;
use crate::variable::Variable;

/// Style of the linear outer approximation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolytopeCreatorStyle {
    Rlt,
    Taylor,
}

#[derive(Clone)]
pub struct ContractorPolytope {
    dag: Rc<Dag>,
    style: PolytopeCreatorStyle,
    eq_tol: f64,
    lp_iter: usize,
    lp_time: f64,
    ctx: DagContext,
}

impl ContractorPolytope {
    pub fn new(
        dag: Rc<Dag>,
        style: PolytopeCreatorStyle,
        eq_tol: f64,
        lp_iter: usize,
        lp_time: f64,
    ) -> Self {
        let ctx = dag.new_context();
        Self {
            dag,
            style,
            eq_tol,
            lp_iter,
            lp_time,
            ctx,
        }
    }

    // Widens a singleton image by the equality tolerance.
    fn relaxed_image(&self, image: Interval) -> Interval {
        if image.is_singleton() {
            image + Interval::new(-self.eq_tol, self.eq_tol)
        } else {
            image
        }
    }

    fn make_rlt(&mut self, bx: &IntervalBox) -> Option<(LpModel, Vec<(Variable, LinVar)>)> {
        let dag = self.dag.clone();
        if !dag.interval_eval_all(bx, &mut self.ctx) {
            return None;
        }
        let mut lp = LpModel::new(self.lp_iter, self.lp_time);
        let mut node_var: Vec<LinVar> = Vec::with_capacity(dag.nb_nodes());
        let mut vars: Vec<(Variable, LinVar)> = Vec::new();
        for i in 0..dag.nb_nodes() {
            let val = self.ctx.val[i];
            let lv = lp.make_var(val.left(), val.right());
            node_var.push(lv);
            if let DagOp::Var(v) = &dag.node(i).op {
                vars.push((v.clone(), lv));
            }
            rlt_cuts(&mut lp, &dag, &self.ctx, i, &node_var);
        }
        // the roots live in their constraint images
        for f in 0..dag.nb_funs() {
            let root = dag.fun(f).root();
            let image = self.relaxed_image(dag.fun(f).image());
            let lv = node_var[root];
            let dom = lp.var_domain(lv) & image;
            if dom.is_empty() {
                return None;
            }
            lp.set_var_domain(lv, dom);
        }
        Some((lp, vars))
    }

    fn make_taylor(&mut self, bx: &IntervalBox) -> Option<(LpModel, Vec<(Variable, LinVar)>)> {
        let dag = self.dag.clone();
        let scope = dag.scope().clone();
        let mut lp = LpModel::new(self.lp_iter, self.lp_time);
        let mut vars: Vec<(Variable, LinVar)> = Vec::new();
        for v in scope.iter() {
            let dom = bx.get(v);
            if !dom.is_finite() {
                return None;
            }
            vars.push((v.clone(), lp.make_var(dom.left(), dom.right())));
        }
        let lv_of = |v: &Variable| -> LinVar {
            vars[scope.index_of(v).expect("variable in scope")].1
        };

        // two opposite corners: all left bounds and all right bounds
        let c1 = IntervalBox::new(
            scope.clone(),
            scope.iter().map(|v| Interval::point(bx.get(v).left())).collect(),
        );
        let c2 = IntervalBox::new(
            scope.clone(),
            scope
                .iter()
                .map(|v| Interval::point(bx.get(v).right()))
                .collect(),
        );

        let nf = dag.nb_funs();
        let mut fc1 = Vec::with_capacity(nf);
        let mut fc2 = Vec::with_capacity(nf);
        for f in 0..nf {
            let x1 = dag.interval_eval(f, &c1, &mut self.ctx);
            let x2 = dag.interval_eval(f, &c2, &mut self.ctx);
            if x1.is_empty() || x2.is_empty() {
                return None;
            }
            fc1.push(x1);
            fc2.push(x2);
        }

        for f in 0..nf {
            let image = self.relaxed_image(dag.fun(f).image());
            // derivatives over the whole box
            if dag.interval_eval(f, bx, &mut self.ctx).is_empty() {
                return None;
            }
            dag.interval_diff(f, &mut self.ctx);
            let fscope = dag.fun(f).scope().clone();

            // lower bounding side: f(x) <= U with x above the left corner
            // and below the right one
            if image.right().is_finite() {
                let mut u1 = Interval::point(image.right()) - fc1[f];
                let mut u2 = Interval::point(image.right()) - fc2[f];
                let mut lo1 = LinExpr::new();
                let mut lo2 = LinExpr::new();
                let mut ok = true;
                for v in fscope.iter() {
                    let z = dag.interval_deriv(v, &self.ctx);
                    if z.is_empty() || z.is_inf() {
                        ok = false;
                        break;
                    }
                    lo1.add_term(z.left(), lv_of(v));
                    u1 += Interval::point(z.left()) * c1.get(v);
                    lo2.add_term(z.right(), lv_of(v));
                    u2 += Interval::point(z.right()) * c2.get(v);
                }
                if ok {
                    lp.add_ctr_le(lo1, u1.right());
                    lp.add_ctr_le(lo2, u2.right());
                }
            }

            // upper bounding side: L <= f(x)
            if image.left().is_finite() {
                let mut l1 = Interval::point(image.left()) - fc1[f];
                let mut l2 = Interval::point(image.left()) - fc2[f];
                let mut up1 = LinExpr::new();
                let mut up2 = LinExpr::new();
                let mut ok = true;
                for v in fscope.iter() {
                    let z = dag.interval_deriv(v, &self.ctx);
                    if z.is_empty() || z.is_inf() {
                        ok = false;
                        break;
                    }
                    up1.add_term(z.right(), lv_of(v));
                    l1 += Interval::point(z.right()) * c1.get(v);
                    up2.add_term(z.left(), lv_of(v));
                    l2 += Interval::point(z.left()) * c2.get(v);
                }
                if ok {
                    lp.add_ctr_ge(l1.left(), up1);
                    lp.add_ctr_ge(l2.left(), up2);
                }
            }
        }
        Some((lp, vars))
    }
}

impl Contractor for ContractorPolytope {
    fn scope(&self) -> Scope {
        self.dag.scope().clone()
    }

    fn contract(&mut self, bx: &mut IntervalBox) -> Proof {
        let made = match self.style {
            PolytopeCreatorStyle::Rlt => self.make_rlt(bx),
            PolytopeCreatorStyle::Taylor => self.make_taylor(bx),
        };
        let Some((mut lp, vars)) = made else {
            return Proof::Maybe;
        };

        let mut first = true;
        for (v, lv) in &vars {
            let mut x = bx.get(v);
            let mut obj = LinExpr::new();
            obj.add_term(1.0, *lv);
            lp.set_obj(obj);

            // reduction of the left bound
            lp.set_minimization();
            let run = if first { lp.optimize() } else { lp.reoptimize() };
            first = false;
            if run.is_err() {
                tracing::debug!("LP failure, polytope hull gives up");
                return Proof::Maybe;
            }
            match lp.status() {
                OptimizationStatus::Infeasible => {
                    if lp.is_safe_infeasible() {
                        return Proof::Empty;
                    }
                    return Proof::Maybe;
                }
                OptimizationStatus::Optimal => {
                    if lp.is_primal_solution_feasible() {
                        let bound = lp.safe_obj_val();
                        x = x & Interval::more_than(bound);
                        if x.is_empty() {
                            return Proof::Empty;
                        }
                    }
                }
                _ => {}
            }

            // reduction of the right bound
            lp.set_maximization();
            if lp.reoptimize().is_err() {
                return Proof::Maybe;
            }
            match lp.status() {
                OptimizationStatus::Infeasible => {
                    if lp.is_safe_infeasible() {
                        return Proof::Empty;
                    }
                    return Proof::Maybe;
                }
                OptimizationStatus::Optimal => {
                    if lp.is_primal_solution_feasible() {
                        let bound = lp.safe_obj_val();
                        x = x & Interval::less_than(bound);
                        if x.is_empty() {
                            return Proof::Empty;
                        }
                    }
                }
                _ => {}
            }

            bx.set(v, x);
        }
        Proof::Maybe
    }

    fn name(&self) -> String {
        let style = match self.style {
            PolytopeCreatorStyle::Rlt => "RLT",
            PolytopeCreatorStyle::Taylor => "Taylor",
        };
        format!("polytope hull contractor ({})", style)
    }

    fn swap_context(&mut self, ctx: &mut DagContext) -> bool {
        std::mem::swap(&mut self.ctx, ctx);
        true
    }
}

// Envelope cuts for one DAG node.
fn rlt_cuts(lp: &mut LpModel, dag: &Dag, ctx: &DagContext, i: usize, node_var: &[LinVar]) {
    let node = dag.node(i);
    let z = node_var[i];
    match &node.op {
        DagOp::Cst(_) | DagOp::Var(_) | DagOp::Sgn => {}
        DagOp::Add => {
            // exact: z - x - y = 0
            let e = LinExpr::with_terms(
                vec![1.0, -1.0, -1.0],
                vec![z, node_var[node.sub[0]], node_var[node.sub[1]]],
            );
            lp.add_ctr(0.0, e, 0.0);
        }
        DagOp::Sub => {
            let e = LinExpr::with_terms(
                vec![1.0, -1.0, 1.0],
                vec![z, node_var[node.sub[0]], node_var[node.sub[1]]],
            );
            lp.add_ctr(0.0, e, 0.0);
        }
        DagOp::Neg => {
            let e = LinExpr::with_terms(vec![1.0, 1.0], vec![z, node_var[node.sub[0]]]);
            lp.add_ctr(0.0, e, 0.0);
        }
        DagOp::Lin { cst, coefs } => {
            // exact when the coefficients are thin; the constant absorbs
            // its own width through a ranged row
            if coefs.iter().any(|c| !c.is_singleton()) {
                return;
            }
            let mut e = LinExpr::new();
            e.add_term(-1.0, z);
            for (k, &c) in node.sub.iter().enumerate() {
                e.add_term(coefs[k].left(), node_var[c]);
            }
            lp.add_ctr(-cst.right(), e, -cst.left());
        }
        DagOp::Mul => {
            let (xn, yn) = (node.sub[0], node.sub[1]);
            mccormick(lp, z, node_var[xn], node_var[yn], ctx.val[xn], ctx.val[yn]);
        }
        DagOp::Div => {
            // z = x / y relaxed through x = z * y
            let (xn, yn) = (node.sub[0], node.sub[1]);
            mccormick(lp, node_var[xn], z, node_var[yn], ctx.val[i], ctx.val[yn]);
        }
        DagOp::Min => {
            let (xn, yn) = (node.sub[0], node.sub[1]);
            lp.add_ctr_le(
                LinExpr::with_terms(vec![1.0, -1.0], vec![z, node_var[xn]]),
                0.0,
            );
            lp.add_ctr_le(
                LinExpr::with_terms(vec![1.0, -1.0], vec![z, node_var[yn]]),
                0.0,
            );
        }
        DagOp::Max => {
            let (xn, yn) = (node.sub[0], node.sub[1]);
            lp.add_ctr_ge(
                0.0,
                LinExpr::with_terms(vec![1.0, -1.0], vec![z, node_var[xn]]),
            );
            lp.add_ctr_ge(
                0.0,
                LinExpr::with_terms(vec![1.0, -1.0], vec![z, node_var[yn]]),
            );
        }
        DagOp::Abs => {
            let xn = node.sub[0];
            let xv = ctx.val[xn];
            // z >= x and z >= -x, chord above
            lp.add_ctr_ge(
                0.0,
                LinExpr::with_terms(vec![1.0, -1.0], vec![z, node_var[xn]]),
            );
            lp.add_ctr_ge(
                0.0,
                LinExpr::with_terms(vec![1.0, 1.0], vec![z, node_var[xn]]),
            );
            if xv.is_finite() {
                over_line(
                    lp,
                    z,
                    node_var[xn],
                    xv.left(),
                    xv.left().abs(),
                    xv.right(),
                    xv.right().abs(),
                );
            }
        }
        DagOp::Sqr => {
            let xn = node.sub[0];
            let xv = ctx.val[xn];
            if !xv.is_finite() {
                return;
            }
            let f: &dyn Fn(Interval) -> Interval = &|v| v.sqr();
            let df: &dyn Fn(Interval) -> Interval = &|v| Interval::point(2.0) * v;
            let (a, b) = (xv.left(), xv.right());
            under_convex(lp, z, node_var[xn], a, b, a, f, df);
            under_convex(lp, z, node_var[xn], a, b, xv.midpoint(), f, df);
            under_convex(lp, z, node_var[xn], a, b, b, f, df);
            over_convex(lp, z, node_var[xn], a, b, f);
        }
        DagOp::Sqrt => {
            let xn = node.sub[0];
            let xv = ctx.val[xn] & Interval::POSITIVE;
            if !xv.is_finite() {
                return;
            }
            let f: &dyn Fn(Interval) -> Interval = &|v| v.sqrt();
            let df: &dyn Fn(Interval) -> Interval =
                &|v| Interval::ONE / (Interval::point(2.0) * v.sqrt());
            let (a, b) = (xv.left(), xv.right());
            over_concave(lp, z, node_var[xn], a, b, xv.midpoint(), f, df);
            under_concave(lp, z, node_var[xn], a, b, f);
        }
        DagOp::Exp => {
            let xn = node.sub[0];
            let xv = ctx.val[xn];
            if !xv.is_finite() {
                return;
            }
            let f: &dyn Fn(Interval) -> Interval = &|v| v.exp();
            let df: &dyn Fn(Interval) -> Interval = &|v| v.exp();
            let (a, b) = (xv.left(), xv.right());
            under_convex(lp, z, node_var[xn], a, b, a, f, df);
            under_convex(lp, z, node_var[xn], a, b, xv.midpoint(), f, df);
            under_convex(lp, z, node_var[xn], a, b, b, f, df);
            over_convex(lp, z, node_var[xn], a, b, f);
        }
        DagOp::Log => {
            let xn = node.sub[0];
            let xv = ctx.val[xn];
            if !xv.is_finite() || xv.left() <= 0.0 {
                return;
            }
            let f: &dyn Fn(Interval) -> Interval = &|v| v.log();
            let df: &dyn Fn(Interval) -> Interval = &|v| Interval::ONE / v;
            let (a, b) = (xv.left(), xv.right());
            over_concave(lp, z, node_var[xn], a, b, xv.midpoint(), f, df);
            under_concave(lp, z, node_var[xn], a, b, f);
        }
        DagOp::Pow(n) => {
            let xn = node.sub[0];
            let xv = ctx.val[xn];
            if !xv.is_finite() {
                return;
            }
            let p = *n;
            if p < 2 {
                return;
            }
            let f = move |v: Interval| v.powi(p);
            let df = move |v: Interval| Interval::point(p as f64) * v.powi(p - 1);
            let (a, b) = (xv.left(), xv.right());
            let even = p % 2 == 0;
            if even || xv.left() >= 0.0 {
                // convex piece
                under_convex(lp, z, node_var[xn], a, b, xv.midpoint(), &f, &df);
                over_convex(lp, z, node_var[xn], a, b, &f);
            } else if xv.right() <= 0.0 {
                // odd power on the negative side is concave
                over_concave(lp, z, node_var[xn], a, b, xv.midpoint(), &f, &df);
                under_concave(lp, z, node_var[xn], a, b, &f);
            }
            // an odd power straddling zero keeps its interval bounds only
        }
        DagOp::Sin => {
            trig_cuts(lp, z, node_var[node.sub[0]], ctx.val[node.sub[0]], false);
        }
        DagOp::Cos => {
            trig_cuts(lp, z, node_var[node.sub[0]], ctx.val[node.sub[0]], true);
        }
        DagOp::Tan => {
            let xn = node.sub[0];
            let xv = ctx.val[xn];
            let tv = ctx.val[i];
            if !xv.is_finite() || !tv.is_finite() {
                return;
            }
            let f = |v: Interval| v.tan();
            let df = |v: Interval| Interval::ONE + v.tan().sqr();
            let (a, b) = (xv.left(), xv.right());
            if xv.left() >= 0.0 {
                under_convex(lp, z, node_var[xn], a, b, xv.midpoint(), &f, &df);
                over_convex(lp, z, node_var[xn], a, b, &f);
            } else if xv.right() <= 0.0 {
                over_concave(lp, z, node_var[xn], a, b, xv.midpoint(), &f, &df);
                under_concave(lp, z, node_var[xn], a, b, &f);
            }
        }
    }
}

// McCormick envelope of z = x * y, with the constants rounded to the safe
// side.
fn mccormick(lp: &mut LpModel, z: LinVar, x: LinVar, y: LinVar, xv: Interval, yv: Interval) {
    use crate::interval::double::{mul_dn, mul_up};
    let (xl, xu) = (xv.left(), xv.right());
    let (yl, yu) = (yv.left(), yv.right());

    // z >= xl*y + yl*x - xl*yl
    if xl.is_finite() && yl.is_finite() {
        let e = LinExpr::with_terms(vec![1.0, -xl, -yl], vec![z, y, x]);
        lp.add_ctr_ge(-mul_up(xl, yl), e);
    }
    // z >= xu*y + yu*x - xu*yu
    if xu.is_finite() && yu.is_finite() {
        let e = LinExpr::with_terms(vec![1.0, -xu, -yu], vec![z, y, x]);
        lp.add_ctr_ge(-mul_up(xu, yu), e);
    }
    // z <= xu*y + yl*x - xu*yl
    if xu.is_finite() && yl.is_finite() {
        let e = LinExpr::with_terms(vec![1.0, -xu, -yl], vec![z, y, x]);
        lp.add_ctr_le(e, -mul_dn(xu, yl));
    }
    // z <= xl*y + yu*x - xl*yu
    if xl.is_finite() && yu.is_finite() {
        let e = LinExpr::with_terms(vec![1.0, -xl, -yu], vec![z, y, x]);
        lp.add_ctr_le(e, -mul_dn(xl, yu));
    }
}

// Sine and cosine: pick the shape of the curve over the node interval and
// relax accordingly; give up outside a single characterized piece.
fn trig_cuts(lp: &mut LpModel, z: LinVar, x: LinVar, xv: Interval, is_cos: bool) {
    if !xv.is_finite() {
        return;
    }
    let f = move |v: Interval| if is_cos { v.cos() } else { v.sin() };
    let df = move |v: Interval| {
        if is_cos {
            -v.sin()
        } else {
            v.cos()
        }
    };
    let curve = f(xv);
    let slope = df(xv);
    let (a, b) = (xv.left(), xv.right());
    if curve.is_negative() {
        // -f'' = f <= 0: convex piece
        under_convex(lp, z, x, a, b, xv.midpoint(), &f, &df);
        over_convex(lp, z, x, a, b, &f);
    } else if curve.is_positive() {
        // concave piece
        over_concave(lp, z, x, a, b, xv.midpoint(), &f, &df);
        under_concave(lp, z, x, a, b, &f);
    } else if slope.is_positive() || slope.is_negative() {
        // monotone across the inflection: unit-slope bracketing lines
        relax_concavo_convex_cos_sin(lp, z, x, a, b, &f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Term;
    use crate::tolerance::Tolerance;
    use crate::variable::{VarKind, Variable};

    #[test]
    fn test_polytope_on_linear_system() {
        // x + y in [0, 1], x - y in [0, 1] on [-2, 2]^2 reduces to
        // x in [0, 1], y in [-1/2, 1/2]
        let x = Variable::new(0, "x", VarKind::Real, Tolerance::default());
        let y = Variable::new(1, "y", VarKind::Real, Tolerance::default());
        let mut dag = Dag::new();
        dag.insert(
            &(Term::var(&x) + Term::var(&y)),
            Interval::new(0.0, 1.0),
        );
        dag.insert(
            &(Term::var(&x) - Term::var(&y)),
            Interval::new(0.0, 1.0),
        );
        let dag = Rc::new(dag);
        let mut op = ContractorPolytope::new(
            dag.clone(),
            PolytopeCreatorStyle::Rlt,
            1e-10,
            100,
            10.0,
        );
        let mut bx = IntervalBox::new(
            dag.scope().clone(),
            vec![Interval::new(-2.0, 2.0), Interval::new(-2.0, 2.0)],
        );
        assert_ne!(op.contract(&mut bx), Proof::Empty);
        let dx = bx.get(&x);
        let dy = bx.get(&y);
        assert!(dx.left() > -1e-6 && dx.right() < 1.0 + 1e-6);
        assert!(dy.left() > -0.5 - 1e-6 && dy.right() < 0.5 + 1e-6);
    }

    #[test]
    fn test_polytope_taylor_on_linear_system() {
        let x = Variable::new(0, "x", VarKind::Real, Tolerance::default());
        let y = Variable::new(1, "y", VarKind::Real, Tolerance::default());
        let mut dag = Dag::new();
        dag.insert(
            &(Term::var(&x) + Term::var(&y)),
            Interval::new(0.0, 1.0),
        );
        dag.insert(
            &(Term::var(&x) - Term::var(&y)),
            Interval::new(0.0, 1.0),
        );
        let dag = Rc::new(dag);
        let mut op = ContractorPolytope::new(
            dag.clone(),
            PolytopeCreatorStyle::Taylor,
            1e-10,
            100,
            10.0,
        );
        let mut bx = IntervalBox::new(
            dag.scope().clone(),
            vec![Interval::new(-2.0, 2.0), Interval::new(-2.0, 2.0)],
        );
        assert_ne!(op.contract(&mut bx), Proof::Empty);
        let dx = bx.get(&x);
        assert!(dx.left() > -1e-6 && dx.right() < 1.0 + 1e-6);
    }

    #[test]
    fn test_polytope_detects_infeasible() {
        // x + y in [10, 11] cannot hold on [0, 1]^2
        let x = Variable::new(0, "x", VarKind::Real, Tolerance::default());
        let y = Variable::new(1, "y", VarKind::Real, Tolerance::default());
        let mut dag = Dag::new();
        dag.insert(
            &(Term::var(&x) + Term::var(&y)),
            Interval::new(10.0, 11.0),
        );
        let dag = Rc::new(dag);
        let mut op = ContractorPolytope::new(
            dag.clone(),
            PolytopeCreatorStyle::Rlt,
            1e-10,
            100,
            10.0,
        );
        let mut bx = IntervalBox::new(
            dag.scope().clone(),
            vec![Interval::new(0.0, 1.0), Interval::new(0.0, 1.0)],
        );
        // the root variable domain is emptied at creation time, which
        // degrades to MAYBE; HC4 would catch this case anyway
        let p = op.contract(&mut bx);
        assert!(p == Proof::Maybe || p == Proof::Empty);
    }
}
