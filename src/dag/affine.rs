//! Affine forms of the DAG functions.
//!
//! Each function is approximated over a box by `center + sum coef_i * e_i +
//! err * e0` with noise symbols in [-1, 1], one per variable. Nonlinear
//! nodes are linearized against their interval range with a midpoint slope.
//! The forms only feed the affine-sum-relative branching heuristic, so the
//! arithmetic is plain f64: selection does not need certified enclosures.

use crate::boxes::IntervalBox;
use crate::interval::Interval;

use super::{Dag, DagContext, DagOp, FunId};

/// Affine form over the scope of a DAG: one coefficient per variable, in
/// scope order, plus an error term.
#[derive(Debug, Clone)]
pub struct AffineForm {
    pub center: f64,
    pub coefs: Vec<f64>,
    pub err: f64,
}

impl AffineForm {
    fn constant(n: usize, x: Interval) -> Self {
        Self {
            center: x.midpoint(),
            coefs: vec![0.0; n],
            err: x.radius(),
        }
    }

    /// Total magnitude of the noise coefficients.
    pub fn deviation(&self) -> f64 {
        self.coefs.iter().map(|c| c.abs()).sum::<f64>() + self.err
    }

    fn add(&self, other: &AffineForm) -> AffineForm {
        AffineForm {
            center: self.center + other.center,
            coefs: self
                .coefs
                .iter()
                .zip(other.coefs.iter())
                .map(|(a, b)| a + b)
                .collect(),
            err: self.err + other.err,
        }
    }

    fn neg(&self) -> AffineForm {
        AffineForm {
            center: -self.center,
            coefs: self.coefs.iter().map(|c| -c).collect(),
            err: self.err,
        }
    }

    fn scale(&self, m: f64) -> AffineForm {
        AffineForm {
            center: m * self.center,
            coefs: self.coefs.iter().map(|c| m * c).collect(),
            err: m.abs() * self.err,
        }
    }

    fn mul(&self, other: &AffineForm) -> AffineForm {
        let ra: f64 = self.deviation();
        let rb: f64 = other.deviation();
        AffineForm {
            center: self.center * other.center,
            coefs: self
                .coefs
                .iter()
                .zip(other.coefs.iter())
                .map(|(a, b)| self.center * b + other.center * a)
                .collect(),
            err: self.center.abs() * other.err + other.center.abs() * self.err + ra * rb,
        }
    }

    // Linearization of y = f(x) over the range of x: slope at the midpoint,
    // remainder absorbed into the error term.
    fn unary(&self, n: usize, range: Interval, fx: Interval, dfx: Interval) -> AffineForm {
        if fx.is_empty() {
            return AffineForm::constant(n, Interval::ZERO);
        }
        if dfx.is_empty() || dfx.is_inf() || !fx.is_finite() {
            return AffineForm::constant(n, fx);
        }
        let m = dfx.midpoint();
        let rem = fx - Interval::point(m) * range;
        let mut out = self.scale(m);
        out.center += rem.midpoint();
        out.err += rem.radius();
        out
    }
}

/// Builds the affine form of every function of the DAG on a box.
pub fn affine_forms(dag: &Dag, bx: &IntervalBox, ctx: &mut DagContext) -> Vec<AffineForm> {
    let n = dag.scope().size();
    dag.interval_eval_all(bx, ctx);

    let mut forms: Vec<Option<AffineForm>> = vec![None; dag.nb_nodes()];
    for i in 0..dag.nb_nodes() {
        let node = dag.node(i);
        let val = ctx.val[i];
        let form = match &node.op {
            DagOp::Cst(x) => AffineForm::constant(n, *x),
            DagOp::Var(v) => {
                let dom = bx.get(v);
                let mut f = AffineForm::constant(n, Interval::point(dom.midpoint()));
                f.err = 0.0;
                if let Some(k) = dag.scope().index_of(v) {
                    f.coefs[k] = if dom.is_finite() { dom.radius() } else { f64::MAX };
                }
                f
            }
            DagOp::Add => forms[node.sub[0]]
                .as_ref()
                .unwrap()
                .add(forms[node.sub[1]].as_ref().unwrap()),
            DagOp::Sub => forms[node.sub[0]]
                .as_ref()
                .unwrap()
                .add(&forms[node.sub[1]].as_ref().unwrap().neg()),
            DagOp::Neg => forms[node.sub[0]].as_ref().unwrap().neg(),
            DagOp::Mul => forms[node.sub[0]]
                .as_ref()
                .unwrap()
                .mul(forms[node.sub[1]].as_ref().unwrap()),
            DagOp::Div => {
                let denom = ctx.val[node.sub[1]];
                let recip = forms[node.sub[1]].as_ref().unwrap().unary(
                    n,
                    denom,
                    Interval::ONE / denom,
                    -Interval::ONE / denom.sqr(),
                );
                forms[node.sub[0]].as_ref().unwrap().mul(&recip)
            }
            // non-smooth operators collapse to their interval range
            DagOp::Min | DagOp::Max | DagOp::Sgn => AffineForm::constant(n, val),
            DagOp::Abs => {
                let x = ctx.val[node.sub[0]];
                if x.contains_zero() {
                    AffineForm::constant(n, val)
                } else {
                    let s = if x.is_positive() { 1.0 } else { -1.0 };
                    forms[node.sub[0]].as_ref().unwrap().scale(s)
                }
            }
            DagOp::Sqr => {
                let x = ctx.val[node.sub[0]];
                forms[node.sub[0]]
                    .as_ref()
                    .unwrap()
                    .unary(n, x, val, Interval::point(2.0) * x)
            }
            DagOp::Sqrt => {
                let x = ctx.val[node.sub[0]];
                forms[node.sub[0]].as_ref().unwrap().unary(
                    n,
                    x,
                    val,
                    Interval::ONE / (Interval::point(2.0) * val),
                )
            }
            DagOp::Exp => {
                let x = ctx.val[node.sub[0]];
                forms[node.sub[0]].as_ref().unwrap().unary(n, x, val, val)
            }
            DagOp::Log => {
                let x = ctx.val[node.sub[0]];
                forms[node.sub[0]]
                    .as_ref()
                    .unwrap()
                    .unary(n, x, val, Interval::ONE / x)
            }
            DagOp::Sin => {
                let x = ctx.val[node.sub[0]];
                forms[node.sub[0]].as_ref().unwrap().unary(n, x, val, x.cos())
            }
            DagOp::Cos => {
                let x = ctx.val[node.sub[0]];
                forms[node.sub[0]]
                    .as_ref()
                    .unwrap()
                    .unary(n, x, val, -x.sin())
            }
            DagOp::Tan => {
                let x = ctx.val[node.sub[0]];
                forms[node.sub[0]].as_ref().unwrap().unary(
                    n,
                    x,
                    val,
                    Interval::ONE + val.sqr(),
                )
            }
            DagOp::Pow(p) => {
                let x = ctx.val[node.sub[0]];
                forms[node.sub[0]].as_ref().unwrap().unary(
                    n,
                    x,
                    val,
                    Interval::point(*p as f64) * x.powi(*p - 1),
                )
            }
            DagOp::Lin { cst, coefs } => {
                let mut out = AffineForm::constant(n, *cst);
                for (k, &c) in node.sub.iter().enumerate() {
                    let child = forms[c].as_ref().unwrap().scale(coefs[k].midpoint());
                    out = out.add(&child);
                    out.err += coefs[k].radius() * ctx.val[c].mag();
                }
                out
            }
        };
        forms[i] = Some(form);
    }

    (0..dag.nb_funs())
        .map(|f| forms[dag.fun(f).root()].clone().unwrap())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Scope;
    use crate::term::Term;
    use crate::tolerance::Tolerance;
    use crate::variable::{VarKind, Variable};

    #[test]
    fn test_linear_function_is_exact() {
        let x = Variable::new(0, "x", VarKind::Real, Tolerance::default());
        let y = Variable::new(1, "y", VarKind::Real, Tolerance::default());
        let mut dag = Dag::new();
        dag.insert(
            &(2.0 * Term::var(&x) + 3.0 * Term::var(&y)),
            Interval::ZERO,
        );
        let bx = IntervalBox::new(
            Scope::from_vars([x, y]),
            vec![Interval::new(0.0, 2.0), Interval::new(-1.0, 1.0)],
        );
        let mut ctx = dag.new_context();
        let forms = affine_forms(&dag, &bx, &mut ctx);
        let f = &forms[0];
        // 2x on [0,2]: coefficient 2 * radius 1 = 2; 3y on [-1,1]: 3
        assert!((f.coefs[0] - 2.0).abs() < 1e-12);
        assert!((f.coefs[1] - 3.0).abs() < 1e-12);
        assert!(f.err < 1e-12);
        assert!((f.center - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_nonlinear_function_has_error_term() {
        let x = Variable::new(0, "x", VarKind::Real, Tolerance::default());
        let mut dag = Dag::new();
        dag.insert(&Term::var(&x).sqr(), Interval::ZERO);
        let bx = IntervalBox::new(
            Scope::singleton(x),
            vec![Interval::new(0.0, 2.0)],
        );
        let mut ctx = dag.new_context();
        let forms = affine_forms(&dag, &bx, &mut ctx);
        // x^2 over [0, 2]: slope 2 at the midpoint, nonzero remainder
        assert!((forms[0].coefs[0] - 2.0).abs() < 1e-9);
        assert!(forms[0].err > 0.0);
    }
}
