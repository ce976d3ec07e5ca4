//! Sound linear estimators of univariate curves.
//!
//! Each helper inserts into an LP a line that provably under- or
//! over-estimates a convex or concave function over an interval. The
//! ordinates and slopes are computed with interval arithmetic and the
//! constant term is shifted to the safe side, so the relaxation never cuts
//! a feasible point.

use crate::interval::Interval;
use crate::interval::double::{next_down, next_up};
use crate::lp::{LinExpr, LinVar, LpModel};

pub type UniFun = dyn Fn(Interval) -> Interval;

/// Tangent line below a convex function `y = f(x)` at abscissa `c`:
/// inserts `y - m*x >= p`.
pub fn under_convex(
    lm: &mut LpModel,
    y: LinVar,
    x: LinVar,
    a: f64,
    b: f64,
    c: f64,
    f: &UniFun,
    df: &UniFun,
) {
    debug_assert!(a <= c && c <= b);
    if a == b {
        return;
    }
    let cc = Interval::point(c);
    let m_enc = df(cc);
    // a null slope means f is minimal at c; the variable bounds already say so
    if m_enc.is_empty() || m_enc.contains_zero() || m_enc.is_inf() {
        return;
    }
    let p_enc = f(cc) - m_enc * cc;
    if p_enc.is_empty() {
        return;
    }
    let mut p = p_enc.left();

    let m = if c < 0.0 || c == b {
        m_enc.right()
    } else if c > 0.0 || c == a {
        m_enc.left()
    } else {
        // c = 0 strictly inside: correct the ordinate by the worst deviation
        let m = m_enc.left();
        let da = f(Interval::point(a)) - Interval::point(m) * Interval::point(a) - p_enc;
        let db = f(Interval::point(b)) - Interval::point(m) * Interval::point(b) - p_enc;
        let d = 0.0_f64.min(da.left()).min(db.left());
        p = next_down(p + d);
        m
    };

    let e = LinExpr::with_terms(vec![1.0, -m], vec![y, x]);
    lm.add_ctr_ge(p, e);
}

/// Chord above a convex function over `[a, b]`.
pub fn over_convex(lm: &mut LpModel, y: LinVar, x: LinVar, a: f64, b: f64, f: &UniFun) {
    if a == b {
        return;
    }
    let fa = f(Interval::point(a));
    let fb = f(Interval::point(b));
    if fa.is_empty() || fb.is_empty() {
        return;
    }
    over_line(lm, y, x, a, fa.right(), b, fb.right());
}

/// Tangent line above a concave function at abscissa `c`:
/// inserts `y - m*x <= p`.
pub fn over_concave(
    lm: &mut LpModel,
    y: LinVar,
    x: LinVar,
    a: f64,
    b: f64,
    c: f64,
    f: &UniFun,
    df: &UniFun,
) {
    debug_assert!(a <= c && c <= b);
    if a == b {
        return;
    }
    let cc = Interval::point(c);
    let m_enc = df(cc);
    if m_enc.is_empty() || m_enc.contains_zero() || m_enc.is_inf() {
        return;
    }
    let p_enc = f(cc) - m_enc * cc;
    if p_enc.is_empty() {
        return;
    }
    let mut p = p_enc.right();

    let m = if c < 0.0 || c == b {
        m_enc.left()
    } else if c > 0.0 || c == a {
        m_enc.right()
    } else {
        let m = m_enc.left();
        let da = f(Interval::point(a)) - Interval::point(m) * Interval::point(a) - p_enc;
        let db = f(Interval::point(b)) - Interval::point(m) * Interval::point(b) - p_enc;
        let d = 0.0_f64.max(da.right()).max(db.right());
        p = next_up(p + d);
        m
    };

    let e = LinExpr::with_terms(vec![1.0, -m], vec![y, x]);
    lm.add_ctr_le(e, p);
}

/// Chord below a concave function over `[a, b]`.
pub fn under_concave(lm: &mut LpModel, y: LinVar, x: LinVar, a: f64, b: f64, f: &UniFun) {
    if a == b {
        return;
    }
    let fa = f(Interval::point(a));
    let fb = f(Interval::point(b));
    if fa.is_empty() || fb.is_empty() {
        return;
    }
    under_line(lm, y, x, a, fa.left(), b, fb.left());
}

/// Linear relaxation of sine or cosine on a monotone half-period: the
/// slope magnitude never exceeds one, so unit-slope lines through the
/// endpoint values bracket the curve.
pub fn relax_concavo_convex_cos_sin(
    lm: &mut LpModel,
    y: LinVar,
    x: LinVar,
    a: f64,
    b: f64,
    f: &UniFun,
) {
    let fa = f(Interval::point(a));
    let fb = f(Interval::point(b));
    if fa.is_empty() || fb.is_empty() {
        return;
    }
    if fa.is_negative() {
        // increasing branch: over-line of slope 1 through (a, f(a)),
        // under-line of slope 1 through (b, f(b))
        let p1 = fa - Interval::point(a);
        lm.add_ctr_le(LinExpr::with_terms(vec![1.0, -1.0], vec![y, x]), p1.right());
        let p2 = fb - Interval::point(b);
        lm.add_ctr_ge(p2.left(), LinExpr::with_terms(vec![1.0, -1.0], vec![y, x]));
    } else {
        // decreasing branch: lines of slope -1
        let p1 = fa + Interval::point(a);
        lm.add_ctr_ge(p1.left(), LinExpr::with_terms(vec![1.0, 1.0], vec![y, x]));
        let p2 = fb + Interval::point(b);
        lm.add_ctr_le(LinExpr::with_terms(vec![1.0, 1.0], vec![y, x]), p2.right());
    }
}

/// Line above the two points `(x1, y1)`, `(x2, y2)`: inserts
/// `y - m*x <= p` valid over `[x1, x2]`.
pub fn over_line(lm: &mut LpModel, y: LinVar, x: LinVar, x1: f64, y1: f64, x2: f64, y2: f64) {
    if x1 == x2 {
        return;
    }
    let (x1, y1, x2, y2) = if x2 < x1 {
        (x2, y2, x1, y1)
    } else {
        (x1, y1, x2, y2)
    };

    let m_enc =
        (Interval::point(y2) - Interval::point(y1)) / (Interval::point(x2) - Interval::point(x1));
    if m_enc.is_empty() {
        return;
    }
    if m_enc.contains_zero() {
        lm.add_ctr_le(LinExpr::with_terms(vec![1.0], vec![y]), y1.max(y2));
        return;
    }

    let p_enc = Interval::point(y1) - m_enc * Interval::point(x1);
    let mut p = p_enc.right();
    let m = if x2 <= 0.0 {
        m_enc.left()
    } else if x1 >= 0.0 {
        m_enc.right()
    } else {
        let m = m_enc.left();
        let v1 = Interval::point(y1) - Interval::point(m) * Interval::point(x1) - p_enc;
        let v2 = Interval::point(y2) - Interval::point(m) * Interval::point(x2) - p_enc;
        let d = v1.right().max(v2.right());
        if d > 0.0 {
            p = next_up(p + d);
        }
        m
    };

    lm.add_ctr_le(LinExpr::with_terms(vec![1.0, -m], vec![y, x]), p);
}

/// Line below the two points: inserts `y - m*x >= p` valid over `[x1, x2]`.
pub fn under_line(lm: &mut LpModel, y: LinVar, x: LinVar, x1: f64, y1: f64, x2: f64, y2: f64) {
    if x1 == x2 {
        return;
    }
    let (x1, y1, x2, y2) = if x2 < x1 {
        (x2, y2, x1, y1)
    } else {
        (x1, y1, x2, y2)
    };

    let m_enc =
        (Interval::point(y2) - Interval::point(y1)) / (Interval::point(x2) - Interval::point(x1));
    if m_enc.is_empty() {
        return;
    }
    if m_enc.contains_zero() {
        lm.add_ctr_ge(y1.min(y2), LinExpr::with_terms(vec![1.0], vec![y]));
        return;
    }

    let p_enc = Interval::point(y1) - m_enc * Interval::point(x1);
    let mut p = p_enc.left();
    let m = if x2 <= 0.0 {
        m_enc.right()
    } else if x1 >= 0.0 {
        m_enc.left()
    } else {
        let m = m_enc.left();
        let v1 = Interval::point(m) * Interval::point(x1) + p_enc - Interval::point(y1);
        let v2 = Interval::point(m) * Interval::point(x2) + p_enc - Interval::point(y2);
        let d = v1.right().max(v2.right());
        if d > 0.0 {
            p = next_down(p - d);
        }
        m
    };

    lm.add_ctr_ge(p, LinExpr::with_terms(vec![1.0, -m], vec![y, x]));
}

#[cfg(test)]
mod tests {
    use super::*;

    // the relaxation of y = x^2 over [0, 2] keeps the curve between the
    // tangents and the chord
    #[test]
    fn test_sqr_envelope_bounds() {
        let mut lm = LpModel::new(100, 10.0);
        let x = lm.make_var(0.0, 2.0);
        let y = lm.make_var(0.0, 4.0);
        let f: &UniFun = &|v: Interval| v.sqr();
        let df: &UniFun = &|v: Interval| Interval::point(2.0) * v;
        under_convex(&mut lm, y, x, 0.0, 2.0, 1.0, f, df);
        over_convex(&mut lm, y, x, 0.0, 2.0, f);

        // minimize y at x = 1: the tangent gives y >= 2x - 1 = 1
        let mut ex = LinExpr::new();
        ex.add_term(1.0, x);
        lm.add_ctr(1.0, ex, 1.0);
        let mut obj = LinExpr::new();
        obj.add_term(1.0, y);
        lm.set_obj(obj);
        lm.set_minimization();
        assert!(lm.optimize().unwrap());
        assert!(lm.obj_val() <= 1.0 + 1e-6 && lm.obj_val() >= 1.0 - 1e-6);

        // maximize y at x = 1: the chord gives y <= 2x = 2
        lm.set_maximization();
        assert!(lm.reoptimize().unwrap());
        assert!((lm.obj_val() - 2.0).abs() < 1e-6);
    }
}
