//! Relational projection operators.
//!
//! For a relation `z = op(x, y)` restricted to boxes X, Y, Z, the projector
//! `op_px(X, Y, Z)` returns an enclosure of the hull of
//! `{ x in X | exists y in Y, op(x, y) in Z }`, and symmetrically for the
//! other arguments. Projectors are the elementary steps of the HC4 backward
//! pass. Returning the first argument unchanged is always sound, which is
//! how the periodic projectors degrade on arguments spanning many periods.

use super::double::{
    acos_dn, acos_up, asin_dn, asin_up, atan_dn, atan_up, next_down, next_up,
};
use super::{DivisionResult, Interval, point_pow};

/// z = x + y
pub fn add_px(x: Interval, y: Interval, z: Interval) -> Interval {
    x & (z - y)
}

pub fn add_py(x: Interval, y: Interval, z: Interval) -> Interval {
    y & (z - x)
}

pub fn add_pz(x: Interval, y: Interval, z: Interval) -> Interval {
    z & (x + y)
}

/// z = x - y
pub fn sub_px(x: Interval, y: Interval, z: Interval) -> Interval {
    x & (z + y)
}

pub fn sub_py(x: Interval, y: Interval, z: Interval) -> Interval {
    y & (x - z)
}

pub fn sub_pz(x: Interval, y: Interval, z: Interval) -> Interval {
    z & (x - y)
}

/// y = -x
pub fn usub_px(x: Interval, y: Interval) -> Interval {
    x & (-y)
}

pub fn usub_py(x: Interval, y: Interval) -> Interval {
    y & (-x)
}

/// z = x * y
pub fn mul_px(x: Interval, y: Interval, z: Interval) -> Interval {
    if x.is_empty() || y.is_empty() || z.is_empty() {
        return Interval::EMPTY;
    }
    // if both y and z admit zero, any x satisfies the relation
    if y.contains_zero() && z.contains_zero() {
        return x;
    }
    match Interval::ext_div(z, y) {
        DivisionResult::Single(q) => x & q,
        DivisionResult::TwoPieces(p, q) => (x & p) | (x & q),
    }
}

pub fn mul_py(x: Interval, y: Interval, z: Interval) -> Interval {
    mul_px(y, x, z)
}

pub fn mul_pz(x: Interval, y: Interval, z: Interval) -> Interval {
    z & (x * y)
}

/// z = x / y
pub fn div_px(x: Interval, y: Interval, z: Interval) -> Interval {
    x & (z * y)
}

pub fn div_py(x: Interval, y: Interval, z: Interval) -> Interval {
    if x.is_empty() || y.is_empty() || z.is_empty() {
        return Interval::EMPTY;
    }
    if x.contains_zero() && z.contains_zero() {
        return y;
    }
    match Interval::ext_div(x, z) {
        DivisionResult::Single(q) => y & q,
        DivisionResult::TwoPieces(p, q) => (y & p) | (y & q),
    }
}

pub fn div_pz(x: Interval, y: Interval, z: Interval) -> Interval {
    z & (x / y)
}

/// z = min(x, y)
pub fn min_px(x: Interval, y: Interval, z: Interval) -> Interval {
    if x.is_empty() || y.is_empty() || z.is_empty() {
        return Interval::EMPTY;
    }
    // the minimum reaches z.left() only if both operands can
    if y.right() < z.left() {
        return Interval::EMPTY;
    }
    let ub = if y.left() <= z.right() {
        f64::INFINITY
    } else {
        z.right()
    };
    x & Interval::new(z.left(), ub)
}

pub fn min_py(x: Interval, y: Interval, z: Interval) -> Interval {
    min_px(y, x, z)
}

pub fn min_pz(x: Interval, y: Interval, z: Interval) -> Interval {
    z & x.min(y)
}

/// z = max(x, y)
pub fn max_px(x: Interval, y: Interval, z: Interval) -> Interval {
    if x.is_empty() || y.is_empty() || z.is_empty() {
        return Interval::EMPTY;
    }
    if y.left() > z.right() {
        return Interval::EMPTY;
    }
    let lb = if y.right() >= z.left() {
        f64::NEG_INFINITY
    } else {
        z.left()
    };
    x & Interval::new(lb, z.right())
}

pub fn max_py(x: Interval, y: Interval, z: Interval) -> Interval {
    max_px(y, x, z)
}

pub fn max_pz(x: Interval, y: Interval, z: Interval) -> Interval {
    z & x.max(y)
}

/// y = x^2
pub fn sqr_px(x: Interval, y: Interval) -> Interval {
    let r = (y & Interval::POSITIVE).sqrt();
    if r.is_empty() {
        return Interval::EMPTY;
    }
    (x & r) | (x & -r)
}

pub fn sqr_py(x: Interval, y: Interval) -> Interval {
    y & x.sqr()
}

/// y = sqrt(x)
pub fn sqrt_px(x: Interval, y: Interval) -> Interval {
    let r = y & Interval::POSITIVE;
    if r.is_empty() {
        return Interval::EMPTY;
    }
    x & Interval::POSITIVE & r.sqr()
}

pub fn sqrt_py(x: Interval, y: Interval) -> Interval {
    y & x.sqrt()
}

/// y = x^n with an integer exponent
pub fn pow_px(x: Interval, n: i32, y: Interval) -> Interval {
    if x.is_empty() || y.is_empty() {
        return Interval::EMPTY;
    }
    if n == 0 {
        return if y.contains(1.0) { x } else { Interval::EMPTY };
    }
    if n == 1 {
        return x & y;
    }
    if n < 0 {
        // x = (1/y)^(-n)
        return pow_px(x, -n, Interval::ONE / y);
    }
    if n % 2 == 0 {
        let r = nth_root(y & Interval::POSITIVE, n);
        if r.is_empty() {
            return Interval::EMPTY;
        }
        (x & r) | (x & -r)
    } else {
        x & nth_root_signed(y, n)
    }
}

pub fn pow_py(x: Interval, n: i32, y: Interval) -> Interval {
    y & x.powi(n)
}

/// y = exp(x)
pub fn exp_px(x: Interval, y: Interval) -> Interval {
    x & y.log()
}

pub fn exp_py(x: Interval, y: Interval) -> Interval {
    y & x.exp()
}

/// y = log(x)
pub fn log_px(x: Interval, y: Interval) -> Interval {
    x & y.exp()
}

pub fn log_py(x: Interval, y: Interval) -> Interval {
    y & x.log()
}

/// y = |x|
pub fn abs_px(x: Interval, y: Interval) -> Interval {
    let p = y & Interval::POSITIVE;
    if p.is_empty() {
        return Interval::EMPTY;
    }
    (x & p) | (x & -p)
}

pub fn abs_py(x: Interval, y: Interval) -> Interval {
    y & x.abs()
}

/// y = sgn(x)
pub fn sgn_px(x: Interval, y: Interval) -> Interval {
    if x.is_empty() || y.is_empty() {
        return Interval::EMPTY;
    }
    let mut u = Interval::EMPTY;
    if y.contains(-1.0) {
        u |= x & Interval::NEGATIVE;
    }
    if y.contains(0.0) {
        u |= x & Interval::ZERO;
    }
    if y.contains(1.0) {
        u |= x & Interval::POSITIVE;
    }
    u
}

pub fn sgn_py(x: Interval, y: Interval) -> Interval {
    y & x.sgn()
}

// A periodic projector gives up beyond this many radians and returns its
// argument unchanged.
const MAX_TRIG_SPAN: f64 = 128.0;

/// y = sin(x)
pub fn sin_px(x: Interval, y: Interval) -> Interval {
    let y2 = y & Interval::MINUS_ONE_PLUS_ONE;
    if x.is_empty() || y2.is_empty() {
        return Interval::EMPTY;
    }
    if x.is_inf() || x.width() > MAX_TRIG_SPAN {
        return x;
    }
    let a = Interval::new(asin_dn(y2.left()), asin_up(y2.right()));
    let pi = Interval::pi();
    let two_pi = Interval::two_pi();
    let mut res = Interval::EMPTY;
    for k in branch_range(&x, two_pi.right()) {
        let shift = two_pi * Interval::point(k as f64);
        res |= x & (a + shift);
        res |= x & (pi - a + shift);
    }
    res
}

pub fn sin_py(x: Interval, y: Interval) -> Interval {
    y & x.sin()
}

/// y = cos(x)
pub fn cos_px(x: Interval, y: Interval) -> Interval {
    let y2 = y & Interval::MINUS_ONE_PLUS_ONE;
    if x.is_empty() || y2.is_empty() {
        return Interval::EMPTY;
    }
    if x.is_inf() || x.width() > MAX_TRIG_SPAN {
        return x;
    }
    let a = Interval::new(acos_dn(y2.right()), acos_up(y2.left()));
    let two_pi = Interval::two_pi();
    let mut res = Interval::EMPTY;
    for k in branch_range(&x, two_pi.right()) {
        let shift = two_pi * Interval::point(k as f64);
        res |= x & (a + shift);
        res |= x & (-a + shift);
    }
    res
}

pub fn cos_py(x: Interval, y: Interval) -> Interval {
    y & x.cos()
}

/// y = tan(x)
pub fn tan_px(x: Interval, y: Interval) -> Interval {
    if x.is_empty() || y.is_empty() {
        return Interval::EMPTY;
    }
    if x.is_inf() || x.width() > MAX_TRIG_SPAN || y.is_universe() {
        return x;
    }
    let half_pi = Interval::half_pi();
    let lo = if y.is_inf_left() {
        -half_pi.right()
    } else {
        atan_dn(y.left())
    };
    let hi = if y.is_inf_right() {
        half_pi.right()
    } else {
        atan_up(y.right())
    };
    let a = Interval::new(lo, hi);
    let pi = Interval::pi();
    let mut res = Interval::EMPTY;
    for k in branch_range(&x, pi.right()) {
        res |= x & (a + pi * Interval::point(k as f64));
    }
    res
}

pub fn tan_py(x: Interval, y: Interval) -> Interval {
    y & x.tan()
}

// Branch indices k whose period [k*p, (k+1)*p] can meet x, padded on both
// sides to absorb the enclosure slop.
fn branch_range(x: &Interval, period: f64) -> std::ops::RangeInclusive<i64> {
    let k_min = (x.left() / period).floor() as i64 - 2;
    let k_max = (x.right() / period).ceil() as i64 + 2;
    k_min..=k_max
}

/// Enclosure of the n-th root of a nonnegative interval.
fn nth_root(y: Interval, n: i32) -> Interval {
    if y.is_empty() {
        return y;
    }
    Interval::new(root_point_dn(y.left(), n), root_point_up(y.right(), n))
}

/// Enclosure of the odd n-th root over the whole line.
fn nth_root_signed(y: Interval, n: i32) -> Interval {
    if y.is_empty() {
        return y;
    }
    let lo = if y.left() >= 0.0 {
        root_point_dn(y.left(), n)
    } else {
        -root_point_up(-y.left(), n)
    };
    let hi = if y.right() >= 0.0 {
        root_point_up(y.right(), n)
    } else {
        -root_point_dn(-y.right(), n)
    };
    Interval::new(lo, hi)
}

// Certified upper bound on v^(1/n) for v >= 0: start from the libm estimate
// and step outward until the n-th power provably covers v.
fn root_point_up(v: f64, n: i32) -> f64 {
    debug_assert!(v >= 0.0 && n >= 1);
    if v == 0.0 || v.is_infinite() {
        return v;
    }
    let mut r = v.powf(1.0 / n as f64);
    let mut iter = 0;
    while point_pow(r, n).left() < v && iter < 64 {
        r = next_up(r);
        iter += 1;
    }
    r
}

fn root_point_dn(v: f64, n: i32) -> f64 {
    debug_assert!(v >= 0.0 && n >= 1);
    if v == 0.0 || v.is_infinite() {
        return v;
    }
    let mut r = v.powf(1.0 / n as f64);
    let mut iter = 0;
    while point_pow(r, n).right() > v && iter < 64 {
        r = next_down(r);
        iter += 1;
    }
    r.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn i(lo: f64, hi: f64) -> Interval {
        Interval::new(lo, hi)
    }

    #[test]
    fn test_add_projections() {
        let (x, y, z) = (i(0.0, 10.0), i(1.0, 2.0), i(5.0, 6.0));
        assert_eq!(add_px(x, y, z), i(3.0, 5.0));
        assert_eq!(add_py(x, y, z), i(1.0, 2.0));
        assert_eq!(add_pz(x, y, z), i(5.0, 6.0));
    }

    #[test]
    fn test_mul_projection_with_zero() {
        // 0 in y and 0 in z: no information on x
        let x = i(-5.0, 5.0);
        assert_eq!(mul_px(x, i(-1.0, 1.0), i(-1.0, 1.0)), x);
        // two-piece division: x * [1,2] in [2,4] with x in [-10,10]
        let px = mul_px(i(-10.0, 10.0), i(1.0, 2.0), i(2.0, 4.0));
        assert_eq!(px, i(1.0, 4.0));
    }

    #[test]
    fn test_sqr_projection() {
        // x^2 = 4, x in [0, 10] -> x = 2
        let px = sqr_px(i(0.0, 10.0), i(4.0, 4.0));
        assert!(px.contains(2.0));
        assert!(px.width() < 1e-10);
        // both branches
        let both = sqr_px(i(-10.0, 10.0), i(4.0, 9.0));
        assert_eq!(both, i(-3.0, 3.0));
    }

    #[test]
    fn test_round_trip_contracts() {
        // op_px(X, Y, op_pz(X, Y, Z)) is contained in X
        let (x, y) = (i(-2.0, 3.0), i(1.0, 4.0));
        for z in [i(-10.0, 10.0), i(0.0, 2.0), i(-1.0, 0.5)] {
            let pz = add_pz(x, y, z);
            assert!(x.contains_interval(&add_px(x, y, pz)));
            let pz = mul_pz(x, y, z);
            assert!(x.contains_interval(&mul_px(x, y, pz)));
            let pz = min_pz(x, y, z);
            assert!(x.contains_interval(&min_px(x, y, pz)));
        }
    }

    #[test]
    fn test_pow_projection() {
        // x^3 = 8 -> x = 2
        let px = pow_px(i(-10.0, 10.0), 3, i(8.0, 8.0));
        assert!(px.contains(2.0) && px.width() < 1e-10);
        // x^4 in [16, 81] -> |x| in [2, 3]
        let px = pow_px(i(-10.0, 10.0), 4, i(16.0, 81.0));
        assert!(px.contains(-3.0) && px.contains(3.0));
        assert!(!px.contains(-4.0) && !px.contains(4.0));
    }

    #[test]
    fn test_exp_log_projection() {
        let px = exp_px(i(-10.0, 10.0), i(1.0, std::f64::consts::E));
        assert!(px.contains(0.0) && px.contains(1.0));
        assert!(px.right() < 1.001);
        let px = log_px(i(0.0, 10.0), i(0.0, 0.0));
        assert!(px.contains(1.0) && px.width() < 1e-10);
    }

    #[test]
    fn test_sin_projection() {
        // sin(x) = 1 on [0, 2pi] -> x near pi/2
        let px = sin_px(i(0.0, 6.4), i(1.0, 1.0));
        assert!(px.contains(std::f64::consts::FRAC_PI_2));
        assert!(px.width() < 1e-3);
        // sin(x) = 0 on [3, 4] -> x near pi
        let px = sin_px(i(3.0, 4.0), i(0.0, 0.0));
        assert!(px.contains(std::f64::consts::PI));
        assert!(px.width() < 1e-6);
    }

    #[test]
    fn test_cos_tan_projection() {
        let px = cos_px(i(0.0, 3.2), i(-1.0, -1.0));
        assert!(px.contains(std::f64::consts::PI));
        assert!(px.width() < 1e-3);
        let px = tan_px(i(0.0, 1.5), i(1.0, 1.0));
        assert!(px.contains(std::f64::consts::FRAC_PI_4));
        assert!(px.width() < 1e-6);
    }

    #[test]
    fn test_min_max_empty_cases() {
        // min(x, y) in [5, 6] but y <= 4: infeasible
        assert!(min_px(i(0.0, 10.0), i(0.0, 4.0), i(5.0, 6.0)).is_empty());
        // max(x, y) in [5, 6] but y >= 7: infeasible
        assert!(max_px(i(0.0, 10.0), i(7.0, 9.0), i(5.0, 6.0)).is_empty());
    }

    #[test]
    fn test_abs_sgn_projection() {
        assert_eq!(abs_px(i(-10.0, 10.0), i(2.0, 3.0)), i(-3.0, 3.0));
        assert_eq!(sgn_px(i(-10.0, 10.0), i(1.0, 1.0)), i(0.0, 10.0));
        assert_eq!(sgn_px(i(-10.0, 10.0), i(-1.0, -1.0)), i(-10.0, 0.0));
    }
}
