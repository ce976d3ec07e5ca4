//! Directed-rounding scalar kernel.
//!
//! Rust (and LLVM) assume the default IEEE-754 rounding environment, so the
//! usual trick of flipping the FPU rounding mode is off the table. Directed
//! results are instead recovered from round-to-nearest results: error-free
//! transformations (2Sum, fused multiply-add residuals) give the sign of the
//! rounding error for `+ - * / sqrt`, and the result is nudged one ulp
//! outward only when the nearest result landed on the wrong side. Exact
//! results stay exact. Elementary functions from libm are faithfully rounded
//! but not correctly rounded; their results are widened by a fixed ulp
//! margin.

/// Ulp safety margin applied around libm elementary functions.
const LIBM_ULPS: u32 = 3;

#[inline]
pub(crate) fn next_up(x: f64) -> f64 {
    if x.is_nan() || x == f64::INFINITY {
        x
    } else {
        x.next_up()
    }
}

#[inline]
pub(crate) fn next_down(x: f64) -> f64 {
    if x.is_nan() || x == f64::NEG_INFINITY {
        x
    } else {
        x.next_down()
    }
}

#[inline]
fn steps_up(mut x: f64, n: u32) -> f64 {
    for _ in 0..n {
        x = next_up(x);
    }
    x
}

#[inline]
fn steps_down(mut x: f64, n: u32) -> f64 {
    for _ in 0..n {
        x = next_down(x);
    }
    x
}

/// Sum rounded toward -oo.
#[inline]
pub(crate) fn add_dn(x: f64, y: f64) -> f64 {
    let s = x + y;
    if s.is_infinite() {
        // a finite sum that overflowed to +oo rounds down to the largest double
        if s > 0.0 && x.is_finite() && y.is_finite() {
            return f64::MAX;
        }
        return s;
    }
    // 2Sum residual: the exact sum is s + e
    let t = s - x;
    let e = (x - (s - t)) + (y - t);
    if e < 0.0 { next_down(s) } else { s }
}

/// Sum rounded toward +oo.
#[inline]
pub(crate) fn add_up(x: f64, y: f64) -> f64 {
    let s = x + y;
    if s.is_infinite() {
        if s < 0.0 && x.is_finite() && y.is_finite() {
            return f64::MIN;
        }
        return s;
    }
    let t = s - x;
    let e = (x - (s - t)) + (y - t);
    if e > 0.0 { next_up(s) } else { s }
}

#[inline]
pub(crate) fn sub_dn(x: f64, y: f64) -> f64 {
    add_dn(x, -y)
}

#[inline]
pub(crate) fn sub_up(x: f64, y: f64) -> f64 {
    add_up(x, -y)
}

/// Product rounded toward -oo. The `0 * oo = 0` convention of interval
/// endpoint arithmetic is applied.
#[inline]
pub(crate) fn mul_dn(x: f64, y: f64) -> f64 {
    if x == 0.0 || y == 0.0 {
        return 0.0;
    }
    let p = x * y;
    if p.is_infinite() {
        if p > 0.0 && x.is_finite() && y.is_finite() {
            return f64::MAX;
        }
        return p;
    }
    // the fma residual is inexact in the subnormal range; widen unconditionally
    if p.is_subnormal() || p == 0.0 {
        return next_down(p);
    }
    let e = x.mul_add(y, -p);
    if e < 0.0 { next_down(p) } else { p }
}

/// Product rounded toward +oo.
#[inline]
pub(crate) fn mul_up(x: f64, y: f64) -> f64 {
    if x == 0.0 || y == 0.0 {
        return 0.0;
    }
    let p = x * y;
    if p.is_infinite() {
        if p < 0.0 && x.is_finite() && y.is_finite() {
            return f64::MIN;
        }
        return p;
    }
    if p.is_subnormal() || p == 0.0 {
        return next_up(p);
    }
    let e = x.mul_add(y, -p);
    if e > 0.0 { next_up(p) } else { p }
}

/// Quotient rounded toward -oo. The divisor must be nonzero.
#[inline]
pub(crate) fn div_dn(x: f64, y: f64) -> f64 {
    debug_assert!(y != 0.0);
    if x == 0.0 {
        return 0.0;
    }
    let q = x / y;
    if q.is_infinite() {
        if q > 0.0 && x.is_finite() {
            return f64::MAX;
        }
        return q;
    }
    if y.is_infinite() {
        return q;
    }
    if q.is_subnormal() || q == 0.0 {
        return next_down(q);
    }
    // x/y - q has the sign of (x - q*y) / y
    let r = q.mul_add(-y, x);
    if r != 0.0 && ((r > 0.0) != (y > 0.0)) {
        next_down(q)
    } else {
        q
    }
}

/// Quotient rounded toward +oo. The divisor must be nonzero.
#[inline]
pub(crate) fn div_up(x: f64, y: f64) -> f64 {
    debug_assert!(y != 0.0);
    if x == 0.0 {
        return 0.0;
    }
    let q = x / y;
    if q.is_infinite() {
        if q < 0.0 && x.is_finite() {
            return f64::MIN;
        }
        return q;
    }
    if y.is_infinite() {
        return q;
    }
    if q.is_subnormal() || q == 0.0 {
        return next_up(q);
    }
    let r = q.mul_add(-y, x);
    if r != 0.0 && ((r > 0.0) == (y > 0.0)) {
        next_up(q)
    } else {
        q
    }
}

/// Square root rounded toward -oo.
#[inline]
pub(crate) fn sqrt_dn(x: f64) -> f64 {
    debug_assert!(x >= 0.0);
    let s = x.sqrt();
    if s.is_infinite() {
        return s;
    }
    let r = s.mul_add(s, -x);
    if r > 0.0 { next_down(s).max(0.0) } else { s }
}

/// Square root rounded toward +oo.
#[inline]
pub(crate) fn sqrt_up(x: f64) -> f64 {
    debug_assert!(x >= 0.0);
    let s = x.sqrt();
    let r = s.mul_add(s, -x);
    if r < 0.0 { next_up(s) } else { s }
}

#[inline]
pub(crate) fn exp_dn(x: f64) -> f64 {
    if x == f64::NEG_INFINITY {
        return 0.0;
    }
    let v = x.exp();
    if v.is_infinite() {
        return f64::MAX;
    }
    steps_down(v, LIBM_ULPS).max(0.0)
}

#[inline]
pub(crate) fn exp_up(x: f64) -> f64 {
    if x == f64::INFINITY {
        return f64::INFINITY;
    }
    let v = x.exp();
    if v.is_infinite() {
        return v;
    }
    steps_up(v, LIBM_ULPS)
}

/// Natural logarithm, lower bound; the argument must be positive.
#[inline]
pub(crate) fn log_dn(x: f64) -> f64 {
    debug_assert!(x > 0.0);
    let v = x.ln();
    if v.is_infinite() {
        return v;
    }
    steps_down(v, LIBM_ULPS)
}

#[inline]
pub(crate) fn log_up(x: f64) -> f64 {
    debug_assert!(x > 0.0);
    let v = x.ln();
    if v.is_infinite() {
        return v;
    }
    steps_up(v, LIBM_ULPS)
}

#[inline]
pub(crate) fn sin_dn(x: f64) -> f64 {
    steps_down(x.sin(), LIBM_ULPS).max(-1.0)
}

#[inline]
pub(crate) fn sin_up(x: f64) -> f64 {
    steps_up(x.sin(), LIBM_ULPS).min(1.0)
}

#[inline]
pub(crate) fn cos_dn(x: f64) -> f64 {
    steps_down(x.cos(), LIBM_ULPS).max(-1.0)
}

#[inline]
pub(crate) fn cos_up(x: f64) -> f64 {
    steps_up(x.cos(), LIBM_ULPS).min(1.0)
}

#[inline]
pub(crate) fn tan_dn(x: f64) -> f64 {
    let v = x.tan();
    if v.is_infinite() {
        return v;
    }
    steps_down(v, LIBM_ULPS)
}

#[inline]
pub(crate) fn tan_up(x: f64) -> f64 {
    let v = x.tan();
    if v.is_infinite() {
        return v;
    }
    steps_up(v, LIBM_ULPS)
}

/// Arc sine, lower bound; the argument must lie in [-1, 1].
#[inline]
pub(crate) fn asin_dn(x: f64) -> f64 {
    steps_down(x.asin(), LIBM_ULPS)
}

#[inline]
pub(crate) fn asin_up(x: f64) -> f64 {
    steps_up(x.asin(), LIBM_ULPS)
}

#[inline]
pub(crate) fn acos_dn(x: f64) -> f64 {
    steps_down(x.acos(), LIBM_ULPS).max(0.0)
}

#[inline]
pub(crate) fn acos_up(x: f64) -> f64 {
    steps_up(x.acos(), LIBM_ULPS)
}

#[inline]
pub(crate) fn atan_dn(x: f64) -> f64 {
    steps_down(x.atan(), LIBM_ULPS)
}

#[inline]
pub(crate) fn atan_up(x: f64) -> f64 {
    steps_up(x.atan(), LIBM_ULPS)
}
