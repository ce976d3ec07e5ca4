//! Soundness properties of the interval operations and their projectors,
//! checked over a deterministic grid of intervals and sample points.

use crate::interval::projections::*;
use crate::interval::{DivisionResult, Interval};

fn grid() -> Vec<Interval> {
    vec![
        Interval::point(0.0),
        Interval::point(1.0),
        Interval::point(-2.5),
        Interval::new(0.1, 0.2),
        Interval::new(-1.0, 1.0),
        Interval::new(-3.0, -0.5),
        Interval::new(0.5, 4.0),
        Interval::new(-10.0, 2.0),
        Interval::new(1.0e-3, 1.0e3),
        Interval::more_than(1.0),
        Interval::less_than(-0.25),
    ]
}

// finite sample points of an interval
fn samples(x: &Interval) -> Vec<f64> {
    let mut out = Vec::new();
    for p in [x.left(), x.midpoint(), x.right()] {
        if p.is_finite() && x.contains(p) {
            out.push(p);
        }
    }
    out
}

type BinFn = (fn(f64, f64) -> f64, fn(Interval, Interval) -> Interval);

#[test]
fn test_binary_forward_soundness() {
    let ops: Vec<BinFn> = vec![
        (|a, b| a + b, |x, y| x + y),
        (|a, b| a - b, |x, y| x - y),
        (|a, b| a * b, |x, y| x * y),
        (f64::min, Interval::min),
        (f64::max, Interval::max),
    ];
    for x in grid() {
        for y in grid() {
            for (point_op, itv_op) in &ops {
                let z = itv_op(x, y);
                for a in samples(&x) {
                    for b in samples(&y) {
                        let v = point_op(a, b);
                        assert!(
                            z.contains(v),
                            "{} not in {} for inputs {} {}",
                            v,
                            z,
                            x,
                            y
                        );
                    }
                }
            }
        }
    }
}

#[test]
fn test_division_forward_soundness() {
    for x in grid() {
        for y in grid() {
            let z = x / y;
            for a in samples(&x) {
                for b in samples(&y) {
                    if b == 0.0 {
                        continue;
                    }
                    assert!(z.contains(a / b), "{} / {} escapes {}", a, b, z);
                }
            }
        }
    }
}

#[test]
fn test_unary_forward_soundness() {
    let ops: Vec<(fn(f64) -> f64, fn(Interval) -> Interval)> = vec![
        (|a| a * a, Interval::sqr),
        (f64::sqrt, Interval::sqrt),
        (f64::exp, Interval::exp),
        (f64::ln, Interval::log),
        (f64::abs, Interval::abs),
        (f64::sin, Interval::sin),
        (f64::cos, Interval::cos),
        (f64::tan, Interval::tan),
    ];
    for x in grid() {
        for (point_op, itv_op) in &ops {
            let z = itv_op(x);
            for a in samples(&x) {
                let v = point_op(a);
                if v.is_nan() {
                    // outside the operator domain
                    continue;
                }
                assert!(z.contains(v), "{} not in {} for input {}", v, z, x);
            }
        }
    }
}

#[test]
fn test_pow_forward_soundness() {
    for x in grid() {
        for n in [2, 3, 4, 5, 6] {
            let z = x.powi(n);
            for a in samples(&x) {
                let v = a.powi(n);
                assert!(z.contains(v), "{}^{} escapes {}", a, n, z);
            }
        }
    }
}

// Every point pair certainly consistent with the relation survives the
// projection. Membership is decided with the rigorous interval operation so
// the witness really is a solution.
#[test]
fn test_binary_projector_soundness() {
    type Projector = fn(Interval, Interval, Interval) -> Interval;
    let ops: Vec<(fn(Interval, Interval) -> Interval, Projector, Projector)> = vec![
        (|a, b| a + b, add_px, add_py),
        (|a, b| a - b, sub_px, sub_py),
        (|a, b| a * b, mul_px, mul_py),
        (Interval::min, min_px, min_py),
        (Interval::max, max_px, max_py),
    ];
    for x in grid() {
        for y in grid() {
            for z in grid() {
                for (itv_op, px, py) in &ops {
                    let rx = px(x, y, z);
                    let ry = py(x, y, z);
                    for a in samples(&x) {
                        for b in samples(&y) {
                            let v = itv_op(Interval::point(a), Interval::point(b));
                            if !z.contains_interval(&v) {
                                continue;
                            }
                            assert!(rx.contains(a), "x = {} lost by projection", a);
                            assert!(ry.contains(b), "y = {} lost by projection", b);
                        }
                    }
                }
            }
        }
    }
}

#[test]
fn test_unary_projector_soundness() {
    let ops: Vec<(fn(Interval) -> Interval, fn(Interval, Interval) -> Interval)> = vec![
        (Interval::sqr, sqr_px),
        (Interval::sqrt, sqrt_px),
        (Interval::exp, exp_px),
        (Interval::log, log_px),
        (Interval::abs, abs_px),
        (Interval::sin, sin_px),
        (Interval::cos, cos_px),
        (Interval::tan, tan_px),
    ];
    for x in grid() {
        for y in grid() {
            for (itv_op, px) in &ops {
                let rx = px(x, y);
                for a in samples(&x) {
                    let v = itv_op(Interval::point(a));
                    if v.is_empty() || !y.contains_interval(&v) {
                        continue;
                    }
                    assert!(
                        rx.contains(a),
                        "x = {} lost by projection into {} from {}",
                        a,
                        rx,
                        x
                    );
                }
            }
        }
    }
}

#[test]
fn test_projector_round_trip_contracts() {
    for x in grid() {
        for y in grid() {
            let z = mul_pz(x, y, Interval::UNIVERSE);
            assert!(x.contains_interval(&mul_px(x, y, z)));
            let z = add_pz(x, y, Interval::UNIVERSE);
            assert!(x.contains_interval(&add_px(x, y, z)));
            let z = div_pz(x, y, Interval::UNIVERSE);
            assert!(x.contains_interval(&div_px(x, y, z)));
        }
    }
}

#[test]
fn test_extended_division_pieces() {
    // two pieces exactly when zero is interior to the divisor and the
    // numerator avoids zero
    let cases = [
        (Interval::new(1.0, 2.0), Interval::new(-1.0, 1.0), true),
        (Interval::new(-2.0, -1.0), Interval::new(-3.0, 2.0), true),
        (Interval::new(-1.0, 2.0), Interval::new(-1.0, 1.0), false),
        (Interval::new(1.0, 2.0), Interval::new(0.0, 1.0), false),
        (Interval::new(1.0, 2.0), Interval::new(1.0, 2.0), false),
    ];
    for (x, y, expect_two) in cases {
        let two = matches!(Interval::ext_div(x, y), DivisionResult::TwoPieces(_, _));
        assert_eq!(two, expect_two, "ext_div({}, {})", x, y);
    }
}
