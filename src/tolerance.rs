//! Width tolerances on intervals.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::interval::Interval;
use crate::{Error, Result};

/// An absolute or relative bound on interval widths.
///
/// The relative interpretation degrades to the absolute one inside the unit
/// box, where relative widths are meaningless.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    val: f64,
    absolute: bool,
}

impl Tolerance {
    pub fn abs(val: f64) -> Self {
        debug_assert!(val >= 0.0);
        Self {
            val,
            absolute: true,
        }
    }

    pub fn rel(val: f64) -> Self {
        debug_assert!((0.0..=1.0).contains(&val));
        Self {
            val,
            absolute: false,
        }
    }

    pub fn value(&self) -> f64 {
        self.val
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    pub fn is_relative(&self) -> bool {
        !self.absolute
    }

    /// The width measure of an interval under this tolerance.
    pub fn measure_of(&self, x: &Interval) -> f64 {
        if x.is_empty() {
            return -1.0;
        }
        if x.is_canonical() {
            return 0.0;
        }
        if self.absolute || Interval::MINUS_ONE_PLUS_ONE.contains_interval(x) {
            x.width()
        } else {
            x.rel_width()
        }
    }

    /// True if the interval is tight enough under this tolerance.
    pub fn has_tolerance(&self, x: &Interval) -> bool {
        if x.is_empty() || x.is_inf() {
            return false;
        }
        if x.is_canonical() {
            return true;
        }
        self.measure_of(x) <= self.val
    }

    /// True if the two bounds are close enough under this tolerance.
    pub fn has_tolerance_points(&self, a: f64, b: f64) -> bool {
        if a == b {
            return true;
        }
        let x = if a < b {
            Interval::new(a, b)
        } else {
            Interval::new(b, a)
        };
        self.has_tolerance(&x)
    }

    /// True if two intervals are at distance within this tolerance, measured
    /// on the bound that moved most.
    pub fn have_dist_tolerance(&self, x: &Interval, y: &Interval) -> bool {
        if x.is_empty() || y.is_empty() || x.is_inf() || y.is_inf() {
            return false;
        }
        let u = (x.left() - y.left()).abs();
        let v = (x.right() - y.right()).abs();
        if u > v {
            self.has_tolerance_points(x.left(), y.left())
        } else {
            self.has_tolerance_points(x.right(), y.right())
        }
    }

    /// Number of slices of this width the interval can be cut into; the
    /// discretized domain size used by the selectors.
    pub fn discrete_size(&self, x: &Interval) -> f64 {
        if x.is_empty() {
            return 0.0;
        }
        if x.is_canonical() {
            return 1.0;
        }
        if x.is_inf() {
            return f64::MAX.floor();
        }
        if self.val == 0.0 {
            return f64::MAX.floor();
        }
        let a = if self.absolute || Interval::MINUS_ONE_PLUS_ONE.contains_interval(x) {
            x.width() / self.val
        } else {
            x.rel_width() / self.val
        };
        let b = a.floor();
        if a == b { b } else { b + 1.0 }
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Tolerance::abs(1.0e-8)
    }
}

impl fmt::Display for Tolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.val, if self.absolute { "A" } else { "R" })
    }
}

/// Parses a tolerance literal: a nonnegative number suffixed by `A`
/// (absolute) or `R` (relative), e.g. `1e-8A` or `0.001R`.
impl FromStr for Tolerance {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || Error::BadTolerance {
            literal: s.to_string(),
        };
        if s.len() < 2 {
            return Err(bad());
        }
        let (num, suffix) = s.split_at(s.len() - 1);
        let val: f64 = num.trim().parse().map_err(|_| bad())?;
        if !val.is_finite() || val < 0.0 {
            return Err(bad());
        }
        match suffix {
            "A" => Ok(Tolerance::abs(val)),
            "R" if val <= 1.0 => Ok(Tolerance::rel(val)),
            _ => Err(bad()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let t: Tolerance = "1e-8A".parse().unwrap();
        assert!(t.is_absolute());
        assert_eq!(t.value(), 1e-8);
        let t: Tolerance = "0.5R".parse().unwrap();
        assert!(t.is_relative());
        assert!("0.5".parse::<Tolerance>().is_err());
        assert!("-1A".parse::<Tolerance>().is_err());
        assert!("2R".parse::<Tolerance>().is_err());
    }

    #[test]
    fn test_has_tolerance() {
        let t = Tolerance::abs(1e-3);
        assert!(t.has_tolerance(&Interval::new(0.0, 1e-4)));
        assert!(!t.has_tolerance(&Interval::new(0.0, 1.0)));
        assert!(!t.has_tolerance(&Interval::UNIVERSE));
        assert!(t.has_tolerance(&Interval::point(5.0)));

        // relative tolerance falls back to absolute inside [-1, 1]
        let r = Tolerance::rel(1e-3);
        assert!(r.has_tolerance(&Interval::new(0.5, 0.5001)));
        assert!(r.has_tolerance(&Interval::new(1e6, 1e6 + 500.0)));
        assert!(!r.has_tolerance(&Interval::new(1e6, 1e6 + 5000.0)));
    }

    #[test]
    fn test_discrete_size() {
        let t = Tolerance::abs(0.25);
        assert_eq!(t.discrete_size(&Interval::new(0.0, 1.0)), 4.0);
        assert_eq!(t.discrete_size(&Interval::new(0.0, 1.1)), 5.0);
        assert_eq!(t.discrete_size(&Interval::point(3.0)), 1.0);
    }
}
