//! Interval slicers: finite ordered covers of an interval.

use dyn_clone::DynClone;

use crate::interval::Interval;

/// Cuts an interval into a finite ordered sequence of sub-intervals
/// covering it.
pub trait IntervalSlicer: DynClone {
    fn slice(&self, x: &Interval) -> Vec<Interval>;
}

dyn_clone::clone_trait_object!(IntervalSlicer);

/// Two halves at the midpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct BisectionSlicer;

impl IntervalSlicer for BisectionSlicer {
    fn slice(&self, x: &Interval) -> Vec<Interval> {
        if x.is_empty() || x.is_canonical() {
            return vec![*x];
        }
        let c = x.midpoint();
        if !x.strictly_contains(c) {
            return vec![*x];
        }
        vec![
            Interval::new(x.left(), c),
            Interval::new(c, x.right()),
        ]
    }
}

/// A thin boundary slice plus the remainder; the factor is a percentage of
/// the width.
#[derive(Debug, Clone, Copy)]
pub struct PeelingSlicer {
    factor: f64,
}

impl PeelingSlicer {
    pub fn new(factor: f64) -> Self {
        debug_assert!((0.0..=100.0).contains(&factor));
        Self { factor }
    }
}

impl IntervalSlicer for PeelingSlicer {
    fn slice(&self, x: &Interval) -> Vec<Interval> {
        if x.is_empty() || x.is_canonical() || x.is_inf() {
            return vec![*x];
        }
        let w = x.width() * self.factor / 100.0;
        let cut = x.left() + w;
        if !x.strictly_contains(cut) {
            return vec![*x];
        }
        vec![
            Interval::new(x.left(), cut),
            Interval::new(cut, x.right()),
        ]
    }
}

/// N equal sub-intervals.
#[derive(Debug, Clone, Copy)]
pub struct PartitionSlicer {
    n: usize,
}

impl PartitionSlicer {
    pub fn new(n: usize) -> Self {
        debug_assert!(n >= 2);
        Self { n }
    }
}

impl IntervalSlicer for PartitionSlicer {
    fn slice(&self, x: &Interval) -> Vec<Interval> {
        if x.is_empty() || x.is_canonical() || x.is_inf() {
            return vec![*x];
        }
        let step = x.width() / self.n as f64;
        if step == 0.0 || !step.is_finite() {
            return vec![*x];
        }
        let mut out = Vec::with_capacity(self.n);
        let mut lo = x.left();
        for k in 0..self.n {
            let hi = if k + 1 == self.n {
                x.right()
            } else {
                (x.left() + step * (k + 1) as f64).min(x.right())
            };
            if hi > lo {
                out.push(Interval::new(lo, hi));
                lo = hi;
            }
        }
        if out.is_empty() {
            return vec![*x];
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bisection_covers() {
        let x = Interval::new(0.0, 1.0);
        let parts = BisectionSlicer.slice(&x);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].right(), parts[1].left());
        assert_eq!(parts[0].left(), 0.0);
        assert_eq!(parts[1].right(), 1.0);
    }

    #[test]
    fn test_peeling() {
        let x = Interval::new(0.0, 100.0);
        let parts = PeelingSlicer::new(2.0).slice(&x);
        assert_eq!(parts.len(), 2);
        assert!((parts[0].width() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_partition_covers() {
        let x = Interval::new(0.0, 1.0);
        let parts = PartitionSlicer::new(4).slice(&x);
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0].left(), 0.0);
        assert_eq!(parts[3].right(), 1.0);
        for w in parts.windows(2) {
            assert_eq!(w[0].right(), w[1].left());
        }
    }

    #[test]
    fn test_canonical_is_not_cut() {
        let x = Interval::point(2.0);
        assert_eq!(BisectionSlicer.slice(&x).len(), 1);
        assert_eq!(PartitionSlicer::new(3).slice(&x).len(), 1);
    }
}
