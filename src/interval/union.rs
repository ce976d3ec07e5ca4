//! Ordered unions of disjoint intervals.

use std::fmt;

use super::Interval;

/// A finite union of disjoint, sorted, nonempty intervals.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IntervalUnion {
    pieces: Vec<Interval>,
}

impl IntervalUnion {
    pub fn new() -> Self {
        Self { pieces: Vec::new() }
    }

    pub fn from_intervals<I: IntoIterator<Item = Interval>>(iter: I) -> Self {
        let mut u = Self::new();
        for x in iter {
            u.insert(x);
        }
        u
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn piece(&self, i: usize) -> &Interval {
        &self.pieces[i]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.pieces.iter()
    }

    /// Inserts an interval, merging it with any overlapping or adjacent
    /// pieces so the representation stays disjoint and sorted.
    pub fn insert(&mut self, x: Interval) {
        if x.is_empty() {
            return;
        }
        let mut merged = x;
        let mut out = Vec::with_capacity(self.pieces.len() + 1);
        let mut placed = false;
        for p in self.pieces.drain(..) {
            if p.overlaps(&merged) || p.right() == merged.left() || merged.right() == p.left() {
                merged |= p;
            } else if p.is_certainly_lt(&merged) {
                out.push(p);
            } else {
                if !placed {
                    out.push(merged);
                    placed = true;
                }
                out.push(p);
            }
        }
        if !placed {
            out.push(merged);
        }
        self.pieces = out;
    }

    /// Interval hull of the union.
    pub fn hull(&self) -> Interval {
        match (self.pieces.first(), self.pieces.last()) {
            (Some(a), Some(b)) => Interval::new(a.left(), b.right()),
            _ => Interval::EMPTY,
        }
    }

    /// Total width of the pieces.
    pub fn width(&self) -> f64 {
        self.pieces.iter().map(|p| p.width()).sum()
    }

    pub fn contains(&self, a: f64) -> bool {
        self.pieces.iter().any(|p| p.contains(a))
    }

    /// Intersects every piece with an interval, dropping emptied pieces.
    pub fn intersect_interval(&mut self, x: &Interval) {
        self.pieces.retain_mut(|p| {
            *p &= *x;
            !p.is_empty()
        });
    }
}

impl From<Interval> for IntervalUnion {
    fn from(x: Interval) -> Self {
        Self::from_intervals([x])
    }
}

impl fmt::Display for IntervalUnion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "empty");
        }
        write!(f, "{{")?;
        for (k, p) in self.pieces.iter().enumerate() {
            if k > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn i(lo: f64, hi: f64) -> Interval {
        Interval::new(lo, hi)
    }

    #[test]
    fn test_insert_keeps_sorted_disjoint() {
        let mut u = IntervalUnion::new();
        u.insert(i(5.0, 6.0));
        u.insert(i(0.0, 1.0));
        u.insert(i(2.0, 3.0));
        assert_eq!(u.len(), 3);
        assert_eq!(*u.piece(0), i(0.0, 1.0));
        assert_eq!(*u.piece(2), i(5.0, 6.0));
    }

    #[test]
    fn test_insert_merges_overlaps() {
        let mut u = IntervalUnion::from_intervals([i(0.0, 1.0), i(2.0, 3.0)]);
        u.insert(i(0.5, 2.5));
        assert_eq!(u.len(), 1);
        assert_eq!(*u.piece(0), i(0.0, 3.0));
    }

    #[test]
    fn test_hull_and_intersect() {
        let mut u = IntervalUnion::from_intervals([i(0.0, 1.0), i(4.0, 5.0)]);
        assert_eq!(u.hull(), i(0.0, 5.0));
        u.intersect_interval(&i(0.5, 4.5));
        assert_eq!(u.len(), 2);
        assert_eq!(*u.piece(0), i(0.5, 1.0));
        assert_eq!(*u.piece(1), i(4.0, 4.5));
    }
}
