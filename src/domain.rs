//! Typed variable domains and domain boxes.

use std::fmt;

use crate::interval::Interval;
use crate::interval::union::IntervalUnion;
use crate::scope::Scope;
use crate::variable::Variable;

/// An integer interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    lo: i64,
    hi: i64,
}

impl Range {
    pub fn new(lo: i64, hi: i64) -> Self {
        Self { lo, hi }
    }

    pub fn lo(&self) -> i64 {
        self.lo
    }

    pub fn hi(&self) -> i64 {
        self.hi
    }

    pub fn is_empty(&self) -> bool {
        self.lo > self.hi
    }

    pub fn count(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            (self.hi - self.lo) as f64 + 1.0
        }
    }

    pub fn to_interval(&self) -> Interval {
        if self.is_empty() {
            Interval::EMPTY
        } else {
            Interval::new(self.lo as f64, self.hi as f64)
        }
    }

    /// Largest integer range contained in the interval.
    pub fn from_interval(x: &Interval) -> Self {
        let r = x.round_int();
        if r.is_empty() {
            Self { lo: 1, hi: 0 }
        } else {
            Self {
                lo: r.left().max(i64::MIN as f64) as i64,
                hi: r.right().min(i64::MAX as f64) as i64,
            }
        }
    }

    pub fn intersect(&self, other: &Range) -> Range {
        Range::new(self.lo.max(other.lo), self.hi.min(other.hi))
    }
}

/// A sorted union of disjoint integer ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeUnion {
    pieces: Vec<Range>,
}

impl RangeUnion {
    pub fn from_ranges<I: IntoIterator<Item = Range>>(iter: I) -> Self {
        let mut pieces: Vec<Range> = iter.into_iter().filter(|r| !r.is_empty()).collect();
        pieces.sort_by_key(|r| r.lo);
        let mut out: Vec<Range> = Vec::with_capacity(pieces.len());
        for r in pieces {
            match out.last_mut() {
                Some(last) if r.lo <= last.hi + 1 => last.hi = last.hi.max(r.hi),
                _ => out.push(r),
            }
        }
        Self { pieces: out }
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    pub fn count(&self) -> f64 {
        self.pieces.iter().map(|r| r.count()).sum()
    }

    pub fn hull(&self) -> Interval {
        match (self.pieces.first(), self.pieces.last()) {
            (Some(a), Some(b)) => Interval::new(a.lo as f64, b.hi as f64),
            _ => Interval::EMPTY,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Range> {
        self.pieces.iter()
    }

    pub fn intersect_interval(&mut self, x: &Interval) {
        let r = Range::from_interval(x);
        self.pieces.retain_mut(|p| {
            *p = p.intersect(&r);
            !p.is_empty()
        });
    }
}

/// The three binary domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryDomain {
    Zero,
    One,
    ZeroOne,
}

impl BinaryDomain {
    pub fn to_interval(&self) -> Interval {
        match self {
            BinaryDomain::Zero => Interval::ZERO,
            BinaryDomain::One => Interval::ONE,
            BinaryDomain::ZeroOne => Interval::ZERO_PLUS_ONE,
        }
    }
}

/// A typed enclosure of the values a variable may take.
#[derive(Debug, Clone, PartialEq)]
pub enum Domain {
    Interval(Interval),
    IntervalUnion(IntervalUnion),
    Binary(BinaryDomain),
    Range(Range),
    RangeUnion(RangeUnion),
}

impl Domain {
    pub fn is_empty(&self) -> bool {
        match self {
            Domain::Interval(x) => x.is_empty(),
            Domain::IntervalUnion(u) => u.is_empty(),
            Domain::Binary(_) => false,
            Domain::Range(r) => r.is_empty(),
            Domain::RangeUnion(u) => u.is_empty(),
        }
    }

    /// Discretized width: total width for continuous domains, value count
    /// for discrete ones.
    pub fn size(&self) -> f64 {
        match self {
            Domain::Interval(x) => x.width(),
            Domain::IntervalUnion(u) => u.width(),
            Domain::Binary(b) => {
                if *b == BinaryDomain::ZeroOne {
                    2.0
                } else {
                    1.0
                }
            }
            Domain::Range(r) => r.count(),
            Domain::RangeUnion(u) => u.count(),
        }
    }

    /// Interval hull of the domain.
    pub fn hull(&self) -> Interval {
        match self {
            Domain::Interval(x) => *x,
            Domain::IntervalUnion(u) => u.hull(),
            Domain::Binary(b) => b.to_interval(),
            Domain::Range(r) => r.to_interval(),
            Domain::RangeUnion(u) => u.hull(),
        }
    }

    pub fn midpoint(&self) -> f64 {
        match self {
            // split points of discrete domains stay on the grid
            Domain::Range(r) => {
                let m = r.to_interval().midpoint();
                m.floor()
            }
            _ => self.hull().midpoint(),
        }
    }

    /// True if the domain holds a single value.
    pub fn is_singleton(&self) -> bool {
        match self {
            Domain::Interval(x) => x.is_singleton(),
            Domain::IntervalUnion(u) => u.len() == 1 && u.piece(0).is_singleton(),
            Domain::Binary(b) => *b != BinaryDomain::ZeroOne,
            Domain::Range(r) => !r.is_empty() && r.lo() == r.hi(),
            Domain::RangeUnion(u) => u.count() == 1.0,
        }
    }

    /// Smallest domain of a compatible type covering both operands, used
    /// when solution clusters merge.
    pub fn hull_merge(&self, other: &Domain) -> Domain {
        match (self, other) {
            (Domain::Range(a), Domain::Range(b)) => {
                Domain::Range(Range::from_interval(&(a.to_interval() | b.to_interval())))
            }
            (Domain::Binary(a), Domain::Binary(b)) => {
                if a == b {
                    Domain::Binary(*a)
                } else {
                    Domain::Binary(BinaryDomain::ZeroOne)
                }
            }
            _ => Domain::Interval(self.hull() | other.hull()),
        }
    }

    /// Narrows the domain by an interval, preserving its type.
    pub fn intersect_interval(&mut self, x: &Interval) {
        match self {
            Domain::Interval(d) => *d &= *x,
            Domain::IntervalUnion(u) => u.intersect_interval(x),
            Domain::Binary(b) => {
                let v = b.to_interval() & *x & Interval::ZERO_PLUS_ONE;
                let r = v.round_int();
                *self = if r.is_empty() {
                    Domain::Interval(Interval::EMPTY)
                } else if r.is_singleton() {
                    Domain::Binary(if r.left() == 0.0 {
                        BinaryDomain::Zero
                    } else {
                        BinaryDomain::One
                    })
                } else {
                    Domain::Binary(BinaryDomain::ZeroOne)
                };
            }
            Domain::Range(r) => {
                let n = r.intersect(&Range::from_interval(x));
                if n.is_empty() {
                    *self = Domain::Interval(Interval::EMPTY);
                } else {
                    *self = Domain::Range(n);
                }
            }
            Domain::RangeUnion(u) => u.intersect_interval(x),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Interval(x) => write!(f, "{}", x),
            Domain::IntervalUnion(u) => write!(f, "{}", u),
            Domain::Binary(b) => match b {
                BinaryDomain::Zero => write!(f, "{{0}}"),
                BinaryDomain::One => write!(f, "{{1}}"),
                BinaryDomain::ZeroOne => write!(f, "{{0, 1}}"),
            },
            Domain::Range(r) => write!(f, "[{}..{}]", r.lo(), r.hi()),
            Domain::RangeUnion(u) => {
                write!(f, "{{")?;
                for (k, r) in u.iter().enumerate() {
                    if k > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "[{}..{}]", r.lo(), r.hi())?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// A total map from a scope to owned typed domains.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainBox {
    scope: Scope,
    doms: Vec<Domain>,
}

impl DomainBox {
    pub fn new(scope: Scope, doms: Vec<Domain>) -> Self {
        debug_assert_eq!(scope.size(), doms.len());
        Self { scope, doms }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn get(&self, v: &Variable) -> &Domain {
        let i = self.scope.index_of(v).expect("variable not in scope");
        &self.doms[i]
    }

    pub fn get_mut(&mut self, v: &Variable) -> &mut Domain {
        let i = self.scope.index_of(v).expect("variable not in scope");
        &mut self.doms[i]
    }

    pub fn set(&mut self, v: &Variable, d: Domain) {
        *self.get_mut(v) = d;
    }

    pub fn is_empty(&self) -> bool {
        self.doms.iter().any(|d| d.is_empty())
    }

    /// Narrows a variable's domain by intersecting it with an interval.
    pub fn narrow(&mut self, v: &Variable, x: &Interval) {
        self.get_mut(v).intersect_interval(x);
    }

    /// True if the domain of `v` can still be split under its tolerance.
    pub fn is_splitable(&self, v: &Variable) -> bool {
        let d = self.get(v);
        if d.is_empty() || d.is_singleton() {
            return false;
        }
        if v.is_integer() {
            d.size() > 1.0
        } else {
            !v.tolerance().has_tolerance(&d.hull())
        }
    }
}

impl fmt::Display for DomainBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, v) in self.scope.iter().enumerate() {
            if k > 0 {
                writeln!(f)?;
            }
            write!(f, "{} = {}", v, self.doms[k])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tolerance::Tolerance;
    use crate::variable::VarKind;

    #[test]
    fn test_range_narrowing() {
        let mut d = Domain::Range(Range::new(0, 10));
        d.intersect_interval(&Interval::new(2.4, 7.6));
        assert_eq!(d, Domain::Range(Range::new(3, 7)));
        assert_eq!(d.size(), 5.0);
        d.intersect_interval(&Interval::new(8.0, 9.0));
        assert!(d.is_empty());
    }

    #[test]
    fn test_binary_narrowing() {
        let mut d = Domain::Binary(BinaryDomain::ZeroOne);
        d.intersect_interval(&Interval::new(0.5, 2.0));
        assert_eq!(d, Domain::Binary(BinaryDomain::One));
        let mut d = Domain::Binary(BinaryDomain::ZeroOne);
        d.intersect_interval(&Interval::new(2.0, 3.0));
        assert!(d.is_empty());
    }

    #[test]
    fn test_splitability() {
        let x = Variable::new(0, "x", VarKind::Real, Tolerance::abs(1e-8));
        let n = Variable::new(1, "n", VarKind::Integer, Tolerance::abs(1e-8));
        let scope = Scope::from_vars([x.clone(), n.clone()]);
        let bx = DomainBox::new(
            scope,
            vec![
                Domain::Interval(Interval::new(0.0, 1.0)),
                Domain::Range(Range::new(3, 3)),
            ],
        );
        assert!(bx.is_splitable(&x));
        assert!(!bx.is_splitable(&n));
    }
}
