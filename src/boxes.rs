//! Interval boxes: the working representation of contractors.

use std::fmt;

use crate::domain::DomainBox;
use crate::interval::Interval;
use crate::scope::Scope;
use crate::variable::Variable;

/// A scope-indexed vector of intervals.
#[derive(Clone, PartialEq)]
pub struct IntervalBox {
    scope: Scope,
    doms: Vec<Interval>,
}

impl IntervalBox {
    pub fn new(scope: Scope, doms: Vec<Interval>) -> Self {
        debug_assert_eq!(scope.size(), doms.len());
        Self { scope, doms }
    }

    /// The whole space over a scope.
    pub fn universe(scope: Scope) -> Self {
        let n = scope.size();
        Self {
            scope,
            doms: vec![Interval::UNIVERSE; n],
        }
    }

    /// Projects the typed domains of a domain box onto intervals.
    pub fn from_domain_box(db: &DomainBox) -> Self {
        Self {
            scope: db.scope().clone(),
            doms: db.scope().iter().map(|v| db.get(v).hull()).collect(),
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn size(&self) -> usize {
        self.doms.len()
    }

    pub fn get(&self, v: &Variable) -> Interval {
        self.doms[self.scope.index_of(v).expect("variable not in scope")]
    }

    pub fn at(&self, i: usize) -> Interval {
        self.doms[i]
    }

    pub fn set(&mut self, v: &Variable, x: Interval) {
        let i = self.scope.index_of(v).expect("variable not in scope");
        self.doms[i] = x;
    }

    pub fn set_at(&mut self, i: usize, x: Interval) {
        self.doms[i] = x;
    }

    pub fn is_empty(&self) -> bool {
        self.doms.iter().any(|x| x.is_empty())
    }

    /// Largest coordinate width.
    pub fn width(&self) -> f64 {
        self.doms.iter().map(|x| x.width()).fold(0.0, f64::max)
    }

    /// Per-coordinate hull.
    pub fn hull_with(&mut self, other: &IntervalBox) {
        debug_assert_eq!(self.scope, other.scope);
        for (a, b) in self.doms.iter_mut().zip(other.doms.iter()) {
            *a |= *b;
        }
    }

    /// Per-coordinate intersection.
    pub fn intersect_with(&mut self, other: &IntervalBox) {
        debug_assert_eq!(self.scope, other.scope);
        for (a, b) in self.doms.iter_mut().zip(other.doms.iter()) {
            *a &= *b;
        }
    }

    /// Copies the coordinates of `other` on a sub-scope.
    pub fn set_on_scope(&mut self, other: &IntervalBox, scope: &Scope) {
        for v in scope.iter() {
            self.set(v, other.get(v));
        }
    }

    pub fn contains_box(&self, other: &IntervalBox) -> bool {
        debug_assert_eq!(self.scope, other.scope);
        self.doms
            .iter()
            .zip(other.doms.iter())
            .all(|(a, b)| a.contains_interval(b))
    }

    pub fn strictly_contains_box(&self, other: &IntervalBox) -> bool {
        debug_assert_eq!(self.scope, other.scope);
        self.doms
            .iter()
            .zip(other.doms.iter())
            .all(|(a, b)| a.strictly_contains_interval(b))
    }

    /// True if some coordinate width shrank by more than `tol` relative to
    /// its previous width.
    pub fn improves(&self, prev: &IntervalBox, tol: f64) -> bool {
        debug_assert_eq!(self.scope, prev.scope);
        for (a, b) in self.doms.iter().zip(prev.doms.iter()) {
            if a.is_empty() {
                return true;
            }
            let (wa, wb) = (a.width(), b.width());
            if wb.is_infinite() {
                if wa.is_finite() {
                    return true;
                }
                continue;
            }
            if wb > 0.0 && (wb - wa) / wb > tol {
                return true;
            }
        }
        false
    }

    /// Midpoint vector, in scope order.
    pub fn midpoint(&self) -> Vec<f64> {
        self.doms.iter().map(|x| x.midpoint()).collect()
    }

    /// Narrows the typed domains of a domain box by this box.
    pub fn write_to_domain_box(&self, db: &mut DomainBox) {
        for (i, v) in self.scope.iter().enumerate() {
            db.narrow(v, &self.doms[i]);
        }
    }

    /// Largest per-coordinate gap with another box, used for solution
    /// clustering.
    pub fn gap_with(&self, other: &IntervalBox) -> f64 {
        debug_assert_eq!(self.scope, other.scope);
        let mut gap: f64 = 0.0;
        for (a, b) in self.doms.iter().zip(other.doms.iter()) {
            if a.overlaps(b) {
                continue;
            }
            let g = if a.is_certainly_lt(b) {
                b.left() - a.right()
            } else {
                a.left() - b.right()
            };
            gap = gap.max(g);
        }
        gap
    }
}

impl fmt::Debug for IntervalBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (k, v) in self.scope.iter().enumerate() {
            if k > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} = {}", v, self.doms[k])?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for IntervalBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Domain;
    use crate::tolerance::Tolerance;
    use crate::variable::VarKind;

    fn vars2() -> (Variable, Variable, Scope) {
        let x = Variable::new(0, "x", VarKind::Real, Tolerance::default());
        let y = Variable::new(1, "y", VarKind::Real, Tolerance::default());
        let s = Scope::from_vars([x.clone(), y.clone()]);
        (x, y, s)
    }

    #[test]
    fn test_round_trip_with_domain_box() {
        let (x, y, s) = vars2();
        let db = DomainBox::new(
            s.clone(),
            vec![
                Domain::Interval(Interval::new(0.0, 1.0)),
                Domain::Interval(Interval::new(-1.0, 1.0)),
            ],
        );
        let mut ib = IntervalBox::from_domain_box(&db);
        assert_eq!(ib.get(&x), Interval::new(0.0, 1.0));
        ib.set(&y, Interval::new(0.0, 0.5));
        let mut db2 = db.clone();
        ib.write_to_domain_box(&mut db2);
        assert_eq!(db2.get(&y).hull(), Interval::new(0.0, 0.5));
    }

    #[test]
    fn test_improves() {
        let (x, _, s) = vars2();
        let a = IntervalBox::new(
            s.clone(),
            vec![Interval::new(0.0, 1.0), Interval::new(0.0, 1.0)],
        );
        let mut b = a.clone();
        b.set(&x, Interval::new(0.0, 0.5));
        assert!(b.improves(&a, 0.1));
        assert!(!a.improves(&a, 0.1));
    }

    #[test]
    fn test_gap() {
        let (x, _, s) = vars2();
        let a = IntervalBox::new(
            s.clone(),
            vec![Interval::new(0.0, 1.0), Interval::new(0.0, 1.0)],
        );
        let mut b = a.clone();
        assert_eq!(a.gap_with(&b), 0.0);
        b.set(&x, Interval::new(1.5, 2.0));
        assert_eq!(a.gap_with(&b), 0.5);
    }
}
