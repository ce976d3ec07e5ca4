//! Typed constraints over terms.
//!
//! Every constraint answers three questions on a box: is it satisfied
//! (EMPTY / INNER / MAYBE), how far is the box from the admissible set, and
//! how does the box contract. Arithmetic and range constraints contract
//! through an HC4 revise on a private single-function DAG; tables filter
//! rows then project columns; conditionals dispatch on the guard.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::Proof;
use crate::boxes::IntervalBox;
use crate::dag::{Dag, DagContext};
use crate::interval::Interval;
use crate::scope::Scope;
use crate::term::Term;
use crate::variable::Variable;

/// Relation symbol of an arithmetic constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelSymbol {
    Eq,
    Le,
    Lt,
    Ge,
    Gt,
}

impl fmt::Display for RelSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelSymbol::Eq => "==",
            RelSymbol::Le => "<=",
            RelSymbol::Lt => "<",
            RelSymbol::Ge => ">=",
            RelSymbol::Gt => ">",
        };
        write!(f, "{}", s)
    }
}

/// One row of a table constraint, as intervals.
pub type TableRow = Vec<Interval>;

#[derive(Debug)]
enum ConstraintRep {
    Arith {
        left: Term,
        right: Term,
        rel: RelSymbol,
    },
    In {
        term: Term,
        image: Interval,
    },
    Table {
        vars: Vec<Variable>,
        rows: Vec<TableRow>,
    },
    Cond {
        guard: Constraint,
        body: Constraint,
    },
}

struct ConstraintInner {
    rep: ConstraintRep,
    scope: Scope,
    // lazily built single-function DAG used by contract()
    dag: RefCell<Option<(Dag, DagContext)>>,
}

impl fmt::Debug for ConstraintInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.rep.fmt(f)
    }
}

/// A shared constraint handle.
#[derive(Debug, Clone)]
pub struct Constraint {
    inner: Rc<ConstraintInner>,
}

impl Constraint {
    fn make(rep: ConstraintRep) -> Self {
        let scope = match &rep {
            ConstraintRep::Arith { left, right, .. } => left.scope().union(right.scope()),
            ConstraintRep::In { term, .. } => term.scope().clone(),
            ConstraintRep::Table { vars, .. } => Scope::from_vars(vars.iter().cloned()),
            ConstraintRep::Cond { guard, body } => guard.scope().union(body.scope()),
        };
        Self {
            inner: Rc::new(ConstraintInner {
                rep,
                scope,
                dag: RefCell::new(None),
            }),
        }
    }

    pub fn eq(left: impl Into<Term>, right: impl Into<Term>) -> Self {
        Self::make(ConstraintRep::Arith {
            left: left.into(),
            right: right.into(),
            rel: RelSymbol::Eq,
        })
    }

    pub fn le(left: impl Into<Term>, right: impl Into<Term>) -> Self {
        Self::make(ConstraintRep::Arith {
            left: left.into(),
            right: right.into(),
            rel: RelSymbol::Le,
        })
    }

    pub fn lt(left: impl Into<Term>, right: impl Into<Term>) -> Self {
        Self::make(ConstraintRep::Arith {
            left: left.into(),
            right: right.into(),
            rel: RelSymbol::Lt,
        })
    }

    pub fn ge(left: impl Into<Term>, right: impl Into<Term>) -> Self {
        Self::make(ConstraintRep::Arith {
            left: left.into(),
            right: right.into(),
            rel: RelSymbol::Ge,
        })
    }

    pub fn gt(left: impl Into<Term>, right: impl Into<Term>) -> Self {
        Self::make(ConstraintRep::Arith {
            left: left.into(),
            right: right.into(),
            rel: RelSymbol::Gt,
        })
    }

    /// Range membership `term in image`.
    pub fn in_range(term: impl Into<Term>, image: Interval) -> Self {
        Self::make(ConstraintRep::In {
            term: term.into(),
            image,
        })
    }

    /// Table constraint: the tuple of variables must lie in some row.
    pub fn table(vars: Vec<Variable>, rows: Vec<TableRow>) -> crate::Result<Self> {
        if vars.is_empty() {
            return Err(crate::Error::MalformedTable {
                reason: "no column".into(),
            });
        }
        if rows.iter().any(|r| r.len() != vars.len()) {
            return Err(crate::Error::MalformedTable {
                reason: "row arity differs from the number of columns".into(),
            });
        }
        Ok(Self::make(ConstraintRep::Table { vars, rows }))
    }

    /// Conditional constraint `guard implies body`.
    pub fn cond(guard: Constraint, body: Constraint) -> Self {
        Self::make(ConstraintRep::Cond { guard, body })
    }

    pub fn scope(&self) -> &Scope {
        &self.inner.scope
    }

    pub fn is_equation(&self) -> bool {
        matches!(
            &self.inner.rep,
            ConstraintRep::Arith {
                rel: RelSymbol::Eq,
                ..
            }
        ) || matches!(&self.inner.rep, ConstraintRep::In { image, .. } if image.is_singleton())
    }

    /// The constraint as a DAG function: root term and image interval.
    /// Strict inequalities take the closure of their admissible set, which
    /// is the sound direction for contraction. Tables and conditionals have
    /// no single-root form.
    pub fn as_fun(&self) -> Option<(Term, Interval)> {
        match &self.inner.rep {
            ConstraintRep::Arith { left, right, rel } => {
                let root = left.clone() - right.clone();
                let image = match rel {
                    RelSymbol::Eq => Interval::ZERO,
                    RelSymbol::Le | RelSymbol::Lt => Interval::NEGATIVE,
                    RelSymbol::Ge | RelSymbol::Gt => Interval::POSITIVE,
                };
                Some((root, image))
            }
            ConstraintRep::In { term, image } => Some((term.clone(), *image)),
            _ => None,
        }
    }

    /// Satisfaction test: EMPTY iff certainly violated, INNER iff every
    /// point of the box satisfies the constraint.
    pub fn is_satisfied(&self, bx: &IntervalBox) -> Proof {
        match &self.inner.rep {
            ConstraintRep::Arith { left, right, rel } => {
                let d = left.eval(bx) - right.eval(bx);
                if d.is_empty() {
                    return Proof::Empty;
                }
                match rel {
                    RelSymbol::Eq => {
                        if !d.contains_zero() {
                            Proof::Empty
                        } else if d.is_zero() {
                            Proof::Inner
                        } else {
                            Proof::Maybe
                        }
                    }
                    RelSymbol::Le => {
                        if d.is_negative() {
                            Proof::Inner
                        } else if d.left() > 0.0 {
                            Proof::Empty
                        } else {
                            Proof::Maybe
                        }
                    }
                    RelSymbol::Lt => {
                        if d.is_strictly_negative() {
                            Proof::Inner
                        } else if d.left() >= 0.0 {
                            Proof::Empty
                        } else {
                            Proof::Maybe
                        }
                    }
                    RelSymbol::Ge => {
                        if d.is_positive() {
                            Proof::Inner
                        } else if d.right() < 0.0 {
                            Proof::Empty
                        } else {
                            Proof::Maybe
                        }
                    }
                    RelSymbol::Gt => {
                        if d.is_strictly_positive() {
                            Proof::Inner
                        } else if d.right() <= 0.0 {
                            Proof::Empty
                        } else {
                            Proof::Maybe
                        }
                    }
                }
            }
            ConstraintRep::In { term, image } => {
                let e = term.eval(bx);
                if e.is_empty() || e.is_disjoint(image) {
                    Proof::Empty
                } else if image.contains_interval(&e) {
                    Proof::Inner
                } else {
                    Proof::Maybe
                }
            }
            ConstraintRep::Table { vars, rows } => {
                let mut some_overlap = false;
                for row in rows {
                    let mut overlap = true;
                    let mut contains = true;
                    for (v, cell) in vars.iter().zip(row.iter()) {
                        let d = bx.get(v);
                        if !d.overlaps(cell) {
                            overlap = false;
                            contains = false;
                            break;
                        }
                        if !cell.contains_interval(&d) {
                            contains = false;
                        }
                    }
                    if contains {
                        return Proof::Inner;
                    }
                    some_overlap |= overlap;
                }
                if some_overlap {
                    Proof::Maybe
                } else {
                    Proof::Empty
                }
            }
            ConstraintRep::Cond { guard, body } => match guard.is_satisfied(bx) {
                Proof::Empty => Proof::Inner,
                Proof::Inner => body.is_satisfied(bx),
                _ => {
                    if body.is_satisfied(bx) == Proof::Inner {
                        Proof::Inner
                    } else {
                        Proof::Maybe
                    }
                }
            },
        }
    }

    /// One-sided distance from the evaluated image to the admissible set;
    /// zero unless the constraint is certainly violated.
    pub fn violation(&self, bx: &IntervalBox) -> f64 {
        match &self.inner.rep {
            ConstraintRep::Arith { left, right, rel } => {
                let d = left.eval(bx) - right.eval(bx);
                if d.is_empty() {
                    return f64::INFINITY;
                }
                match rel {
                    RelSymbol::Eq => {
                        if d.contains_zero() {
                            0.0
                        } else if d.left() > 0.0 {
                            d.left()
                        } else {
                            -d.right()
                        }
                    }
                    RelSymbol::Le | RelSymbol::Lt => d.left().max(0.0),
                    RelSymbol::Ge | RelSymbol::Gt => (-d.right()).max(0.0),
                }
            }
            ConstraintRep::In { term, image } => {
                let e = term.eval(bx);
                if e.is_empty() {
                    return f64::INFINITY;
                }
                if e.overlaps(image) {
                    0.0
                } else if e.is_certainly_lt(image) {
                    image.left() - e.right()
                } else {
                    e.left() - image.right()
                }
            }
            ConstraintRep::Table { vars, rows } => {
                let mut best = f64::INFINITY;
                for row in rows {
                    let mut worst: f64 = 0.0;
                    for (v, cell) in vars.iter().zip(row.iter()) {
                        let d = bx.get(v);
                        let gap = if d.overlaps(cell) {
                            0.0
                        } else if d.is_certainly_lt(cell) {
                            cell.left() - d.right()
                        } else {
                            d.left() - cell.right()
                        };
                        worst = worst.max(gap);
                    }
                    best = best.min(worst);
                }
                if rows.is_empty() { f64::INFINITY } else { best }
            }
            ConstraintRep::Cond { guard, body } => {
                if guard.is_satisfied(bx) == Proof::Inner {
                    body.violation(bx)
                } else {
                    0.0
                }
            }
        }
    }

    /// Contracts the box with respect to this constraint.
    pub fn contract(&self, bx: &mut IntervalBox) -> Proof {
        match &self.inner.rep {
            ConstraintRep::Arith { .. } | ConstraintRep::In { .. } => self.hc4_revise(bx),
            ConstraintRep::Table { vars, rows } => contract_table(vars, rows, bx),
            ConstraintRep::Cond { guard, body } => contract_cond(guard, body, bx),
        }
    }

    /// HC4 revise through the private single-function DAG.
    fn hc4_revise(&self, bx: &mut IntervalBox) -> Proof {
        let mut slot = self.inner.dag.borrow_mut();
        if slot.is_none() {
            let (root, image) = self.as_fun().expect("arithmetic constraint");
            let mut dag = Dag::new();
            dag.insert(&root, image);
            let ctx = dag.new_context();
            *slot = Some((dag, ctx));
        }
        let (dag, ctx) = slot.as_mut().unwrap();
        dag.hc4_revise(0, bx, ctx)
    }

    /// Projection of the negated constraint, available for single-root
    /// forms; leaves the box unchanged otherwise.
    pub fn contract_neg(&self, bx: &mut IntervalBox) -> Proof {
        if self.as_fun().is_none() {
            return Proof::Maybe;
        }
        let mut slot = self.inner.dag.borrow_mut();
        if slot.is_none() {
            let (root, image) = self.as_fun().expect("arithmetic constraint");
            let mut dag = Dag::new();
            dag.insert(&root, image);
            let ctx = dag.new_context();
            *slot = Some((dag, ctx));
        }
        let (dag, ctx) = slot.as_mut().unwrap();
        dag.hc4_revise_neg(0, bx, ctx)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.rep {
            ConstraintRep::Arith { left, right, rel } => {
                write!(f, "{} {} {}", left, rel, right)
            }
            ConstraintRep::In { term, image } => write!(f, "{} in {}", term, image),
            ConstraintRep::Table { vars, rows } => {
                write!(f, "table(")?;
                for (k, v) in vars.iter().enumerate() {
                    if k > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "; {} rows)", rows.len())
            }
            ConstraintRep::Cond { guard, body } => write!(f, "({}) -> ({})", guard, body),
        }
    }
}

// Row-by-row table consistency: drop rows disjoint from the box, then
// project the hull of the surviving rows onto each variable.
fn contract_table(vars: &[Variable], rows: &[TableRow], bx: &mut IntervalBox) -> Proof {
    let alive: Vec<&TableRow> = rows
        .iter()
        .filter(|row| {
            vars.iter()
                .zip(row.iter())
                .all(|(v, cell)| bx.get(v).overlaps(cell))
        })
        .collect();
    if alive.is_empty() {
        return Proof::Empty;
    }
    for (j, v) in vars.iter().enumerate() {
        let mut hull = Interval::EMPTY;
        for row in &alive {
            hull |= row[j];
        }
        let d = bx.get(v) & hull;
        if d.is_empty() {
            return Proof::Empty;
        }
        bx.set(v, d);
    }
    // a single surviving row that contains the box proves it inner
    if alive.len() == 1
        && vars
            .iter()
            .zip(alive[0].iter())
            .all(|(v, cell)| cell.contains_interval(&bx.get(v)))
    {
        Proof::Inner
    } else {
        Proof::Maybe
    }
}

// Guarded contraction: when the guard is decided, contract accordingly;
// otherwise combine the guard-true and guard-false contractions by hull.
fn contract_cond(guard: &Constraint, body: &Constraint, bx: &mut IntervalBox) -> Proof {
    match guard.is_satisfied(bx) {
        Proof::Empty => Proof::Maybe,
        Proof::Inner => body.contract(bx),
        _ => {
            let mut when_true = bx.clone();
            let mut p_true = guard.contract(&mut when_true);
            if p_true != Proof::Empty {
                p_true = body.contract(&mut when_true);
            }
            let mut when_false = bx.clone();
            let p_false = guard.contract_neg(&mut when_false);

            match (p_true, p_false) {
                (Proof::Empty, Proof::Empty) => Proof::Empty,
                (Proof::Empty, _) => {
                    *bx = when_false;
                    Proof::Maybe
                }
                (_, Proof::Empty) => {
                    *bx = when_true;
                    p_true.min(Proof::Maybe)
                }
                _ => {
                    when_true.hull_with(&when_false);
                    *bx = when_true;
                    Proof::Maybe
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tolerance::Tolerance;
    use crate::variable::VarKind;

    fn setup() -> (Variable, Variable, Scope) {
        let x = Variable::new(0, "x", VarKind::Real, Tolerance::default());
        let y = Variable::new(1, "y", VarKind::Real, Tolerance::default());
        let s = Scope::from_vars([x.clone(), y.clone()]);
        (x, y, s)
    }

    fn bx(s: &Scope, doms: &[(f64, f64)]) -> IntervalBox {
        IntervalBox::new(
            s.clone(),
            doms.iter().map(|&(a, b)| Interval::new(a, b)).collect(),
        )
    }

    #[test]
    fn test_satisfaction() {
        let (x, y, s) = setup();
        let c = Constraint::le(Term::var(&x) + Term::var(&y), 1.0);
        assert_eq!(c.is_satisfied(&bx(&s, &[(0.0, 0.4), (0.0, 0.4)])), Proof::Inner);
        assert_eq!(c.is_satisfied(&bx(&s, &[(2.0, 3.0), (0.0, 1.0)])), Proof::Empty);
        assert_eq!(c.is_satisfied(&bx(&s, &[(0.0, 2.0), (0.0, 2.0)])), Proof::Maybe);
    }

    #[test]
    fn test_violation() {
        let (x, _, s) = setup();
        let c = Constraint::le(Term::var(&x), 1.0);
        assert_eq!(c.violation(&bx(&s, &[(0.0, 0.5), (0.0, 1.0)])), 0.0);
        assert_eq!(c.violation(&bx(&s, &[(3.0, 4.0), (0.0, 1.0)])), 2.0);
        let e = Constraint::eq(Term::var(&x), 5.0);
        assert_eq!(e.violation(&bx(&s, &[(0.0, 1.0), (0.0, 1.0)])), 4.0);
    }

    #[test]
    fn test_contract_arith() {
        let (x, y, s) = setup();
        let c = Constraint::eq(Term::var(&x).sqr() + Term::var(&y).sqr(), 1.0);
        let mut b = bx(&s, &[(-2.0, 2.0), (-2.0, 2.0)]);
        assert_eq!(c.contract(&mut b), Proof::Maybe);
        assert_eq!(b.get(&x), Interval::new(-1.0, 1.0));
    }

    #[test]
    fn test_table() {
        let (x, y, s) = setup();
        let rows = vec![
            vec![Interval::point(1.0), Interval::point(2.0)],
            vec![Interval::point(2.0), Interval::point(1.0)],
            vec![Interval::point(3.0), Interval::point(3.0)],
        ];
        let c = Constraint::table(vec![x.clone(), y.clone()], rows).unwrap();
        let mut b = bx(&s, &[(0.0, 2.5), (0.0, 3.0)]);
        assert_eq!(c.contract(&mut b), Proof::Maybe);
        // row 3 is dropped: x <= 2.5
        assert_eq!(b.get(&x), Interval::new(1.0, 2.0));
        assert_eq!(b.get(&y), Interval::new(1.0, 2.0));

        let mut b2 = bx(&s, &[(0.9, 1.1), (1.9, 2.1)]);
        assert_eq!(c.contract(&mut b2), Proof::Inner);

        let mut b3 = bx(&s, &[(4.0, 5.0), (0.0, 3.0)]);
        assert_eq!(c.contract(&mut b3), Proof::Empty);
    }

    #[test]
    fn test_conditional() {
        let (x, y, s) = setup();
        // x >= 0 implies y = x
        let c = Constraint::cond(
            Constraint::ge(Term::var(&x), 0.0),
            Constraint::eq(Term::var(&y), Term::var(&x)),
        );
        // guard certainly true: body contracts
        let mut b = bx(&s, &[(0.5, 1.0), (-2.0, 2.0)]);
        assert_ne!(c.contract(&mut b), Proof::Empty);
        assert_eq!(b.get(&y), Interval::new(0.5, 1.0));
        // guard certainly false: no contraction
        let mut b2 = bx(&s, &[(-2.0, -1.0), (-2.0, 2.0)]);
        assert_eq!(c.contract(&mut b2), Proof::Maybe);
        assert_eq!(b2.get(&y), Interval::new(-2.0, 2.0));
        // undecided guard: the hull of both branches keeps everything
        let mut b3 = bx(&s, &[(-1.0, 1.0), (-2.0, 2.0)]);
        assert_ne!(c.contract(&mut b3), Proof::Empty);
        assert_eq!(b3.get(&x), Interval::new(-1.0, 1.0));
    }

    #[test]
    fn test_is_equation() {
        let (x, y, _) = setup();
        assert!(Constraint::eq(Term::var(&x), Term::var(&y)).is_equation());
        assert!(!Constraint::le(Term::var(&x), Term::var(&y)).is_equation());
        assert!(Constraint::in_range(Term::var(&x), Interval::ZERO).is_equation());
    }
}
