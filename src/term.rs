//! Algebraic expression trees.
//!
//! Terms are immutable shared handles over a sum-type representation. The
//! constructors apply local canonicalizations only: linear combinations
//! collapse into a single [`LinForm`] node and `pow(x, 2)` becomes a square.
//! Anything deeper (common subexpressions, simplification) is the DAG's job.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::rc::Rc;

use crate::interval::Interval;
use crate::boxes::IntervalBox;
use crate::scope::Scope;
use crate::variable::Variable;

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Neg,
    Abs,
    Sgn,
    Sqr,
    Sqrt,
    Exp,
    Log,
    Cos,
    Sin,
    Tan,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
}

/// A canonical linear form: constant + sum of coefficient * variable, with
/// the variables sorted by id and no zero coefficient.
#[derive(Debug, Clone, PartialEq)]
pub struct LinForm {
    pub cst: Interval,
    pub terms: Vec<(Interval, Variable)>,
}

impl LinForm {
    pub fn constant(cst: Interval) -> Self {
        Self {
            cst,
            terms: Vec::new(),
        }
    }

    pub fn variable(v: Variable) -> Self {
        Self {
            cst: Interval::ZERO,
            terms: vec![(Interval::ONE, v)],
        }
    }

    /// Adds `scale * other` into this form, combining coefficients on the
    /// same variable and dropping the ones that vanish.
    pub fn add_scaled(&mut self, scale: Interval, other: &LinForm) {
        self.cst += scale * other.cst;
        for (a, v) in &other.terms {
            let coef = scale * *a;
            match self.terms.binary_search_by(|(_, w)| w.cmp(v)) {
                Ok(i) => {
                    self.terms[i].0 += coef;
                }
                Err(i) => {
                    self.terms.insert(i, (coef, v.clone()));
                }
            }
        }
        self.terms.retain(|(a, _)| !a.is_zero());
    }

    pub fn scale(&mut self, factor: Interval) {
        self.cst = self.cst * factor;
        for (a, _) in &mut self.terms {
            *a = *a * factor;
        }
        self.terms.retain(|(a, _)| !a.is_zero());
    }
}

/// The term representation.
#[derive(Debug, Clone)]
pub enum TermKind {
    Cst(Interval),
    Var(Variable),
    Unary { op: UnOp, sub: Term },
    Binary { op: BinOp, left: Term, right: Term },
    Pow { sub: Term, n: i32 },
    Lin(LinForm),
}

#[derive(Debug)]
struct TermRep {
    kind: TermKind,
    hash: u64,
    scope: Scope,
}

/// A shared immutable term with a cached structural hash and scope.
#[derive(Clone)]
pub struct Term {
    rep: Rc<TermRep>,
}

impl Term {
    fn make(kind: TermKind) -> Self {
        let scope = match &kind {
            TermKind::Cst(_) => Scope::new(),
            TermKind::Var(v) => Scope::singleton(v.clone()),
            TermKind::Unary { sub, .. } => sub.scope().clone(),
            TermKind::Binary { left, right, .. } => left.scope().union(right.scope()),
            TermKind::Pow { sub, .. } => sub.scope().clone(),
            TermKind::Lin(l) => Scope::from_vars(l.terms.iter().map(|(_, v)| v.clone())),
        };
        let hash = hash_kind(&kind);
        Self {
            rep: Rc::new(TermRep { kind, hash, scope }),
        }
    }

    pub fn cst(x: impl Into<Interval>) -> Self {
        Self::make(TermKind::Cst(x.into()))
    }

    pub fn var(v: &Variable) -> Self {
        Self::make(TermKind::Var(v.clone()))
    }

    pub fn kind(&self) -> &TermKind {
        &self.rep.kind
    }

    pub fn scope(&self) -> &Scope {
        &self.rep.scope
    }

    pub fn structural_hash(&self) -> u64 {
        self.rep.hash
    }

    pub fn is_constant(&self) -> bool {
        self.rep.scope.is_empty()
    }

    pub fn is_linear(&self) -> bool {
        self.as_linear().is_some()
    }

    /// The term as a linear form, when it is one.
    pub fn as_linear(&self) -> Option<LinForm> {
        match &self.rep.kind {
            TermKind::Cst(x) => Some(LinForm::constant(*x)),
            TermKind::Var(v) => Some(LinForm::variable(v.clone())),
            TermKind::Lin(l) => Some(l.clone()),
            _ => None,
        }
    }

    fn from_lin(mut l: LinForm) -> Self {
        if l.terms.is_empty() {
            return Self::cst(l.cst);
        }
        if l.terms.len() == 1 && l.cst.is_zero() && l.terms[0].0 == Interval::ONE {
            let v = l.terms.pop().unwrap().1;
            return Self::var(&v);
        }
        Self::make(TermKind::Lin(l))
    }

    fn unary(op: UnOp, sub: Term) -> Self {
        Self::make(TermKind::Unary { op, sub })
    }

    fn binary(op: BinOp, left: Term, right: Term) -> Self {
        Self::make(TermKind::Binary { op, left, right })
    }

    pub fn abs(self) -> Self {
        Self::unary(UnOp::Abs, self)
    }

    pub fn sgn(self) -> Self {
        Self::unary(UnOp::Sgn, self)
    }

    pub fn sqr(self) -> Self {
        Self::unary(UnOp::Sqr, self)
    }

    pub fn sqrt(self) -> Self {
        Self::unary(UnOp::Sqrt, self)
    }

    pub fn exp(self) -> Self {
        Self::unary(UnOp::Exp, self)
    }

    pub fn log(self) -> Self {
        Self::unary(UnOp::Log, self)
    }

    pub fn cos(self) -> Self {
        Self::unary(UnOp::Cos, self)
    }

    pub fn sin(self) -> Self {
        Self::unary(UnOp::Sin, self)
    }

    pub fn tan(self) -> Self {
        Self::unary(UnOp::Tan, self)
    }

    /// Integer power; `pow(x, 2)` canonicalizes to the square node.
    pub fn pow(self, n: i32) -> Self {
        match n {
            0 => Self::cst(Interval::ONE),
            1 => self,
            2 => self.sqr(),
            _ => Self::make(TermKind::Pow { sub: self, n }),
        }
    }

    pub fn min(a: Term, b: Term) -> Self {
        Self::binary(BinOp::Min, a, b)
    }

    pub fn max(a: Term, b: Term) -> Self {
        Self::binary(BinOp::Max, a, b)
    }

    /// Folds a constant-only term to an interval; empty on any variable.
    pub fn eval_const(&self) -> Interval {
        match &self.rep.kind {
            TermKind::Cst(x) => *x,
            TermKind::Var(_) => Interval::EMPTY,
            TermKind::Unary { op, sub } => apply_unary(*op, sub.eval_const()),
            TermKind::Binary { op, left, right } => {
                apply_binary(*op, left.eval_const(), right.eval_const())
            }
            TermKind::Pow { sub, n } => sub.eval_const().powi(*n),
            TermKind::Lin(l) => {
                if l.terms.is_empty() {
                    l.cst
                } else {
                    Interval::EMPTY
                }
            }
        }
    }

    /// Interval evaluation on a box.
    pub fn eval(&self, bx: &IntervalBox) -> Interval {
        match &self.rep.kind {
            TermKind::Cst(x) => *x,
            TermKind::Var(v) => bx.get(v),
            TermKind::Unary { op, sub } => apply_unary(*op, sub.eval(bx)),
            TermKind::Binary { op, left, right } => {
                apply_binary(*op, left.eval(bx), right.eval(bx))
            }
            TermKind::Pow { sub, n } => sub.eval(bx).powi(*n),
            TermKind::Lin(l) => {
                let mut e = l.cst;
                for (a, v) in &l.terms {
                    e += *a * bx.get(v);
                }
                e
            }
        }
    }

    /// Structural equality, used for DAG deduplication; constants compare
    /// by set equality.
    pub fn struct_eq(&self, other: &Term) -> bool {
        if Rc::ptr_eq(&self.rep, &other.rep) {
            return true;
        }
        if self.rep.hash != other.rep.hash {
            return false;
        }
        match (&self.rep.kind, &other.rep.kind) {
            (TermKind::Cst(a), TermKind::Cst(b)) => a.is_set_eq(b),
            (TermKind::Var(a), TermKind::Var(b)) => a == b,
            (
                TermKind::Unary { op: o1, sub: s1 },
                TermKind::Unary { op: o2, sub: s2 },
            ) => o1 == o2 && s1.struct_eq(s2),
            (
                TermKind::Binary {
                    op: o1,
                    left: l1,
                    right: r1,
                },
                TermKind::Binary {
                    op: o2,
                    left: l2,
                    right: r2,
                },
            ) => o1 == o2 && l1.struct_eq(l2) && r1.struct_eq(r2),
            (TermKind::Pow { sub: s1, n: n1 }, TermKind::Pow { sub: s2, n: n2 }) => {
                n1 == n2 && s1.struct_eq(s2)
            }
            (TermKind::Lin(a), TermKind::Lin(b)) => {
                a.cst.is_set_eq(&b.cst)
                    && a.terms.len() == b.terms.len()
                    && a.terms
                        .iter()
                        .zip(b.terms.iter())
                        .all(|((c1, v1), (c2, v2))| c1.is_set_eq(c2) && v1 == v2)
            }
            _ => false,
        }
    }
}

pub(crate) fn apply_unary(op: UnOp, x: Interval) -> Interval {
    match op {
        UnOp::Neg => -x,
        UnOp::Abs => x.abs(),
        UnOp::Sgn => x.sgn(),
        UnOp::Sqr => x.sqr(),
        UnOp::Sqrt => x.sqrt(),
        UnOp::Exp => x.exp(),
        UnOp::Log => x.log(),
        UnOp::Cos => x.cos(),
        UnOp::Sin => x.sin(),
        UnOp::Tan => x.tan(),
    }
}

pub(crate) fn apply_binary(op: BinOp, x: Interval, y: Interval) -> Interval {
    match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => x / y,
        BinOp::Min => x.min(y),
        BinOp::Max => x.max(y),
    }
}

fn hash_kind(kind: &TermKind) -> u64 {
    let mut h = DefaultHasher::new();
    match kind {
        TermKind::Cst(x) => {
            0u8.hash(&mut h);
            x.hash(&mut h);
        }
        TermKind::Var(v) => {
            1u8.hash(&mut h);
            v.id().hash(&mut h);
        }
        TermKind::Unary { op, sub } => {
            2u8.hash(&mut h);
            op.hash(&mut h);
            sub.structural_hash().hash(&mut h);
        }
        TermKind::Binary { op, left, right } => {
            3u8.hash(&mut h);
            op.hash(&mut h);
            left.structural_hash().hash(&mut h);
            right.structural_hash().hash(&mut h);
        }
        TermKind::Pow { sub, n } => {
            4u8.hash(&mut h);
            n.hash(&mut h);
            sub.structural_hash().hash(&mut h);
        }
        TermKind::Lin(l) => {
            5u8.hash(&mut h);
            l.cst.hash(&mut h);
            for (a, v) in &l.terms {
                a.hash(&mut h);
                v.id().hash(&mut h);
            }
        }
    }
    h.finish()
}

impl From<f64> for Term {
    fn from(a: f64) -> Self {
        Term::cst(a)
    }
}

impl From<Interval> for Term {
    fn from(x: Interval) -> Self {
        Term::cst(x)
    }
}

impl From<&Variable> for Term {
    fn from(v: &Variable) -> Self {
        Term::var(v)
    }
}

impl From<Variable> for Term {
    fn from(v: Variable) -> Self {
        Term::var(&v)
    }
}

impl Add for Term {
    type Output = Term;

    fn add(self, rhs: Term) -> Term {
        if self.is_constant() && rhs.is_constant() {
            return Term::cst(self.eval_const() + rhs.eval_const());
        }
        match (self.as_linear(), rhs.as_linear()) {
            (Some(mut l), Some(r)) => {
                l.add_scaled(Interval::ONE, &r);
                Term::from_lin(l)
            }
            _ => Term::binary(BinOp::Add, self, rhs),
        }
    }
}

impl Sub for Term {
    type Output = Term;

    fn sub(self, rhs: Term) -> Term {
        if self.is_constant() && rhs.is_constant() {
            return Term::cst(self.eval_const() - rhs.eval_const());
        }
        match (self.as_linear(), rhs.as_linear()) {
            (Some(mut l), Some(r)) => {
                l.add_scaled(Interval::MINUS_ONE, &r);
                Term::from_lin(l)
            }
            _ => Term::binary(BinOp::Sub, self, rhs),
        }
    }
}

impl Mul for Term {
    type Output = Term;

    fn mul(self, rhs: Term) -> Term {
        if self.is_constant() && rhs.is_constant() {
            return Term::cst(self.eval_const() * rhs.eval_const());
        }
        // constant * linear folds into the linear form
        if self.is_constant() {
            if let Some(mut l) = rhs.as_linear() {
                l.scale(self.eval_const());
                return Term::from_lin(l);
            }
        }
        if rhs.is_constant() {
            if let Some(mut l) = self.as_linear() {
                l.scale(rhs.eval_const());
                return Term::from_lin(l);
            }
        }
        Term::binary(BinOp::Mul, self, rhs)
    }
}

impl Div for Term {
    type Output = Term;

    fn div(self, rhs: Term) -> Term {
        if self.is_constant() && rhs.is_constant() {
            return Term::cst(self.eval_const() / rhs.eval_const());
        }
        Term::binary(BinOp::Div, self, rhs)
    }
}

impl Neg for Term {
    type Output = Term;

    fn neg(self) -> Term {
        if self.is_constant() {
            return Term::cst(-self.eval_const());
        }
        match self.as_linear() {
            Some(mut l) => {
                l.scale(Interval::MINUS_ONE);
                Term::from_lin(l)
            }
            None => Term::unary(UnOp::Neg, self),
        }
    }
}

macro_rules! scalar_ops {
    ($($t:ty),*) => {$(
        impl Add<$t> for Term {
            type Output = Term;
            fn add(self, rhs: $t) -> Term { self + Term::from(rhs) }
        }
        impl Add<Term> for $t {
            type Output = Term;
            fn add(self, rhs: Term) -> Term { Term::from(self) + rhs }
        }
        impl Sub<$t> for Term {
            type Output = Term;
            fn sub(self, rhs: $t) -> Term { self - Term::from(rhs) }
        }
        impl Sub<Term> for $t {
            type Output = Term;
            fn sub(self, rhs: Term) -> Term { Term::from(self) - rhs }
        }
        impl Mul<$t> for Term {
            type Output = Term;
            fn mul(self, rhs: $t) -> Term { self * Term::from(rhs) }
        }
        impl Mul<Term> for $t {
            type Output = Term;
            fn mul(self, rhs: Term) -> Term { Term::from(self) * rhs }
        }
        impl Div<$t> for Term {
            type Output = Term;
            fn div(self, rhs: $t) -> Term { self / Term::from(rhs) }
        }
        impl Div<Term> for $t {
            type Output = Term;
            fn div(self, rhs: Term) -> Term { Term::from(self) / rhs }
        }
    )*};
}

scalar_ops!(f64);

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.rep.kind {
            TermKind::Cst(x) => {
                if x.is_singleton() {
                    write!(f, "{}", x.left())
                } else {
                    write!(f, "{}", x)
                }
            }
            TermKind::Var(v) => write!(f, "{}", v),
            TermKind::Unary { op, sub } => {
                let name = match op {
                    UnOp::Neg => return write!(f, "(-{})", sub),
                    UnOp::Abs => "abs",
                    UnOp::Sgn => "sgn",
                    UnOp::Sqr => "sqr",
                    UnOp::Sqrt => "sqrt",
                    UnOp::Exp => "exp",
                    UnOp::Log => "log",
                    UnOp::Cos => "cos",
                    UnOp::Sin => "sin",
                    UnOp::Tan => "tan",
                };
                write!(f, "{}({})", name, sub)
            }
            TermKind::Binary { op, left, right } => {
                let sym = match op {
                    BinOp::Add => "+",
                    BinOp::Sub => "-",
                    BinOp::Mul => "*",
                    BinOp::Div => "/",
                    BinOp::Min => return write!(f, "min({}, {})", left, right),
                    BinOp::Max => return write!(f, "max({}, {})", left, right),
                };
                write!(f, "({} {} {})", left, sym, right)
            }
            TermKind::Pow { sub, n } => write!(f, "{}^{}", sub, n),
            TermKind::Lin(l) => {
                write!(f, "(")?;
                let mut first = true;
                if !l.cst.is_zero() {
                    write!(f, "{}", Term::cst(l.cst))?;
                    first = false;
                }
                for (a, v) in &l.terms {
                    if !first {
                        write!(f, " + ")?;
                    }
                    first = false;
                    if a.is_set_eq(&Interval::ONE) {
                        write!(f, "{}", v)?;
                    } else {
                        write!(f, "{}*{}", Term::cst(*a), v)?;
                    }
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Debug for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tolerance::Tolerance;
    use crate::variable::VarKind;

    fn vars() -> (Variable, Variable) {
        (
            Variable::new(0, "x", VarKind::Real, Tolerance::default()),
            Variable::new(1, "y", VarKind::Real, Tolerance::default()),
        )
    }

    #[test]
    fn test_linear_collapse() {
        let (x, y) = vars();
        let t = 2.0 * Term::var(&x) + 3.0 * Term::var(&y) + Term::var(&x) + 1.0;
        match t.kind() {
            TermKind::Lin(l) => {
                assert_eq!(l.terms.len(), 2);
                assert!(l.terms[0].0.is_set_eq(&Interval::point(3.0)));
                assert!(l.cst.is_set_eq(&Interval::ONE));
            }
            k => panic!("expected a linear node, got {:?}", k),
        }
    }

    #[test]
    fn test_zero_coefficient_drops() {
        let (x, y) = vars();
        let t = Term::var(&x) + Term::var(&y) - Term::var(&x);
        match t.kind() {
            TermKind::Var(v) => assert_eq!(*v, y),
            k => panic!("expected the bare variable, got {:?}", k),
        }
    }

    #[test]
    fn test_pow_two_is_sqr() {
        let (x, _) = vars();
        let t = Term::var(&x).pow(2);
        assert!(matches!(t.kind(), TermKind::Unary { op: UnOp::Sqr, .. }));
        let t = Term::var(&x).pow(3);
        assert!(matches!(t.kind(), TermKind::Pow { n: 3, .. }));
    }

    #[test]
    fn test_eval_const() {
        let (x, _) = vars();
        let c = (Term::cst(2.0) + Term::cst(3.0)).sqrt();
        assert!(c.eval_const().contains(5.0_f64.sqrt()));
        let t = Term::var(&x) + 1.0;
        assert!(t.eval_const().is_empty());
    }

    #[test]
    fn test_struct_eq_and_hash() {
        let (x, y) = vars();
        let a = Term::var(&x) * Term::var(&y);
        let b = Term::var(&x) * Term::var(&y);
        assert!(a.struct_eq(&b));
        assert_eq!(a.structural_hash(), b.structural_hash());
        let c = Term::var(&y) * Term::var(&x);
        assert!(!a.struct_eq(&c));
    }

    #[test]
    fn test_scope() {
        let (x, y) = vars();
        let t = (Term::var(&x) + Term::var(&y)).sqr();
        assert_eq!(t.scope().size(), 2);
        assert!(t.scope().contains(&x));
    }
}
