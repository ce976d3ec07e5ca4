//! Problem definition: variables with typed domains and constraints.

use crate::constraint::Constraint;
use crate::domain::{BinaryDomain, Domain, DomainBox, Range, RangeUnion};
use crate::interval::Interval;
use crate::interval::union::IntervalUnion;
use crate::scope::Scope;
use crate::tolerance::Tolerance;
use crate::variable::{VarKind, Variable};

/// A numerical constraint satisfaction problem.
///
/// The problem owns its variables: every factory hands out a stable handle
/// whose id indexes the initial domain. There is no objective function by
/// construction.
#[derive(Default)]
pub struct Problem {
    vars: Vec<Variable>,
    doms: Vec<Domain>,
    ctrs: Vec<Constraint>,
}

impl Problem {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_var(&mut self, name: String, kind: VarKind, tol: Tolerance, dom: Domain) -> Variable {
        let id = self.vars.len() as u32;
        let name = if name.is_empty() {
            format!("_v{}", id)
        } else {
            name
        };
        let v = Variable::new(id, name, kind, tol);
        self.vars.push(v.clone());
        self.doms.push(dom);
        v
    }

    pub fn add_real_var(&mut self, lo: f64, hi: f64, name: &str) -> Variable {
        self.push_var(
            name.to_string(),
            VarKind::Real,
            Tolerance::default(),
            Domain::Interval(Interval::new(lo, hi)),
        )
    }

    pub fn add_real_var_tol(&mut self, lo: f64, hi: f64, name: &str, tol: Tolerance) -> Variable {
        self.push_var(
            name.to_string(),
            VarKind::Real,
            tol,
            Domain::Interval(Interval::new(lo, hi)),
        )
    }

    pub fn add_real_var_interval(&mut self, x: Interval, name: &str) -> Variable {
        self.push_var(
            name.to_string(),
            VarKind::Real,
            Tolerance::default(),
            Domain::Interval(x),
        )
    }

    /// A real variable over a union of disjoint intervals.
    pub fn add_real_var_union(&mut self, u: IntervalUnion, name: &str) -> Variable {
        self.push_var(
            name.to_string(),
            VarKind::Real,
            Tolerance::default(),
            Domain::IntervalUnion(u),
        )
    }

    pub fn add_int_var(&mut self, lo: i64, hi: i64, name: &str) -> Variable {
        self.push_var(
            name.to_string(),
            VarKind::Integer,
            Tolerance::default(),
            Domain::Range(Range::new(lo, hi)),
        )
    }

    pub fn add_int_var_union(&mut self, u: RangeUnion, name: &str) -> Variable {
        self.push_var(
            name.to_string(),
            VarKind::Integer,
            Tolerance::default(),
            Domain::RangeUnion(u),
        )
    }

    pub fn add_binary_var(&mut self, name: &str) -> Variable {
        self.push_var(
            name.to_string(),
            VarKind::Binary,
            Tolerance::default(),
            Domain::Binary(BinaryDomain::ZeroOne),
        )
    }

    pub fn add_ctr(&mut self, c: Constraint) {
        self.ctrs.push(c);
    }

    pub fn add_ctrs<I: IntoIterator<Item = Constraint>>(&mut self, iter: I) {
        self.ctrs.extend(iter);
    }

    pub fn nb_vars(&self) -> usize {
        self.vars.len()
    }

    pub fn nb_ctrs(&self) -> usize {
        self.ctrs.len()
    }

    pub fn var(&self, i: usize) -> &Variable {
        &self.vars[i]
    }

    pub fn ctr(&self, i: usize) -> &Constraint {
        &self.ctrs[i]
    }

    pub fn ctrs(&self) -> &[Constraint] {
        &self.ctrs
    }

    pub fn scope(&self) -> Scope {
        Scope::from_vars(self.vars.iter().cloned())
    }

    /// The initial domain box over the whole scope.
    pub fn initial_box(&self) -> DomainBox {
        DomainBox::new(self.scope(), self.doms.clone())
    }

    /// True for a pure satisfaction problem; always true here since the
    /// problem carries no objective.
    pub fn is_csp(&self) -> bool {
        true
    }
}
