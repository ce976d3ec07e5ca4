//! Ordered sets of variables.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::variable::Variable;

#[derive(Debug, Default)]
struct ScopeRep {
    // sorted by variable id, no duplicates
    vars: Vec<Variable>,
}

/// An ordered set of variables, sorted by id, with idempotent insertion.
///
/// Scopes are immutable shared values: set operations return new scopes and
/// cloning is O(1), so identical scopes share their representation instead
/// of going through a process-wide bank.
#[derive(Clone, Default)]
pub struct Scope {
    rep: Rc<ScopeRep>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vars<I: IntoIterator<Item = Variable>>(iter: I) -> Self {
        let mut vars: Vec<Variable> = iter.into_iter().collect();
        vars.sort();
        vars.dedup();
        Self {
            rep: Rc::new(ScopeRep { vars }),
        }
    }

    pub fn singleton(v: Variable) -> Self {
        Self::from_vars([v])
    }

    pub fn size(&self) -> usize {
        self.rep.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rep.vars.is_empty()
    }

    pub fn contains(&self, v: &Variable) -> bool {
        self.index_of(v).is_some()
    }

    pub fn contains_scope(&self, other: &Scope) -> bool {
        other.iter().all(|v| self.contains(v))
    }

    /// Position of a variable in id order.
    pub fn index_of(&self, v: &Variable) -> Option<usize> {
        self.rep.vars.binary_search(v).ok()
    }

    pub fn var(&self, i: usize) -> &Variable {
        &self.rep.vars[i]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.rep.vars.iter()
    }

    /// Set union; sharing is preserved when one side contains the other.
    pub fn union(&self, other: &Scope) -> Scope {
        if self.contains_scope(other) {
            return self.clone();
        }
        if other.contains_scope(self) {
            return other.clone();
        }
        Scope::from_vars(self.iter().chain(other.iter()).cloned())
    }

    pub fn intersection(&self, other: &Scope) -> Scope {
        Scope::from_vars(self.iter().filter(|v| other.contains(v)).cloned())
    }

    /// Insertion, idempotent.
    pub fn inserted(&self, v: Variable) -> Scope {
        if self.contains(&v) {
            self.clone()
        } else {
            Scope::from_vars(self.iter().cloned().chain([v]))
        }
    }

    pub fn removed(&self, v: &Variable) -> Scope {
        Scope::from_vars(self.iter().filter(|w| *w != v).cloned())
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.rep, &other.rep) || self.rep.vars == other.rep.vars
    }
}

impl Eq for Scope {}

impl Hash for Scope {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for v in &self.rep.vars {
            v.id().hash(state);
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (k, v) in self.iter().enumerate() {
            if k > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, "}}")
    }
}

impl FromIterator<Variable> for Scope {
    fn from_iter<I: IntoIterator<Item = Variable>>(iter: I) -> Self {
        Scope::from_vars(iter)
    }
}
