//! Preprocessing of a problem before the search.
//!
//! The initial contractor is propagated to a fixpoint on the input box,
//! variables whose domain collapses to a singleton are marked fixed,
//! inactive constraints (certainly satisfied on the contracted box) are
//! dropped, and infeasibility is detected outright. Fixed variables keep
//! their singleton domain in the reduced box, so reported solutions always
//! cover the original scope.

use std::time::{Duration, Instant};

use crate::Proof;
use crate::boxes::IntervalBox;
use crate::constraint::Constraint;
use crate::contractor::fixpoint::ContractorLoop;
use crate::contractor::{ConstraintContractor, Contractor, Propagator, SharedContractor};
use crate::domain::DomainBox;
use crate::params::Params;
use crate::problem::Problem;
use crate::scope::Scope;
use crate::variable::Variable;

pub struct Preprocessor {
    box_out: DomainBox,
    active: Vec<Constraint>,
    fixed: Vec<Variable>,
    nb_inactive: usize,
    unfeasible: bool,
    elapsed: Duration,
}

impl Preprocessor {
    /// Runs the preprocessing phase on a problem.
    pub fn apply(problem: &Problem, params: &Params) -> Self {
        let start = Instant::now();
        let mut db = problem.initial_box();

        if db.is_empty() || problem.nb_vars() == 0 {
            return Self {
                box_out: db,
                active: problem.ctrs().to_vec(),
                fixed: Vec::new(),
                nb_inactive: 0,
                unfeasible: true,
                elapsed: start.elapsed(),
            };
        }

        // fixpoint propagation of the whole constraint set
        let ops: Vec<SharedContractor> = problem
            .ctrs()
            .iter()
            .map(|c| Box::new(ConstraintContractor::new(c.clone())) as SharedContractor)
            .collect();
        let mut contractor = ContractorLoop::new(
            Box::new(Propagator::new(
                ops,
                params.loop_contractor_tol,
                params.propagation_iter_limit,
            )),
            params.loop_contractor_tol,
        );
        let mut ib = IntervalBox::from_domain_box(&db);
        let proof = contractor.contract(&mut ib);
        if proof == Proof::Empty {
            return Self {
                box_out: db,
                active: Vec::new(),
                fixed: Vec::new(),
                nb_inactive: 0,
                unfeasible: true,
                elapsed: start.elapsed(),
            };
        }
        ib.write_to_domain_box(&mut db);
        if db.is_empty() {
            return Self {
                box_out: db,
                active: Vec::new(),
                fixed: Vec::new(),
                nb_inactive: 0,
                unfeasible: true,
                elapsed: start.elapsed(),
            };
        }

        // fixed variables and inactive constraints
        let contracted = IntervalBox::from_domain_box(&db);
        let fixed: Vec<Variable> = db
            .scope()
            .iter()
            .filter(|v| db.get(v).is_singleton())
            .cloned()
            .collect();
        let mut active = Vec::new();
        let mut nb_inactive = 0usize;
        for c in problem.ctrs() {
            if c.is_satisfied(&contracted) == Proof::Inner {
                nb_inactive += 1;
            } else {
                active.push(c.clone());
            }
        }

        tracing::debug!(
            fixed = fixed.len(),
            inactive = nb_inactive,
            "preprocessing done"
        );

        Self {
            box_out: db,
            active,
            fixed,
            nb_inactive,
            unfeasible: false,
            elapsed: start.elapsed(),
        }
    }

    /// True when preprocessing alone settled the problem.
    pub fn is_solved(&self) -> bool {
        self.unfeasible || self.active.is_empty()
    }

    pub fn is_unfeasible(&self) -> bool {
        self.unfeasible
    }

    pub fn nb_fixed_vars(&self) -> usize {
        self.fixed.len()
    }

    pub fn nb_inactive_ctrs(&self) -> usize {
        self.nb_inactive
    }

    pub fn fixed_scope(&self) -> Scope {
        Scope::from_vars(self.fixed.iter().cloned())
    }

    pub fn unfixed_scope(&self) -> Scope {
        let fixed = self.fixed_scope();
        Scope::from_vars(
            self.box_out
                .scope()
                .iter()
                .filter(|v| !fixed.contains(v))
                .cloned(),
        )
    }

    /// The contracted box over the full scope; fixed variables hold their
    /// singleton value.
    pub fn reduced_box(&self) -> &DomainBox {
        &self.box_out
    }

    /// The constraints that remain active after preprocessing.
    pub fn active_ctrs(&self) -> &[Constraint] {
        &self.active
    }

    pub fn elapsed_time(&self) -> Duration {
        self.elapsed
    }
}
