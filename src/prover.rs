//! Proof certification of terminal boxes.
//!
//! A box that the search cannot split any further is either proven inner
//! (every constraint certainly satisfied), refuted, or handed to the
//! inflated multivariate Newton operator on the equation subsystem, which
//! can promote MAYBE to FEASIBLE when the system is square.

use std::rc::Rc;

use crate::Proof;
use crate::boxes::IntervalBox;
use crate::constraint::Constraint;
use crate::contractor::Inflator;
use crate::contractor::gauss_seidel::IntervalGaussSeidel;
use crate::contractor::newton::IntervalNewton;
use crate::dag::Dag;
use crate::params::Params;

struct Item {
    ctr: Constraint,
    is_eq: bool,
}

pub struct Prover {
    items: Vec<Item>,
    newton: Option<IntervalNewton>,
}

impl Prover {
    /// Builds a prover for a set of constraints. The Newton certification
    /// stage is armed only when the equations form a square system.
    pub fn new(ctrs: &[Constraint], params: &Params) -> Self {
        let items: Vec<Item> = ctrs
            .iter()
            .map(|c| Item {
                ctr: c.clone(),
                is_eq: c.is_equation(),
            })
            .collect();

        let mut dag = Dag::new();
        let mut funs = Vec::new();
        for item in items.iter().filter(|i| i.is_eq) {
            if let Some((root, image)) = item.ctr.as_fun() {
                funs.push(dag.insert(&root, image));
            }
        }

        let newton = if funs.is_empty() {
            None
        } else {
            let gs = IntervalGaussSeidel::new(
                params.gauss_seidel_iter_limit,
                params.gauss_seidel_xtol,
                params.gauss_seidel_dtol,
                params.gaussian_min_pivot,
            );
            IntervalNewton::new(
                Rc::new(dag),
                funs,
                gs,
                params.newton_iter_limit,
                params.newton_rel_tol,
                params.newton_certify_iter_limit,
                params.newton_certify_rel_tol,
                Inflator::new(params.inflation_delta, params.inflation_chi),
            )
            .ok()
        };

        Self { items, newton }
    }

    pub fn has_newton(&self) -> bool {
        self.newton.is_some()
    }

    /// Certifies a box against every constraint.
    pub fn certify(&mut self, bx: &IntervalBox) -> Proof {
        let mut inner = true;
        // inner certificate for everything but the equations
        let mut inner_but_equations = true;

        for item in &self.items {
            let proof = item.ctr.is_satisfied(bx);
            if proof == Proof::Empty {
                return Proof::Empty;
            }
            if proof != Proof::Inner {
                inner = false;
                if !item.is_eq {
                    inner_but_equations = false;
                }
            }
        }

        if inner {
            return Proof::Inner;
        }
        if !inner_but_equations {
            return Proof::Maybe;
        }

        // only the equations remain undecided: try the Newton certificate
        match &mut self.newton {
            Some(newton) => newton.certify(bx),
            None => Proof::Maybe,
        }
    }

}
