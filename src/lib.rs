//! Rigorous solver for numerical constraint satisfaction problems.
//!
//! A problem is a conjunction of nonlinear constraints over real, integer and
//! binary variables with interval domains. The solver encloses the solution
//! set by a paving of boxes, each carrying a proof certificate: interval
//! arithmetic with outward rounding guarantees that no solution is lost.
//!
//! The pipeline is made of three layers:
//! - an expression DAG with shared subterms supporting interval and real
//!   evaluation, backward projection and automatic differentiation,
//! - a contractor algebra (HC4, BC3, interval Newton, Gauss-Seidel, polytope
//!   hull, 3B shaving, fixpoint loops, composition),
//! - a branch-and-prune search engine with proof certification by the
//!   inflated Newton operator and solution clustering.

use derive_more::{Display, Error};

pub mod boxes;
pub mod constraint;
pub mod contractor;
pub mod dag;
pub mod domain;
pub mod interval;
pub mod linalg;
pub mod lp;
pub mod params;
pub mod preproc;
pub mod problem;
pub mod prover;
pub mod report;
pub mod scope;
pub mod search;
pub mod solver;
pub mod term;
pub mod tolerance;
pub mod variable;

#[cfg(test)]
pub mod tests;

/// Proof certificate attached to a box by contractors, provers and the
/// search engine.
///
/// The ordering reflects the strength of the certificate: `Empty` refutes
/// the box, `Inner` proves every point feasible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Proof {
    /// The box certainly contains no solution.
    Empty,
    #[default]
    /// Nothing is known about the box.
    Maybe,
    /// The box is proven to contain at least one solution.
    Feasible,
    /// Every point of the box is a solution.
    Inner,
}

impl std::fmt::Display for Proof {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Proof::Empty => "empty",
            Proof::Maybe => "maybe",
            Proof::Feasible => "feasible",
            Proof::Inner => "inner",
        };
        write!(f, "{}", s)
    }
}

/// Configuration and model faults. Infeasibility is never an error: it is
/// carried as [`Proof::Empty`].
#[derive(Debug, Display, Error, PartialEq)]
pub enum Error {
    #[display("unknown parameter '{name}'")]
    UnknownParameter {
        #[error(not(source))]
        name: String,
    },

    #[display("bad value '{value}' for parameter '{name}'")]
    BadParameterValue { name: String, value: String },

    #[display("bad tolerance literal '{literal}'")]
    BadTolerance {
        #[error(not(source))]
        literal: String,
    },

    #[display("certification requires a square system of equations")]
    NonSquareSystem,

    #[display("singular matrix in a preconditioning step")]
    SingularMatrix,

    #[display("variable '{name}' is not in the scope")]
    VariableNotInScope {
        #[error(not(source))]
        name: String,
    },

    #[display("the problem has no variable")]
    EmptyProblem,

    #[display("malformed table constraint: {reason}")]
    MalformedTable {
        #[error(not(source))]
        reason: String,
    },

    #[display("linear solver failure: {reason}")]
    LinearSolver {
        #[error(not(source))]
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
