//! Solver parameters.
//!
//! A typed bag of tuning values and strategy selections with the textual
//! `KEY = value` surface used by parameter files. Defaults follow the
//! shipped configuration; every value can be overridden programmatically or
//! through [`Params::set`].

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::tolerance::Tolerance;
use crate::{Error, Result};

macro_rules! yes_no_enum {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            Yes,
            No,
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, String> {
                match s {
                    "YES" => Ok(Self::Yes),
                    "NO" => Ok(Self::No),
                    _ => Err(format!("expected YES or NO, got '{}'", s)),
                }
            }
        }
    };
}

yes_no_enum!(Preprocessing);
yes_no_enum!(WithNewton);
yes_no_enum!(With3B);

/// Variable selection strategy for branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitSelector {
    /// Round-robin over the scope.
    RoundRobin,
    /// Largest discretized domain first.
    LargestFirst,
    /// Smallest discretized domain first.
    SmallestFirst,
    /// Largest domain width over tolerance.
    MaxDom,
    /// Smear sum relative, from the interval Jacobian.
    SmearSumRel,
    /// Affine sum relative, from affine forms.
    AffineSumRel,
    /// Integer variables first (smallest), then reals (largest).
    SmallestLargestFirst,
    /// SSR with a frequency, LF otherwise.
    HybridSsrLf,
}

impl FromStr for SplitSelector {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "RR" => Ok(Self::RoundRobin),
            "LF" => Ok(Self::LargestFirst),
            "SF" => Ok(Self::SmallestFirst),
            "MAX_DOM" | "MAXDOM" => Ok(Self::MaxDom),
            "SSR" => Ok(Self::SmearSumRel),
            "ASR" => Ok(Self::AffineSumRel),
            "SLF" => Ok(Self::SmallestLargestFirst),
            "HYBRID_SSR" => Ok(Self::HybridSsrLf),
            _ => Err(format!("unknown selector '{}'", s)),
        }
    }
}

/// Interval slicing strategy for branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitSlicer {
    Bisection,
    Peeling,
    Partition,
}

impl FromStr for SplitSlicer {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "BISECTION" => Ok(Self::Bisection),
            "PEELING" => Ok(Self::Peeling),
            "PARTITION" => Ok(Self::Partition),
            _ => Err(format!("unknown slicer '{}'", s)),
        }
    }
}

/// Exploration order of the pending nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeSelection {
    /// Depth-first (LIFO).
    Dfs,
    /// Breadth-first (FIFO).
    Bfs,
    /// Depth-first until a switch depth, then widest box first.
    Dmdfs,
}

impl FromStr for NodeSelection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "DFS" => Ok(Self::Dfs),
            "BFS" => Ok(Self::Bfs),
            "DMDFS" => Ok(Self::Dmdfs),
            _ => Err(format!("unknown node selection '{}'", s)),
        }
    }
}

/// Linear outer approximation used by the polytope hull contractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolytopeStyle {
    No,
    Rlt,
    Taylor,
}

impl FromStr for PolytopeStyle {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "NO" => Ok(Self::No),
            "RLT" => Ok(Self::Rlt),
            "TAYLOR" => Ok(Self::Taylor),
            _ => Err(format!("unknown polytope style '{}'", s)),
        }
    }
}

/// Layout of the solution report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayRegion {
    Std,
    Vec,
}

impl FromStr for DisplayRegion {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "STD" => Ok(Self::Std),
            "VEC" => Ok(Self::Vec),
            _ => Err(format!("unknown display region '{}'", s)),
        }
    }
}

/// The full parameter set with its defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Params {
    // limits
    pub time_limit: f64,
    pub node_limit: usize,
    pub solution_limit: usize,
    pub depth_limit: usize,

    // tolerances
    pub xtol: Tolerance,
    pub gauss_seidel_xtol: Tolerance,
    pub gauss_seidel_dtol: Tolerance,
    pub newton_rel_tol: f64,
    pub newton_certify_rel_tol: f64,
    pub loop_contractor_tol: f64,
    pub relaxation_eq_tol: f64,
    pub solution_cluster_gap: f64,

    // iteration caps
    pub propagation_iter_limit: usize,
    pub bc3_iter_limit: usize,
    pub uni_newton_iter_limit: usize,
    pub newton_iter_limit: usize,
    pub newton_certify_iter_limit: usize,
    pub gauss_seidel_iter_limit: usize,
    pub lp_iter_limit: usize,
    pub lp_time_limit: f64,

    // factors
    pub bc3_peel_factor: f64,
    pub inflation_delta: f64,
    pub inflation_chi: f64,
    pub gaussian_min_pivot: f64,
    pub var3b_min_width: f64,
    pub nb_slice_3b: usize,
    pub dmdfs_switch_depth: usize,
    pub split_hybrid_frequency: f64,

    // strategies
    pub split_selector: SplitSelector,
    pub split_slicer: SplitSlicer,
    pub bp_node_selection: NodeSelection,
    pub propagation_with_polytope: PolytopeStyle,
    pub propagation_with_newton: WithNewton,
    pub propagation_with_3b: With3B,
    pub preprocessing: Preprocessing,
    pub display_region: DisplayRegion,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            time_limit: 100.0,
            node_limit: 100_000,
            solution_limit: 100,
            depth_limit: 100,

            xtol: Tolerance::abs(1.0e-8),
            gauss_seidel_xtol: Tolerance::rel(1.0e-6),
            gauss_seidel_dtol: Tolerance::rel(1.0e-6),
            newton_rel_tol: 1.0e-4,
            newton_certify_rel_tol: 1.0e-4,
            loop_contractor_tol: 1.0e-4,
            relaxation_eq_tol: 1.0e-10,
            solution_cluster_gap: 0.0,

            propagation_iter_limit: 50,
            bc3_iter_limit: 30,
            uni_newton_iter_limit: 20,
            newton_iter_limit: 30,
            newton_certify_iter_limit: 20,
            gauss_seidel_iter_limit: 50,
            lp_iter_limit: 50,
            lp_time_limit: 10.0,

            bc3_peel_factor: 2.0,
            inflation_delta: 1.125,
            inflation_chi: 1.0e-12,
            gaussian_min_pivot: 1.0e-8,
            var3b_min_width: 1.0e-6,
            nb_slice_3b: 7,
            dmdfs_switch_depth: 8,
            split_hybrid_frequency: 0.5,

            split_selector: SplitSelector::RoundRobin,
            split_slicer: SplitSlicer::Bisection,
            bp_node_selection: NodeSelection::Dfs,
            propagation_with_polytope: PolytopeStyle::No,
            propagation_with_newton: WithNewton::No,
            propagation_with_3b: With3B::No,
            preprocessing: Preprocessing::Yes,
            display_region: DisplayRegion::Std,
        }
    }
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a textual `KEY = value` assignment, the interface offered to
    /// the external parameter-file loader.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        let bad = || Error::BadParameterValue {
            name: key.to_string(),
            value: value.to_string(),
        };
        macro_rules! num {
            ($field:ident, $ty:ty) => {{
                self.$field = value.parse::<$ty>().map_err(|_| bad())?;
            }};
        }
        macro_rules! strat {
            ($field:ident) => {{
                self.$field = value.parse().map_err(|_| bad())?;
            }};
        }
        match key {
            "TIME_LIMIT" => num!(time_limit, f64),
            "NODE_LIMIT" => num!(node_limit, usize),
            "SOLUTION_LIMIT" => num!(solution_limit, usize),
            "DEPTH_LIMIT" => num!(depth_limit, usize),

            "XTOL" => strat!(xtol),
            "GAUSS_SEIDEL_XTOL" => strat!(gauss_seidel_xtol),
            "GAUSS_SEIDEL_DTOL" => strat!(gauss_seidel_dtol),
            "NEWTON_REL_TOL" => num!(newton_rel_tol, f64),
            "NEWTON_CERTIFY_REL_TOL" => num!(newton_certify_rel_tol, f64),
            "LOOP_CONTRACTOR_TOL" => num!(loop_contractor_tol, f64),
            "RELAXATION_EQ_TOL" => num!(relaxation_eq_tol, f64),
            "SOLUTION_CLUSTER_GAP" => num!(solution_cluster_gap, f64),

            "PROPAGATION_ITER_LIMIT" => num!(propagation_iter_limit, usize),
            "BC3_ITER_LIMIT" => num!(bc3_iter_limit, usize),
            "UNI_NEWTON_ITER_LIMIT" => num!(uni_newton_iter_limit, usize),
            "NEWTON_ITER_LIMIT" => num!(newton_iter_limit, usize),
            "NEWTON_CERTIFY_ITER_LIMIT" => num!(newton_certify_iter_limit, usize),
            "GAUSS_SEIDEL_ITER_LIMIT" => num!(gauss_seidel_iter_limit, usize),
            "LP_ITER_LIMIT" => num!(lp_iter_limit, usize),
            "LP_TIME_LIMIT" => num!(lp_time_limit, f64),

            "BC3_PEEL_FACTOR" => num!(bc3_peel_factor, f64),
            "INFLATION_DELTA" => num!(inflation_delta, f64),
            "INFLATION_CHI" => num!(inflation_chi, f64),
            "GAUSSIAN_MIN_PIVOT" => num!(gaussian_min_pivot, f64),
            "VAR3B_MIN_WIDTH" => num!(var3b_min_width, f64),
            "NB_SLICE_3B" => num!(nb_slice_3b, usize),
            "DMDFS_SWITCH_DEPTH" => num!(dmdfs_switch_depth, usize),
            "SPLIT_HYBRID_FREQUENCY" => num!(split_hybrid_frequency, f64),

            "SPLIT_SELECTOR" => strat!(split_selector),
            "SPLIT_SLICER" => strat!(split_slicer),
            "BP_NODE_SELECTION" => strat!(bp_node_selection),
            "PROPAGATION_WITH_POLYTOPE" => strat!(propagation_with_polytope),
            "PROPAGATION_WITH_NEWTON" => strat!(propagation_with_newton),
            "PROPAGATION_WITH_3B" => strat!(propagation_with_3b),
            "PREPROCESSING" => strat!(preprocessing),
            "DISPLAY_REGION" => strat!(display_region),

            "PROPAGATION_BASE" => {
                if value != "HC4" {
                    return Err(bad());
                }
            }
            _ => {
                return Err(Error::UnknownParameter {
                    name: key.to_string(),
                });
            }
        }
        self.validate()
    }

    /// Rejects inconsistent values early, before a solve starts.
    pub fn validate(&self) -> Result<()> {
        let bad = |name: &str, value: String| Error::BadParameterValue {
            name: name.to_string(),
            value,
        };
        if self.inflation_delta <= 1.0 {
            return Err(bad("INFLATION_DELTA", self.inflation_delta.to_string()));
        }
        if self.inflation_chi <= 0.0 {
            return Err(bad("INFLATION_CHI", self.inflation_chi.to_string()));
        }
        if !(0.0..=100.0).contains(&self.bc3_peel_factor) {
            return Err(bad("BC3_PEEL_FACTOR", self.bc3_peel_factor.to_string()));
        }
        if self.nb_slice_3b < 2 {
            return Err(bad("NB_SLICE_3B", self.nb_slice_3b.to_string()));
        }
        if !(0.0..=1.0).contains(&self.split_hybrid_frequency) {
            return Err(bad(
                "SPLIT_HYBRID_FREQUENCY",
                self.split_hybrid_frequency.to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.loop_contractor_tol) {
            return Err(bad(
                "LOOP_CONTRACTOR_TOL",
                self.loop_contractor_tol.to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Params::default().validate().is_ok());
    }

    #[test]
    fn test_set_by_key() {
        let mut p = Params::new();
        p.set("NODE_LIMIT", "500").unwrap();
        assert_eq!(p.node_limit, 500);
        p.set("XTOL", "1e-6R").unwrap();
        assert!(p.xtol.is_relative());
        p.set("SPLIT_SELECTOR", "SSR").unwrap();
        assert_eq!(p.split_selector, SplitSelector::SmearSumRel);
        p.set("BP_NODE_SELECTION", "DMDFS").unwrap();
        assert_eq!(p.bp_node_selection, NodeSelection::Dmdfs);
    }

    #[test]
    fn test_bad_values_rejected() {
        let mut p = Params::new();
        assert!(p.set("NO_SUCH_KEY", "1").is_err());
        assert!(p.set("NODE_LIMIT", "abc").is_err());
        assert!(p.set("INFLATION_DELTA", "0.5").is_err());
        assert!(p.set("PROPAGATION_BASE", "BC5").is_err());
    }
}
