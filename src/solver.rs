//! The NCSP solver driver.
//!
//! Solving is a two-phase algorithm: a preprocessing step contracts the
//! initial box, fixes settled variables and removes inactive constraints;
//! then an interval branch-and-prune loop pops pending nodes, contracts
//! them with the composed contractor, certifies terminal boxes and splits
//! the rest. The components are assembled from the [`Params`].

use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::Proof;
use crate::boxes::IntervalBox;
use crate::constraint::Constraint;
use crate::contractor::exclusion::ContractorExclusionRegion;
use crate::contractor::fixpoint::ContractorLoop;
use crate::contractor::hc4::Hc4Contractor;
use crate::contractor::newton::IntervalNewton;
use crate::contractor::polytope::{ContractorPolytope, PolytopeCreatorStyle};
use crate::contractor::var3b::ContractorVar3B;
use crate::contractor::gauss_seidel::IntervalGaussSeidel;
use crate::contractor::{
    ConstraintContractor, ContextBinding, Contractor, ContractorPool, Inflator, Propagator,
    SharedContractor,
};
use crate::dag::Dag;
use crate::domain::{Domain, DomainBox};
use crate::params::{
    NodeSelection, Params, PolytopeStyle, Preprocessing, SplitSelector, SplitSlicer, With3B,
    WithNewton,
};
use crate::preproc::Preprocessor;
use crate::problem::Problem;
use crate::prover::Prover;
use crate::search::limits::{
    Limit, MultipleLimits, NodeLimit, SearchStats, SolutionLimit, StopReason, TimeLimit,
};
use crate::search::node::NcspNode;
use crate::search::selector::{
    Selector, SelectorASR, SelectorHybridSSR, SelectorLF, SelectorMaxDom, SelectorRR, SelectorSF,
    SelectorSLF, SelectorSSR,
};
use crate::search::slicer::{BisectionSlicer, IntervalSlicer, PartitionSlicer, PeelingSlicer};
use crate::search::space::NcspSpace;
use crate::{Error, Result};

/// Whether the search exhausted the space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolvingStatus {
    Complete,
    Partial,
}

/// What is known about the solution set after solving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolutionStatus {
    /// At least one solution carries an existence or inner proof.
    Feasible,
    /// The search is complete and found nothing.
    Unfeasible,
    /// Solutions were enclosed but none carries a proof.
    NoProof,
    /// Nothing found, but the search is partial.
    NoSolutionFound,
}

pub struct NcspSolver {
    problem: Problem,
    params: Params,
    preproc: Option<Preprocessor>,
    space: NcspSpace,
    nb_nodes: usize,
    stop_reason: Option<StopReason>,
    depth_limit_hit: bool,
    preproc_time: Duration,
    solve_time: Duration,
}

impl NcspSolver {
    pub fn new(problem: Problem) -> Self {
        Self::with_params(problem, Params::default())
    }

    pub fn with_params(problem: Problem, params: Params) -> Self {
        let space = NcspSpace::new(
            params.bp_node_selection,
            params.dmdfs_switch_depth,
            params.solution_cluster_gap,
        );
        Self {
            problem,
            params,
            preproc: None,
            space,
            nb_nodes: 0,
            stop_reason: None,
            depth_limit_hit: false,
            preproc_time: Duration::ZERO,
            solve_time: Duration::ZERO,
        }
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut Params {
        &mut self.params
    }

    pub fn preprocessor(&self) -> Option<&Preprocessor> {
        self.preproc.as_ref()
    }

    /// Runs preprocessing then branch-and-prune.
    pub fn solve(&mut self) -> Result<()> {
        self.params.validate()?;
        if self.problem.nb_vars() == 0 {
            return Err(Error::EmptyProblem);
        }
        self.space = NcspSpace::new(
            self.params.bp_node_selection,
            self.params.dmdfs_switch_depth,
            self.params.solution_cluster_gap,
        );
        self.nb_nodes = 0;
        self.stop_reason = None;
        self.depth_limit_hit = false;

        tracing::debug!(
            vars = self.problem.nb_vars(),
            ctrs = self.problem.nb_ctrs(),
            "NCSP solving"
        );

        // preprocessing phase
        let t0 = Instant::now();
        let (root_box, active): (DomainBox, Vec<Constraint>) =
            if self.params.preprocessing == Preprocessing::Yes {
                let pre = Preprocessor::apply(&self.problem, &self.params);
                let out = (pre.reduced_box().clone(), pre.active_ctrs().to_vec());
                self.preproc = Some(pre);
                out
            } else {
                (self.problem.initial_box(), self.problem.ctrs().to_vec())
            };
        let root_box = self.apply_xtol(root_box);
        self.preproc_time = t0.elapsed();

        if let Some(pre) = &self.preproc {
            if pre.is_unfeasible() {
                self.solve_time = Duration::ZERO;
                return Ok(());
            }
        }

        let t1 = Instant::now();
        if active.is_empty() {
            // every constraint is inactive: the whole contracted box is a
            // solution
            let mut node = NcspNode::root(root_box);
            node.proof = Proof::Inner;
            self.space.push_solution(node);
            self.solve_time = t1.elapsed();
            return Ok(());
        }

        self.branch_and_prune(root_box, active)?;
        self.solve_time = t1.elapsed();
        Ok(())
    }

    fn branch_and_prune(&mut self, root_box: DomainBox, active: Vec<Constraint>) -> Result<()> {
        // the DAG holds every constraint with a single-root form; the
        // others keep their own contraction
        let mut dag = Dag::new();
        let mut others: Vec<Constraint> = Vec::new();
        for c in &active {
            match c.as_fun() {
                Some((root, image)) => {
                    dag.insert(&root, image);
                }
                None => others.push(c.clone()),
            }
        }
        let dag = Rc::new(dag);

        let mut contractor = self.make_contractor(&dag, &others)?;
        let mut selector = self.make_selector(&dag, root_box.scope());
        let slicer = self.make_slicer();
        let mut prover = Prover::new(&active, &self.params);
        let mut exclusion = self.make_exclusion(&dag, root_box.scope());

        let mut limits = MultipleLimits::new(vec![
            Box::new(TimeLimit::new(self.params.time_limit)),
            Box::new(NodeLimit::new(self.params.node_limit)),
            Box::new(SolutionLimit::new(self.params.solution_limit)),
        ]);
        limits.initialize();

        let mut root = NcspNode::root(root_box);
        if dag.nb_funs() > 0 {
            root.ctx = Some(dag.new_context());
        }
        let mut next_id = 1usize;
        self.space.push_pending(root);

        loop {
            let stats = SearchStats {
                nb_nodes: self.nb_nodes,
                nb_solutions: self.space.nb_solutions(),
            };
            if let Some(reason) = limits.exceeded(&stats) {
                tracing::debug!(?reason, "limit reached, search is partial");
                self.stop_reason = Some(reason);
                break;
            }
            let Some(mut node) = self.space.pop() else {
                break;
            };
            self.nb_nodes += 1;

            // boxes inside a certified exclusion region duplicate a
            // solution that is already recorded
            let mut ib = IntervalBox::from_domain_box(&node.bx);
            if let Some(excl) = exclusion.as_mut() {
                if excl.contract(&mut ib) == Proof::Empty {
                    continue;
                }
            }

            // contraction, with the node's DAG overlay bound for the call
            let proof = match node.ctx.as_mut() {
                Some(ctx) => {
                    let mut bound = ContextBinding::new(contractor.as_mut(), ctx);
                    bound.contract(&mut ib)
                }
                None => contractor.contract(&mut ib),
            };
            if proof == Proof::Empty {
                continue;
            }
            ib.write_to_domain_box(&mut node.bx);
            if node.bx.is_empty() {
                continue;
            }

            // an inner region needs no further split
            if proof == Proof::Inner
                || active.iter().all(|c| c.is_satisfied(&ib) == Proof::Inner)
            {
                node.proof = Proof::Inner;
                if let Some(excl) = exclusion.as_mut() {
                    let _ = excl.compute_new_region(&ib);
                }
                self.space.push_solution(node);
                continue;
            }

            // canonical or within-tolerance boxes, and boxes nothing can
            // split, are terminal: certify and record
            let splittable = node.bx.scope().iter().any(|v| node.bx.is_splitable(v));
            let choice = if splittable {
                selector.select(&node.bx, node.depth)
            } else {
                None
            };
            let Some(v) = choice else {
                let tight = IntervalBox::from_domain_box(&node.bx);
                let certified = prover.certify(&tight);
                if certified == Proof::Empty {
                    continue;
                }
                node.proof = proof.max(certified);
                // a proven solution seeds an exclusion region so later
                // nodes converging to the same point are pruned; the
                // certified enclosure is folded into the reported box so
                // the proven point stays inside it
                if node.proof >= Proof::Feasible {
                    if let Some(excl) = exclusion.as_mut() {
                        if let Some(enclosure) = excl.compute_new_region(&tight) {
                            for v in enclosure.scope().clone().iter() {
                                let d = node
                                    .bx
                                    .get(v)
                                    .hull_merge(&Domain::Interval(enclosure.get(v)));
                                node.bx.set(v, d);
                            }
                        }
                    }
                }
                self.space.push_solution(node);
                continue;
            };

            if node.depth >= self.params.depth_limit {
                self.depth_limit_hit = true;
                self.space.suspend(node);
                continue;
            }

            for child_dom in split_domain(node.bx.get(&v), slicer.as_ref()) {
                if child_dom.is_empty() {
                    continue;
                }
                let mut child_box = node.bx.clone();
                child_box.set(&v, child_dom);
                let child = node.child(next_id, child_box);
                next_id += 1;
                self.space.push_pending(child);
            }
        }
        Ok(())
    }

    // The XTOL parameter becomes the width tolerance of every variable
    // that kept the built-in default; explicitly chosen tolerances win.
    fn apply_xtol(&self, bx: DomainBox) -> DomainBox {
        use crate::tolerance::Tolerance;
        let default = Tolerance::default();
        let scope: crate::scope::Scope = bx
            .scope()
            .iter()
            .map(|v| {
                if v.tolerance() == default {
                    v.with_tolerance(self.params.xtol)
                } else {
                    v.clone()
                }
            })
            .collect();
        let doms = bx.scope().iter().map(|v| bx.get(v).clone()).collect();
        DomainBox::new(scope, doms)
    }

    fn make_contractor(
        &self,
        dag: &Rc<Dag>,
        others: &[Constraint],
    ) -> Result<Box<dyn Contractor>> {
        let mut ops: Vec<SharedContractor> = Vec::new();
        for f in 0..dag.nb_funs() {
            ops.push(Box::new(Hc4Contractor::new(dag.clone(), f)));
        }
        for c in others {
            ops.push(Box::new(ConstraintContractor::new(c.clone())));
        }
        let base: SharedContractor = Box::new(Propagator::new(
            ops,
            self.params.loop_contractor_tol,
            self.params.propagation_iter_limit,
        ));

        let mut pool = ContractorPool::new(vec![base.clone()]);

        if self.params.propagation_with_newton == WithNewton::Yes && dag.nb_funs() > 0 {
            let gs = IntervalGaussSeidel::new(
                self.params.gauss_seidel_iter_limit,
                self.params.gauss_seidel_xtol,
                self.params.gauss_seidel_dtol,
                self.params.gaussian_min_pivot,
            );
            // only a square system of singleton-image functions qualifies
            let eq_funs: Vec<usize> = (0..dag.nb_funs())
                .filter(|&f| dag.fun(f).image().is_singleton())
                .collect();
            if let Ok(newton) = IntervalNewton::new(
                dag.clone(),
                eq_funs,
                gs,
                self.params.newton_iter_limit,
                self.params.newton_rel_tol,
                self.params.newton_certify_iter_limit,
                self.params.newton_certify_rel_tol,
                Inflator::new(self.params.inflation_delta, self.params.inflation_chi),
            ) {
                pool.push(Box::new(newton));
            }
        }

        match self.params.propagation_with_polytope {
            PolytopeStyle::No => {}
            PolytopeStyle::Rlt => pool.push(Box::new(ContractorPolytope::new(
                dag.clone(),
                PolytopeCreatorStyle::Rlt,
                self.params.relaxation_eq_tol,
                self.params.lp_iter_limit,
                self.params.lp_time_limit,
            ))),
            PolytopeStyle::Taylor => pool.push(Box::new(ContractorPolytope::new(
                dag.clone(),
                PolytopeCreatorStyle::Taylor,
                self.params.relaxation_eq_tol,
                self.params.lp_iter_limit,
                self.params.lp_time_limit,
            ))),
        }

        if self.params.propagation_with_3b == With3B::Yes {
            for v in dag.scope().clone().iter() {
                pool.push(Box::new(ContractorVar3B::new(
                    base.clone(),
                    v.clone(),
                    Box::new(PartitionSlicer::new(self.params.nb_slice_3b)),
                    self.params.var3b_min_width,
                )));
            }
        }

        // the whole battery iterates to a joint fixpoint: an improvement
        // found by Newton, the polytope hull or the shaving stage re-runs
        // the propagation until nothing moves by more than the tolerance
        Ok(Box::new(ContractorLoop::new(
            Box::new(pool),
            self.params.loop_contractor_tol,
        )))
    }

    // Exclusion regions are sound only when the square equation system
    // spans every variable: a box covered on a partial scope could still
    // hold distinct solutions elsewhere.
    fn make_exclusion(
        &self,
        dag: &Rc<Dag>,
        scope: &crate::scope::Scope,
    ) -> Option<ContractorExclusionRegion> {
        let eq_funs: Vec<usize> = (0..dag.nb_funs())
            .filter(|&f| dag.fun(f).image().is_singleton())
            .collect();
        let gs = IntervalGaussSeidel::new(
            self.params.gauss_seidel_iter_limit,
            self.params.gauss_seidel_xtol,
            self.params.gauss_seidel_dtol,
            self.params.gaussian_min_pivot,
        );
        IntervalNewton::new(
            dag.clone(),
            eq_funs,
            gs,
            self.params.newton_iter_limit,
            self.params.newton_rel_tol,
            self.params.newton_certify_iter_limit,
            self.params.newton_certify_rel_tol,
            Inflator::new(self.params.inflation_delta, self.params.inflation_chi),
        )
        .ok()
        .filter(|newton| newton.scope().size() == scope.size())
        .map(ContractorExclusionRegion::new)
    }

    fn make_selector(&self, dag: &Rc<Dag>, scope: &crate::scope::Scope) -> Box<dyn Selector> {
        match self.params.split_selector {
            SplitSelector::RoundRobin => Box::new(SelectorRR::new(scope.clone())),
            SplitSelector::LargestFirst => Box::new(SelectorLF::new(scope.clone())),
            SplitSelector::SmallestFirst => Box::new(SelectorSF::new(scope.clone())),
            SplitSelector::MaxDom => Box::new(SelectorMaxDom::new(scope.clone())),
            SplitSelector::SmearSumRel => Box::new(SelectorSSR::new(dag.clone())),
            SplitSelector::AffineSumRel => Box::new(SelectorASR::new(dag.clone())),
            SplitSelector::SmallestLargestFirst => Box::new(SelectorSLF::new(scope.clone())),
            SplitSelector::HybridSsrLf => Box::new(SelectorHybridSSR::new(
                dag.clone(),
                scope.clone(),
                self.params.split_hybrid_frequency,
            )),
        }
    }

    fn make_slicer(&self) -> Box<dyn IntervalSlicer> {
        match self.params.split_slicer {
            SplitSlicer::Bisection => Box::new(BisectionSlicer),
            SplitSlicer::Peeling => Box::new(PeelingSlicer::new(self.params.bc3_peel_factor)),
            SplitSlicer::Partition => Box::new(PartitionSlicer::new(3)),
        }
    }

    pub fn nb_nodes(&self) -> usize {
        self.nb_nodes
    }

    pub fn preprocessing_time(&self) -> Duration {
        self.preproc_time
    }

    pub fn solving_time(&self) -> Duration {
        self.solve_time
    }

    /// The policy used to explore the tree.
    pub fn node_selection(&self) -> NodeSelection {
        self.params.bp_node_selection
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason.or(if self.depth_limit_hit {
            Some(StopReason::DepthLimit)
        } else {
            None
        })
    }

    pub fn used_no_limit(&self) -> bool {
        self.stop_reason.is_none() && !self.depth_limit_hit
    }

    pub fn solving_status(&self) -> SolvingStatus {
        if self.used_no_limit() && self.space.nb_pending() == 0 {
            SolvingStatus::Complete
        } else {
            SolvingStatus::Partial
        }
    }

    pub fn solution_status(&self) -> SolutionStatus {
        if self.space.nb_solutions() == 0 {
            if self.solving_status() == SolvingStatus::Complete {
                SolutionStatus::Unfeasible
            } else {
                SolutionStatus::NoSolutionFound
            }
        } else if self.space.has_feasible_solution() {
            SolutionStatus::Feasible
        } else {
            SolutionStatus::NoProof
        }
    }

    pub fn nb_solutions(&self) -> usize {
        self.space.nb_solutions()
    }

    pub fn nb_individual_solutions(&self) -> usize {
        self.space.nb_individual_solutions()
    }

    /// The i-th clustered solution over the scope of the initial problem.
    pub fn solution(&self, i: usize) -> (DomainBox, Proof) {
        let node = self.space.solution(i);
        (node.bx.clone(), node.proof)
    }

    pub fn nb_pending_boxes(&self) -> usize {
        self.space.nb_pending()
    }

    pub fn hull_of_pending(&self) -> Option<IntervalBox> {
        self.space.hull_of_pending()
    }

    pub fn space(&self) -> &NcspSpace {
        &self.space
    }
}

// Branching on a domain: a union branches on its pieces, everything else
// goes through the slicer on the interval hull with the typed domain
// narrowed back onto each slice.
fn split_domain(dom: &crate::domain::Domain, slicer: &dyn IntervalSlicer) -> Vec<crate::domain::Domain> {
    use crate::domain::Domain;
    match dom {
        Domain::IntervalUnion(u) if u.len() > 1 => {
            u.iter().map(|p| Domain::Interval(*p)).collect()
        }
        Domain::RangeUnion(u) if u.iter().count() > 1 => {
            u.iter().map(|r| Domain::Range(*r)).collect()
        }
        _ => slicer
            .slice(&dom.hull())
            .into_iter()
            .map(|slice| {
                let mut d = dom.clone();
                d.intersect_interval(&slice);
                d
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Term;

    fn circle_line_problem() -> Problem {
        let mut p = Problem::new();
        let x = p.add_real_var(-2.0, 2.0, "x");
        let y = p.add_real_var(-2.0, 2.0, "y");
        p.add_ctr(Constraint::eq(
            Term::var(&x).sqr() + Term::var(&y).sqr(),
            1.0,
        ));
        p.add_ctr(Constraint::eq(Term::var(&y), Term::var(&x)));
        p
    }

    #[test]
    fn test_circle_line_two_solutions() {
        let mut solver = NcspSolver::new(circle_line_problem());
        solver.params_mut().solution_cluster_gap = 1e-6;
        solver.solve().unwrap();
        assert_eq!(solver.solving_status(), SolvingStatus::Complete);
        assert_eq!(solver.solution_status(), SolutionStatus::Feasible);
        assert_eq!(solver.nb_solutions(), 2);
        let r = 0.5_f64.sqrt();
        let mut found = [false, false];
        for i in 0..2 {
            let (bx, proof) = solver.solution(i);
            assert!(proof >= Proof::Feasible);
            let v = bx.scope().var(0).clone();
            if bx.get(&v).hull().contains(r) {
                found[0] = true;
            }
            if bx.get(&v).hull().contains(-r) {
                found[1] = true;
            }
        }
        assert!(found[0] && found[1]);
    }

    #[test]
    fn test_infeasible_problem() {
        let mut p = Problem::new();
        let x = p.add_real_var(-10.0, 10.0, "x");
        p.add_ctr(Constraint::eq(Term::var(&x).sqr() + 1.0, 0.0));
        let mut solver = NcspSolver::new(p);
        solver.solve().unwrap();
        assert_eq!(solver.solving_status(), SolvingStatus::Complete);
        assert_eq!(solver.solution_status(), SolutionStatus::Unfeasible);
        assert_eq!(solver.nb_solutions(), 0);
        assert_eq!(solver.nb_pending_boxes(), 0);
    }

    #[test]
    fn test_determinism() {
        let run = || {
            let mut solver = NcspSolver::new(circle_line_problem());
            solver.params_mut().solution_cluster_gap = 1e-6;
            solver.solve().unwrap();
            let sols: Vec<String> = (0..solver.nb_solutions())
                .map(|i| format!("{}", solver.solution(i).0))
                .collect();
            (solver.nb_nodes(), sols)
        };
        let (n1, s1) = run();
        let (n2, s2) = run();
        assert_eq!(n1, n2);
        assert_eq!(s1, s2);
    }
}
