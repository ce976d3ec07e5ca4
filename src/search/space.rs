//! Search space: pending frontier and solution list.

use std::collections::VecDeque;

use crate::Proof;
use crate::boxes::IntervalBox;
use crate::params::NodeSelection;
use crate::search::node::NcspNode;

/// The frontier of pending nodes with a pop policy, the accepted solution
/// nodes with clustering, and the nodes suspended by the depth limit.
pub struct NcspSpace {
    policy: NodeSelection,
    switch_depth: usize,
    cluster_gap: f64,
    pending: VecDeque<NcspNode>,
    suspended: Vec<NcspNode>,
    solutions: Vec<NcspNode>,
    nb_individual_solutions: usize,
}

impl NcspSpace {
    pub fn new(policy: NodeSelection, switch_depth: usize, cluster_gap: f64) -> Self {
        Self {
            policy,
            switch_depth,
            cluster_gap,
            pending: VecDeque::new(),
            suspended: Vec::new(),
            solutions: Vec::new(),
            nb_individual_solutions: 0,
        }
    }

    pub fn push_pending(&mut self, node: NcspNode) {
        self.pending.push_back(node);
    }

    /// Pops the next node to process according to the policy.
    pub fn pop(&mut self) -> Option<NcspNode> {
        match self.policy {
            NodeSelection::Dfs => self.pending.pop_back(),
            NodeSelection::Bfs => self.pending.pop_front(),
            NodeSelection::Dmdfs => {
                // depth-first until the switch depth, then widest box first
                match self.pending.back() {
                    Some(last) if last.depth < self.switch_depth => self.pending.pop_back(),
                    Some(_) => {
                        let mut best = 0;
                        let mut w = f64::NEG_INFINITY;
                        for (k, node) in self.pending.iter().enumerate() {
                            let nw = node.width();
                            if nw > w {
                                w = nw;
                                best = k;
                            }
                        }
                        self.pending.remove(best)
                    }
                    None => None,
                }
            }
        }
    }

    pub fn nb_pending(&self) -> usize {
        self.pending.len() + self.suspended.len()
    }

    /// Parks a node that hit the depth limit; it stays pending for the
    /// reporting but is never popped again.
    pub fn suspend(&mut self, node: NcspNode) {
        self.suspended.push(node);
    }

    /// Records a solution node, merging it into an existing cluster when
    /// the hull gap stays within the configured limit on every coordinate.
    pub fn push_solution(&mut self, node: NcspNode) {
        self.nb_individual_solutions += 1;
        let bx = IntervalBox::from_domain_box(&node.bx);
        for sol in &mut self.solutions {
            let sbx = IntervalBox::from_domain_box(&sol.bx);
            if sbx.scope() == bx.scope() && sbx.gap_with(&bx) <= self.cluster_gap {
                // an inner certificate does not survive hulling distinct
                // boxes, an existence certificate does
                let contained = sbx.contains_box(&bx) || bx.contains_box(&sbx);
                let merged = match sol.proof.max(node.proof) {
                    Proof::Inner if !contained => Proof::Feasible,
                    p => p,
                };
                for v in node.bx.scope().clone().iter() {
                    let d = sol.bx.get(v).hull_merge(node.bx.get(v));
                    sol.bx.set(v, d);
                }
                sol.proof = merged;
                return;
            }
        }
        self.solutions.push(node);
    }

    pub fn nb_solutions(&self) -> usize {
        self.solutions.len()
    }

    pub fn nb_individual_solutions(&self) -> usize {
        self.nb_individual_solutions
    }

    pub fn solution(&self, i: usize) -> &NcspNode {
        &self.solutions[i]
    }

    pub fn solutions(&self) -> &[NcspNode] {
        &self.solutions
    }

    pub fn has_feasible_solution(&self) -> bool {
        self.solutions
            .iter()
            .any(|s| s.proof >= Proof::Feasible)
    }

    pub fn pending_nodes(&self) -> impl Iterator<Item = &NcspNode> {
        self.pending.iter().chain(self.suspended.iter())
    }

    /// Per-variable hull of the pending nodes.
    pub fn hull_of_pending(&self) -> Option<IntervalBox> {
        let mut it = self.pending_nodes();
        let first = it.next()?;
        let mut hull = IntervalBox::from_domain_box(&first.bx);
        for node in it {
            hull.hull_with(&IntervalBox::from_domain_box(&node.bx));
        }
        Some(hull)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Domain, DomainBox};
    use crate::interval::Interval;
    use crate::scope::Scope;
    use crate::tolerance::Tolerance;
    use crate::variable::{VarKind, Variable};

    fn node(id: usize, depth: usize, lo: f64, hi: f64) -> NcspNode {
        let x = Variable::new(0, "x", VarKind::Real, Tolerance::default());
        let bx = DomainBox::new(
            Scope::singleton(x),
            vec![Domain::Interval(Interval::new(lo, hi))],
        );
        NcspNode {
            id,
            depth,
            parent: None,
            bx,
            ctx: None,
            proof: Proof::Maybe,
        }
    }

    #[test]
    fn test_dfs_bfs_policies() {
        let mut dfs = NcspSpace::new(NodeSelection::Dfs, 8, 0.0);
        dfs.push_pending(node(1, 1, 0.0, 1.0));
        dfs.push_pending(node(2, 1, 0.0, 1.0));
        assert_eq!(dfs.pop().unwrap().id, 2);

        let mut bfs = NcspSpace::new(NodeSelection::Bfs, 8, 0.0);
        bfs.push_pending(node(1, 1, 0.0, 1.0));
        bfs.push_pending(node(2, 1, 0.0, 1.0));
        assert_eq!(bfs.pop().unwrap().id, 1);
    }

    #[test]
    fn test_dmdfs_switches_to_widest() {
        let mut sp = NcspSpace::new(NodeSelection::Dmdfs, 2, 0.0);
        sp.push_pending(node(1, 5, 0.0, 10.0));
        sp.push_pending(node(2, 5, 0.0, 1.0));
        // both beyond the switch depth: the widest box is preferred
        assert_eq!(sp.pop().unwrap().id, 1);
    }

    #[test]
    fn test_solution_clustering() {
        let mut sp = NcspSpace::new(NodeSelection::Dfs, 8, 0.1);
        sp.push_solution(node(1, 3, 0.0, 1.0));
        sp.push_solution(node(2, 3, 1.05, 2.0));
        // gap 0.05 <= 0.1: merged
        assert_eq!(sp.nb_solutions(), 1);
        assert_eq!(sp.nb_individual_solutions(), 2);
        sp.push_solution(node(3, 3, 5.0, 6.0));
        assert_eq!(sp.nb_solutions(), 2);
    }

    #[test]
    fn test_hull_of_pending() {
        let mut sp = NcspSpace::new(NodeSelection::Dfs, 8, 0.0);
        assert!(sp.hull_of_pending().is_none());
        sp.push_pending(node(1, 1, 0.0, 1.0));
        sp.push_pending(node(2, 1, 3.0, 4.0));
        let hull = sp.hull_of_pending().unwrap();
        let x = hull.scope().var(0).clone();
        assert_eq!(hull.get(&x), Interval::new(0.0, 4.0));
    }
}
