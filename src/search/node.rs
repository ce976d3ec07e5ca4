//! Search tree nodes.

use crate::Proof;
use crate::dag::DagContext;
use crate::domain::DomainBox;

/// A node of the search tree: a box, its position in the tree, its proof
/// certificate and an optional DAG overlay snapshot.
#[derive(Clone)]
pub struct NcspNode {
    pub id: usize,
    pub depth: usize,
    pub parent: Option<usize>,
    pub bx: DomainBox,
    pub ctx: Option<DagContext>,
    pub proof: Proof,
}

impl NcspNode {
    pub fn root(bx: DomainBox) -> Self {
        Self {
            id: 0,
            depth: 0,
            parent: None,
            bx,
            ctx: None,
            proof: Proof::Maybe,
        }
    }

    /// A child node with the same context snapshot and an updated box.
    pub fn child(&self, id: usize, bx: DomainBox) -> Self {
        Self {
            id,
            depth: self.depth + 1,
            parent: Some(self.id),
            bx,
            ctx: self.ctx.clone(),
            proof: Proof::Maybe,
        }
    }

    /// Largest hull width over the variables, used by the widest-first
    /// exploration policy.
    pub fn width(&self) -> f64 {
        self.bx
            .scope()
            .iter()
            .map(|v| self.bx.get(v).hull().width())
            .fold(0.0, f64::max)
    }
}
