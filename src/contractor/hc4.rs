//! HC4 constraint propagation on the shared DAG.

use std::rc::Rc;

use crate::Proof;
use crate::boxes::IntervalBox;
use crate::contractor::Contractor;
use crate::dag::{Dag, DagContext, FunId};
use crate::scope::Scope;

/// A single application of the forward-backward revise of one DAG function.
#[derive(Clone)]
pub struct Hc4Contractor {
    dag: Rc<Dag>,
    fun: FunId,
    ctx: DagContext,
}

impl Hc4Contractor {
    pub fn new(dag: Rc<Dag>, fun: FunId) -> Self {
        let ctx = dag.new_context();
        Self { dag, fun, ctx }
    }

    pub fn fun(&self) -> FunId {
        self.fun
    }
}

impl Contractor for Hc4Contractor {
    fn scope(&self) -> Scope {
        self.dag.fun(self.fun).scope().clone()
    }

    fn contract(&mut self, bx: &mut IntervalBox) -> Proof {
        let proof = self.dag.hc4_revise(self.fun, bx, &mut self.ctx);
        tracing::trace!(fun = self.fun, %proof, "hc4 revise");
        proof
    }

    fn name(&self) -> String {
        format!("HC4 contractor #{}", self.fun)
    }

    fn swap_context(&mut self, ctx: &mut DagContext) -> bool {
        std::mem::swap(&mut self.ctx, ctx);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::Interval;
    use crate::term::Term;
    use crate::tolerance::Tolerance;
    use crate::variable::{VarKind, Variable};

    #[test]
    fn test_hc4_contractor_on_circle() {
        let x = Variable::new(0, "x", VarKind::Real, Tolerance::default());
        let y = Variable::new(1, "y", VarKind::Real, Tolerance::default());
        let mut dag = Dag::new();
        let f = dag.insert(
            &(Term::var(&x).sqr() + Term::var(&y).sqr()),
            Interval::ONE,
        );
        let dag = Rc::new(dag);
        let mut op = Hc4Contractor::new(dag.clone(), f);
        let mut bx = IntervalBox::new(
            dag.scope().clone(),
            vec![Interval::new(-2.0, 2.0), Interval::new(-2.0, 2.0)],
        );
        assert_eq!(op.contract(&mut bx), Proof::Maybe);
        assert_eq!(bx.get(&x), Interval::new(-1.0, 1.0));
        assert_eq!(bx.get(&y), Interval::new(-1.0, 1.0));
    }
}
