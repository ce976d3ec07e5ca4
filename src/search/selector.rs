//! Variable selection strategies for branching.

use std::rc::Rc;

use dyn_clone::DynClone;

use crate::boxes::IntervalBox;
use crate::dag::affine::affine_forms;
use crate::dag::{Dag, DagContext};
use crate::domain::DomainBox;
use crate::scope::Scope;
use crate::variable::Variable;

/// Picks the variable to split, or declines when every domain is canonical
/// or within tolerance.
pub trait Selector: DynClone {
    fn select(&mut self, bx: &DomainBox, depth: usize) -> Option<Variable>;
}

dyn_clone::clone_trait_object!(Selector);

/// Largest domain width first.
#[derive(Clone)]
pub struct SelectorMaxDom {
    scope: Scope,
}

impl SelectorMaxDom {
    pub fn new(scope: Scope) -> Self {
        Self { scope }
    }
}

impl Selector for SelectorMaxDom {
    fn select(&mut self, bx: &DomainBox, _depth: usize) -> Option<Variable> {
        let mut best: Option<(f64, Variable)> = None;
        for v in self.scope.iter() {
            if !bx.is_splitable(v) {
                continue;
            }
            let w = bx.get(v).hull().width();
            if best.as_ref().is_none_or(|(bw, _)| w > *bw) {
                best = Some((w, v.clone()));
            }
        }
        best.map(|(_, v)| v)
    }
}

/// Largest discretized domain size first.
#[derive(Clone)]
pub struct SelectorLF {
    scope: Scope,
}

impl SelectorLF {
    pub fn new(scope: Scope) -> Self {
        Self { scope }
    }
}

impl Selector for SelectorLF {
    fn select(&mut self, bx: &DomainBox, _depth: usize) -> Option<Variable> {
        let mut best: Option<(f64, Variable)> = None;
        for v in self.scope.iter() {
            if !bx.is_splitable(v) {
                continue;
            }
            let s = bx.get(v).size();
            if best.as_ref().is_none_or(|(bs, _)| s > *bs) {
                best = Some((s, v.clone()));
            }
        }
        best.map(|(_, v)| v)
    }
}

/// Smallest discretized domain size first.
#[derive(Clone)]
pub struct SelectorSF {
    scope: Scope,
}

impl SelectorSF {
    pub fn new(scope: Scope) -> Self {
        Self { scope }
    }
}

impl Selector for SelectorSF {
    fn select(&mut self, bx: &DomainBox, _depth: usize) -> Option<Variable> {
        let mut best: Option<(f64, Variable)> = None;
        for v in self.scope.iter() {
            if !bx.is_splitable(v) {
                continue;
            }
            let s = bx.get(v).size();
            if best.as_ref().is_none_or(|(bs, _)| s < *bs) {
                best = Some((s, v.clone()));
            }
        }
        best.map(|(_, v)| v)
    }
}

/// Round-robin: starts scanning at `depth mod n` so the choice is
/// deterministic per node, and takes the first splittable variable.
#[derive(Clone)]
pub struct SelectorRR {
    scope: Scope,
}

impl SelectorRR {
    pub fn new(scope: Scope) -> Self {
        Self { scope }
    }
}

impl Selector for SelectorRR {
    fn select(&mut self, bx: &DomainBox, depth: usize) -> Option<Variable> {
        let n = self.scope.size();
        if n == 0 {
            return None;
        }
        for k in 0..n {
            let v = self.scope.var((depth + k) % n);
            if bx.is_splitable(v) {
                return Some(v.clone());
            }
        }
        None
    }
}

/// Integer variables first (smallest domain), then reals (largest domain).
#[derive(Clone)]
pub struct SelectorSLF {
    scope: Scope,
}

impl SelectorSLF {
    pub fn new(scope: Scope) -> Self {
        Self { scope }
    }
}

impl Selector for SelectorSLF {
    fn select(&mut self, bx: &DomainBox, _depth: usize) -> Option<Variable> {
        let mut int_best: Option<(f64, Variable)> = None;
        let mut real_best: Option<(f64, Variable)> = None;
        for v in self.scope.iter() {
            if !bx.is_splitable(v) {
                continue;
            }
            let d = bx.get(v).size();
            if v.is_real() {
                if real_best.as_ref().is_none_or(|(bd, _)| d > *bd) {
                    real_best = Some((d, v.clone()));
                }
            } else if int_best.as_ref().is_none_or(|(bd, _)| d < *bd) {
                int_best = Some((d, v.clone()));
            }
        }
        int_best.or(real_best).map(|(_, v)| v)
    }
}

/// Smear sum relative: the interval Jacobian is evaluated on the box, each
/// row's smear values `|J_ij| * width(x_j)` are normalized by their row
/// sum, and the variable with the largest column sum wins.
#[derive(Clone)]
pub struct SelectorSSR {
    dag: Rc<Dag>,
    ctx: DagContext,
}

impl SelectorSSR {
    pub fn new(dag: Rc<Dag>) -> Self {
        let ctx = dag.new_context();
        Self { dag, ctx }
    }

    fn smear_sums(&mut self, bx: &IntervalBox) -> Vec<(Variable, f64)> {
        let scope = self.dag.scope().clone();
        let n = scope.size();
        let mut sums = vec![0.0; n];
        for f in 0..self.dag.nb_funs() {
            let e = self.dag.interval_eval(f, bx, &mut self.ctx);
            if e.is_empty() {
                continue;
            }
            self.dag.interval_diff(f, &mut self.ctx);
            let mut row: Vec<f64> = Vec::with_capacity(n);
            let mut total = 0.0;
            for v in scope.iter() {
                let d = self.dag.interval_deriv(v, &self.ctx);
                let smear = if d.is_empty() {
                    0.0
                } else {
                    let m = d.mag();
                    let w = bx.get(v).width();
                    if m.is_finite() && w.is_finite() {
                        m * w
                    } else if m == 0.0 || w == 0.0 {
                        0.0
                    } else {
                        f64::MAX
                    }
                };
                total += smear;
                row.push(smear);
            }
            if total != 0.0 && total.is_finite() {
                for (j, s) in row.into_iter().enumerate() {
                    sums[j] += s / total;
                }
            }
        }
        scope.iter().cloned().zip(sums).collect()
    }
}

impl Selector for SelectorSSR {
    fn select(&mut self, bx: &DomainBox, _depth: usize) -> Option<Variable> {
        let ib = IntervalBox::from_domain_box(bx);
        let mut items = self.smear_sums(&ib);
        items.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        items
            .into_iter()
            .map(|(v, _)| v)
            .find(|v| bx.is_splitable(v))
    }
}

/// Affine sum relative: like SSR, but the contributions come from the
/// affine forms of the functions, error term included in the normalization.
#[derive(Clone)]
pub struct SelectorASR {
    dag: Rc<Dag>,
    ctx: DagContext,
}

impl SelectorASR {
    pub fn new(dag: Rc<Dag>) -> Self {
        let ctx = dag.new_context();
        Self { dag, ctx }
    }
}

impl Selector for SelectorASR {
    fn select(&mut self, bx: &DomainBox, _depth: usize) -> Option<Variable> {
        let ib = IntervalBox::from_domain_box(bx);
        let forms = affine_forms(&self.dag, &ib, &mut self.ctx);
        let scope = self.dag.scope().clone();
        let n = scope.size();
        let mut sums = vec![0.0; n];
        for form in &forms {
            let total = form.deviation();
            if total == 0.0 || !total.is_finite() {
                continue;
            }
            for j in 0..n {
                sums[j] += form.coefs[j].abs() / total;
            }
        }
        let mut items: Vec<(Variable, f64)> = scope.iter().cloned().zip(sums).collect();
        items.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        items
            .into_iter()
            .map(|(v, _)| v)
            .find(|v| bx.is_splitable(v))
    }
}

/// Applies SSR with the configured frequency, and LF the rest of the time.
#[derive(Clone)]
pub struct SelectorHybridSSR {
    ssr: SelectorSSR,
    lf: SelectorLF,
    nb: usize,
    nb_ssr: usize,
    frequency: f64,
}

impl SelectorHybridSSR {
    pub fn new(dag: Rc<Dag>, scope: Scope, frequency: f64) -> Self {
        debug_assert!((0.0..=1.0).contains(&frequency));
        Self {
            ssr: SelectorSSR::new(dag),
            lf: SelectorLF::new(scope),
            nb: 0,
            nb_ssr: 0,
            frequency,
        }
    }
}

impl Selector for SelectorHybridSSR {
    fn select(&mut self, bx: &DomainBox, depth: usize) -> Option<Variable> {
        self.nb += 1;
        if (self.nb_ssr as f64) < self.frequency * self.nb as f64 {
            self.nb_ssr += 1;
            self.ssr.select(bx, depth)
        } else {
            self.lf.select(bx, depth)
        }
    }
}
