use std::rc::Rc;

use paver::boxes::IntervalBox;
use paver::constraint::Constraint;
use paver::contractor::Contractor;
use paver::contractor::hc4::Hc4Contractor;
use paver::dag::Dag;
use paver::interval::Interval;
use paver::problem::Problem;
use paver::solver::NcspSolver;
use paver::term::Term;
use paver::tolerance::Tolerance;
use paver::variable::{VarKind, Variable};

fn circle_dag() -> (Rc<Dag>, IntervalBox) {
    let x = Variable::new(0, "x", VarKind::Real, Tolerance::default());
    let y = Variable::new(1, "y", VarKind::Real, Tolerance::default());
    let mut dag = Dag::new();
    dag.insert(
        &(Term::var(&x).sqr() + Term::var(&y).sqr()),
        Interval::ONE,
    );
    let dag = Rc::new(dag);
    let bx = IntervalBox::new(
        dag.scope().clone(),
        vec![Interval::new(-2.0, 2.0), Interval::new(-2.0, 2.0)],
    );
    (dag, bx)
}

#[divan::bench]
fn hc4_revise_circle(bencher: divan::Bencher) {
    let (dag, bx) = circle_dag();
    let mut op = Hc4Contractor::new(dag, 0);
    bencher.bench_local(move || {
        let mut b = bx.clone();
        divan::black_box(op.contract(&mut b))
    });
}

#[divan::bench]
fn solve_circle_line(bencher: divan::Bencher) {
    bencher.bench_local(|| {
        let mut p = Problem::new();
        let x = p.add_real_var(-2.0, 2.0, "x");
        let y = p.add_real_var(-2.0, 2.0, "y");
        p.add_ctr(Constraint::eq(
            Term::var(&x).sqr() + Term::var(&y).sqr(),
            1.0,
        ));
        p.add_ctr(Constraint::eq(Term::var(&y), Term::var(&x)));
        let mut solver = NcspSolver::new(p);
        solver.params_mut().set("XTOL", "1e-6A").unwrap();
        solver.solve().unwrap();
        divan::black_box(solver.nb_solutions())
    });
}

fn main() {
    divan::main();
}
