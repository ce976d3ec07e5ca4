//! Full-pipeline scenarios: problems built through the public API, solved
//! with various strategy combinations, with the reported certificates
//! checked against the mathematics.

use rstest::rstest;

use crate::Proof;
use crate::boxes::IntervalBox;
use crate::constraint::Constraint;
use crate::interval::Interval;
use crate::problem::Problem;
use crate::solver::{NcspSolver, SolutionStatus, SolvingStatus};
use crate::term::Term;

fn circle_line() -> Problem {
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

#[rstest]
fn test_circle_line_under_strategies(
    #[values("RR", "LF", "SF", "MAX_DOM", "SSR", "ASR", "SLF", "HYBRID_SSR")] selector: &str,
    #[values("DFS", "BFS", "DMDFS")] policy: &str,
) {
    let mut solver = NcspSolver::new(circle_line());
    solver.params_mut().set("XTOL", "1e-8A").unwrap();
    solver.params_mut().set("SPLIT_SELECTOR", selector).unwrap();
    solver.params_mut().set("BP_NODE_SELECTION", policy).unwrap();
    solver.params_mut().set("SOLUTION_CLUSTER_GAP", "1e-6").unwrap();
    solver.solve().unwrap();

    assert_eq!(solver.solving_status(), SolvingStatus::Complete);
    assert_eq!(solver.solution_status(), SolutionStatus::Feasible);
    assert_eq!(solver.nb_solutions(), 2);

    let r = 0.5_f64.sqrt();
    let mut pos = false;
    let mut neg = false;
    for i in 0..solver.nb_solutions() {
        let (bx, proof) = solver.solution(i);
        assert!(proof >= Proof::Feasible);
        let v = bx.scope().var(0).clone();
        let h = bx.get(&v).hull();
        pos |= h.contains(r);
        neg |= h.contains(-r);
        // sampled soundness: the box midpoint satisfies both equations up
        // to the certification slack
        let ib = IntervalBox::from_domain_box(&bx);
        let m = ib.midpoint();
        assert!((m[0] * m[0] + m[1] * m[1] - 1.0).abs() < 1e-4);
        assert!((m[0] - m[1]).abs() < 1e-4);
    }
    assert!(pos && neg);
}

// Brown's almost-linear system in dimension 5: the all-ones point is a
// solution, certified by the inflated Newton operator.
#[test]
fn test_brown_5() {
    let n = 5;
    let mut p = Problem::new();
    let vars: Vec<_> = (0..n)
        .map(|i| p.add_real_var(-2.0, 2.0, &format!("x{}", i + 1)))
        .collect();

    // x_i + sum_j x_j = n + 1 for i < n
    for i in 0..n - 1 {
        let mut sum = Term::var(&vars[i]);
        for v in &vars {
            sum = sum + Term::var(v);
        }
        p.add_ctr(Constraint::eq(sum, (n + 1) as f64));
    }
    // the product equation
    let mut prod = Term::var(&vars[0]);
    for v in &vars[1..] {
        prod = prod * Term::var(v);
    }
    p.add_ctr(Constraint::eq(prod, 1.0));

    let mut solver = NcspSolver::new(p);
    solver.params_mut().set("XTOL", "1e-6A").unwrap();
    solver.params_mut().set("INFLATION_DELTA", "1.125").unwrap();
    solver.params_mut().set("SOLUTION_LIMIT", "100").unwrap();
    solver.params_mut().set("PROPAGATION_WITH_NEWTON", "YES").unwrap();
    solver.params_mut().set("SPLIT_SELECTOR", "SSR").unwrap();
    solver.params_mut().set("SOLUTION_CLUSTER_GAP", "1e-4").unwrap();
    solver.solve().unwrap();

    assert!(solver.nb_solutions() >= 1);
    assert_eq!(solver.solution_status(), SolutionStatus::Feasible);
    // some feasible cluster encloses the all-ones solution
    let mut found = false;
    for i in 0..solver.nb_solutions() {
        let (bx, proof) = solver.solution(i);
        if proof >= Proof::Feasible
            && bx.scope().iter().all(|v| {
                let h = bx.get(v).hull();
                h.left() <= 1.0 + 1e-4 && h.right() >= 1.0 - 1e-4
            })
        {
            found = true;
        }
    }
    assert!(found);
}

#[test]
fn test_table_constraint_solutions() {
    let mut p = Problem::new();
    let x = p.add_real_var(0.0, 3.0, "x");
    let y = p.add_real_var(0.0, 3.0, "y");
    let rows = vec![
        vec![Interval::point(1.0), Interval::point(2.0)],
        vec![Interval::point(2.0), Interval::point(1.0)],
        vec![Interval::point(3.0), Interval::point(3.0)],
    ];
    p.add_ctr(Constraint::table(vec![x.clone(), y.clone()], rows).unwrap());
    p.add_ctr(Constraint::le(Term::var(&x) + Term::var(&y), 5.0));

    let mut solver = NcspSolver::new(p);
    solver.solve().unwrap();

    assert_eq!(solver.solving_status(), SolvingStatus::Complete);
    // exactly the rows satisfying x + y <= 5: (1,2), (2,1); row (3,3) is
    // cut by the inequality
    assert_eq!(solver.nb_solutions(), 2);
    let mut points = Vec::new();
    for i in 0..solver.nb_solutions() {
        let (bx, _) = solver.solution(i);
        points.push((
            bx.get(&x).hull().midpoint().round(),
            bx.get(&y).hull().midpoint().round(),
        ));
    }
    points.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(points, vec![(1.0, 2.0), (2.0, 1.0)]);
}

#[test]
fn test_conditional_constraint_covers_abs_line() {
    let mut p = Problem::new();
    let x = p.add_real_var(-1.0, 1.0, "x");
    let y = p.add_real_var(-1.0, 1.0, "y");
    p.add_ctr(Constraint::cond(
        Constraint::ge(Term::var(&x), 0.0),
        Constraint::eq(Term::var(&y), Term::var(&x)),
    ));
    p.add_ctr(Constraint::cond(
        Constraint::lt(Term::var(&x), 0.0),
        Constraint::eq(Term::var(&y), -Term::var(&x)),
    ));

    let mut solver = NcspSolver::new(p);
    solver.params_mut().set("XTOL", "1e-2A").unwrap();
    solver.params_mut().set("SOLUTION_CLUSTER_GAP", "0.1").unwrap();
    solver.params_mut().set("SOLUTION_LIMIT", "1000").unwrap();
    solver.params_mut().set("NODE_LIMIT", "50000").unwrap();
    solver.solve().unwrap();

    assert!(solver.nb_solutions() >= 1);
    // the paving of y = |x| covers sample points on both branches, either
    // by a solution cluster or by the pending hull of a partial run
    let pending = solver.hull_of_pending();
    for k in 0..19 {
        let sx = -0.9 + 0.1 * k as f64;
        let sy = sx.abs();
        let mut covered = false;
        for i in 0..solver.nb_solutions() {
            let (bx, _) = solver.solution(i);
            if bx.get(&x).hull().contains(sx) && bx.get(&y).hull().contains(sy) {
                covered = true;
                break;
            }
        }
        if !covered {
            if let Some(hull) = &pending {
                covered = hull.get(&x).contains(sx) && hull.get(&y).contains(sy);
            }
        }
        assert!(covered, "({}, {}) not covered", sx, sy);
    }
}

#[test]
fn test_infeasible_problem_reports_unfeasible() {
    let mut p = Problem::new();
    let x = p.add_real_var(-10.0, 10.0, "x");
    p.add_ctr(Constraint::eq(Term::var(&x).sqr() + 1.0, 0.0));
    let mut solver = NcspSolver::new(p);
    solver.solve().unwrap();
    assert_eq!(solver.solving_status(), SolvingStatus::Complete);
    assert_eq!(solver.solution_status(), SolutionStatus::Unfeasible);
    assert_eq!(solver.nb_solutions(), 0);
    assert_eq!(solver.nb_pending_boxes(), 0);
    assert!(solver.hull_of_pending().is_none());
}

#[test]
fn test_solution_limit_partial_run() {
    // a continuum of solutions: the parabola y = x^2
    let mut p = Problem::new();
    let x = p.add_real_var(-1.0, 1.0, "x");
    let y = p.add_real_var(-1.0, 1.0, "y");
    p.add_ctr(Constraint::eq(Term::var(&y), Term::var(&x).sqr()));

    let mut solver = NcspSolver::new(p);
    solver.params_mut().set("XTOL", "1e-3A").unwrap();
    solver.params_mut().set("SOLUTION_LIMIT", "1").unwrap();
    solver.solve().unwrap();

    assert_eq!(solver.solving_status(), SolvingStatus::Partial);
    assert_eq!(solver.nb_solutions(), 1);
    assert!(solver.nb_pending_boxes() > 0);
    let hull = solver.hull_of_pending().unwrap();
    assert!(!hull.is_empty());
    assert_eq!(
        solver.stop_reason(),
        Some(crate::search::limits::StopReason::SolutionLimit)
    );
}

#[rstest]
fn test_circle_line_under_slicers(#[values("BISECTION", "PARTITION", "PEELING")] slicer: &str) {
    let mut solver = NcspSolver::new(circle_line());
    solver.params_mut().set("XTOL", "1e-6A").unwrap();
    solver.params_mut().set("SPLIT_SLICER", slicer).unwrap();
    solver.params_mut().set("SOLUTION_CLUSTER_GAP", "1e-4").unwrap();
    solver.params_mut().set("NODE_LIMIT", "50000").unwrap();
    solver.solve().unwrap();
    assert_eq!(solver.solution_status(), SolutionStatus::Feasible);
    let r = 0.5_f64.sqrt();
    let hit = (0..solver.nb_solutions()).any(|i| {
        let (bx, _) = solver.solution(i);
        let v = bx.scope().var(0).clone();
        bx.get(&v).hull().contains(r)
    });
    assert!(hit);
}

#[test]
fn test_3b_stage_solves_circle_line() {
    let mut solver = NcspSolver::new(circle_line());
    solver.params_mut().set("PROPAGATION_WITH_3B", "YES").unwrap();
    solver.params_mut().set("SOLUTION_CLUSTER_GAP", "1e-6").unwrap();
    solver.solve().unwrap();
    assert_eq!(solver.solution_status(), SolutionStatus::Feasible);
    assert_eq!(solver.nb_solutions(), 2);
}

#[test]
fn test_polytope_strategy_solves_circle_line() {
    let mut solver = NcspSolver::new(circle_line());
    solver
        .params_mut()
        .set("PROPAGATION_WITH_POLYTOPE", "RLT")
        .unwrap();
    solver.params_mut().set("SOLUTION_CLUSTER_GAP", "1e-6").unwrap();
    solver.solve().unwrap();
    assert_eq!(solver.solution_status(), SolutionStatus::Feasible);
    assert_eq!(solver.nb_solutions(), 2);
}

#[test]
fn test_union_domain_branches_on_pieces() {
    use crate::interval::union::IntervalUnion;
    let mut p = Problem::new();
    let u = IntervalUnion::from_intervals([Interval::new(0.0, 1.0), Interval::new(3.0, 5.0)]);
    let x = p.add_real_var_union(u, "x");
    p.add_ctr(Constraint::in_range(
        Term::var(&x).sqr(),
        Interval::new(0.25, 16.0),
    ));

    let mut solver = NcspSolver::new(p);
    solver.params_mut().set("XTOL", "1e-3A").unwrap();
    solver.params_mut().set("SOLUTION_CLUSTER_GAP", "0.5").unwrap();
    solver.solve().unwrap();

    assert_eq!(solver.solving_status(), SolvingStatus::Complete);
    // the admissible set is [1/2, 1] union [3, 4]: one cluster per piece,
    // nothing in the hole between the pieces
    assert_eq!(solver.nb_solutions(), 2);
    let mut covers_low = false;
    let mut covers_high = false;
    for i in 0..solver.nb_solutions() {
        let (bx, _) = solver.solution(i);
        let h = bx.get(&x).hull();
        assert!(!h.contains(2.0));
        covers_low |= h.contains(0.75);
        covers_high |= h.contains(3.5);
    }
    assert!(covers_low && covers_high);
}

#[test]
fn test_integer_variables_snap_to_grid() {
    // x integer, y real, y = x / 2 with x + y >= 4 on small ranges
    let mut p = Problem::new();
    let x = p.add_int_var(0, 5, "x");
    let y = p.add_real_var(0.0, 5.0, "y");
    p.add_ctr(Constraint::eq(Term::var(&y) * 2.0, Term::var(&x)));
    p.add_ctr(Constraint::ge(Term::var(&x) + Term::var(&y), 4.0));

    let mut solver = NcspSolver::new(p);
    solver.params_mut().set("SPLIT_SELECTOR", "SLF").unwrap();
    solver.solve().unwrap();

    assert!(solver.nb_solutions() >= 1);
    for i in 0..solver.nb_solutions() {
        let (bx, _) = solver.solution(i);
        let h = bx.get(&x).hull();
        // integer domains only hold integral values
        assert_eq!(h.left().fract(), 0.0);
        assert_eq!(h.right().fract(), 0.0);
        // x + y >= 4 with y = x/2 forces x >= 3
        assert!(h.left() >= 3.0);
    }
}
