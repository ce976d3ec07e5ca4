//! Solution report rendering.
//!
//! Produces the textual solution listing: one `SOLUTION k` block per
//! clustered solution in the standard layout, or a scope header followed by
//! one vector line per solution, plus the hull of the pending nodes when
//! the search is partial. Writing the report to files and the console is
//! the driver's business; this module only formats.

use std::fmt::Write;

use crate::Proof;
use crate::domain::DomainBox;
use crate::params::DisplayRegion;
use crate::solver::NcspSolver;

fn proof_label(proof: Proof) -> &'static str {
    match proof {
        Proof::Inner => "[inner]",
        Proof::Feasible => "[safe]",
        Proof::Maybe => "[unsafe]",
        Proof::Empty => "[bug]",
    }
}

fn box_width(bx: &DomainBox) -> f64 {
    bx.scope()
        .iter()
        .map(|v| bx.get(v).hull().width())
        .fold(0.0, f64::max)
}

/// Renders every clustered solution and the pending hull.
pub fn write_solutions(solver: &NcspSolver, region: DisplayRegion, out: &mut String) {
    match region {
        DisplayRegion::Std => {
            for i in 0..solver.nb_solutions() {
                let (bx, proof) = solver.solution(i);
                let _ = writeln!(
                    out,
                    "\nSOLUTION {} [{:.3e}] {}",
                    i + 1,
                    box_width(&bx),
                    proof_label(proof)
                );
                for v in bx.scope().iter() {
                    let _ = writeln!(out, "{} = {}", v, bx.get(v));
                }
            }
        }
        DisplayRegion::Vec => {
            if solver.nb_solutions() > 0 {
                let (bx, _) = solver.solution(0);
                let _ = writeln!(out, "\nSCOPE = {}", bx.scope());
            }
            for i in 0..solver.nb_solutions() {
                let (bx, _) = solver.solution(i);
                let mut line = String::new();
                for (k, v) in bx.scope().iter().enumerate() {
                    if k > 0 {
                        line.push(' ');
                    }
                    let _ = write!(line, "{}", bx.get(v).hull());
                }
                let _ = writeln!(out, "{}", line);
            }
        }
    }

    if let Some(hull) = solver.hull_of_pending() {
        let _ = writeln!(out, "\nHULL OF PENDING NODES");
        match region {
            DisplayRegion::Std => {
                for v in hull.scope().iter() {
                    let _ = writeln!(out, "{} = {}", v, hull.get(v));
                }
            }
            DisplayRegion::Vec => {
                let mut line = String::new();
                for (k, v) in hull.scope().iter().enumerate() {
                    if k > 0 {
                        line.push(' ');
                    }
                    let _ = write!(line, "{}", hull.get(v));
                }
                let _ = writeln!(out, "{}", line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::Constraint;
    use crate::problem::Problem;
    use crate::term::Term;

    #[test]
    fn test_report_layout() {
        let mut p = Problem::new();
        let x = p.add_real_var(-2.0, 2.0, "x");
        p.add_ctr(Constraint::eq(Term::var(&x).sqr(), 1.0));
        let mut solver = NcspSolver::new(p);
        solver.params_mut().solution_cluster_gap = 1e-6;
        solver.solve().unwrap();
        assert!(solver.nb_solutions() >= 1);

        let mut std_out = String::new();
        write_solutions(&solver, DisplayRegion::Std, &mut std_out);
        assert!(std_out.contains("SOLUTION 1"));
        assert!(std_out.contains("x = "));

        let mut vec_out = String::new();
        write_solutions(&solver, DisplayRegion::Vec, &mut vec_out);
        assert!(vec_out.contains("SCOPE = {x}"));
    }
}
