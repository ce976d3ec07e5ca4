//! Interval Gauss-Seidel iteration on square interval linear systems.

use crate::Proof;
use crate::interval::projections::mul_px;
use crate::linalg::{IntervalMatrix, IntervalVector, gauss_jordan_inverse, precondition_matrix, precondition_vector};
use crate::tolerance::Tolerance;

/// The interval Gauss-Seidel operator for `A x = b`, contracting `x`.
#[derive(Debug, Clone)]
pub struct IntervalGaussSeidel {
    max_iter: usize,
    xtol: Tolerance,
    dtol: Tolerance,
    min_pivot: f64,
}

impl IntervalGaussSeidel {
    pub fn new(max_iter: usize, xtol: Tolerance, dtol: Tolerance, min_pivot: f64) -> Self {
        debug_assert!(max_iter > 0);
        Self {
            max_iter,
            xtol,
            dtol,
            min_pivot,
        }
    }

    /// Preconditioned variant: both sides are multiplied by the inverse of
    /// the midpoint matrix when that inverse exists.
    pub fn contract_precond(
        &self,
        a: &IntervalMatrix,
        x: &mut IntervalVector,
        b: &IntervalVector,
    ) -> Proof {
        let mid = a.midpoint();
        match gauss_jordan_inverse(&mid, self.min_pivot) {
            Some(p) => {
                let pa = precondition_matrix(&p, a);
                let pb = precondition_vector(&p, b);
                self.contract(&pa, x, &pb)
            }
            None => Proof::Maybe,
        }
    }

    /// Plain iteration: stops on emptiness, width tolerance, insufficient
    /// contraction, or the iteration cap.
    pub fn contract(
        &self,
        a: &IntervalMatrix,
        x: &mut IntervalVector,
        b: &IntervalVector,
    ) -> Proof {
        debug_assert_eq!(a.nrows(), a.ncols());
        debug_assert_eq!(a.nrows(), x.size());
        debug_assert_eq!(a.nrows(), b.size());

        tracing::trace!(dim = x.size(), "interval Gauss-Seidel");
        let mut nb_steps = 0usize;
        loop {
            nb_steps += 1;
            match self.inner_step(a, x, b) {
                StepOutcome::Empty => return Proof::Empty,
                StepOutcome::NoContraction => return Proof::Maybe,
                StepOutcome::Contracted => {}
            }
            if nb_steps > self.max_iter || self.has_tolerance(x) {
                return Proof::Maybe;
            }
        }
    }

    fn has_tolerance(&self, x: &IntervalVector) -> bool {
        x.iter().all(|v| self.xtol.has_tolerance(v))
    }

    // Inversion of each row whose pivot excludes zero:
    // x_i := ((b_i - sum_{j != i} A_ij x_j) / A_ii) intersected with x_i.
    fn inner_step(
        &self,
        a: &IntervalMatrix,
        x: &mut IntervalVector,
        b: &IntervalVector,
    ) -> StepOutcome {
        let n = x.size();
        let mut outcome = StepOutcome::NoContraction;
        for i in 0..n {
            if a.get(i, i).contains_zero() {
                continue;
            }
            let mut rhs = b.get(i);
            for j in 0..n {
                if j != i {
                    rhs -= a.get(i, j) * x.get(j);
                }
            }
            // projection of rhs = x_i * A_ii onto x_i
            let z = mul_px(x.get(i), a.get(i, i), rhs);
            if z.is_empty() {
                return StepOutcome::Empty;
            }
            if !self.dtol.have_dist_tolerance(&z, &x.get(i)) {
                outcome = StepOutcome::Contracted;
            }
            x.set(i, z);
        }
        outcome
    }
}

enum StepOutcome {
    Empty,
    Contracted,
    NoContraction,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::Interval;

    fn gs() -> IntervalGaussSeidel {
        IntervalGaussSeidel::new(50, Tolerance::rel(1e-6), Tolerance::rel(1e-6), 1e-8)
    }

    #[test]
    fn test_diagonally_dominant_system() {
        // 4x - y = 3, -x + 4y = 9: solution x = 7/5, y = 13/5
        let mut a = IntervalMatrix::new(2, 2, Interval::ZERO);
        a.set(0, 0, Interval::point(4.0));
        a.set(0, 1, Interval::point(-1.0));
        a.set(1, 0, Interval::point(-1.0));
        a.set(1, 1, Interval::point(4.0));
        let b = IntervalVector::from_fn(2, |i| Interval::point([3.0, 9.0][i]));
        let mut x = IntervalVector::new(2, Interval::new(-10.0, 10.0));
        let proof = gs().contract(&a, &mut x, &b);
        assert_ne!(proof, Proof::Empty);
        assert!(x.get(0).contains(1.4));
        assert!(x.get(1).contains(2.6));
        assert!(x.get(0).width() < 1e-4);
        assert!(x.get(1).width() < 1e-4);
    }

    #[test]
    fn test_infeasible_system() {
        // x = 1 and x = 3 cannot both hold
        let mut a = IntervalMatrix::new(2, 2, Interval::ZERO);
        a.set(0, 0, Interval::point(1.0));
        a.set(1, 0, Interval::point(1.0));
        a.set(1, 1, Interval::point(1e-12));
        let b = IntervalVector::from_fn(2, |i| Interval::point([1.0, 3.0][i]));
        let mut x = IntervalVector::new(2, Interval::new(-1e9, 1e9));
        // row 2: x + 1e-12 y = 3 with x pinned near 1 forces y out of range
        let proof = gs().contract(&a, &mut x, &b);
        // the first row pins x to 1; the second requires 1e-12 y = 2
        assert!(proof == Proof::Empty || x.get(1).left() > 1e9);
    }

    #[test]
    fn test_preconditioning_contracts() {
        // non diagonally dominant but well conditioned
        let mut a = IntervalMatrix::new(2, 2, Interval::ZERO);
        a.set(0, 0, Interval::point(1.0));
        a.set(0, 1, Interval::point(2.0));
        a.set(1, 0, Interval::point(3.0));
        a.set(1, 1, Interval::point(1.0));
        let b = IntervalVector::from_fn(2, |i| Interval::point([5.0, 5.0][i]));
        let mut x = IntervalVector::new(2, Interval::new(-100.0, 100.0));
        let proof = gs().contract_precond(&a, &mut x, &b);
        assert_ne!(proof, Proof::Empty);
        // solution (1, 2)
        assert!(x.get(0).contains(1.0));
        assert!(x.get(1).contains(2.0));
        assert!(x.get(0).width() < 1e-3);
    }
}
