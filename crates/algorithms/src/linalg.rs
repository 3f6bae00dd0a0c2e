//! Dense linear solvers shared by regression and kriging
//!
//! Matrices are row-major `n × n` slices. Small systems only: the ridge
//! normal equations (predictors × predictors) and the kriging system
//! (stations + drift terms).

use metgrid_core::{Error, Result};

/// Pivots below `PIVOT_RTOL · n · max|aᵢⱼ|` are treated as zero
const PIVOT_RTOL: f64 = f64::EPSILON;

/// Solve `mat · x = rhs` by Gaussian elimination with partial pivoting.
pub fn solve(n: usize, mat: &[f64], rhs: &[f64]) -> Result<Vec<f64>> {
    LuFactor::new(n, mat.to_vec())?.solve(rhs)
}

/// LU factorisation with partial pivoting, `P·A = L·U`.
///
/// Factor once, solve for many right-hand sides.
#[derive(Debug, Clone)]
pub struct LuFactor {
    n: usize,
    lu: Vec<f64>,
    perm: Vec<usize>,
}

impl LuFactor {
    pub fn new(n: usize, mut mat: Vec<f64>) -> Result<Self> {
        if mat.len() != n * n {
            return Err(Error::Algorithm(format!(
                "LU: expected {} entries, got {}",
                n * n,
                mat.len()
            )));
        }
        let mut perm: Vec<usize> = (0..n).collect();
        let max_abs = mat.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let tolerance = PIVOT_RTOL * n as f64 * max_abs;

        for col in 0..n {
            let mut max_val = mat[col * n + col].abs();
            let mut max_row = col;
            for row in (col + 1)..n {
                let val = mat[row * n + col].abs();
                if val > max_val {
                    max_val = val;
                    max_row = row;
                }
            }

            if max_val <= tolerance || !max_val.is_finite() {
                return Err(Error::Algorithm("singular matrix".into()));
            }

            if max_row != col {
                for j in 0..n {
                    mat.swap(col * n + j, max_row * n + j);
                }
                perm.swap(col, max_row);
            }

            let pivot = mat[col * n + col];
            for row in (col + 1)..n {
                let factor = mat[row * n + col] / pivot;
                mat[row * n + col] = factor;
                for j in (col + 1)..n {
                    mat[row * n + j] -= factor * mat[col * n + j];
                }
            }
        }

        Ok(Self { n, lu: mat, perm })
    }

    /// System size
    pub fn dim(&self) -> usize {
        self.n
    }

    /// Solve for one right-hand side
    pub fn solve(&self, rhs: &[f64]) -> Result<Vec<f64>> {
        let n = self.n;
        if rhs.len() != n {
            return Err(Error::Algorithm(format!(
                "LU: rhs length {} != {}",
                rhs.len(),
                n
            )));
        }

        // Forward substitution on the permuted rhs (unit lower triangle)
        let mut x: Vec<f64> = self.perm.iter().map(|&p| rhs[p]).collect();
        for row in 1..n {
            let mut sum = x[row];
            for j in 0..row {
                sum -= self.lu[row * n + j] * x[j];
            }
            x[row] = sum;
        }

        for row in (0..n).rev() {
            let mut sum = x[row];
            for j in (row + 1)..n {
                sum -= self.lu[row * n + j] * x[j];
            }
            x[row] = sum / self.lu[row * n + row];
        }

        Ok(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_solve_3x3() {
        // 2x + y - z = 8, -3x - y + 2z = -11, -2x + y + 2z = -3
        let mat = [2.0, 1.0, -1.0, -3.0, -1.0, 2.0, -2.0, 1.0, 2.0];
        let x = solve(3, &mat, &[8.0, -11.0, -3.0]).unwrap();
        assert_abs_diff_eq!(x[0], 2.0, epsilon = 1e-10);
        assert_abs_diff_eq!(x[1], 3.0, epsilon = 1e-10);
        assert_abs_diff_eq!(x[2], -1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_requires_pivoting() {
        // Zero on the leading diagonal
        let lu = LuFactor::new(2, vec![0.0, 1.0, 1.0, 0.0]).unwrap();
        let x = lu.solve(&[3.0, 5.0]).unwrap();
        assert_abs_diff_eq!(x[0], 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(x[1], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_singular() {
        assert!(LuFactor::new(2, vec![1.0, 2.0, 2.0, 4.0]).is_err());
    }

    #[test]
    fn test_singularity_is_scale_free() {
        let tiny = LuFactor::new(2, vec![4e-20, 1e-20, 1e-20, 3e-20]).unwrap();
        let x = tiny.solve(&[1e-20, 2e-20]).unwrap();
        assert_abs_diff_eq!(x[0], 1.0 / 11.0, epsilon = 1e-12);
        assert_abs_diff_eq!(x[1], 7.0 / 11.0, epsilon = 1e-12);

        assert!(LuFactor::new(2, vec![1e20, 2e20, 2e20, 4e20]).is_err());
        assert!(LuFactor::new(2, vec![0.0; 4]).is_err());
    }

    #[test]
    fn test_many_rhs() {
        let lu = LuFactor::new(2, vec![4.0, 1.0, 1.0, 3.0]).unwrap();
        for b in [[1.0, 2.0], [0.0, 1.0], [5.0, -2.0]] {
            let x = lu.solve(&b).unwrap();
            assert_abs_diff_eq!(4.0 * x[0] + x[1], b[0], epsilon = 1e-12);
            assert_abs_diff_eq!(x[0] + 3.0 * x[1], b[1], epsilon = 1e-12);
        }
    }
}
