//! Ridge regression with intercept
//!
//! Predictors and targets are centred, so the penalty acts on slopes only:
//! ```text
//! (X̃ᵀX̃ + αI) β = X̃ᵀỹ,   β₀ = ȳ − x̄ᵀβ
//! ```
//! Several targets can share one model; coefficients are stored per output.

use metgrid_core::{Error, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, concatenate};
use serde::{Deserialize, Serialize};

use crate::linalg::LuFactor;

/// Fitted linear model, possibly multi-output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RidgeModel {
    /// Slopes, `(n_features, n_outputs)`
    pub coefficients: Array2<f64>,
    /// One intercept per output
    pub intercept: Array1<f64>,
    /// Regularisation strength per output
    pub alpha: Vec<f64>,
}

impl RidgeModel {
    pub fn n_features(&self) -> usize {
        self.coefficients.nrows()
    }

    pub fn n_outputs(&self) -> usize {
        self.coefficients.ncols()
    }

    /// Predict `(n_samples, n_outputs)` from `(n_samples, n_features)`.
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features() {
            return Err(Error::InvalidInput(format!(
                "model expects {} predictors, got {}",
                self.n_features(),
                x.ncols()
            )));
        }
        // Row by row, so a sample's prediction never depends on its batch
        let mut out = Array2::zeros((x.nrows(), self.n_outputs()));
        for (row, mut pred) in x.outer_iter().zip(out.outer_iter_mut()) {
            for (k, p) in pred.iter_mut().enumerate() {
                let mut acc = self.intercept[k];
                for (j, &v) in row.iter().enumerate() {
                    acc += v * self.coefficients[[j, k]];
                }
                *p = acc;
            }
        }
        Ok(out)
    }

    /// Predict the single output of a one-output model.
    pub fn predict_one(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        if self.n_outputs() != 1 {
            return Err(Error::InvalidInput(format!(
                "predict_one on a model with {} outputs",
                self.n_outputs()
            )));
        }
        Ok(self.predict(x)?.column(0).to_owned())
    }

    /// Join models sharing the same predictors into one multi-output model.
    pub fn stack(models: &[RidgeModel]) -> Result<RidgeModel> {
        let first = models
            .first()
            .ok_or_else(|| Error::InvalidInput("no models to stack".into()))?;
        if models.iter().any(|m| m.n_features() != first.n_features()) {
            return Err(Error::InvalidInput(
                "stacked models must share the predictor count".into(),
            ));
        }
        let coefs: Vec<_> = models.iter().map(|m| m.coefficients.view()).collect();
        let intercepts: Vec<_> = models.iter().map(|m| m.intercept.view()).collect();
        Ok(RidgeModel {
            coefficients: concatenate(Axis(1), &coefs)?,
            intercept: concatenate(Axis(0), &intercepts)?,
            alpha: models.iter().flat_map(|m| m.alpha.iter().copied()).collect(),
        })
    }
}

/// Fit ridge regression of every column of `y` on `x` with strength `alpha`.
pub fn fit_ridge(x: ArrayView2<'_, f64>, y: ArrayView2<'_, f64>, alpha: f64) -> Result<RidgeModel> {
    let (n, p) = x.dim();
    if n == 0 {
        return Err(Error::Algorithm("ridge: no training rows".into()));
    }
    if y.nrows() != n {
        return Err(Error::SizeMismatch {
            er: n,
            ec: y.ncols(),
            ar: y.nrows(),
            ac: y.ncols(),
        });
    }
    if !(alpha >= 0.0) {
        return Err(Error::InvalidParameter {
            name: "alpha",
            value: alpha.to_string(),
            reason: "must be non-negative".into(),
        });
    }

    let x_mean = x.mean_axis(Axis(0)).ok_or_else(|| Error::Algorithm("ridge: empty X".into()))?;
    let y_mean = y.mean_axis(Axis(0)).ok_or_else(|| Error::Algorithm("ridge: empty y".into()))?;
    let xc = &x - &x_mean;
    let yc = &y - &y_mean;

    // Normal equations: (XcᵀXc + αI) β = Xcᵀ yc
    let mut gram = xc.t().dot(&xc);
    for i in 0..p {
        gram[[i, i]] += alpha;
    }
    let xty = xc.t().dot(&yc);

    let mut coefficients = Array2::<f64>::zeros((p, y.ncols()));
    if p > 0 {
        let lu = LuFactor::new(p, gram.iter().copied().collect())
            .map_err(|e| Error::Algorithm(format!("ridge (alpha={alpha}): {e}")))?;
        for (k, rhs) in xty.axis_iter(Axis(1)).enumerate() {
            let beta = lu.solve(&rhs.to_vec())?;
            coefficients.column_mut(k).assign(&Array1::from(beta));
        }
    }

    let intercept = &y_mean - &x_mean.dot(&coefficients);
    Ok(RidgeModel {
        coefficients,
        intercept,
        alpha: vec![alpha; y.ncols()],
    })
}

/// Coefficient of determination, `1 − SSres/SStot`.
///
/// A constant target scores 1.0 when predicted exactly, else 0.0.
pub fn r2_score(observed: ArrayView1<'_, f64>, predicted: ArrayView1<'_, f64>) -> f64 {
    let n = observed.len();
    if n == 0 {
        return f64::NAN;
    }
    let mean = observed.sum() / n as f64;
    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for (&o, &p) in observed.iter().zip(predicted.iter()) {
        ss_res += (o - p) * (o - p);
        ss_tot += (o - mean) * (o - mean);
    }
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_ols_limit_recovers_plane() {
        // y = 3 + 2·x0 − x1
        let x = array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0], [2.0, 3.0]];
        let y = x.map_axis(Axis(1), |r| 3.0 + 2.0 * r[0] - r[1]).insert_axis(Axis(1));
        let model = fit_ridge(x.view(), y.view(), 0.0).unwrap();
        assert_abs_diff_eq!(model.coefficients[[0, 0]], 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(model.coefficients[[1, 0]], -1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(model.intercept[0], 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_penalty_shrinks_slopes_not_intercept() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![[10.0], [12.0], [14.0], [16.0]];
        let ols = fit_ridge(x.view(), y.view(), 0.0).unwrap();
        let ridge = fit_ridge(x.view(), y.view(), 5.0).unwrap();
        assert!(ridge.coefficients[[0, 0]] < ols.coefficients[[0, 0]]);
        // Prediction at the predictor mean equals the target mean either way
        let at_mean = ridge.predict(array![[1.5]].view()).unwrap();
        assert_abs_diff_eq!(at_mean[[0, 0]], 13.0, epsilon = 1e-9);
    }

    #[test]
    fn test_stack_matches_separate_models() {
        let x = array![[0.0, 1.0], [1.0, 0.5], [2.0, 2.0], [3.0, 1.0], [4.0, 0.0]];
        let y1 = array![[1.0], [2.0], [2.5], [4.0], [5.5]];
        let y2 = array![[50.0], [48.0], [47.0], [41.0], [40.0]];
        let m1 = fit_ridge(x.view(), y1.view(), 0.1).unwrap();
        let m2 = fit_ridge(x.view(), y2.view(), 0.4).unwrap();
        let stacked = RidgeModel::stack(&[m1.clone(), m2.clone()]).unwrap();
        assert_eq!(stacked.n_outputs(), 2);
        assert_eq!(stacked.alpha, vec![0.1, 0.4]);

        let p = stacked.predict(x.view()).unwrap();
        let p1 = m1.predict_one(x.view()).unwrap();
        let p2 = m2.predict_one(x.view()).unwrap();
        for i in 0..x.nrows() {
            assert_abs_diff_eq!(p[[i, 0]], p1[i], epsilon = 1e-12);
            assert_abs_diff_eq!(p[[i, 1]], p2[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_r2_score() {
        let obs = array![1.0, 2.0, 3.0];
        assert_abs_diff_eq!(r2_score(obs.view(), obs.view()), 1.0);
        let mean = array![2.0, 2.0, 2.0];
        assert_abs_diff_eq!(r2_score(obs.view(), mean.view()), 0.0);
        let flat = array![4.0, 4.0];
        assert_eq!(r2_score(flat.view(), array![4.0, 5.0].view()), 0.0);
    }

    #[test]
    fn test_wrong_predictor_count() {
        let x = array![[0.0], [1.0]];
        let y = array![[0.0], [1.0]];
        let model = fit_ridge(x.view(), y.view(), 0.1).unwrap();
        assert!(model.predict(array![[1.0, 2.0]].view()).is_err());
    }
}
