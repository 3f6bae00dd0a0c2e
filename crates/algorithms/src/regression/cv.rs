//! Cross-validated choice of the ridge strength

use metgrid_core::{Error, Result};
use ndarray::{ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ridge::{fit_ridge, r2_score, RidgeModel};

/// Candidate strengths: `linspace(0, 1, 21)` with the zero replaced by 0.001.
pub fn default_alphas() -> Vec<f64> {
    let mut alphas: Vec<f64> = (0..=20).map(|i| i as f64 / 20.0).collect();
    alphas[0] = 0.001;
    alphas
}

/// Parameters for [`train_ridge_cv`]
#[derive(Debug, Clone)]
pub struct RidgeCvParams {
    /// Candidate regularisation strengths, tried in order
    pub alphas: Vec<f64>,
    /// Number of contiguous folds (default 4)
    pub n_folds: usize,
}

impl Default for RidgeCvParams {
    fn default() -> Self {
        Self {
            alphas: default_alphas(),
            n_folds: 4,
        }
    }
}

/// Trained model plus its tuning record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RidgeFit {
    pub model: RidgeModel,
    /// Selected regularisation strength
    pub alpha: f64,
    /// Mean fold R² of the selected strength
    pub r2_cv: f64,
    /// In-sample R² of the refitted model
    pub r2_train: f64,
}

/// Contiguous, unshuffled fold boundaries.
///
/// The first `n % k` folds hold one extra row. Returns `(start, end)` of each
/// held-out block.
pub fn kfold_bounds(n: usize, k: usize) -> Vec<(usize, usize)> {
    let base = n / k;
    let extra = n % k;
    let mut bounds = Vec::with_capacity(k);
    let mut start = 0;
    for fold in 0..k {
        let len = base + usize::from(fold < extra);
        bounds.push((start, start + len));
        start += len;
    }
    bounds
}

/// Fit ridge regression, choosing the strength by k-fold CV R².
///
/// Each candidate is scored by its mean held-out R²; ties keep the earlier
/// candidate. The winner is refitted on all rows.
pub fn train_ridge_cv(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    params: &RidgeCvParams,
) -> Result<RidgeFit> {
    let n = x.nrows();
    let k = params.n_folds;
    if k < 2 {
        return Err(Error::InvalidParameter {
            name: "n_folds",
            value: k.to_string(),
            reason: "need at least 2 folds".into(),
        });
    }
    if n < k {
        return Err(Error::Algorithm(format!(
            "ridge CV: {n} rows cannot be split into {k} folds"
        )));
    }
    if y.len() != n {
        return Err(Error::SizeMismatch { er: n, ec: 1, ar: y.len(), ac: 1 });
    }
    if params.alphas.is_empty() {
        return Err(Error::InvalidParameter {
            name: "alphas",
            value: "[]".into(),
            reason: "need at least one candidate".into(),
        });
    }

    let y2 = y.insert_axis(Axis(1));
    let folds = kfold_bounds(n, k);

    let mut best: Option<(f64, f64)> = None;
    for &alpha in &params.alphas {
        let mut total = 0.0;
        for &(start, end) in &folds {
            let train_idx: Vec<usize> = (0..start).chain(end..n).collect();
            let x_train = x.select(Axis(0), &train_idx);
            let y_train = y2.select(Axis(0), &train_idx);
            let model = fit_ridge(x_train.view(), y_train.view(), alpha)?;

            let x_test = x.slice(ndarray::s![start..end, ..]);
            let predicted = model.predict_one(x_test)?;
            total += r2_score(y.slice(ndarray::s![start..end]), predicted.view());
        }
        let score = total / k as f64;
        debug!("ridge alpha={alpha:.3} cv_r2={score:.4}");

        if best.is_none_or(|(_, s)| score > s) {
            best = Some((alpha, score));
        }
    }

    let (alpha, r2_cv) = best.ok_or_else(|| Error::Algorithm("ridge CV: no candidate scored".into()))?;
    let model = fit_ridge(x, y2, alpha)?;
    let fitted = model.predict_one(x)?;
    let r2_train = r2_score(y, fitted.view());

    Ok(RidgeFit {
        model,
        alpha,
        r2_cv,
        r2_train,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array2};

    fn lcg(state: &mut u64) -> f64 {
        *state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (*state >> 33) as f64 / (1u64 << 31) as f64
    }

    #[test]
    fn test_default_alphas() {
        let a = default_alphas();
        assert_eq!(a.len(), 21);
        assert_eq!(a[0], 0.001);
        assert_abs_diff_eq!(a[1], 0.05);
        assert_abs_diff_eq!(a[20], 1.0);
    }

    #[test]
    fn test_fold_sizes() {
        assert_eq!(kfold_bounds(10, 4), vec![(0, 3), (3, 6), (6, 8), (8, 10)]);
        assert_eq!(kfold_bounds(8, 4), vec![(0, 2), (2, 4), (4, 6), (6, 8)]);
    }

    #[test]
    fn test_linear_signal_scores_high() {
        let mut rng = 7u64;
        let n = 60;
        let x = Array2::from_shape_fn((n, 2), |_| lcg(&mut rng) * 10.0);
        let y = Array1::from_shape_fn(n, |i| 1.5 * x[[i, 0]] + 4.0 + 0.01 * lcg(&mut rng));

        let fit = train_ridge_cv(x.view(), y.view(), &RidgeCvParams::default()).unwrap();
        assert!(fit.r2_cv > 0.99, "cv r2 {}", fit.r2_cv);
        assert!(fit.r2_train > 0.99, "train r2 {}", fit.r2_train);
        assert!(default_alphas().contains(&fit.alpha));
    }

    #[test]
    fn test_noise_scores_low() {
        let mut rng = 99u64;
        let n = 60;
        let x = Array2::from_shape_fn((n, 3), |_| lcg(&mut rng));
        let y = Array1::from_shape_fn(n, |_| lcg(&mut rng));

        let fit = train_ridge_cv(x.view(), y.view(), &RidgeCvParams::default()).unwrap();
        assert!(fit.r2_cv < 0.5, "cv r2 {}", fit.r2_cv);
    }

    #[test]
    fn test_ties_keep_first_alpha() {
        // No predictors: every strength gives the same model
        let x = Array2::<f64>::zeros((8, 0));
        let y = Array1::from(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let fit = train_ridge_cv(x.view(), y.view(), &RidgeCvParams::default()).unwrap();
        assert_eq!(fit.alpha, 0.001);
    }

    #[test]
    fn test_too_few_rows() {
        let x = Array2::<f64>::zeros((3, 1));
        let y = Array1::<f64>::zeros(3);
        assert!(train_ridge_cv(x.view(), y.view(), &RidgeCvParams::default()).is_err());
    }
}
