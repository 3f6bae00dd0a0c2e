//! Variogram estimation and covariance model fitting
//!
//! The empirical semivariance of station values is binned by separation
//! distance h (Matheron estimator):
//! ```text
//! γ(h) = (1/2N(h)) Σ [z(xᵢ) - z(xⱼ)]²   for all pairs with |xᵢ-xⱼ| in bin(h)
//! ```
//! Bins are `n_bins` equal-width intervals on `[0, max_dist]`; pairs farther
//! apart than `max_dist` are ignored.
//!
//! A parametric model with nugget c₀, partial sill c and length scale ℓ is
//! fitted by bounded Levenberg–Marquardt least squares on the non-empty bins:
//! ```text
//! exponential  γ(h) = c₀ + c·[1 - exp(-h/ℓ)]
//! gaussian     γ(h) = c₀ + c·[1 - exp(-(h/ℓ)²)]
//! spherical    γ(h) = c₀ + c·[1.5(h/ℓ) - 0.5(h/ℓ)³]   (h < ℓ), c₀ + c beyond
//! ```
//!
//! Reference:
//! Matheron, G. (1963). Principles of geostatistics. Economic Geology.
//! Cressie, N. (1993). Statistics for Spatial Data. Wiley.

use metgrid_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::SamplePoint;
use crate::linalg;

/// Empirical variogram: semivariance values at discrete lag distances.
#[derive(Debug, Clone, Serialize)]
pub struct EmpiricalVariogram {
    /// Lag distances (bin centres)
    pub lags: Vec<f64>,
    /// Semivariance γ(h) per bin, NaN where the bin holds no pair
    pub semivariance: Vec<f64>,
    /// Number of point pairs contributing to each bin
    pub pair_counts: Vec<usize>,
}

impl EmpiricalVariogram {
    /// (lag, γ) of bins holding at least one pair
    pub fn non_empty(&self) -> Vec<(f64, f64)> {
        self.lags
            .iter()
            .zip(&self.semivariance)
            .zip(&self.pair_counts)
            .filter(|((_, sv), cnt)| **cnt > 0 && sv.is_finite())
            .map(|((&lag, &sv), _)| (lag, sv))
            .collect()
    }
}

/// Theoretical variogram model family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariogramModel {
    #[default]
    Exponential,
    Gaussian,
    Spherical,
}

impl VariogramModel {
    /// Correlation ρ(h) of the unit-sill, zero-nugget model
    pub fn correlation(&self, h: f64, len_scale: f64) -> f64 {
        let r = h / len_scale;
        match self {
            VariogramModel::Exponential => (-r).exp(),
            VariogramModel::Gaussian => (-r * r).exp(),
            VariogramModel::Spherical => {
                if r >= 1.0 {
                    0.0
                } else {
                    1.0 - 1.5 * r + 0.5 * r * r * r
                }
            }
        }
    }

    /// Distance at which the model reaches ~95% of its sill
    pub fn effective_range(&self, len_scale: f64) -> f64 {
        match self {
            VariogramModel::Exponential => 3.0 * len_scale,
            VariogramModel::Gaussian => 3.0_f64.sqrt() * len_scale,
            VariogramModel::Spherical => len_scale,
        }
    }
}

impl std::str::FromStr for VariogramModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "exponential" | "exp" => Ok(VariogramModel::Exponential),
            "gaussian" | "gau" => Ok(VariogramModel::Gaussian),
            "spherical" | "sph" => Ok(VariogramModel::Spherical),
            other => Err(Error::InvalidParameter {
                name: "variogram_model",
                value: other.to_string(),
                reason: "expected exponential, gaussian or spherical".into(),
            }),
        }
    }
}

/// Fitted variogram model parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedVariogram {
    pub model: VariogramModel,
    /// Nugget (c₀): semivariance at h → 0⁺
    pub nugget: f64,
    /// Partial sill (c)
    pub partial_sill: f64,
    /// Sill (c₀ + c)
    pub sill: f64,
    /// Length scale ℓ
    pub len_scale: f64,
    /// Effective range derived from ℓ
    pub range: f64,
    /// Pseudo-R² of the fit over the non-empty bins
    pub r2: f64,
    /// Residual sum of squares of the fit
    pub rss: f64,
}

impl FittedVariogram {
    /// Build from parameters; derived fields are filled in.
    pub fn new(model: VariogramModel, nugget: f64, partial_sill: f64, len_scale: f64) -> Self {
        Self {
            model,
            nugget,
            partial_sill,
            sill: nugget + partial_sill,
            len_scale,
            range: model.effective_range(len_scale),
            r2: f64::NAN,
            rss: f64::NAN,
        }
    }

    /// Semivariance γ(h); zero at h = 0
    pub fn evaluate(&self, h: f64) -> f64 {
        if h < 1e-12 {
            return 0.0;
        }
        self.nugget + self.partial_sill * (1.0 - self.model.correlation(h, self.len_scale))
    }

    /// Covariance C(h) = sill − γ(h); the nugget only contributes at h = 0
    pub fn covariance(&self, h: f64) -> f64 {
        self.sill - self.evaluate(h)
    }

    /// Covariance of the smooth part only, c·ρ(h)
    pub fn structural_covariance(&self, h: f64) -> f64 {
        self.partial_sill * self.model.correlation(h, self.len_scale)
    }
}

/// Parameters for empirical variogram computation
#[derive(Debug, Clone)]
pub struct VariogramParams {
    /// Number of lag bins (default 16)
    pub n_bins: usize,
    /// Upper edge of the last bin in metres (default 5000)
    pub max_dist: f64,
}

impl Default for VariogramParams {
    fn default() -> Self {
        Self {
            n_bins: 16,
            max_dist: 5000.0,
        }
    }
}

/// Compute the empirical (experimental) variogram from sample points.
///
/// # Arguments
/// * `points` — Sample points with (x, y, value)
/// * `params` — Bin count and maximum distance
///
/// # Returns
/// [`EmpiricalVariogram`] with bin centres, semivariance, and pair counts.
pub fn empirical_variogram(
    points: &[SamplePoint],
    params: &VariogramParams,
) -> Result<EmpiricalVariogram> {
    let n = points.len();
    if n < 2 {
        return Err(Error::Algorithm("Need at least 2 points for variogram".into()));
    }
    if params.n_bins == 0 {
        return Err(Error::InvalidParameter {
            name: "variogram_bins",
            value: "0".into(),
            reason: "need at least one bin".into(),
        });
    }
    if !(params.max_dist > 0.0) {
        return Err(Error::InvalidParameter {
            name: "variogram_max_dist",
            value: params.max_dist.to_string(),
            reason: "must be positive".into(),
        });
    }

    let n_bins = params.n_bins;
    let bin_width = params.max_dist / n_bins as f64;
    let lags: Vec<f64> = (0..n_bins).map(|k| (k as f64 + 0.5) * bin_width).collect();
    let mut sums = vec![0.0_f64; n_bins];
    let mut pair_counts = vec![0_usize; n_bins];

    for i in 0..n {
        for j in (i + 1)..n {
            let d = points[i].dist(points[j].x, points[j].y);
            if d > params.max_dist {
                continue;
            }
            // Right edge of the last bin is inclusive
            let bin = ((d / bin_width) as usize).min(n_bins - 1);
            let dz = points[i].value - points[j].value;
            sums[bin] += dz * dz;
            pair_counts[bin] += 1;
        }
    }

    let semivariance = sums
        .iter()
        .zip(&pair_counts)
        .map(|(&s, &c)| if c > 0 { s / (2.0 * c as f64) } else { f64::NAN })
        .collect();

    Ok(EmpiricalVariogram {
        lags,
        semivariance,
        pair_counts,
    })
}

const LM_MAX_ITER: usize = 500;
const LM_TOL: f64 = 1e-10;
const LM_LAMBDA_MAX: f64 = 1e16;

/// Fit a theoretical variogram model to an empirical variogram.
///
/// Bounded Levenberg–Marquardt on (nugget, partial sill, length scale) with
/// `nugget ≥ 0`, `partial sill > 0`, `length scale > 0`. Every non-empty bin
/// has unit weight.
///
/// # Errors
/// - Fewer than 3 non-empty bins
/// - Non-finite residuals or parameters
/// - No convergence within the iteration limit
pub fn fit_variogram(
    empirical: &EmpiricalVariogram,
    model: VariogramModel,
) -> Result<FittedVariogram> {
    let bins = empirical.non_empty();
    if bins.len() < 3 {
        return Err(Error::Algorithm(format!(
            "Need at least 3 non-empty lag bins to fit variogram, got {}",
            bins.len()
        )));
    }

    let max_lag = bins.iter().map(|b| b.0).fold(0.0_f64, f64::max);
    let min_sv = bins.iter().map(|b| b.1).fold(f64::INFINITY, f64::min);
    let max_sv = bins.iter().map(|b| b.1).fold(0.0_f64, f64::max);
    if !(max_sv > 0.0) {
        return Err(Error::Algorithm("All semivariance values are zero".into()));
    }

    let lower = [0.0, max_sv * 1e-9, max_lag * 1e-6];
    let scale = [max_sv, max_sv, max_lag];
    let project = |p: [f64; 3]| -> [f64; 3] {
        [p[0].max(lower[0]), p[1].max(lower[1]), p[2].max(lower[2])]
    };
    let residuals = |p: &[f64; 3]| -> Vec<f64> {
        let m = FittedVariogram::new(model, p[0], p[1], p[2]);
        bins.iter().map(|&(h, sv)| m.evaluate(h) - sv).collect()
    };
    let cost = |r: &[f64]| -> f64 { r.iter().map(|v| v * v).sum() };

    let nugget0 = (0.5 * min_sv).max(0.0);
    let mut p = project([nugget0, (max_sv - nugget0).max(lower[1]), max_lag / 3.0]);
    let mut r = residuals(&p);
    let mut ss = cost(&r);
    let mut lambda = 1e-3;
    let mut converged = false;

    for iter in 0..LM_MAX_ITER {
        // Forward-difference Jacobian, m × 3
        let mut jac = vec![[0.0_f64; 3]; bins.len()];
        for k in 0..3 {
            let step = 1e-7 * p[k].abs().max(scale[k]);
            let mut q = p;
            q[k] += step;
            let rq = residuals(&q);
            for (row, (a, b)) in jac.iter_mut().zip(rq.iter().zip(&r)) {
                row[k] = (a - b) / step;
            }
        }

        let mut jtj = [0.0_f64; 9];
        let mut jtr = [0.0_f64; 3];
        for (row, &res) in jac.iter().zip(&r) {
            for a in 0..3 {
                jtr[a] += row[a] * res;
                for b in 0..3 {
                    jtj[a * 3 + b] += row[a] * row[b];
                }
            }
        }

        let mut improved = false;
        while lambda < LM_LAMBDA_MAX {
            let mut damped = jtj;
            for a in 0..3 {
                damped[a * 3 + a] += lambda * jtj[a * 3 + a].max(1e-300);
            }
            let neg: Vec<f64> = jtr.iter().map(|v| -v).collect();
            let Ok(delta) = linalg::solve(3, &damped, &neg) else {
                lambda *= 10.0;
                continue;
            };
            let trial = project([p[0] + delta[0], p[1] + delta[1], p[2] + delta[2]]);
            let r_trial = residuals(&trial);
            let ss_trial = cost(&r_trial);
            if ss_trial.is_finite() && ss_trial < ss {
                let rel = (ss - ss_trial) / ss.max(f64::MIN_POSITIVE);
                let step = (0..3)
                    .map(|k| (trial[k] - p[k]).abs() / p[k].abs().max(scale[k]))
                    .fold(0.0_f64, f64::max);
                p = trial;
                r = r_trial;
                ss = ss_trial;
                // Tiny steps under heavy damping are not convergence
                if (rel < LM_TOL || step < LM_TOL) && lambda < 1e3 {
                    converged = true;
                }
                lambda = (lambda / 10.0).max(1e-12);
                improved = true;
                break;
            }
            lambda *= 10.0;
        }

        if !improved {
            // No downhill step at any damping: local minimum
            debug!("variogram LM stalled after {iter} iterations, ss={ss:.4e}");
            converged = true;
        }
        if converged || ss == 0.0 {
            converged = true;
            break;
        }
    }

    if !converged {
        return Err(Error::Algorithm(format!(
            "{model:?} variogram fit did not converge in {LM_MAX_ITER} iterations"
        )));
    }
    if !(ss.is_finite() && p.iter().all(|v| v.is_finite())) {
        return Err(Error::Algorithm("variogram fit produced non-finite parameters".into()));
    }

    let mean_sv = bins.iter().map(|b| b.1).sum::<f64>() / bins.len() as f64;
    let ss_tot: f64 = bins.iter().map(|b| (b.1 - mean_sv) * (b.1 - mean_sv)).sum();
    let r2 = if ss_tot > 0.0 { 1.0 - ss / ss_tot } else { f64::NAN };

    let mut fitted = FittedVariogram::new(model, p[0], p[1], p[2]);
    fitted.r2 = r2;
    fitted.rss = ss;
    Ok(fitted)
}
