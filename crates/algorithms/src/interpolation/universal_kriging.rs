//! Universal Kriging (UK) interpolation
//!
//! Kriging with a linear drift {1, x, y} using every conditioning point. The
//! system is written in covariance form:
//! ```text
//! [C(xᵢ,xⱼ) | fₖ(xᵢ)] [wᵢ]   [c₀(xᵢ,x₀)]
//! [---------+--------] [  ] = [---------]
//! [fₖ(xᵢ)ᵀ |    0   ] [μₖ]   [fₖ(x₀)   ]
//! ```
//! The matrix does not depend on the target, so it is factorised once and
//! the estimate is evaluated in dual form, `ẑ(x₀) = [c₀; f₀]ᵀ K⁻¹ [z; 0]`.
//!
//! With `exact = true` the target covariance includes the nugget at zero
//! distance, so the estimate honours the data at conditioning points. With
//! `exact = false` the nugget is treated as measurement noise and only the
//! smooth part c·ρ(h) enters the right-hand side.
//!
//! Reference:
//! Matheron, G. (1969). Le Krigeage Universel. Cahiers du CMMM.
//! Cressie, N. (1993). Statistics for Spatial Data. Wiley.

use crate::maybe_rayon::*;
use metgrid_core::raster::{GeoTransform, Raster};
use metgrid_core::{Error, Result};
use ndarray::Array2;

use super::variogram::FittedVariogram;
use super::SamplePoint;
use crate::linalg::LuFactor;

/// Number of linear drift functions {1, x, y}
const N_DRIFT: usize = 3;

/// Parameters for Universal Kriging interpolation
#[derive(Debug, Clone)]
pub struct UniversalKrigingParams {
    /// Output raster rows
    pub rows: usize,
    /// Output raster columns
    pub cols: usize,
    /// Output raster geotransform
    pub transform: GeoTransform,
    /// Honour the data at conditioning points (default true)
    pub exact: bool,
    /// Whether to produce a kriging variance raster
    pub compute_variance: bool,
}

impl Default for UniversalKrigingParams {
    fn default() -> Self {
        Self {
            rows: 100,
            cols: 100,
            transform: GeoTransform::default(),
            exact: true,
            compute_variance: false,
        }
    }
}

/// Result of Universal Kriging interpolation
#[derive(Debug, Clone)]
pub struct UniversalKrigingResult {
    /// Interpolated values
    pub estimate: Raster,
    /// Kriging variance (estimation uncertainty). `None` if not requested.
    pub variance: Option<Raster>,
}

/// A factorised kriging system for one set of conditioning points.
#[derive(Debug, Clone)]
pub struct UniversalKriging {
    xs: Vec<f64>,
    ys: Vec<f64>,
    variogram: FittedVariogram,
    exact: bool,
    // Drift coordinates are centred and scaled for conditioning
    center: (f64, f64),
    scale: f64,
    lu: LuFactor,
}

impl UniversalKriging {
    /// Assemble and factorise the kriging matrix.
    ///
    /// # Errors
    /// - Fewer than 4 points (3 drift terms + 1)
    /// - Singular system, e.g. duplicate or collinear points
    pub fn new(points: &[SamplePoint], variogram: &FittedVariogram, exact: bool) -> Result<Self> {
        let n = points.len();
        if n < N_DRIFT + 1 {
            return Err(Error::Algorithm(format!(
                "Universal Kriging with linear drift requires at least {} points, got {}",
                N_DRIFT + 1,
                n
            )));
        }
        if !(variogram.sill > 0.0 && variogram.len_scale > 0.0) {
            return Err(Error::Algorithm(format!(
                "degenerate covariance model: sill={}, len_scale={}",
                variogram.sill, variogram.len_scale
            )));
        }

        let xs: Vec<f64> = points.iter().map(|p| p.x).collect();
        let ys: Vec<f64> = points.iter().map(|p| p.y).collect();
        let cx = xs.iter().sum::<f64>() / n as f64;
        let cy = ys.iter().sum::<f64>() / n as f64;
        let scale = xs
            .iter()
            .zip(&ys)
            .map(|(x, y)| (x - cx).abs().max((y - cy).abs()))
            .fold(0.0_f64, f64::max)
            .max(1.0);

        let m = n + N_DRIFT;
        let mut mat = vec![0.0_f64; m * m];

        // Upper-left: covariance matrix (n × n), C(0) = sill on the diagonal
        for i in 0..n {
            mat[i * m + i] = variogram.covariance(0.0);
            for j in (i + 1)..n {
                let h = points[i].dist(points[j].x, points[j].y);
                let c = variogram.covariance(h);
                mat[i * m + j] = c;
                mat[j * m + i] = c;
            }
        }

        // Upper-right and lower-left: drift functions
        for i in 0..n {
            let f = drift_values(xs[i], ys[i], (cx, cy), scale);
            for (l, fv) in f.iter().enumerate() {
                mat[i * m + n + l] = *fv;
                mat[(n + l) * m + i] = *fv;
            }
        }

        let lu = LuFactor::new(m, mat).map_err(|e| {
            Error::Algorithm(format!("UK: cannot factorise kriging system ({e})"))
        })?;

        Ok(Self {
            xs,
            ys,
            variogram: variogram.clone(),
            exact,
            center: (cx, cy),
            scale,
            lu,
        })
    }

    /// Number of conditioning points
    pub fn n_points(&self) -> usize {
        self.xs.len()
    }

    /// Dual weights `K⁻¹ [z; 0]` for conditioning values `z`.
    pub fn dual_weights(&self, values: &[f64]) -> Result<Vec<f64>> {
        if values.len() != self.n_points() {
            return Err(Error::InvalidInput(format!(
                "UK: {} values for {} conditioning points",
                values.len(),
                self.n_points()
            )));
        }
        let mut rhs = values.to_vec();
        rhs.extend([0.0; N_DRIFT]);
        self.lu.solve(&rhs)
    }

    /// Right-hand side `[c₀; f₀]` for target (x, y)
    fn target_vector(&self, x: f64, y: f64) -> Vec<f64> {
        let n = self.n_points();
        let mut rhs = Vec::with_capacity(n + N_DRIFT);
        for i in 0..n {
            let dx = self.xs[i] - x;
            let dy = self.ys[i] - y;
            let h = (dx * dx + dy * dy).sqrt();
            rhs.push(if self.exact {
                self.variogram.covariance(h)
            } else {
                self.variogram.structural_covariance(h)
            });
        }
        rhs.extend(drift_values(x, y, self.center, self.scale));
        rhs
    }

    /// Estimate at (x, y) from precomputed dual weights
    pub fn estimate_with(&self, dual: &[f64], x: f64, y: f64) -> f64 {
        self.target_vector(x, y)
            .iter()
            .zip(dual)
            .map(|(a, b)| a * b)
            .sum()
    }

    /// Kriging variance at (x, y)
    pub fn variance_at(&self, x: f64, y: f64) -> Result<f64> {
        let rhs = self.target_vector(x, y);
        let sol = self.lu.solve(&rhs)?;
        let prior = if self.exact {
            self.variogram.sill
        } else {
            self.variogram.partial_sill
        };
        let reduction: f64 = sol.iter().zip(&rhs).map(|(a, b)| a * b).sum();
        Ok((prior - reduction).max(0.0))
    }

    /// Estimate on a structured grid; `x_axis` gives columns, `y_axis` rows.
    pub fn estimate_grid(&self, values: &[f64], x_axis: &[f64], y_axis: &[f64]) -> Result<Array2<f64>> {
        let dual = self.dual_weights(values)?;
        let cols = x_axis.len();
        let data: Vec<f64> = y_axis
            .to_vec()
            .into_par_iter()
            .flat_map(|y| {
                x_axis
                    .iter()
                    .map(|&x| self.estimate_with(&dual, x, y))
                    .collect::<Vec<f64>>()
            })
            .collect();
        Ok(Array2::from_shape_vec((y_axis.len(), cols), data)?)
    }

    /// Kriging variance on a structured grid
    pub fn variance_grid(&self, x_axis: &[f64], y_axis: &[f64]) -> Result<Array2<f64>> {
        let mut out = Array2::zeros((y_axis.len(), x_axis.len()));
        for (row, &y) in y_axis.iter().enumerate() {
            for (col, &x) in x_axis.iter().enumerate() {
                out[[row, col]] = self.variance_at(x, y)?;
            }
        }
        Ok(out)
    }
}

/// Linear drift basis at a point, in centred and scaled coordinates
#[inline]
fn drift_values(x: f64, y: f64, center: (f64, f64), scale: f64) -> [f64; N_DRIFT] {
    [1.0, (x - center.0) / scale, (y - center.1) / scale]
}

/// Perform Universal Kriging interpolation from scattered points to a raster grid.
///
/// # Arguments
/// * `points` — Sample points with (x, y, value)
/// * `variogram` — Fitted covariance model
/// * `params` — Output grid specification, exactness and variance flag
///
/// # Returns
/// [`UniversalKrigingResult`] with the estimate at every cell centre and
/// optionally the kriging variance.
pub fn universal_kriging(
    points: &[SamplePoint],
    variogram: &FittedVariogram,
    params: &UniversalKrigingParams,
) -> Result<UniversalKrigingResult> {
    let krig = UniversalKriging::new(points, variogram, params.exact)?;
    let values: Vec<f64> = points.iter().map(|p| p.value).collect();
    let x_axis = params.transform.x_axis(params.cols);
    let y_axis = params.transform.y_axis(params.rows);

    let estimate = Raster::from_array(krig.estimate_grid(&values, &x_axis, &y_axis)?)
        .with_transform(params.transform);

    let variance = if params.compute_variance {
        Some(Raster::from_array(krig.variance_grid(&x_axis, &y_axis)?).with_transform(params.transform))
    } else {
        None
    };

    Ok(UniversalKrigingResult { estimate, variance })
}
