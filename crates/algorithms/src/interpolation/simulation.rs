//! Conditional simulation by the randomization method
//!
//! An unconditional Gaussian field with the covariance c·ρ(h) is generated
//! as a sum of random Fourier modes:
//! ```text
//! S(x) = √(c/N) Σⱼ [aⱼ cos(kⱼ·x) + bⱼ sin(kⱼ·x)],   aⱼ, bⱼ ~ N(0, 1)
//! ```
//! with wave vectors kⱼ drawn from the spectral density of ρ. A conditional
//! realisation adds the kriged correction of the data mismatch:
//! ```text
//! Zᵢ(x) = Sᵢ(x) + UK[z − Sᵢ(xₛ)](x)
//! ```
//! Kriging is linear in the data, so the ensemble mean equals
//! `mean(Sᵢ)(x) + UK[z − mean(Sᵢ(xₛ))](x)` and needs one kriging pass.
//!
//! Reference:
//! Heße, F. et al. (2014). Efficient simulation of Gaussian random fields.
//! Environmental Modelling & Software.

use metgrid_core::{Error, Result};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use rand_distr::StandardNormal;
use tracing::debug;

use super::universal_kriging::UniversalKriging;
use super::variogram::{FittedVariogram, VariogramModel};
use super::SamplePoint;

/// Default master seed of the realisation sequence
pub const DEFAULT_SEED: u64 = 323_582;

/// Fourier modes per unconditional field
pub const DEFAULT_MODES: usize = 1000;

/// One unconditional random field
#[derive(Debug, Clone)]
pub struct RandomizationField {
    wave: Vec<(f64, f64)>,
    coef: Vec<(f64, f64)>,
    amplitude: f64,
    origin: (f64, f64),
}

impl RandomizationField {
    /// Draw a field with covariance `variogram.structural_covariance`.
    ///
    /// `origin` shifts coordinates before evaluation to keep phase
    /// arguments small.
    pub fn sample<R: Rng + ?Sized>(
        variogram: &FittedVariogram,
        n_modes: usize,
        origin: (f64, f64),
        rng: &mut R,
    ) -> Result<Self> {
        if n_modes == 0 {
            return Err(Error::InvalidParameter {
                name: "n_modes",
                value: "0".into(),
                reason: "need at least one mode".into(),
            });
        }
        let ls = variogram.len_scale;
        let mut wave = Vec::with_capacity(n_modes);
        for _ in 0..n_modes {
            let z1: f64 = rng.sample(StandardNormal);
            let z2: f64 = rng.sample(StandardNormal);
            let k = match variogram.model {
                // exp(-h/ℓ): bivariate Cauchy spectrum, z / (ℓ·|w|)
                VariogramModel::Exponential => {
                    let w: f64 = rng.sample(StandardNormal);
                    let s = 1.0 / (ls * w.abs().max(f64::MIN_POSITIVE));
                    (z1 * s, z2 * s)
                }
                // exp(-(h/ℓ)²): Gaussian spectrum with variance 2/ℓ² per axis
                VariogramModel::Gaussian => {
                    let s = 2.0_f64.sqrt() / ls;
                    (z1 * s, z2 * s)
                }
                VariogramModel::Spherical => {
                    return Err(Error::Algorithm(
                        "conditional simulation does not support the spherical model".into(),
                    ));
                }
            };
            wave.push(k);
        }
        let coef = (0..n_modes)
            .map(|_| (rng.sample(StandardNormal), rng.sample(StandardNormal)))
            .collect();

        Ok(Self {
            wave,
            coef,
            amplitude: (variogram.partial_sill / n_modes as f64).sqrt(),
            origin,
        })
    }

    /// Field value at (x, y)
    pub fn value(&self, x: f64, y: f64) -> f64 {
        let px = x - self.origin.0;
        let py = y - self.origin.1;
        let sum: f64 = self
            .wave
            .iter()
            .zip(&self.coef)
            .map(|(&(kx, ky), &(a, b))| {
                let phase = kx * px + ky * py;
                a * phase.cos() + b * phase.sin()
            })
            .sum();
        self.amplitude * sum
    }
}

/// Ensemble of conditional realisations sharing one kriging system.
pub struct ConditionalSimulation<'a> {
    krig: &'a UniversalKriging,
    points: &'a [SamplePoint],
    variogram: &'a FittedVariogram,
    n_modes: usize,
    seeds: Vec<u64>,
    origin: (f64, f64),
}

impl<'a> ConditionalSimulation<'a> {
    /// Draw one seed per realisation, in order, from a master generator.
    pub fn new(
        krig: &'a UniversalKriging,
        points: &'a [SamplePoint],
        variogram: &'a FittedVariogram,
        n_realizations: usize,
        master_seed: u64,
    ) -> Result<Self> {
        if variogram.model == VariogramModel::Spherical {
            return Err(Error::Algorithm(
                "conditional simulation does not support the spherical model".into(),
            ));
        }
        if points.len() != krig.n_points() {
            return Err(Error::InvalidInput(format!(
                "{} points for a kriging system of {}",
                points.len(),
                krig.n_points()
            )));
        }
        let mut master = StdRng::seed_from_u64(master_seed);
        let seeds = (0..n_realizations).map(|_| master.next_u64()).collect();
        let n = points.len().max(1) as f64;
        let origin = (
            points.iter().map(|p| p.x).sum::<f64>() / n,
            points.iter().map(|p| p.y).sum::<f64>() / n,
        );
        Ok(Self {
            krig,
            points,
            variogram,
            n_modes: DEFAULT_MODES,
            seeds,
            origin,
        })
    }

    /// Override the number of Fourier modes
    pub fn with_modes(mut self, n_modes: usize) -> Self {
        self.n_modes = n_modes;
        self
    }

    pub fn n_realizations(&self) -> usize {
        self.seeds.len()
    }

    fn field(&self, index: usize) -> Result<RandomizationField> {
        let mut rng = StdRng::seed_from_u64(self.seeds[index]);
        RandomizationField::sample(self.variogram, self.n_modes, self.origin, &mut rng)
    }

    fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// Realisation `index` on a structured grid
    pub fn realization(&self, index: usize, x_axis: &[f64], y_axis: &[f64]) -> Result<Array2<f64>> {
        if index >= self.seeds.len() {
            return Err(Error::InvalidInput(format!(
                "realisation {index} of {}",
                self.seeds.len()
            )));
        }
        let field = self.field(index)?;
        let mismatch: Vec<f64> = self
            .points
            .iter()
            .map(|p| p.value - field.value(p.x, p.y))
            .collect();
        let mut out = self.krig.estimate_grid(&mismatch, x_axis, y_axis)?;
        for ((row, col), v) in out.indexed_iter_mut() {
            *v += field.value(x_axis[col], y_axis[row]);
        }
        Ok(out)
    }

    /// Per-cell mean over all realisations; plain kriging when there are none.
    pub fn mean(&self, x_axis: &[f64], y_axis: &[f64]) -> Result<Array2<f64>> {
        let n_real = self.seeds.len();
        if n_real == 0 {
            return self.krig.estimate_grid(&self.values(), x_axis, y_axis);
        }

        let mut field_sum = Array2::<f64>::zeros((y_axis.len(), x_axis.len()));
        let mut station_sum = vec![0.0_f64; self.points.len()];
        for i in 0..n_real {
            let field = self.field(i)?;
            for ((row, col), v) in field_sum.indexed_iter_mut() {
                *v += field.value(x_axis[col], y_axis[row]);
            }
            for (acc, p) in station_sum.iter_mut().zip(self.points) {
                *acc += field.value(p.x, p.y);
            }
            debug!("realisation {}/{} drawn", i + 1, n_real);
        }

        let nf = n_real as f64;
        let mismatch: Vec<f64> = self
            .points
            .iter()
            .zip(&station_sum)
            .map(|(p, s)| p.value - s / nf)
            .collect();
        let correction = self.krig.estimate_grid(&mismatch, x_axis, y_axis)?;
        Ok(field_sum / nf + correction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points() -> Vec<SamplePoint> {
        let mut rng = 11u64;
        (0..25)
            .map(|_| {
                rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let x = (rng >> 33) as f64 / (1u64 << 31) as f64 * 2000.0;
                rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let y = (rng >> 33) as f64 / (1u64 << 31) as f64 * 2000.0;
                SamplePoint::new(x, y, 15.0 + 0.002 * x + (y / 300.0).sin())
            })
            .collect()
    }

    fn axes() -> (Vec<f64>, Vec<f64>) {
        let x: Vec<f64> = (0..12).map(|i| 50.0 + 160.0 * i as f64).collect();
        let y: Vec<f64> = (0..10).map(|i| 1950.0 - 190.0 * i as f64).collect();
        (x, y)
    }

    #[test]
    fn test_field_variance_matches_sill() {
        let v = FittedVariogram::new(VariogramModel::Gaussian, 0.0, 4.0, 200.0);
        let mut total = 0.0;
        let mut total_sq = 0.0;
        let n = 400;
        for seed in 0..n {
            let mut rng = StdRng::seed_from_u64(seed);
            let f = RandomizationField::sample(&v, 200, (0.0, 0.0), &mut rng).unwrap();
            let s = f.value(123.0, 456.0);
            total += s;
            total_sq += s * s;
        }
        let mean = total / n as f64;
        let var = total_sq / n as f64 - mean * mean;
        assert!((var - 4.0).abs() < 1.0, "sample variance {var}");
    }

    #[test]
    fn test_same_seed_same_output() {
        let pts = points();
        let v = FittedVariogram::new(VariogramModel::Exponential, 0.05, 1.0, 400.0);
        let krig = UniversalKriging::new(&pts, &v, true).unwrap();
        let (xa, ya) = axes();

        let a = ConditionalSimulation::new(&krig, &pts, &v, 3, DEFAULT_SEED)
            .unwrap()
            .with_modes(64)
            .mean(&xa, &ya)
            .unwrap();
        let b = ConditionalSimulation::new(&krig, &pts, &v, 3, DEFAULT_SEED)
            .unwrap()
            .with_modes(64)
            .mean(&xa, &ya)
            .unwrap();
        assert_eq!(a, b);

        let c = ConditionalSimulation::new(&krig, &pts, &v, 3, 1)
            .unwrap()
            .with_modes(64)
            .mean(&xa, &ya)
            .unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_mean_equals_average_of_realizations() {
        let pts = points();
        let v = FittedVariogram::new(VariogramModel::Exponential, 0.05, 1.0, 400.0);
        let krig = UniversalKriging::new(&pts, &v, true).unwrap();
        let (xa, ya) = axes();
        let sim = ConditionalSimulation::new(&krig, &pts, &v, 4, DEFAULT_SEED)
            .unwrap()
            .with_modes(32);

        let mean = sim.mean(&xa, &ya).unwrap();
        let mut avg = Array2::<f64>::zeros(mean.dim());
        for i in 0..4 {
            avg += &sim.realization(i, &xa, &ya).unwrap();
        }
        avg /= 4.0;
        for (a, b) in mean.iter().zip(avg.iter()) {
            assert!((a - b).abs() < 1e-8, "{a} vs {b}");
        }
    }

    #[test]
    fn test_realization_honours_data() {
        let pts = points();
        let v = FittedVariogram::new(VariogramModel::Exponential, 0.0, 1.0, 300.0);
        let krig = UniversalKriging::new(&pts, &v, true).unwrap();
        let sim = ConditionalSimulation::new(&krig, &pts, &v, 1, 5).unwrap().with_modes(32);
        let xa = [pts[0].x];
        let ya = [pts[0].y];
        let z = sim.realization(0, &xa, &ya).unwrap();
        assert!((z[[0, 0]] - pts[0].value).abs() < 1e-6);
    }

    #[test]
    fn test_spherical_rejected() {
        let pts = points();
        let v = FittedVariogram::new(VariogramModel::Spherical, 0.0, 1.0, 300.0);
        let krig = UniversalKriging::new(&pts, &v, true).unwrap();
        assert!(ConditionalSimulation::new(&krig, &pts, &v, 2, DEFAULT_SEED).is_err());
    }
}
