//! Validation scores of an output surface against station observations

use metgrid_core::{Error, Result};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Agreement between observed and predicted station values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationScores {
    #[serde(rename = "R2")]
    pub r2: f64,
    /// Pearson correlation coefficient
    pub r: f64,
    /// Two-sided p-value of `r`
    pub pval: f64,
    #[serde(rename = "MAE")]
    pub mae: f64,
    #[serde(rename = "MedAE")]
    pub medae: f64,
    #[serde(rename = "MSE")]
    pub mse: f64,
    #[serde(rename = "N")]
    pub n: usize,
}

/// Score paired observations and predictions.
pub fn evaluate(observed: &[f64], predicted: &[f64]) -> Result<ValidationScores> {
    if observed.len() != predicted.len() {
        return Err(Error::InvalidInput(format!(
            "{} observations vs {} predictions",
            observed.len(),
            predicted.len()
        )));
    }
    let n = observed.len();
    if n == 0 {
        return Err(Error::InvalidInput("no samples to score".into()));
    }
    let nf = n as f64;

    let mut abs_err: Vec<f64> = observed
        .iter()
        .zip(predicted)
        .map(|(o, p)| (o - p).abs())
        .collect();
    let mae = abs_err.iter().sum::<f64>() / nf;
    let mse = abs_err.iter().map(|e| e * e).sum::<f64>() / nf;
    abs_err.sort_by(f64::total_cmp);
    let medae = if n % 2 == 1 {
        abs_err[n / 2]
    } else {
        0.5 * (abs_err[n / 2 - 1] + abs_err[n / 2])
    };

    let obs_mean = observed.iter().sum::<f64>() / nf;
    let ss_tot: f64 = observed.iter().map(|o| (o - obs_mean) * (o - obs_mean)).sum();
    let ss_res = mse * nf;
    let r2 = if ss_tot == 0.0 {
        if ss_res == 0.0 { 1.0 } else { 0.0 }
    } else {
        1.0 - ss_res / ss_tot
    };

    let (r, pval) = pearson(observed, predicted);

    Ok(ValidationScores {
        r2,
        r,
        pval,
        mae,
        medae,
        mse,
        n,
    })
}

/// Pearson r and its two-sided p-value under a Student t with n − 2 dof.
///
/// NaN when either series is constant or fewer than two samples exist.
pub fn pearson(a: &[f64], b: &[f64]) -> (f64, f64) {
    let n = a.len().min(b.len());
    if n < 2 {
        return (f64::NAN, f64::NAN);
    }
    let nf = n as f64;
    let ma = a[..n].iter().sum::<f64>() / nf;
    let mb = b[..n].iter().sum::<f64>() / nf;
    let (mut sab, mut saa, mut sbb) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        let dx = x - ma;
        let dy = y - mb;
        sab += dx * dy;
        saa += dx * dx;
        sbb += dy * dy;
    }
    if saa == 0.0 || sbb == 0.0 {
        return (f64::NAN, f64::NAN);
    }
    let r = (sab / (saa * sbb).sqrt()).clamp(-1.0, 1.0);

    if n == 2 {
        return (r, 1.0);
    }
    let df = nf - 2.0;
    if (1.0 - r.abs()) < f64::EPSILON {
        return (r, 0.0);
    }
    let t = r * (df / (1.0 - r * r)).sqrt();
    let pval = match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    };
    (r, pval)
}
