//! Run configuration

use metgrid_core::{Error, Result, TargetVariable, DEFAULT_NODATA};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::interpolation::{VariogramModel, VariogramParams, DEFAULT_SEED};
use crate::regression::{default_alphas, RidgeCvParams, MAX_PREDICTIONS};

/// What to do when pure kriging leaves a variable without a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialResultPolicy {
    /// Keep the variables that succeeded
    #[default]
    Accept,
    /// Fail the run
    Abort,
}

/// Immutable settings of one interpolation run.
///
/// Loadable from JSON; missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InterpolationConfig {
    /// Cross-validation folds for the ridge strength
    pub n_folds: usize,
    /// Conditional realisations averaged into the kriged field (0 = plain kriging)
    pub n_realizations: usize,
    /// Minimum station count to attempt interpolation
    pub min_stations: usize,
    /// CV R² needed to trust the regression
    pub r2_threshold: f64,
    /// Krige regression residuals and add them back
    pub residual_correction: bool,
    pub variogram_bins: usize,
    /// Metres
    pub variogram_max_dist: f64,
    pub variogram_model: VariogramModel,
    /// Honour station values exactly when kriging
    pub exact: bool,
    /// Master seed of the realisation sequence
    pub seed: u64,
    /// Valid-cell count above which prediction is chunked
    pub max_predictions: usize,
    pub variables: Vec<TargetVariable>,
    pub partial_result: PartialResultPolicy,
    /// Write the `intermediate/` artefacts
    pub save_intermediate: bool,
    /// No-data value of the feature raster
    pub nodata: f64,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            n_folds: 4,
            n_realizations: 0,
            min_stations: 50,
            r2_threshold: 0.5,
            residual_correction: false,
            variogram_bins: 16,
            variogram_max_dist: 5000.0,
            variogram_model: VariogramModel::Exponential,
            exact: true,
            seed: DEFAULT_SEED,
            max_predictions: MAX_PREDICTIONS,
            variables: TargetVariable::ALL.to_vec(),
            partial_result: PartialResultPolicy::Accept,
            save_intermediate: true,
            nodata: DEFAULT_NODATA,
        }
    }
}

impl InterpolationConfig {
    /// Load a JSON config file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let mut vars = self.variables.clone();
        vars.sort();
        vars.dedup();
        if self.variables.len() != 2 || vars != TargetVariable::ALL {
            let names: Vec<String> = self.variables.iter().map(|v| v.to_string()).collect();
            return Err(Error::InvalidVariables(names.join(", ")));
        }
        if self.n_folds < 2 {
            return Err(invalid("n_folds", self.n_folds, "need at least 2 folds"));
        }
        if self.min_stations == 0 {
            return Err(invalid("min_stations", self.min_stations, "must be positive"));
        }
        if !self.r2_threshold.is_finite() {
            return Err(invalid("r2_threshold", self.r2_threshold, "must be finite"));
        }
        if self.variogram_bins == 0 {
            return Err(invalid("variogram_bins", self.variogram_bins, "need at least one bin"));
        }
        if !(self.variogram_max_dist > 0.0) {
            return Err(invalid("variogram_max_dist", self.variogram_max_dist, "must be positive"));
        }
        if self.max_predictions == 0 {
            return Err(invalid("max_predictions", self.max_predictions, "must be positive"));
        }
        if self.n_realizations > 0 && self.variogram_model == VariogramModel::Spherical {
            return Err(invalid(
                "variogram_model",
                "spherical",
                "conditional simulation needs an exponential or gaussian model",
            ));
        }
        Ok(())
    }

    pub fn ridge_params(&self) -> RidgeCvParams {
        RidgeCvParams {
            alphas: default_alphas(),
            n_folds: self.n_folds,
        }
    }

    pub fn variogram_params(&self) -> VariogramParams {
        VariogramParams {
            n_bins: self.variogram_bins,
            max_dist: self.variogram_max_dist,
        }
    }
}

fn invalid(name: &'static str, value: impl ToString, reason: &str) -> Error {
    Error::InvalidParameter {
        name,
        value: value.to_string(),
        reason: reason.into(),
    }
}
