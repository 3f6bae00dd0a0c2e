//! Workflow path decision

use serde::{Serialize, Serializer};
use std::fmt;

use super::config::InterpolationConfig;

/// Modelling strategy of a run, in fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowPath {
    /// Regression surface only (1.0)
    RegressionOnly,
    /// Regression plus kriged residual correction (1.5)
    RegressionKrigedResidual,
    /// Kriging of raw station values (2.0)
    PureKriging,
}

impl WorkflowPath {
    /// Numeric code written to `output_meta.json`
    pub fn code(&self) -> f64 {
        match self {
            WorkflowPath::RegressionOnly => 1.0,
            WorkflowPath::RegressionKrigedResidual => 1.5,
            WorkflowPath::PureKriging => 2.0,
        }
    }

    /// Whether the regression surface is part of the result
    pub fn uses_regression(&self) -> bool {
        !matches!(self, WorkflowPath::PureKriging)
    }

    /// Whether any variable gets kriged
    pub fn uses_kriging(&self) -> bool {
        !matches!(self, WorkflowPath::RegressionOnly)
    }
}

impl fmt::Display for WorkflowPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.code())
    }
}

impl Serialize for WorkflowPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.code())
    }
}

/// Pick the path from the best cross-validated R² over the target variables.
///
/// A NaN score (no usable regression) always falls back to pure kriging.
pub fn decide_path(best_cv_r2: f64, config: &InterpolationConfig) -> WorkflowPath {
    if best_cv_r2.is_nan() || best_cv_r2 < config.r2_threshold {
        WorkflowPath::PureKriging
    } else if config.residual_correction {
        WorkflowPath::RegressionKrigedResidual
    } else {
        WorkflowPath::RegressionOnly
    }
}
