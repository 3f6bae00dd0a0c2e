//! # metgrid algorithms
//!
//! Regression kriging of station observations onto a predictor grid.
//!
//! ## Components
//!
//! - **sampling**: predictor vectors at station locations
//! - **regression**: cross-validated ridge regression and chunked grid prediction
//! - **interpolation**: variogram fitting, universal kriging, conditional simulation
//! - **metrics**: validation scores against station observations
//! - **workflow**: path decision, composition and output of a run
//! - **postprocess**: hourly area means, no-data filling

pub mod interpolation;
pub mod linalg;
pub(crate) mod maybe_rayon;
pub mod metrics;
pub mod postprocess;
pub mod regression;
pub mod sampling;
pub mod workflow;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::interpolation::{
        empirical_variogram, fit_variogram, universal_kriging, ConditionalSimulation,
        FittedVariogram, SamplePoint, UniversalKriging, UniversalKrigingParams, VariogramModel,
        VariogramParams,
    };
    pub use crate::metrics::{evaluate, ValidationScores};
    pub use crate::regression::{predict_surfaces, train_ridge_cv, RidgeCvParams, RidgeModel};
    pub use crate::sampling::{build_design_matrix, DesignMatrix};
    pub use crate::workflow::{
        interpolate, run_interpolation, InterpolationConfig, InterpolationRun, OutputLayout,
        WorkflowPath,
    };
    pub use metgrid_core::prelude::*;
}
