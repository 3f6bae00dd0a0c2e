//! Ridge regression of station targets on gridded predictors
//!
//! - `ridge`: closed-form ridge fit with intercept, multi-output models
//! - `cv`: k-fold cross-validated choice of the ridge strength
//! - `apply`: chunked prediction over a masked feature grid

mod apply;
mod cv;
mod ridge;

pub use apply::{chunk_bounds, predict_grid, predict_surfaces, MAX_PREDICTIONS};
pub use cv::{default_alphas, kfold_bounds, train_ridge_cv, RidgeCvParams, RidgeFit};
pub use ridge::{fit_ridge, r2_score, RidgeModel};
