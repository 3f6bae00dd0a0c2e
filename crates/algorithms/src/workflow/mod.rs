//! Interpolation workflow
//!
//! Decides once per run between three paths, in fallback order:
//!
//! ```text
//! 1.0  regression only           best CV R² ≥ threshold
//! 1.5  regression + kriged resid  best CV R² ≥ threshold, residual correction on
//! 2.0  kriging of raw values      otherwise
//! ```
//!
//! Outputs are masked by the feature grid, relative humidity is clamped to
//! [0, 100] and each surface is scored against the stations it came from.

mod config;
mod output;
mod path;
mod run;

pub use config::{InterpolationConfig, PartialResultPolicy};
pub use output::{
    write_outputs, Intermediates, OutputLayout, OutputMeta, StationResidual, TuningRecord,
};
pub use path::{decide_path, WorkflowPath};
pub use run::{interpolate, run_interpolation, InterpolationRun};
