//! Run artefacts and their on-disk layout

use metgrid_core::io::{write_json, write_raster, GeoTiffOptions};
use metgrid_core::{Raster, Result, TargetVariable};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::config::InterpolationConfig;
use super::path::WorkflowPath;
use crate::interpolation::FittedVariogram;
use crate::metrics::ValidationScores;
use crate::regression::RidgeFit;

/// Contents of `output_meta.json`
#[derive(Debug, Clone, Serialize)]
pub struct OutputMeta {
    /// 1 when the best station R² of the outputs reaches the threshold
    pub qc: u8,
    pub wpath: WorkflowPath,
    pub scores: BTreeMap<TargetVariable, ValidationScores>,
}

/// Tuning record of one regression, as written to `regr_tuning.json`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TuningRecord {
    pub alpha: f64,
    pub r2_cv: f64,
    pub r2_tr: f64,
}

impl From<&RidgeFit> for TuningRecord {
    fn from(fit: &RidgeFit) -> Self {
        Self {
            alpha: fit.alpha,
            r2_cv: fit.r2_cv,
            r2_tr: fit.r2_train,
        }
    }
}

/// Regression residual at one station; `None` when its cell is invalid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationResidual {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub residual: Option<f64>,
}

/// Everything a run produces besides the final surfaces
#[derive(Debug, Clone, Default)]
pub struct Intermediates {
    pub tuning: BTreeMap<TargetVariable, TuningRecord>,
    pub regression: BTreeMap<TargetVariable, Raster>,
    pub residuals: BTreeMap<TargetVariable, Vec<StationResidual>>,
    pub kriged_residuals: BTreeMap<TargetVariable, Raster>,
    pub variograms: BTreeMap<TargetVariable, Option<FittedVariogram>>,
}

/// Where a run writes its files.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputLayout {
    pub dir: PathBuf,
    pub air_temperature: String,
    pub relative_humidity: String,
}

impl OutputLayout {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            air_temperature: "output_ta.tif".into(),
            relative_humidity: "output_rh.tif".into(),
        }
    }

    /// Override the final raster file names
    pub fn with_names(mut self, ta: impl Into<String>, rh: impl Into<String>) -> Self {
        self.air_temperature = ta.into();
        self.relative_humidity = rh.into();
        self
    }

    pub fn raster_path(&self, var: TargetVariable) -> PathBuf {
        match var {
            TargetVariable::AirTemperature => self.dir.join(&self.air_temperature),
            TargetVariable::RelativeHumidity => self.dir.join(&self.relative_humidity),
        }
    }

    pub fn meta_path(&self) -> PathBuf {
        self.dir.join("output_meta.json")
    }

    pub fn intermediate_dir(&self) -> PathBuf {
        self.dir.join("intermediate")
    }
}

/// Write the final rasters and `output_meta.json`, plus the intermediate
/// artefacts when enabled. Returns every path written.
pub fn write_outputs(
    surfaces: &BTreeMap<TargetVariable, Raster>,
    meta: &OutputMeta,
    intermediates: &Intermediates,
    layout: &OutputLayout,
    config: &InterpolationConfig,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(&layout.dir)?;
    let mut written = Vec::new();

    if config.save_intermediate {
        written.extend(write_intermediates(intermediates, &layout.intermediate_dir())?);
    }

    for (var, surface) in surfaces {
        let path = layout.raster_path(*var);
        write_surface(surface, &path)?;
        written.push(path);
    }

    let meta_path = layout.meta_path();
    write_json(meta, &meta_path)?;
    written.push(meta_path);

    info!(
        "Wrote {} output rasters to {} (wpath {}, qc {})",
        surfaces.len(),
        layout.dir.display(),
        meta.wpath,
        meta.qc
    );
    Ok(written)
}

fn write_intermediates(interm: &Intermediates, dir: &Path) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    if !interm.tuning.is_empty() {
        let path = dir.join("regr_tuning.json");
        write_json(&interm.tuning, &path)?;
        written.push(path);
    }
    for (var, surface) in &interm.regression {
        let path = dir.join(format!("{}_regr.tif", var.key()));
        write_surface(surface, &path)?;
        written.push(path);
    }
    if !interm.residuals.is_empty() {
        let path = dir.join("regr_residuals.json");
        write_json(&interm.residuals, &path)?;
        written.push(path);
    }
    for (var, surface) in &interm.kriged_residuals {
        let path = dir.join(format!("{}-resids_kriged.tif", var.key()));
        write_surface(surface, &path)?;
        written.push(path);
    }
    if !interm.variograms.is_empty() {
        let path = dir.join("variograms.json");
        write_json(&interm.variograms, &path)?;
        written.push(path);
    }

    debug!("{} intermediate artefacts in {}", written.len(), dir.display());
    Ok(written)
}

fn write_surface(surface: &Raster, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    write_raster(surface, path, Some(GeoTiffOptions::default()))
}
