//! Feature sampling at station locations
//!
//! Stations are matched to the grid cell whose centre is nearest along each
//! axis independently; no interpolation between cells. Points outside the
//! grid extent snap to the border cell.

use metgrid_core::{Error, FeatureGrid, Raster, Result, StationSet, TargetVariable};
use ndarray::{Array1, Array2};
use tracing::warn;

/// Predictor vector at (x, y), or `None` when the nearest cell is invalid.
pub fn sample_features(grid: &FeatureGrid, x: f64, y: f64) -> Option<Array1<f64>> {
    let (row, col) = grid.nearest_cell(x, y);
    grid.is_valid(row, col).then(|| grid.cell(row, col).to_owned())
}

/// Surface value at (x, y), or `None` when the nearest cell is invalid.
pub fn sample_surface(surface: &Raster, x: f64, y: f64) -> Option<f64> {
    surface.sample(x, y)
}

/// Station design matrix: predictors and targets of usable stations.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    /// Predictors, `(n_rows, n_bands)`
    pub features: Array2<f64>,
    /// Targets, `(n_rows, n_variables)` in the order of `variables`
    pub targets: Array2<f64>,
    /// Index into the source [`StationSet`] of each row
    pub station_indices: Vec<usize>,
    pub variables: Vec<TargetVariable>,
}

impl DesignMatrix {
    /// Number of usable stations
    pub fn n_rows(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// Target column of one variable
    pub fn target(&self, var: TargetVariable) -> Result<Array1<f64>> {
        let idx = self
            .variables
            .iter()
            .position(|v| *v == var)
            .ok_or_else(|| Error::InvalidInput(format!("design matrix has no {var} column")))?;
        Ok(self.targets.column(idx).to_owned())
    }
}

/// Sample every station on the grid and assemble the design matrix.
///
/// Stations whose nearest cell is invalid in any band are left out with a
/// warning; row order follows station order.
pub fn build_design_matrix(
    grid: &FeatureGrid,
    stations: &StationSet,
    variables: &[TargetVariable],
) -> Result<DesignMatrix> {
    let n_bands = grid.n_bands();
    let mut features = Vec::with_capacity(stations.len() * n_bands);
    let mut targets = Vec::with_capacity(stations.len() * variables.len());
    let mut station_indices = Vec::with_capacity(stations.len());

    for (i, station) in stations.iter().enumerate() {
        let Some(sample) = sample_features(grid, station.x, station.y) else {
            warn!(
                "Station '{}' at ({:.1}, {:.1}) falls on an invalid feature cell, excluded from training",
                station.name, station.x, station.y
            );
            continue;
        };
        for &var in variables {
            let value = station.value(var).ok_or_else(|| {
                Error::InvalidInput(format!("station '{}' has no {} value", station.name, var))
            })?;
            targets.push(value);
        }
        features.extend(sample.iter());
        station_indices.push(i);
    }

    let n_rows = station_indices.len();
    Ok(DesignMatrix {
        features: Array2::from_shape_vec((n_rows, n_bands), features)?,
        targets: Array2::from_shape_vec((n_rows, variables.len()), targets)?,
        station_indices,
        variables: variables.to_vec(),
    })
}
