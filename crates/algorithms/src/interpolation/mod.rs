//! Geostatistical interpolation of station values
//!
//! - Variogram: empirical semivariance and covariance model fitting
//! - Universal Kriging: global kriging with linear drift
//! - Simulation: conditional realisations and their ensemble mean

pub mod simulation;
mod universal_kriging;
pub mod variogram;

pub use simulation::{ConditionalSimulation, RandomizationField, DEFAULT_SEED};
pub use universal_kriging::{
    universal_kriging, UniversalKriging, UniversalKrigingParams, UniversalKrigingResult,
};
pub use variogram::{
    empirical_variogram, fit_variogram, EmpiricalVariogram, FittedVariogram, VariogramModel,
    VariogramParams,
};

use metgrid_core::{Result, Station, StationSet, TargetVariable};

/// A sample point with x, y coordinates and a value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePoint {
    pub x: f64,
    pub y: f64,
    pub value: f64,
}

impl SamplePoint {
    pub fn new(x: f64, y: f64, value: f64) -> Self {
        Self { x, y, value }
    }

    /// Squared Euclidean distance to another point
    #[inline]
    pub fn dist_sq(&self, other_x: f64, other_y: f64) -> f64 {
        let dx = self.x - other_x;
        let dy = self.y - other_y;
        dx * dx + dy * dy
    }

    /// Euclidean distance to another point
    #[inline]
    pub fn dist(&self, other_x: f64, other_y: f64) -> f64 {
        self.dist_sq(other_x, other_y).sqrt()
    }

    /// Station position paired with an arbitrary value
    pub fn at(station: &Station, value: f64) -> Self {
        Self::new(station.x, station.y, value)
    }
}

/// Points closer than this (CRS units) are treated as one location
pub const COLOCATION_TOLERANCE: f64 = 1e-3;

/// Merge points within `tolerance` of an earlier point into it, averaging
/// their values. The first occurrence keeps its position and order.
///
/// Co-located points give identical rows in the kriging matrix, so they must
/// be merged before a system is assembled.
pub fn merge_colocated(points: &[SamplePoint], tolerance: f64) -> Vec<SamplePoint> {
    let tol_sq = tolerance * tolerance;
    let mut merged: Vec<(SamplePoint, usize)> = Vec::with_capacity(points.len());
    for p in points {
        match merged
            .iter_mut()
            .find(|(m, _)| m.dist_sq(p.x, p.y) <= tol_sq)
        {
            Some((m, count)) => {
                m.value += p.value;
                *count += 1;
            }
            None => merged.push((*p, 1)),
        }
    }
    merged
        .into_iter()
        .map(|(mut m, count)| {
            m.value /= count as f64;
            m
        })
        .collect()
}

/// Conditioning points of one variable, in station order
pub fn station_points(stations: &StationSet, var: TargetVariable) -> Result<Vec<SamplePoint>> {
    let values = stations.values(var)?;
    Ok(stations
        .iter()
        .zip(values)
        .map(|(s, v)| SamplePoint::at(s, v))
        .collect())
}
