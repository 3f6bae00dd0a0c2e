//! # metgrid core
//!
//! Core types and I/O for the metgrid station-interpolation pipeline.
//!
//! This crate provides:
//! - `Raster`: single-band grid with an explicit validity mask
//! - `FeatureGrid`: stack of predictor bands sharing one validity mask
//! - `GeoTransform`: affine georeference (north-up, no rotation)
//! - `CRS`: coordinate reference system tag
//! - `Station` / `StationSet`: ground-station observations
//! - I/O for GeoTIFF rasters, GeoJSON stations, JSON and CSV records

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod station;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{FeatureGrid, GeoTransform, Raster};
pub use station::{Station, StationSet, TargetVariable};

/// Default no-data value of persisted rasters in the pipeline.
pub const DEFAULT_NODATA: f64 = -32768.0;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{FeatureGrid, GeoTransform, Raster};
    pub use crate::station::{Station, StationSet, TargetVariable};
}
