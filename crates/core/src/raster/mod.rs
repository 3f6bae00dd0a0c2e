//! Raster data structures
//!
//! Cells carry an explicit validity flag next to their value; no sentinel
//! number ever doubles as "missing" inside the pipeline.

mod geotransform;
mod grid;
mod stack;

pub use geotransform::GeoTransform;
pub use grid::{Raster, RasterStatistics};
pub use stack::FeatureGrid;
