//! I/O for rasters, station feeds and run records

mod geojson;
mod native;
mod records;

pub use geojson::{read_stations, read_stations_from_str};
pub use native::{
    read_feature_grid, read_raster, write_raster, Compression, GeoTiffOptions,
};
pub use records::{write_csv, write_json};
