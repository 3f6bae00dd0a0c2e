//! Replace NaN cells with a persisted no-data value

use metgrid_core::io::{read_raster, write_raster, GeoTiffOptions};
use metgrid_core::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// `<dir>/<stem>_ndv.tif` next to the input
pub fn nodata_path(input: &Path) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::InvalidInput(format!("{}: no file stem", input.display())))?;
    Ok(input.with_file_name(format!("{stem}_ndv.tif")))
}

/// Rewrite `input` with invalid cells set to `nodata`; returns the new path.
pub fn fill_nodata(input: &Path, nodata: f64) -> Result<PathBuf> {
    let raster = read_raster(input, None)?;
    let output = nodata_path(input)?;
    let invalid = raster.len() - raster.valid_count();
    write_raster(
        &raster,
        &output,
        Some(GeoTiffOptions {
            nodata,
            ..Default::default()
        }),
    )?;
    info!(
        "{} cells set to {} in {}",
        invalid,
        nodata,
        output.display()
    );
    Ok(output)
}
