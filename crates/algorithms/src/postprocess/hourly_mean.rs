//! Hourly area means of consecutive interpolated rasters
//!
//! Rasters follow the pipeline naming scheme
//!
//! ```text
//! DO_<TA|RH>_<YYYY>_interpolate-<x.y>_<DOY>_<HH>_<prev_align|align>.tif
//! ```
//!
//! and are assumed to be masked to the area of interest already. The mean
//! ignores invalid cells (NaN or the -32768 no-data value).

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use metgrid_core::io::{read_raster, write_csv};
use metgrid_core::{Error, Raster, Result, TargetVariable, DEFAULT_NODATA};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Fields parsed from an aligned raster file name
#[derive(Debug, Clone, PartialEq)]
pub struct RasterStamp {
    pub variable: TargetVariable,
    /// `x.y` tag of the interpolation run
    pub version: String,
    /// Start of the hour the raster covers
    pub time: NaiveDateTime,
    /// `prev_align` rather than `align`
    pub previous: bool,
}

impl RasterStamp {
    /// Parse a file name (directories are ignored).
    pub fn parse(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| bad_name(path, "not a file name"))?;
        let stem = name
            .strip_suffix(".tif")
            .ok_or_else(|| bad_name(path, "expected a .tif extension"))?;

        let (stem, previous) = if let Some(s) = stem.strip_suffix("_prev_align") {
            (s, true)
        } else if let Some(s) = stem.strip_suffix("_align") {
            (s, false)
        } else {
            return Err(bad_name(path, "expected an _align or _prev_align suffix"));
        };

        let parts: Vec<&str> = stem.split('_').collect();
        let [prefix, var, year, run, doy, hour] = parts.as_slice() else {
            return Err(bad_name(path, "unexpected number of fields"));
        };
        if *prefix != "DO" {
            return Err(bad_name(path, "expected the DO_ prefix"));
        }
        let variable = match *var {
            "TA" => TargetVariable::AirTemperature,
            "RH" => TargetVariable::RelativeHumidity,
            _ => return Err(bad_name(path, "variable must be TA or RH")),
        };
        let version = run
            .strip_prefix("interpolate-")
            .filter(|v| is_version(v))
            .ok_or_else(|| bad_name(path, "expected interpolate-<x.y>"))?;

        let year = parse_digits(year, 4).ok_or_else(|| bad_name(path, "bad year"))?;
        let doy = parse_digits(doy, 3).ok_or_else(|| bad_name(path, "bad day of year"))?;
        let hour = parse_digits(hour, 2).ok_or_else(|| bad_name(path, "bad hour"))?;

        let time = NaiveDate::from_yo_opt(year as i32, doy)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|t| t + Duration::hours(i64::from(hour)))
            .ok_or_else(|| bad_name(path, "date out of range"))?;

        Ok(Self {
            variable,
            version: version.to_string(),
            time,
            previous,
        })
    }
}

fn parse_digits(s: &str, width: usize) -> Option<u32> {
    (s.len() == width && s.bytes().all(|b| b.is_ascii_digit()))
        .then(|| s.parse().ok())
        .flatten()
}

fn is_version(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 3 && b[0].is_ascii_digit() && b[1] == b'.' && b[2].is_ascii_digit()
}

fn bad_name(path: &Path, reason: &str) -> Error {
    Error::InvalidInput(format!("{}: {}", path.display(), reason))
}

/// One CSV row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourlyMean {
    pub year: i32,
    pub doy: u32,
    pub hour: u32,
    /// Empty in the CSV when the raster has no valid cell
    pub value: Option<f64>,
}

impl HourlyMean {
    fn at(time: NaiveDateTime, value: Option<f64>) -> Self {
        Self {
            year: time.year(),
            doy: time.ordinal(),
            hour: time.hour(),
            value,
        }
    }
}

/// Mean of the valid cells rounded to two decimals, `None` if there are none.
pub fn area_mean(raster: &Raster) -> Option<f64> {
    let (sum, n) = raster
        .view()
        .iter()
        .zip(raster.validity().iter())
        .filter(|&(v, &ok)| ok && v.is_finite() && *v != DEFAULT_NODATA)
        .fold((0.0, 0usize), |(s, n), (v, _)| (s + v, n + 1));
    (n > 0).then(|| (sum / n as f64 * 100.0).round() / 100.0)
}

/// Means of the previous and current hour rasters.
///
/// Timestamps come from the current file name; the previous row is one hour
/// earlier whatever its own name says.
pub fn hourly_means(prev: &Path, now: &Path) -> Result<[HourlyMean; 2]> {
    let stamp_prev = RasterStamp::parse(prev)?;
    let stamp_now = RasterStamp::parse(now)?;
    if stamp_prev.variable != stamp_now.variable {
        warn!(
            "Mixing variables: {} and {}",
            stamp_prev.variable, stamp_now.variable
        );
    }
    let prev_time = stamp_now.time - Duration::hours(1);
    if stamp_prev.time != prev_time {
        warn!(
            "{} is stamped {}, expected {}",
            prev.display(),
            stamp_prev.time,
            prev_time
        );
    }

    let mean_prev = area_mean(&read_raster(prev, Some(DEFAULT_NODATA))?);
    let mean_now = area_mean(&read_raster(now, Some(DEFAULT_NODATA))?);
    Ok([
        HourlyMean::at(prev_time, mean_prev),
        HourlyMean::at(stamp_now.time, mean_now),
    ])
}

/// Compute [`hourly_means`] and write them as `year,doy,hour,value` CSV.
pub fn write_hourly_means(prev: &Path, now: &Path, output: &Path) -> Result<[HourlyMean; 2]> {
    let rows = hourly_means(prev, now)?;
    write_csv(&rows, output)?;
    info!("Hourly means written to {}", output.display());
    Ok(rows)
}
