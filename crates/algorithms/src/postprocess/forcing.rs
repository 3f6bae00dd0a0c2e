//! Merge interpolated hourly means into a meteorological forcing file
//!
//! The forcing file is a space separated table with one row per hour, keyed
//! by `iy` (year), `id` (day of year) and `it` (hour). Its `Tair` and `RH`
//! columns are replaced by the hourly means of the interpolated surfaces.
//! Hours without a mean and empty fields become -999, and the columns are
//! written in [`FORCING_COLUMNS`] order.

use metgrid_core::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::info;

use super::hourly_mean::HourlyMean;

/// Missing value of the forcing format
pub const FORCING_NODATA: f64 = -999.0;

/// Output column order
pub const FORCING_COLUMNS: [&str; 24] = [
    "iy", "id", "it", "imin", "qn", "qh", "qe", "qs", "qf", "U", "RH", "Tair", "pres", "rain",
    "kdown", "snow", "ldown", "fcld", "Wuh", "xsmd", "lai", "kdiff", "kdir", "wdir",
];

type HourKey = (i32, u32, u32);

/// Counts of a [`merge_forcing`] run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForcingMerge {
    pub rows: usize,
    /// Rows that received an interpolated air temperature
    pub tair: usize,
    /// Rows that received an interpolated relative humidity
    pub rh: usize,
}

/// Read a `year,doy,hour,value` CSV as written by the hourly mean step.
pub fn read_hourly_means<P: AsRef<Path>>(path: P) -> Result<Vec<HourlyMean>> {
    let mut reader = csv::Reader::from_path(path.as_ref())?;
    let rows = reader
        .deserialize()
        .collect::<std::result::Result<Vec<HourlyMean>, csv::Error>>()?;
    Ok(rows)
}

fn by_hour(rows: &[HourlyMean]) -> BTreeMap<HourKey, f64> {
    rows.iter()
        .filter_map(|r| Some(((r.year, r.doy, r.hour), r.value?)))
        .collect()
}

fn format_value(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{v:.1}")
    } else {
        v.to_string()
    }
}

fn parse_key_field(record: &csv::StringRecord, idx: usize, name: &str, row: usize) -> Result<f64> {
    record
        .get(idx)
        .and_then(|s| s.trim().parse::<f64>().ok())
        .ok_or_else(|| Error::InvalidInput(format!("forcing row {row}: invalid '{name}' field")))
}

/// Replace `Tair` and `RH` of `city_means` with the hourly means and write
/// the result to `output`, whose directory must exist.
pub fn merge_forcing<P, Q, R, S>(
    tair_means: P,
    rh_means: Q,
    city_means: R,
    output: S,
) -> Result<ForcingMerge>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    R: AsRef<Path>,
    S: AsRef<Path>,
{
    let output = output.as_ref();
    if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.is_dir() {
            return Err(Error::InvalidInput(format!(
                "output directory {} does not exist",
                dir.display()
            )));
        }
    }

    let tair = by_hour(&read_hourly_means(tair_means)?);
    let rh = by_hour(&read_hourly_means(rh_means)?);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b' ')
        .from_path(city_means.as_ref())?;
    let headers = reader.headers()?.clone();
    let index: HashMap<&str, usize> = headers.iter().enumerate().map(|(i, h)| (h, i)).collect();
    for col in FORCING_COLUMNS {
        if col != "Tair" && col != "RH" && !index.contains_key(col) {
            return Err(Error::InvalidInput(format!(
                "forcing file has no '{col}' column"
            )));
        }
    }
    let (iy, id, it) = (index["iy"], index["id"], index["it"]);

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b' ')
        .from_path(output)?;
    writer.write_record(FORCING_COLUMNS)?;

    let mut summary = ForcingMerge {
        rows: 0,
        tair: 0,
        rh: 0,
    };
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let key = (
            parse_key_field(&record, iy, "iy", row)? as i32,
            parse_key_field(&record, id, "id", row)? as u32,
            parse_key_field(&record, it, "it", row)? as u32,
        );
        let fields: Vec<String> = FORCING_COLUMNS
            .iter()
            .map(|&col| match col {
                "Tair" => {
                    summary.tair += usize::from(tair.contains_key(&key));
                    format_value(tair.get(&key).copied().unwrap_or(FORCING_NODATA))
                }
                "RH" => {
                    summary.rh += usize::from(rh.contains_key(&key));
                    format_value(rh.get(&key).copied().unwrap_or(FORCING_NODATA))
                }
                other => match record.get(index[other]).map(str::trim) {
                    Some(s) if !s.is_empty() => s.to_string(),
                    _ => format!("{}", FORCING_NODATA as i32),
                },
            })
            .collect();
        writer.write_record(&fields)?;
        summary.rows += 1;
    }
    writer.flush()?;

    info!(
        "Merged {} Tair and {} RH hours into {} forcing rows",
        summary.tair, summary.rh, summary.rows
    );
    Ok(summary)
}
