//! GeoJSON station feed reader

use crate::error::{Error, Result};
use crate::station::{Station, StationSet, TargetVariable};
use serde_json::Value;
use std::path::Path;
use tracing::warn;

/// Read stations from a GeoJSON FeatureCollection of points.
///
/// Each feature needs a `name` property, one numeric property per entry of
/// `vars` and point coordinates in the grid's projected CRS. Features with a
/// missing or null measurement are skipped with a warning.
pub fn read_stations<P: AsRef<Path>>(path: P, vars: &[TargetVariable]) -> Result<StationSet> {
    let text = std::fs::read_to_string(path.as_ref())?;
    read_stations_from_str(&text, vars)
}

/// Parse stations from GeoJSON text, see [`read_stations`].
pub fn read_stations_from_str(text: &str, vars: &[TargetVariable]) -> Result<StationSet> {
    let doc: Value = serde_json::from_str(text)?;
    let features = doc
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::InvalidInput("GeoJSON has no 'features' array".into()))?;

    let mut stations = Vec::with_capacity(features.len());
    for (i, feature) in features.iter().enumerate() {
        let props = feature.get("properties").unwrap_or(&Value::Null);
        let name = match props.get("name") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => format!("station_{i}"),
        };

        let coords = feature
            .pointer("/geometry/coordinates")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                Error::InvalidInput(format!("feature '{name}' has no point coordinates"))
            })?;
        let (x, y) = match (
            coords.first().and_then(Value::as_f64),
            coords.get(1).and_then(Value::as_f64),
        ) {
            (Some(x), Some(y)) => (x, y),
            _ => {
                return Err(Error::InvalidInput(format!(
                    "feature '{name}' has non-numeric coordinates"
                )));
            }
        };

        let mut station = Station::new(name, x, y);
        let mut complete = true;
        for &var in vars {
            match props.get(var.key()).and_then(Value::as_f64) {
                Some(v) if v.is_finite() => station = station.with_value(var, v),
                _ => {
                    warn!("Skipping station '{}': no {} value", station.name, var);
                    complete = false;
                    break;
                }
            }
        }
        if complete {
            stations.push(station);
        }
    }

    Ok(StationSet::new(stations))
}
