//! Ground-station observations

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Interpolated meteorological quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetVariable {
    /// Air temperature, °C
    AirTemperature,
    /// Relative humidity, %
    RelativeHumidity,
}

impl TargetVariable {
    /// Both variables in pipeline order
    pub const ALL: [TargetVariable; 2] = [
        TargetVariable::AirTemperature,
        TargetVariable::RelativeHumidity,
    ];

    /// Property name used in station feeds and output metadata
    pub fn key(&self) -> &'static str {
        match self {
            TargetVariable::AirTemperature => "air_temperature",
            TargetVariable::RelativeHumidity => "relative_humidity",
        }
    }

    /// Physically admissible range, if any
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match self {
            TargetVariable::AirTemperature => None,
            TargetVariable::RelativeHumidity => Some((0.0, 100.0)),
        }
    }

    /// Clamp a value into the admissible range
    pub fn correct(&self, value: f64) -> f64 {
        match self.bounds() {
            Some((lo, hi)) => value.clamp(lo, hi),
            None => value,
        }
    }
}

impl fmt::Display for TargetVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for TargetVariable {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "air_temperature" | "ta" | "tair" => Ok(TargetVariable::AirTemperature),
            "relative_humidity" | "rh" => Ok(TargetVariable::RelativeHumidity),
            other => Err(Error::InvalidParameter {
                name: "variable",
                value: other.to_string(),
                reason: "expected air_temperature or relative_humidity".into(),
            }),
        }
    }
}

/// One station: identity, projected position and measured values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub name: String,
    /// Easting in metres
    pub x: f64,
    /// Northing in metres
    pub y: f64,
    values: BTreeMap<TargetVariable, f64>,
}

impl Station {
    pub fn new(name: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            values: BTreeMap::new(),
        }
    }

    /// Attach a measurement, clamped to the variable's admissible range.
    pub fn with_value(mut self, var: TargetVariable, value: f64) -> Self {
        self.values.insert(var, var.correct(value));
        self
    }

    pub fn value(&self, var: TargetVariable) -> Option<f64> {
        self.values.get(&var).copied()
    }
}

/// Ordered collection of stations; order fixes CV folds and kriging rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationSet {
    stations: Vec<Station>,
}

impl StationSet {
    pub fn new(stations: Vec<Station>) -> Self {
        Self { stations }
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Station> {
        self.stations.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Station> {
        self.stations.get(index)
    }

    /// Keep only stations satisfying `keep`
    pub fn retain(&mut self, keep: impl FnMut(&Station) -> bool) {
        self.stations.retain(keep);
    }

    /// Measurements of `var` in station order.
    ///
    /// Fails when any station lacks the variable.
    pub fn values(&self, var: TargetVariable) -> Result<Vec<f64>> {
        self.stations
            .iter()
            .map(|s| {
                s.value(var).ok_or_else(|| {
                    Error::InvalidInput(format!("station '{}' has no {} value", s.name, var))
                })
            })
            .collect()
    }
}

impl FromIterator<Station> for StationSet {
    fn from_iter<I: IntoIterator<Item = Station>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a StationSet {
    type Item = &'a Station;
    type IntoIter = std::slice::Iter<'a, Station>;

    fn into_iter(self) -> Self::IntoIter {
        self.stations.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_humidity_clamped_on_input() {
        let low = Station::new("a", 0.0, 0.0).with_value(TargetVariable::RelativeHumidity, -5.0);
        let high = Station::new("b", 0.0, 0.0).with_value(TargetVariable::RelativeHumidity, 134.0);
        assert_eq!(low.value(TargetVariable::RelativeHumidity), Some(0.0));
        assert_eq!(high.value(TargetVariable::RelativeHumidity), Some(100.0));
    }

    #[test]
    fn test_temperature_not_clamped() {
        let s = Station::new("a", 0.0, 0.0).with_value(TargetVariable::AirTemperature, -12.5);
        assert_eq!(s.value(TargetVariable::AirTemperature), Some(-12.5));
    }

    #[test]
    fn test_parse_variable() {
        assert_eq!(
            "air_temperature".parse::<TargetVariable>().unwrap(),
            TargetVariable::AirTemperature
        );
        assert_eq!("RH".parse::<TargetVariable>().unwrap(), TargetVariable::RelativeHumidity);
        assert!("pressure".parse::<TargetVariable>().is_err());
    }

    #[test]
    fn test_values_missing() {
        let set: StationSet = vec![
            Station::new("a", 0.0, 0.0).with_value(TargetVariable::AirTemperature, 1.0),
            Station::new("b", 1.0, 0.0),
        ]
        .into_iter()
        .collect();
        assert!(set.values(TargetVariable::AirTemperature).is_err());
    }
}
