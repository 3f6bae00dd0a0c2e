//! Coordinate Reference System tags
//!
//! The pipeline never reprojects: station coordinates and the feature grid
//! must already share one projected CRS. The tag is carried from the feature
//! raster onto every output so downstream tools can georeference them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CRS {
    /// EPSG registry code
    Epsg(u32),
    /// Well-known text
    Wkt(String),
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        CRS::Epsg(code)
    }

    /// Create a CRS from a WKT string
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        CRS::Wkt(wkt.into())
    }

    /// ETRS89 / UTM zone 32N, the projection of the station feeds.
    pub fn etrs89_utm32n() -> Self {
        CRS::Epsg(25832)
    }

    /// EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        match self {
            CRS::Epsg(code) => Some(*code),
            CRS::Wkt(_) => None,
        }
    }

    /// Parse identifiers such as `EPSG:25832` or `urn:ogc:def:crs:EPSG::25832`.
    pub fn parse_identifier(s: &str) -> Option<Self> {
        let upper = s.to_ascii_uppercase();
        let idx = upper.rfind("EPSG")?;
        let code = upper[idx + 4..].trim_start_matches(':').trim();
        code.parse::<u32>().ok().map(CRS::Epsg)
    }

    /// Check if two CRS are equivalent
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        match (self, other) {
            (CRS::Epsg(a), CRS::Epsg(b)) => a == b,
            (CRS::Wkt(a), CRS::Wkt(b)) => a.trim() == b.trim(),
            _ => false,
        }
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        match self {
            CRS::Epsg(code) => format!("EPSG:{}", code),
            CRS::Wkt(wkt) => format!("WKT:{}", &wkt[..wkt.len().min(50)]),
        }
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}
