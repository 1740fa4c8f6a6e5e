//! Coordinate Reference System identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::bbox::BoundingBox;

/// A coordinate reference system identified by its EPSG authority code.
///
/// One CRS is resolved per run; every tile and the final mosaic carry it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Crs(u32);

impl Crs {
    /// WGS84 Geographic (lat/lon in degrees)
    pub const WGS84: Crs = Crs(4326);
    /// Web Mercator (meters)
    pub const WEB_MERCATOR: Crs = Crs(3857);

    /// Wrap an EPSG code.
    pub const fn from_epsg(code: u32) -> Self {
        Crs(code)
    }

    /// The numeric EPSG code.
    pub fn epsg(&self) -> u32 {
        self.0
    }

    /// Parse a CRS string.
    ///
    /// Accepts formats like:
    /// - "EPSG:3857"
    /// - "epsg:4326"
    /// - "3857"
    /// - "CRS:84" (equivalent to EPSG:4326)
    /// - "EPSG:900913" (legacy alias of EPSG:3857)
    pub fn parse(s: &str) -> Result<Self, CrsParseError> {
        let normalized = s.trim().to_uppercase();

        let code = match normalized.as_str() {
            "CRS:84" => return Ok(Crs::WGS84),
            other => other.strip_prefix("EPSG:").unwrap_or(other),
        };

        let code: u32 = code
            .parse()
            .map_err(|_| CrsParseError::InvalidCode(s.to_string()))?;

        match code {
            0 => Err(CrsParseError::InvalidCode(s.to_string())),
            900913 => Ok(Crs::WEB_MERCATOR),
            _ => Ok(Crs(code)),
        }
    }

    /// Check if this is a geographic (lat/lon) CRS.
    pub fn is_geographic(&self) -> bool {
        matches!(self.0, 4326 | 4269 | 4258 | 4230)
    }

    /// Get the valid bounds for well-known codes.
    pub fn valid_bounds(&self) -> Option<BoundingBox> {
        match self.0 {
            4326 | 4269 | 4258 => Some(BoundingBox::new(-180.0, -90.0, 180.0, 90.0)),
            3857 => {
                // Web Mercator bounds (approx ±85.06° latitude)
                let max_extent = 20037508.342789244;
                Some(BoundingBox::new(
                    -max_extent,
                    -max_extent,
                    max_extent,
                    max_extent,
                ))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

impl FromStr for Crs {
    type Err = CrsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Crs::parse(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CrsParseError {
    #[error("Invalid CRS code: {0}. Expected 'EPSG:<code>' or '<code>'")]
    InvalidCode(String),
}
