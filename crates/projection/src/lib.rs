//! Coordinate reference system transformations.
//!
//! Implements the projections the extractor needs from scratch without
//! external dependencies. Only the geographic <-> Web Mercator pair is
//! supported; other pairs must already share a CRS.

pub mod mercator;

pub use mercator::{web_mercator_to_wgs84, wgs84_to_web_mercator, MAX_MERCATOR_LAT};

use tile_common::Crs;

/// Errors raised while transforming coordinates.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("no transformation available from {from} to {to}")]
    UnsupportedTransform { from: Crs, to: Crs },

    #[error("coordinate ({x}, {y}) is not valid in {crs}")]
    InvalidCoordinate { x: f64, y: f64, crs: Crs },
}

/// Check whether [`transform_point`] can map `from` to `to`.
pub fn supports(from: Crs, to: Crs) -> bool {
    from == to || (is_wgs84_like(from) && to == Crs::WEB_MERCATOR)
        || (from == Crs::WEB_MERCATOR && is_wgs84_like(to))
}

/// Transform a single coordinate between two CRS.
pub fn transform_point(from: Crs, to: Crs, x: f64, y: f64) -> Result<(f64, f64), ProjectionError> {
    if !x.is_finite() || !y.is_finite() {
        return Err(ProjectionError::InvalidCoordinate { x, y, crs: from });
    }

    if from == to {
        return Ok((x, y));
    }

    if is_wgs84_like(from) && to == Crs::WEB_MERCATOR {
        if !(-180.0..=180.0).contains(&x) || !(-90.0..=90.0).contains(&y) {
            return Err(ProjectionError::InvalidCoordinate { x, y, crs: from });
        }
        return Ok(wgs84_to_web_mercator(x, y));
    }

    if from == Crs::WEB_MERCATOR && is_wgs84_like(to) {
        return Ok(web_mercator_to_wgs84(x, y));
    }

    Err(ProjectionError::UnsupportedTransform { from, to })
}

/// Geographic datums that are treated as WGS84 at map-tile precision.
fn is_wgs84_like(crs: Crs) -> bool {
    matches!(crs.epsg(), 4326 | 4269 | 4258)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let crs = Crs::from_epsg(32633);
        assert_eq!(transform_point(crs, crs, 1.5, 2.5).unwrap(), (1.5, 2.5));
    }

    #[test]
    fn test_unsupported_pair() {
        let err = transform_point(Crs::from_epsg(32633), Crs::WEB_MERCATOR, 0.0, 0.0).unwrap_err();
        assert!(matches!(err, ProjectionError::UnsupportedTransform { .. }));
        assert!(!supports(Crs::from_epsg(32633), Crs::WEB_MERCATOR));
        assert!(supports(Crs::WGS84, Crs::WEB_MERCATOR));
    }

    #[test]
    fn test_rejects_out_of_range_degrees() {
        assert!(transform_point(Crs::WGS84, Crs::WEB_MERCATOR, 200.0, 0.0).is_err());
    }
}
