//! Boundary geometry type and file loading.

use std::path::Path;

use geo::{BoundingRect, Coord, MapCoords, MultiPolygon, Polygon};
use tracing::debug;

use tile_common::{BoundingBox, Crs, ExtractError, ExtractResult};

use crate::geojson::GeoJsonDocument;
use crate::shp;

/// A (multi)polygon area of interest together with its CRS.
///
/// Read-only once loaded; reprojection produces a new value.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryGeometry {
    polygons: MultiPolygon<f64>,
    crs: Crs,
}

impl BoundaryGeometry {
    /// Wrap polygons after validating them.
    pub fn new(polygons: MultiPolygon<f64>, crs: Crs) -> ExtractResult<Self> {
        let geometry = Self { polygons, crs };
        geometry.validate()?;
        Ok(geometry)
    }

    /// Single polygon convenience constructor.
    pub fn from_polygon(polygon: Polygon<f64>, crs: Crs) -> ExtractResult<Self> {
        Self::new(MultiPolygon::new(vec![polygon]), crs)
    }

    /// Load a boundary file, GeoJSON or ESRI shapefile by extension.
    pub fn load(path: &Path) -> ExtractResult<Self> {
        Self::load_with_crs(path, None)
    }

    /// Load a boundary file, interpreting its coordinates in `crs` when
    /// given instead of the CRS the file declares.
    ///
    /// Shapefiles take their CRS from the `.prj` sidecar; one without a
    /// recognisable `.prj` needs `crs`.
    pub fn load_with_crs(path: &Path, crs: Option<Crs>) -> ExtractResult<Self> {
        let is_shapefile = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| ext.eq_ignore_ascii_case("shp"));

        let geometry = if is_shapefile {
            let (polygons, declared) = shp::read_polygons(path)?;
            if polygons.is_empty() {
                return Err(ExtractError::data_integrity(format!(
                    "shapefile {} contains no polygons",
                    path.display()
                )));
            }
            let crs = crs.or(declared).ok_or_else(|| {
                ExtractError::configuration(format!(
                    "shapefile {} has no recognisable .prj; specify the boundary CRS",
                    path.display()
                ))
            })?;
            Self::new(MultiPolygon::new(polygons), crs)?
        } else {
            let text = std::fs::read_to_string(path).map_err(|e| {
                ExtractError::configuration(format!(
                    "cannot read boundary file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            let geometry = Self::from_geojson_str(&text)?;
            match crs {
                Some(crs) => Self::new(geometry.polygons, crs)?,
                None => geometry,
            }
        };

        debug!(
            path = %path.display(),
            polygons = geometry.polygons.0.len(),
            crs = %geometry.crs,
            "Loaded boundary geometry"
        );
        Ok(geometry)
    }

    /// Parse GeoJSON text (geometry, Feature or FeatureCollection).
    ///
    /// The CRS is taken from a legacy top-level `crs` member when present,
    /// otherwise WGS84 as GeoJSON prescribes.
    pub fn from_geojson_str(text: &str) -> ExtractResult<Self> {
        let document = GeoJsonDocument::parse(text)?;
        let crs = document.crs()?;
        let polygons = document.polygons()?;

        if polygons.is_empty() {
            return Err(ExtractError::data_integrity(
                "GeoJSON contains no polygon geometry",
            ));
        }

        Self::new(MultiPolygon::new(polygons), crs)
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn polygons(&self) -> &MultiPolygon<f64> {
        &self.polygons
    }

    /// Bounding box of the geometry in its own CRS.
    pub fn bounds(&self) -> ExtractResult<BoundingBox> {
        let rect = self
            .polygons
            .bounding_rect()
            .ok_or_else(|| ExtractError::data_integrity("boundary geometry is empty"))?;
        Ok(BoundingBox::new(
            rect.min().x,
            rect.min().y,
            rect.max().x,
            rect.max().y,
        ))
    }

    /// Reproject every vertex into `target`.
    pub fn reproject(&self, target: Crs) -> ExtractResult<Self> {
        if target == self.crs {
            return Ok(self.clone());
        }

        let source = self.crs;
        let polygons = self
            .polygons
            .try_map_coords(|c: Coord<f64>| {
                projection::transform_point(source, target, c.x, c.y).map(|(x, y)| Coord { x, y })
            })
            .map_err(|e| ExtractError::configuration(format!("cannot reproject boundary: {}", e)))?;

        debug!(from = %source, to = %target, "Reprojected boundary geometry");
        Self::new(polygons, target)
    }

    /// Reject empty, degenerate or non-finite geometry.
    fn validate(&self) -> ExtractResult<()> {
        if self.polygons.0.is_empty() {
            return Err(ExtractError::data_integrity("boundary geometry is empty"));
        }

        for (idx, polygon) in self.polygons.0.iter().enumerate() {
            let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors());
            for ring in rings {
                // Closed rings repeat the first vertex, so a triangle has 4 coords.
                if ring.0.len() < 4 {
                    return Err(ExtractError::data_integrity(format!(
                        "polygon {} has a ring with fewer than 3 vertices",
                        idx
                    )));
                }
                if ring.coords().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
                    return Err(ExtractError::data_integrity(format!(
                        "polygon {} has non-finite coordinates",
                        idx
                    )));
                }
            }
        }

        let bounds = self.bounds()?;
        if bounds.width() <= 0.0 || bounds.height() <= 0.0 {
            return Err(ExtractError::data_integrity(
                "boundary geometry has zero area bounds",
            ));
        }

        Ok(())
    }
}
