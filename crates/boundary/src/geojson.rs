//! Typed GeoJSON documents accepted as boundary input.
//!
//! Only polygonal content is modelled; any other geometry type fails to
//! deserialize.

use geo::{Coord, LineString, Polygon};
use serde::Deserialize;

use tile_common::{Crs, ExtractError, ExtractResult};

/// Exterior ring followed by holes, each ring a list of positions.
pub type PolygonCoordinates = Vec<Vec<Vec<f64>>>;

/// A GeoJSON document with its optional legacy `crs` member.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GeoJsonDocument {
    #[serde(default)]
    pub crs: Option<NamedCrs>,

    #[serde(flatten)]
    pub object: GeoJson,
}

/// Top-level GeoJSON objects.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum GeoJson {
    FeatureCollection {
        features: Vec<Feature>,
    },
    Feature {
        #[serde(default)]
        geometry: Option<Geometry>,
    },
    Polygon {
        coordinates: PolygonCoordinates,
    },
    MultiPolygon {
        coordinates: Vec<PolygonCoordinates>,
    },
    GeometryCollection {
        geometries: Vec<Geometry>,
    },
}

/// A feature inside a FeatureCollection.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Feature {
    /// Type identifier (always "Feature").
    #[serde(rename = "type")]
    pub type_: String,

    /// Null geometries are allowed and contribute nothing.
    #[serde(default)]
    pub geometry: Option<Geometry>,
}

/// Polygonal geometry objects.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Geometry {
    Polygon {
        coordinates: PolygonCoordinates,
    },
    MultiPolygon {
        coordinates: Vec<PolygonCoordinates>,
    },
    GeometryCollection {
        geometries: Vec<Geometry>,
    },
}

/// Legacy named CRS member, e.g. `urn:ogc:def:crs:EPSG::3857`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NamedCrs {
    pub properties: NamedCrsProperties,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NamedCrsProperties {
    pub name: String,
}

impl GeoJsonDocument {
    pub fn parse(text: &str) -> ExtractResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| ExtractError::data_integrity(format!("invalid GeoJSON: {}", e)))
    }

    /// CRS named by the document, WGS84 when absent.
    pub fn crs(&self) -> ExtractResult<Crs> {
        match &self.crs {
            Some(named) => named.to_crs(),
            None => Ok(Crs::WGS84),
        }
    }

    /// Every polygon in document order.
    pub fn polygons(&self) -> ExtractResult<Vec<Polygon<f64>>> {
        let mut out = Vec::new();
        match &self.object {
            GeoJson::FeatureCollection { features } => {
                for feature in features {
                    if feature.type_ != "Feature" {
                        return Err(ExtractError::data_integrity(format!(
                            "FeatureCollection member has type {}",
                            feature.type_
                        )));
                    }
                    if let Some(geometry) = &feature.geometry {
                        geometry.collect_polygons(&mut out)?;
                    }
                }
            }
            GeoJson::Feature { geometry } => {
                if let Some(geometry) = geometry {
                    geometry.collect_polygons(&mut out)?;
                }
            }
            GeoJson::Polygon { coordinates } => out.push(to_polygon(coordinates)?),
            GeoJson::MultiPolygon { coordinates } => {
                for part in coordinates {
                    out.push(to_polygon(part)?);
                }
            }
            GeoJson::GeometryCollection { geometries } => {
                for geometry in geometries {
                    geometry.collect_polygons(&mut out)?;
                }
            }
        }
        Ok(out)
    }
}

impl Geometry {
    fn collect_polygons(&self, out: &mut Vec<Polygon<f64>>) -> ExtractResult<()> {
        match self {
            Geometry::Polygon { coordinates } => out.push(to_polygon(coordinates)?),
            Geometry::MultiPolygon { coordinates } => {
                for part in coordinates {
                    out.push(to_polygon(part)?);
                }
            }
            Geometry::GeometryCollection { geometries } => {
                for geometry in geometries {
                    geometry.collect_polygons(out)?;
                }
            }
        }
        Ok(())
    }
}

impl NamedCrs {
    pub fn to_crs(&self) -> ExtractResult<Crs> {
        let name = self.properties.name.as_str();
        if name.ends_with("CRS84") {
            return Ok(Crs::WGS84);
        }

        let code = name.rsplit(':').next().unwrap_or(name);
        Crs::parse(code).map_err(|_| {
            ExtractError::data_integrity(format!("unrecognised GeoJSON crs name: {}", name))
        })
    }
}

fn to_polygon(rings: &PolygonCoordinates) -> ExtractResult<Polygon<f64>> {
    let mut rings = rings.iter().map(|ring| to_ring(ring));
    let exterior = rings
        .next()
        .ok_or_else(|| ExtractError::data_integrity("polygon has no exterior ring"))??;
    let interiors = rings.collect::<ExtractResult<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn to_ring(positions: &[Vec<f64>]) -> ExtractResult<LineString<f64>> {
    positions
        .iter()
        .map(|position| match position.as_slice() {
            [x, y, ..] => Ok(Coord { x: *x, y: *y }),
            _ => Err(ExtractError::data_integrity(format!(
                "invalid position: {:?}",
                position
            ))),
        })
        .collect::<ExtractResult<Vec<_>>>()
        .map(LineString::new)
}
