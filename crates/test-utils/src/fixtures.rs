//! Common test fixtures for extraction tests.
//!
//! This module provides pre-defined extents and boundary geometries that
//! represent common extraction scenarios.

use geo::{Coord, LineString, Polygon};
use shapefile::record::point::Point as ShapePoint;
use shapefile::record::polygon::{Polygon as ShapePolygon, PolygonRing};
use std::path::{Path, PathBuf};

/// Common extent definitions for testing, as (min_x, min_y, max_x, max_y).
pub mod extent {
    /// The 2000 x 1500 box used by the end-to-end scenarios
    pub const SCENARIO: (f64, f64, f64, f64) = (0.0, 0.0, 2000.0, 1500.0);

    /// Small area in Web Mercator around lower Manhattan
    pub const MANHATTAN: (f64, f64, f64, f64) =
        (-8_238_000.0, 4_966_000.0, -8_235_000.0, 4_971_000.0);

    /// Degenerate box (zero width)
    pub const DEGENERATE: (f64, f64, f64, f64) = (10.0, 0.0, 10.0, 5.0);

    /// Invalid box (min > max)
    pub const INVALID: (f64, f64, f64, f64) = (10.0, 10.0, 5.0, 5.0);
}

/// Common CRS identifiers.
pub mod crs {
    /// WGS84 geographic
    pub const EPSG_4326: &str = "EPSG:4326";

    /// Web Mercator
    pub const EPSG_3857: &str = "EPSG:3857";

    /// UTM zone 33N, projected but without a built-in transform
    pub const EPSG_32633: &str = "EPSG:32633";
}

/// Build a `BoundingBox` from one of the tuples above.
pub fn bbox_of(extent: (f64, f64, f64, f64)) -> tile_common::BoundingBox {
    tile_common::BoundingBox::new(extent.0, extent.1, extent.2, extent.3)
}

/// A closed circle approximation with `vertices` points.
///
/// Use a multiple of 4 so the polygon reaches the circle's extreme points
/// and its bounds equal the circle's bounds.
pub fn circle_polygon(cx: f64, cy: f64, radius: f64, vertices: usize) -> Polygon<f64> {
    let mut coords: Vec<Coord<f64>> = (0..vertices)
        .map(|k| {
            let angle = 2.0 * std::f64::consts::PI * k as f64 / vertices as f64;
            Coord {
                x: cx + radius * angle.cos(),
                y: cy + radius * angle.sin(),
            }
        })
        .collect();
    coords.push(coords[0]);
    Polygon::new(LineString::new(coords), vec![])
}

/// An axis-aligned rectangle polygon.
pub fn rectangle_polygon(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Polygon<f64> {
    Polygon::new(
        LineString::from(vec![
            (min_x, min_y),
            (max_x, min_y),
            (max_x, max_y),
            (min_x, max_y),
            (min_x, min_y),
        ]),
        vec![],
    )
}

/// GeoJSON Feature text for `polygon`, optionally tagged with a legacy `crs` member.
pub fn polygon_geojson(polygon: &Polygon<f64>, epsg: Option<u32>) -> String {
    let ring: Vec<[f64; 2]> = polygon.exterior().coords().map(|c| [c.x, c.y]).collect();
    let mut feature = serde_json::json!({
        "type": "Feature",
        "properties": {},
        "geometry": {
            "type": "Polygon",
            "coordinates": [ring],
        }
    });
    if let Some(code) = epsg {
        feature["crs"] = serde_json::json!({
            "type": "name",
            "properties": { "name": format!("urn:ogc:def:crs:EPSG::{}", code) }
        });
    }
    feature.to_string()
}

/// Write `polygon` as a GeoJSON file named `name` inside `dir`.
pub fn write_boundary_file(
    dir: &Path,
    name: &str,
    polygon: &Polygon<f64>,
    epsg: Option<u32>,
) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, polygon_geojson(polygon, epsg)).expect("Failed to write boundary file");
    path
}

/// ESRI WKT for Web Mercator as GIS tools write it into `.prj` files.
pub const WEB_MERCATOR_PRJ: &str = r#"PROJCS["WGS_1984_Web_Mercator_Auxiliary_Sphere",GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Mercator_Auxiliary_Sphere"],PARAMETER["False_Easting",0.0],PARAMETER["False_Northing",0.0],PARAMETER["Central_Meridian",0.0],PARAMETER["Standard_Parallel_1",0.0],PARAMETER["Auxiliary_Sphere_Type",0.0],UNIT["Meter",1.0]]"#;

/// Write `polygons` as an ESRI shapefile named `name` inside `dir`, with an
/// optional `.prj` sidecar holding `prj`.
pub fn write_boundary_shapefile(
    dir: &Path,
    name: &str,
    polygons: &[Polygon<f64>],
    prj: Option<&str>,
) -> PathBuf {
    let path = dir.join(name);
    let shapes: Vec<ShapePolygon> = polygons
        .iter()
        .map(|polygon| {
            let mut rings = vec![PolygonRing::Outer(shape_points(polygon.exterior()))];
            rings.extend(
                polygon
                    .interiors()
                    .iter()
                    .map(|ring| PolygonRing::Inner(shape_points(ring))),
            );
            ShapePolygon::with_rings(rings)
        })
        .collect();

    let mut writer = shapefile::ShapeWriter::from_path(&path).expect("Failed to create shapefile");
    writer.write_shapes(&shapes).expect("Failed to write shapefile");

    if let Some(wkt) = prj {
        std::fs::write(path.with_extension("prj"), wkt).expect("Failed to write .prj file");
    }
    path
}

fn shape_points(ring: &LineString<f64>) -> Vec<ShapePoint> {
    ring.coords().map(|c| ShapePoint::new(c.x, c.y)).collect()
}

/// Circle inscribed in the height of the scenario box: centre (1000, 750), radius 750.
pub fn scenario_circle() -> Polygon<f64> {
    circle_polygon(1000.0, 750.0, 750.0, 256)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::BoundingRect;

    #[test]
    fn test_circle_bounds_match_radius() {
        let rect = scenario_circle().bounding_rect().unwrap();
        assert!((rect.min().x - 250.0).abs() < 1e-9);
        assert!((rect.max().x - 1750.0).abs() < 1e-9);
        assert!((rect.min().y - 0.0).abs() < 1e-9);
        assert!((rect.max().y - 1500.0).abs() < 1e-9);
    }

    #[test]
    fn test_polygon_geojson_has_crs_member() {
        let text = polygon_geojson(&rectangle_polygon(0.0, 0.0, 1.0, 1.0), Some(3857));
        assert!(text.contains("EPSG::3857"));
        assert!(text.contains("\"Polygon\""));
    }

    #[test]
    fn test_bbox_of() {
        let bbox = bbox_of(extent::SCENARIO);
        assert_eq!(bbox.width(), 2000.0);
        assert_eq!(bbox.height(), 1500.0);
    }
}
