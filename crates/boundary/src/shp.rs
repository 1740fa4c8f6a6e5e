//! ESRI shapefile boundaries.
//!
//! Polygon records (including M and Z variants) are read with the
//! `shapefile` crate. The CRS comes from the caller or from the sidecar
//! `.prj` file.

use std::path::Path;

use geo::{Coord, LineString, Polygon};
use shapefile::record::polygon::PolygonRing;
use shapefile::record::Shape;
use tracing::debug;

use tile_common::{Crs, ExtractError, ExtractResult};

/// Read every polygon in a `.shp` file, along with the CRS declared by its
/// `.prj` sidecar when one exists.
pub fn read_polygons(path: &Path) -> ExtractResult<(Vec<Polygon<f64>>, Option<Crs>)> {
    if !path.is_file() {
        return Err(ExtractError::configuration(format!(
            "cannot read boundary file {}: not a file",
            path.display()
        )));
    }

    let shapes = shapefile::read_shapes(path).map_err(|e| {
        ExtractError::data_integrity(format!("invalid shapefile {}: {}", path.display(), e))
    })?;

    let mut polygons = Vec::new();
    for (idx, shape) in shapes.into_iter().enumerate() {
        let rings: Vec<(bool, Vec<Coord<f64>>)> = match shape {
            Shape::NullShape => continue,
            Shape::Polygon(polygon) => polygon
                .rings()
                .iter()
                .map(|ring| ring_coords(ring, |p| Coord { x: p.x, y: p.y }))
                .collect(),
            Shape::PolygonM(polygon) => polygon
                .rings()
                .iter()
                .map(|ring| ring_coords(ring, |p| Coord { x: p.x, y: p.y }))
                .collect(),
            Shape::PolygonZ(polygon) => polygon
                .rings()
                .iter()
                .map(|ring| ring_coords(ring, |p| Coord { x: p.x, y: p.y }))
                .collect(),
            other => {
                return Err(ExtractError::data_integrity(format!(
                    "shapefile record {} is a {:?}, not a polygon",
                    idx,
                    other.shapetype()
                )))
            }
        };
        assemble_rings(rings, &mut polygons);
    }

    let prj = path.with_extension("prj");
    let crs = if prj.is_file() {
        let wkt = std::fs::read_to_string(&prj).map_err(|e| {
            ExtractError::configuration(format!("cannot read {}: {}", prj.display(), e))
        })?;
        let crs = crs_from_wkt(&wkt);
        if crs.is_none() {
            debug!(path = %prj.display(), "Unrecognised projection file");
        }
        crs
    } else {
        None
    };

    Ok((polygons, crs))
}

fn ring_coords<P>(ring: &PolygonRing<P>, xy: impl Fn(&P) -> Coord<f64>) -> (bool, Vec<Coord<f64>>) {
    let outer = matches!(ring, PolygonRing::Outer(_));
    (outer, ring.points().iter().map(xy).collect())
}

/// Each outer ring opens a polygon and inner rings attach to the most
/// recent one. An inner ring with no outer ring before it becomes an outer.
fn assemble_rings(rings: Vec<(bool, Vec<Coord<f64>>)>, out: &mut Vec<Polygon<f64>>) {
    let mut current: Option<(LineString<f64>, Vec<LineString<f64>>)> = None;

    for (outer, coords) in rings {
        let ring = LineString::new(coords);
        match (outer, current.as_mut()) {
            (false, Some((_, holes))) => holes.push(ring),
            _ => {
                if let Some((exterior, holes)) = current.take() {
                    out.push(Polygon::new(exterior, holes));
                }
                current = Some((ring, Vec::new()));
            }
        }
    }

    if let Some((exterior, holes)) = current {
        out.push(Polygon::new(exterior, holes));
    }
}

/// Recognise the CRS described by ESRI or OGC WKT.
///
/// The last EPSG authority in the text names the outermost CRS. Files
/// without one are matched on well-known projection names.
pub fn crs_from_wkt(wkt: &str) -> Option<Crs> {
    if let Some(code) = last_epsg_authority(wkt) {
        return Some(Crs::from_epsg(code));
    }

    let upper = wkt.trim_start().to_uppercase();
    if upper.contains("WEB_MERCATOR")
        || upper.contains("PSEUDO_MERCATOR")
        || upper.contains("PSEUDO-MERCATOR")
        || upper.contains("POPULAR VISUALISATION")
    {
        return Some(Crs::WEB_MERCATOR);
    }

    if let Some(zone) = utm_zone(&upper) {
        return Some(zone);
    }

    if upper.starts_with("GEOGCS") || upper.starts_with("GEOGCRS") {
        if upper.contains("WGS_1984") || upper.contains("WGS 84") || upper.contains("WGS84") {
            return Some(Crs::WGS84);
        }
    }

    None
}

fn last_epsg_authority(wkt: &str) -> Option<u32> {
    let upper = wkt.to_uppercase();
    let mut found = None;
    for marker in ["AUTHORITY[\"EPSG\",", "ID[\"EPSG\","] {
        let mut rest = upper.as_str();
        while let Some(pos) = rest.find(marker) {
            let tail = &rest[pos + marker.len()..];
            let digits: String = tail
                .trim_start_matches(|c: char| c == '"' || c.is_whitespace())
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if let Ok(code) = digits.parse::<u32>() {
                let offset = upper.len() - rest.len() + pos;
                if found.map_or(true, |(at, _)| offset > at) {
                    found = Some((offset, code));
                }
            }
            rest = tail;
        }
    }
    found.map(|(_, code)| code)
}

/// `WGS_1984_UTM_Zone_33N` and friends.
fn utm_zone(upper: &str) -> Option<Crs> {
    let marker = "WGS_1984_UTM_ZONE_";
    let pos = upper.find(marker)?;
    let tail = &upper[pos + marker.len()..];
    let digits: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
    let zone: u32 = digits.parse().ok()?;
    if !(1..=60).contains(&zone) {
        return None;
    }
    match tail[digits.len()..].chars().next()? {
        'N' => Some(Crs::from_epsg(32600 + zone)),
        'S' => Some(Crs::from_epsg(32700 + zone)),
        _ => None,
    }
}
