//! Spherical Web Mercator (EPSG:3857).

/// Earth radius used by Web Mercator (meters).
const EARTH_RADIUS: f64 = 6_378_137.0;

/// Latitude at which Web Mercator is clamped (degrees).
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

/// Convert lon/lat degrees to Web Mercator meters.
///
/// Latitudes beyond ±[`MAX_MERCATOR_LAT`] are clamped.
#[inline]
pub fn wgs84_to_web_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
    let x = EARTH_RADIUS * lon.to_radians();
    let y = EARTH_RADIUS * lat.to_radians().tan().asinh();
    (x, y)
}

/// Convert Web Mercator meters to lon/lat degrees.
#[inline]
pub fn web_mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (y / EARTH_RADIUS).sinh().atan().to_degrees();
    (lon, lat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin() {
        let (x, y) = wgs84_to_web_mercator(0.0, 0.0);
        assert!(x.abs() < 1e-9);
        assert!(y.abs() < 1e-9);
    }

    #[test]
    fn test_world_extent() {
        let (x, y) = wgs84_to_web_mercator(180.0, MAX_MERCATOR_LAT);
        assert!((x - 20_037_508.342_789_244).abs() < 1e-3);
        assert!((y - 20_037_508.342_789_244).abs() < 1e-3);
    }

    #[test]
    fn test_round_trip() {
        for &(lon, lat) in &[(-73.9857, 40.7484), (2.2945, 48.8584), (151.2153, -33.8568)] {
            let (x, y) = wgs84_to_web_mercator(lon, lat);
            let (lon2, lat2) = web_mercator_to_wgs84(x, y);
            assert!((lon - lon2).abs() < 1e-9);
            assert!((lat - lat2).abs() < 1e-9);
        }
    }
}
