//! Tile relevance filter.

use geo::{Intersects, Rect};
use tracing::debug;

use tile_common::{BoundingBox, TileSpec};

use crate::geometry::BoundaryGeometry;

/// Tiles split by whether they touch the boundary.
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub kept: Vec<TileSpec>,
    pub discarded: Vec<TileSpec>,
}

/// Keep the tiles whose extents intersect `boundary`.
///
/// Without a boundary every tile is kept. Touching edges count as
/// intersecting so edge tiles that still contribute pixels after an
/// all-touched clip are not dropped. Input order is preserved.
///
/// Tiles are consumed one at a time, so a lazy grid iterator never has to
/// be collected first.
pub fn filter_tiles(
    tiles: impl IntoIterator<Item = TileSpec>,
    boundary: Option<&BoundaryGeometry>,
) -> FilterOutcome {
    let Some(boundary) = boundary else {
        return FilterOutcome {
            kept: tiles.into_iter().collect(),
            discarded: Vec::new(),
        };
    };

    let bounds = boundary.bounds().ok();
    let (kept, discarded): (Vec<_>, Vec<_>) = tiles.into_iter().partition(|tile| {
        // Cheap bbox rejection before the exact polygon test.
        if let Some(bounds) = &bounds {
            if !bounds.intersects(&tile.extent) {
                return false;
            }
        }
        boundary.polygons().intersects(&to_rect(&tile.extent))
    });

    debug!(
        kept = kept.len(),
        discarded = discarded.len(),
        "Filtered tiles against boundary"
    );

    FilterOutcome { kept, discarded }
}

fn to_rect(extent: &BoundingBox) -> Rect<f64> {
    Rect::new(
        geo::coord! { x: extent.min_x, y: extent.min_y },
        geo::coord! { x: extent.max_x, y: extent.max_y },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use tile_common::{Crs, EdgePolicy, TileGrid};

    fn grid_tiles() -> Vec<TileSpec> {
        TileGrid::new(
            BoundingBox::new(0.0, 0.0, 2000.0, 1500.0),
            1000.0,
            EdgePolicy::Overshoot,
        )
        .unwrap()
        .tiles()
    }

    #[test]
    fn test_identity_without_boundary() {
        let tiles = grid_tiles();
        let outcome = filter_tiles(tiles.clone(), None);
        assert_eq!(outcome.kept, tiles);
        assert!(outcome.discarded.is_empty());
    }

    #[test]
    fn test_lower_left_quadrant_keeps_one_tile() {
        let boundary = BoundaryGeometry::from_polygon(
            polygon![
                (x: 100.0, y: 100.0),
                (x: 900.0, y: 100.0),
                (x: 900.0, y: 700.0),
                (x: 100.0, y: 700.0),
            ],
            Crs::WEB_MERCATOR,
        )
        .unwrap();

        let outcome = filter_tiles(grid_tiles(), Some(&boundary));
        assert_eq!(outcome.kept.len(), 1);
        assert_eq!(outcome.kept[0].output_id, "raster_0_0");
        assert_eq!(outcome.discarded.len(), 3);
    }

    #[test]
    fn test_touching_edge_is_kept() {
        // Polygon ends exactly on the x = 1000 tile border.
        let boundary = BoundaryGeometry::from_polygon(
            polygon![
                (x: 500.0, y: 100.0),
                (x: 1000.0, y: 100.0),
                (x: 1000.0, y: 400.0),
                (x: 500.0, y: 400.0),
            ],
            Crs::WEB_MERCATOR,
        )
        .unwrap();

        let outcome = filter_tiles(grid_tiles(), Some(&boundary));
        let ids: Vec<_> = outcome.kept.iter().map(|t| t.output_id.as_str()).collect();
        assert_eq!(ids, ["raster_0_0", "raster_1_0"]);
    }

    #[test]
    fn test_bbox_overlap_without_polygon_overlap_is_discarded() {
        // Triangle under the line y = 0.75x. Its bbox touches every tile
        // but the polygon never reaches the upper-left cell.
        let boundary = BoundaryGeometry::from_polygon(
            polygon![
                (x: 0.0, y: 0.0),
                (x: 2000.0, y: 0.0),
                (x: 2000.0, y: 1500.0),
            ],
            Crs::WEB_MERCATOR,
        )
        .unwrap();

        let outcome = filter_tiles(grid_tiles(), Some(&boundary));
        let ids: Vec<_> = outcome.kept.iter().map(|t| t.output_id.as_str()).collect();
        assert_eq!(ids, ["raster_0_0", "raster_1_0", "raster_1_1"]);
        assert_eq!(outcome.discarded[0].output_id, "raster_0_1");
    }

    #[test]
    fn test_filters_lazy_grid_iterator() {
        let grid = TileGrid::new(
            BoundingBox::new(0.0, 0.0, 10_000.0, 10_000.0),
            100.0,
            EdgePolicy::Overshoot,
        )
        .unwrap();
        let boundary = BoundaryGeometry::from_polygon(
            polygon![
                (x: 5010.0, y: 5010.0),
                (x: 5090.0, y: 5010.0),
                (x: 5090.0, y: 5090.0),
            ],
            Crs::WEB_MERCATOR,
        )
        .unwrap();

        let outcome = filter_tiles(grid.iter(), Some(&boundary));
        assert_eq!(outcome.kept.len(), 1);
        assert_eq!(outcome.kept[0].output_id, "raster_50_50");
        assert_eq!(outcome.discarded.len(), grid.len() - 1);
    }
}
