//! Coverage and determinism tests for the tile lattice.

use tile_common::{BoundingBox, EdgePolicy, ExtractError, TileGrid, MAX_TILES};

fn sample_boxes() -> Vec<BoundingBox> {
    vec![
        BoundingBox::new(0.0, 0.0, 2000.0, 1500.0),
        BoundingBox::new(-1234.5, 987.25, 3210.75, 4567.5),
        BoundingBox::new(100.0, 100.0, 101.0, 100.5),
        BoundingBox::new(-8_238_000.0, 4_960_000.0, -8_230_500.0, 4_971_250.0),
        BoundingBox::new(0.0, 0.0, 10_000.0, 10_000.0),
    ]
}

const TILE_SIZES: [f64; 5] = [1.0, 250.0, 333.3, 1000.0, 4096.0];

/// Build the grid when it holds at most 50 000 tiles.
fn small_grid(bbox: BoundingBox, tile_size: f64, policy: EdgePolicy) -> Option<TileGrid> {
    let estimate = (bbox.width() / tile_size).ceil() * (bbox.height() / tile_size).ceil();
    if estimate > 50_000.0 {
        return None;
    }
    Some(TileGrid::new(bbox, tile_size, policy).unwrap())
}

// ============================================================================
// Coverage
// ============================================================================

#[test]
fn test_tiles_cover_the_box() {
    for bbox in sample_boxes() {
        for tile_size in TILE_SIZES {
            for policy in [EdgePolicy::Overshoot, EdgePolicy::ClipToExact] {
                let Some(grid) = small_grid(bbox, tile_size, policy) else {
                    continue;
                };
                let tiles = grid.tiles();
                assert_eq!(tiles.len(), grid.len());

                let union = tiles
                    .iter()
                    .map(|t| t.extent)
                    .reduce(|a, b| a.union(&b))
                    .unwrap();
                assert!(
                    union.contains(&bbox),
                    "union {:?} does not cover {:?} (tile size {})",
                    union,
                    bbox,
                    tile_size
                );
            }
        }
    }
}

#[test]
fn test_tile_areas_sum_to_lattice_area() {
    // Non-overlap check: interior-disjoint tiles inside the lattice extent
    // have areas that sum to the lattice area.
    for bbox in sample_boxes() {
        for tile_size in TILE_SIZES {
            let Some(grid) = small_grid(bbox, tile_size, EdgePolicy::Overshoot) else {
                continue;
            };
            let total: f64 = grid.iter().map(|t| t.extent.area()).sum();
            let lattice = grid.extent().area();
            assert!(
                ((total - lattice) / lattice).abs() < 1e-9,
                "tile areas {} != lattice area {}",
                total,
                lattice
            );
        }
    }
}

#[test]
fn test_no_two_tiles_overlap() {
    let bbox = BoundingBox::new(-1234.5, 987.25, 3210.75, 4567.5);
    for policy in [EdgePolicy::Overshoot, EdgePolicy::ClipToExact] {
        let grid = TileGrid::new(bbox, 333.3, policy).unwrap();
        let tiles = grid.tiles();
        for (a_idx, a) in tiles.iter().enumerate() {
            for b in &tiles[a_idx + 1..] {
                assert!(
                    !a.extent.overlaps_interior(&b.extent),
                    "{} overlaps {}",
                    a.output_id,
                    b.output_id
                );
            }
        }
    }
}

#[test]
fn test_lattice_larger_than_limit_is_configuration_error() {
    let bbox = BoundingBox::new(0.0, 0.0, 1e10, 1e10);
    let err = TileGrid::new(bbox, 1000.0, EdgePolicy::Overshoot).unwrap_err();
    assert!(matches!(err, ExtractError::Configuration(_)));
    assert!(err.to_string().contains(&MAX_TILES.to_string()));
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn test_identifiers_are_unique_and_reproducible() {
    let bbox = BoundingBox::new(0.0, 0.0, 10_000.0, 7_500.0);
    let first = TileGrid::new(bbox, 1000.0, EdgePolicy::Overshoot).unwrap().tiles();
    let second = TileGrid::new(bbox, 1000.0, EdgePolicy::Overshoot).unwrap().tiles();
    assert_eq!(first, second);

    let mut ids: Vec<_> = first.iter().map(|t| t.output_id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), first.len());
}

#[test]
fn test_transform_is_reproducible() {
    let bbox = BoundingBox::new(0.0, 0.0, 2000.0, 1500.0);
    let a = TileGrid::new(bbox, 1000.0, EdgePolicy::Overshoot)
        .unwrap()
        .transform(0.3);
    let b = TileGrid::new(bbox, 1000.0, EdgePolicy::Overshoot)
        .unwrap()
        .transform(0.3);
    assert_eq!(a, b);
    assert_eq!(a.origin_x, 0.0);
    assert_eq!(a.origin_y, 2000.0);
}

// ============================================================================
// Scenario: bbox (0,2000,0,1500) with 1000 unit tiles
// ============================================================================

#[test]
fn test_two_by_two_scenario() {
    let bbox = BoundingBox::new(0.0, 0.0, 2000.0, 1500.0);
    let grid = TileGrid::new(bbox, 1000.0, EdgePolicy::Overshoot).unwrap();
    let tiles = grid.tiles();

    assert_eq!(grid.shape(), (2, 2));
    assert_eq!(tiles.len(), 4);
    assert_eq!(tiles[0].extent, BoundingBox::new(0.0, 0.0, 1000.0, 1000.0));
    assert_eq!(
        tiles[0].extent.to_extent_string(tile_common::Crs::WEB_MERCATOR),
        "0,1000,0,1000 [EPSG:3857]"
    );
    assert_eq!(tiles[3].output_id, "raster_1_1");
}
