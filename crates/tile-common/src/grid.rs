//! Tile lattice over a bounding box.

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::error::{ExtractError, ExtractResult};
use crate::tile::TileSpec;
use crate::transform::AffineTransform;

/// Tolerance used when deciding whether a span is an exact multiple of the tile size.
const SPAN_EPSILON: f64 = 1e-9;

/// Largest number of tiles a single lattice may hold.
pub const MAX_TILES: usize = 1_000_000;

/// What to do with the last row/column when the box is not a multiple of the tile size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgePolicy {
    /// Keep full-size edge tiles; the lattice may extend past the box.
    #[default]
    Overshoot,
    /// Shrink edge tiles so the lattice ends exactly on the box.
    ClipToExact,
}

impl EdgePolicy {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "overshoot" | "cover" => Some(Self::Overshoot),
            "clip" | "clip_to_exact" | "exact" => Some(Self::ClipToExact),
            _ => None,
        }
    }
}

/// A regular lattice of square tiles anchored at the bottom-left of a bbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileGrid {
    /// Area being partitioned
    pub bbox: BoundingBox,
    /// Tile side length in CRS units
    pub tile_size: f64,
    /// Number of tiles along X
    pub nx: usize,
    /// Number of tiles along Y
    pub ny: usize,
    /// Edge handling
    pub edge_policy: EdgePolicy,
}

impl TileGrid {
    /// Partition `bbox` into tiles of `tile_size` units.
    pub fn new(bbox: BoundingBox, tile_size: f64, edge_policy: EdgePolicy) -> ExtractResult<Self> {
        if !tile_size.is_finite() || tile_size <= 0.0 {
            return Err(ExtractError::configuration(format!(
                "tile size must be a positive number, got {}",
                tile_size
            )));
        }
        bbox.validate()?;

        let nx = cells_along(bbox.width(), tile_size)?;
        let ny = cells_along(bbox.height(), tile_size)?;
        match nx.checked_mul(ny) {
            Some(count) if count <= MAX_TILES => {}
            _ => {
                return Err(ExtractError::configuration(format!(
                    "{}x{} tiles exceed the limit of {} tiles per run",
                    nx, ny, MAX_TILES
                )))
            }
        }

        Ok(Self {
            bbox,
            tile_size,
            nx,
            ny,
            edge_policy,
        })
    }

    /// Grid shape as (nx, ny).
    pub fn shape(&self) -> (usize, usize) {
        (self.nx, self.ny)
    }

    /// Total number of tiles.
    pub fn len(&self) -> usize {
        self.nx.saturating_mul(self.ny)
    }

    /// Check if grid is empty.
    pub fn is_empty(&self) -> bool {
        self.nx == 0 || self.ny == 0
    }

    /// Ground extent covered by the whole lattice.
    ///
    /// Equal to `bbox` under [`EdgePolicy::ClipToExact`]; may extend past
    /// the high edges under [`EdgePolicy::Overshoot`].
    pub fn extent(&self) -> BoundingBox {
        match self.edge_policy {
            EdgePolicy::ClipToExact => self.bbox,
            EdgePolicy::Overshoot => BoundingBox::new(
                self.bbox.min_x,
                self.bbox.min_y,
                self.bbox.min_x + self.nx as f64 * self.tile_size,
                self.bbox.min_y + self.ny as f64 * self.tile_size,
            ),
        }
    }

    /// Extent of tile `(i, j)`.
    pub fn tile_extent(&self, i: usize, j: usize) -> Option<BoundingBox> {
        if i >= self.nx || j >= self.ny {
            return None;
        }

        let min_x = self.bbox.min_x + i as f64 * self.tile_size;
        let min_y = self.bbox.min_y + j as f64 * self.tile_size;
        let mut max_x = self.bbox.min_x + (i + 1) as f64 * self.tile_size;
        let mut max_y = self.bbox.min_y + (j + 1) as f64 * self.tile_size;

        if self.edge_policy == EdgePolicy::ClipToExact {
            max_x = max_x.min(self.bbox.max_x);
            max_y = max_y.min(self.bbox.max_y);
        }

        Some(BoundingBox::new(min_x, min_y, max_x, max_y))
    }

    /// Iterate tiles in row-major `(i, j)` order: `i` outer, `j` inner.
    pub fn iter(&self) -> impl Iterator<Item = TileSpec> + '_ {
        (0..self.nx).flat_map(move |i| {
            (0..self.ny).filter_map(move |j| {
                self.tile_extent(i, j)
                    .map(|extent| TileSpec::new(i, j, extent))
            })
        })
    }

    /// Collect every tile of the lattice.
    pub fn tiles(&self) -> Vec<TileSpec> {
        self.iter().collect()
    }

    /// The shared pixel transform for this lattice at `pixel_size` units per pixel.
    pub fn transform(&self, pixel_size: f64) -> AffineTransform {
        AffineTransform::from_bbox(&self.extent(), pixel_size)
    }
}

/// `ceil(span / tile_size)`, tolerant of floating point noise on exact multiples.
fn cells_along(span: f64, tile_size: f64) -> ExtractResult<usize> {
    let ratio = span / tile_size;
    let rounded = ratio.round();
    let cells = if (ratio - rounded).abs() < SPAN_EPSILON {
        rounded
    } else {
        ratio.ceil()
    };

    // Also rejects NaN and infinite ratios.
    if !(cells <= MAX_TILES as f64) {
        return Err(ExtractError::configuration(format!(
            "a span of {} at tile size {} needs {} tiles, limit is {}",
            span, tile_size, cells, MAX_TILES
        )));
    }
    Ok(cells.max(1.0) as usize)
}
