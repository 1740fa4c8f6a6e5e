//! Per-tile work items and their rendered artifacts.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::bbox::BoundingBox;
use crate::crs::Crs;

/// File extension of per-tile rasters.
pub const TILE_EXTENSION: &str = "tif";

/// One cell of the tile lattice.
///
/// Created by the partitioner and consumed once by the render stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileSpec {
    /// Zero-based column in the lattice
    pub grid_i: usize,
    /// Zero-based row in the lattice (counted from the bottom)
    pub grid_j: usize,
    /// Ground extent of this cell
    pub extent: BoundingBox,
    /// Deterministic identifier, `raster_{i}_{j}`
    pub output_id: String,
}

impl TileSpec {
    pub fn new(grid_i: usize, grid_j: usize, extent: BoundingBox) -> Self {
        Self {
            grid_i,
            grid_j,
            extent,
            output_id: Self::output_id_for(grid_i, grid_j),
        }
    }

    /// Identifier for lattice coordinates `(i, j)`.
    pub fn output_id_for(grid_i: usize, grid_j: usize) -> String {
        format!("raster_{}_{}", grid_i, grid_j)
    }

    /// File name of the rendered raster.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.output_id, TILE_EXTENSION)
    }

    /// Output path of the rendered raster inside `work_dir`.
    pub fn output_path(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(self.file_name())
    }
}

/// A tile raster on disk together with the CRS stamped onto it.
///
/// Owned by the mosaic assembler until merged.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedTile {
    pub tile_spec: TileSpec,
    pub raster_path: PathBuf,
    pub crs: Crs,
}

impl RenderedTile {
    pub fn new(tile_spec: TileSpec, raster_path: PathBuf, crs: Crs) -> Self {
        Self {
            tile_spec,
            raster_path,
            crs,
        }
    }

    pub fn id(&self) -> &str {
        &self.tile_spec.output_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_paths_are_deterministic() {
        let spec = TileSpec::new(3, 7, BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(spec.output_id, "raster_3_7");
        assert_eq!(
            spec.output_path(Path::new("/tmp/work")),
            PathBuf::from("/tmp/work/raster_3_7.tif")
        );
    }
}
