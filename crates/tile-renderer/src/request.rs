//! Render request construction.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use tile_common::{BoundingBox, Crs, TileSpec};

/// Satellite basemap layer rendered when no source is given.
pub const DEFAULT_LAYER: &str = "wms://crs=EPSG:3857&format&type=xyz&url=https://mt1.google.com/vt/lyrs%3Ds%26x%3D%7Bx%7D%26y%3D%7By%7D%26z%3D%7Bz%7D&zmax=22&zmin=0&http-header:referer=";

/// Everything a renderer needs to produce one tile raster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    /// `raster_{i}_{j}`
    pub tile_id: String,
    pub grid_i: usize,
    pub grid_j: usize,
    /// Ground extent of the tile
    pub bbox: BoundingBox,
    pub crs: Crs,
    /// `"<minx>,<maxx>,<miny>,<maxy> [EPSG:<code>]"`
    pub extent: String,
    /// Tile edge length in CRS units
    pub tile_size: f64,
    /// Map units per pixel
    pub pixel_size: f64,
    pub background_transparent: bool,
    pub layer_reference: String,
    pub output_path: PathBuf,
}

impl RenderRequest {
    /// Build the request for `tile`, writing into `work_dir`.
    pub fn for_tile(
        tile: &TileSpec,
        crs: Crs,
        tile_size: f64,
        pixel_size: f64,
        layer_reference: &str,
        work_dir: &Path,
    ) -> Self {
        Self {
            tile_id: tile.output_id.clone(),
            grid_i: tile.grid_i,
            grid_j: tile.grid_j,
            bbox: tile.extent,
            crs,
            extent: tile.extent.to_extent_string(crs),
            tile_size,
            pixel_size,
            background_transparent: false,
            layer_reference: layer_reference.to_string(),
            output_path: tile.output_path(work_dir),
        }
    }

    /// Pixel dimensions of the expected output.
    pub fn pixel_dims(&self) -> (usize, usize) {
        let width = (self.bbox.width() / self.pixel_size).round().max(1.0) as usize;
        let height = (self.bbox.height() / self.pixel_size).round().max(1.0) as usize;
        (width, height)
    }

    /// Parameters of the `native:rasterize` processing algorithm, in call order.
    pub fn to_parameters(&self) -> Vec<(&'static str, String)> {
        vec![
            ("EXTENT", self.extent.clone()),
            ("EXTENT_BUFFER", "0".to_string()),
            ("TILE_SIZE", format_number(self.tile_size)),
            ("MAP_UNITS_PER_PIXEL", format_number(self.pixel_size)),
            (
                "MAKE_BACKGROUND_TRANSPARENT",
                self.background_transparent.to_string(),
            ),
            ("LAYERS", self.layer_reference.clone()),
            ("OUTPUT", self.output_path.display().to_string()),
        ]
    }
}

fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}
