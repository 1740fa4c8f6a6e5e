//! Affine mapping between pixel lattice coordinates and ground coordinates.

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;

/// A north-up affine transform with square pixels.
///
/// Pixel `(col, row)` has its top-left corner at
/// `(origin_x + col * pixel_size, origin_y - row * pixel_size)`.
/// One transform is derived per run and shared by every tile so that
/// per-tile rasters land on the same pixel lattice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_size: f64,
}

impl AffineTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_size: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_size,
        }
    }

    /// Transform anchored at the top-left corner of `bbox`.
    pub fn from_bbox(bbox: &BoundingBox, pixel_size: f64) -> Self {
        Self::new(bbox.min_x, bbox.max_y, pixel_size)
    }

    /// Ground coordinate of the top-left corner of a pixel.
    pub fn pixel_to_ground(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_size,
            self.origin_y - row * self.pixel_size,
        )
    }

    /// Fractional pixel position of a ground coordinate.
    pub fn ground_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_size,
            (self.origin_y - y) / self.pixel_size,
        )
    }

    /// Integer pixel offset of the top-left corner of `extent`.
    ///
    /// Rounded rather than floored so that extents lying on the lattice up
    /// to floating point noise map to the same offset every run.
    pub fn pixel_offset(&self, extent: &BoundingBox) -> (i64, i64) {
        let (col, row) = self.ground_to_pixel(extent.min_x, extent.max_y);
        (col.round() as i64, row.round() as i64)
    }

    /// Pixel dimensions (width, height) covering `extent`.
    pub fn pixel_dims(&self, extent: &BoundingBox) -> (usize, usize) {
        let width = (extent.width() / self.pixel_size).round().max(0.0) as usize;
        let height = (extent.height() / self.pixel_size).round().max(0.0) as usize;
        (width, height)
    }

    /// Ground extent of a pixel window.
    pub fn window_bbox(&self, col: i64, row: i64, width: usize, height: usize) -> BoundingBox {
        let (min_x, max_y) = self.pixel_to_ground(col as f64, row as f64);
        let (max_x, min_y) =
            self.pixel_to_ground((col + width as i64) as f64, (row + height as i64) as f64);
        BoundingBox::new(min_x, min_y, max_x, max_y)
    }

    /// Transform of a sub-window whose top-left pixel is `(col, row)`.
    pub fn shifted(&self, col: i64, row: i64) -> AffineTransform {
        let (x, y) = self.pixel_to_ground(col as f64, row as f64);
        AffineTransform::new(x, y, self.pixel_size)
    }

    /// Transform with pixels `factor` times larger, same origin.
    pub fn scaled(&self, factor: usize) -> AffineTransform {
        AffineTransform::new(
            self.origin_x,
            self.origin_y,
            self.pixel_size * factor as f64,
        )
    }

    /// GDAL-style six coefficient form.
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_size,
            0.0,
            self.origin_y,
            0.0,
            -self.pixel_size,
        ]
    }
}
