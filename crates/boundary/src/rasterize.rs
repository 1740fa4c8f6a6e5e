//! All-touched rasterization of boundary geometry onto a pixel lattice.
//!
//! A pixel is inside the mask when the polygon overlaps any part of its
//! interior, not only when the pixel centre falls inside. A polygon that
//! merely shares an edge or a corner with a pixel does not mark it. The
//! mask is built in two passes:
//!
//! 1. **Interior fill**: a scanline through each row's pixel centres marks
//!    the pixels whose centres are inside a polygon (even-odd per polygon).
//! 2. **Edge trace**: every ring segment is walked cell by cell and each
//!    pixel whose interior it passes through is marked.

use geo::{LineString, Polygon};

use tile_common::{AffineTransform, BoundingBox, ExtractError, ExtractResult};

use crate::geometry::BoundaryGeometry;

/// Values closer than this to an integer pixel edge snap onto it.
const SNAP_EPSILON: f64 = 1e-6;

/// A boolean pixel mask in row-major order, row 0 at the top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    pub width: usize,
    pub height: usize,
    cells: Vec<bool>,
}

impl Mask {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![false; width * height],
        }
    }

    pub fn get(&self, col: usize, row: usize) -> bool {
        col < self.width && row < self.height && self.cells[row * self.width + col]
    }

    fn set(&mut self, col: i64, row: i64) {
        if col >= 0 && row >= 0 && (col as usize) < self.width && (row as usize) < self.height {
            self.cells[row as usize * self.width + col as usize] = true;
        }
    }

    /// Number of marked pixels.
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.cells
    }
}

/// A pixel-aligned window inside a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub col: usize,
    pub row: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelWindow {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Smallest pixel window of a `width` x `height` raster that covers `bounds`.
///
/// Edges are rounded outward so partially covered pixels are included.
/// Fails when the bounds do not overlap the raster at all.
pub fn bounding_window(
    bounds: &BoundingBox,
    transform: &AffineTransform,
    width: usize,
    height: usize,
) -> ExtractResult<PixelWindow> {
    let (left, top) = transform.ground_to_pixel(bounds.min_x, bounds.max_y);
    let (right, bottom) = transform.ground_to_pixel(bounds.max_x, bounds.min_y);

    let col0 = snap_floor(left).max(0.0);
    let row0 = snap_floor(top).max(0.0);
    let col1 = snap_ceil(right).min(width as f64);
    let row1 = snap_ceil(bottom).min(height as f64);

    if col1 <= col0 || row1 <= row0 {
        return Err(ExtractError::data_integrity(format!(
            "boundary bounds {:?} do not overlap the mosaic",
            bounds
        )));
    }

    Ok(PixelWindow {
        col: col0 as usize,
        row: row0 as usize,
        width: (col1 - col0) as usize,
        height: (row1 - row0) as usize,
    })
}

/// Rasterize `boundary` onto a `width` x `height` lattice described by `transform`.
pub fn rasterize_all_touched(
    boundary: &BoundaryGeometry,
    transform: &AffineTransform,
    width: usize,
    height: usize,
) -> Mask {
    let mut mask = Mask::new(width, height);
    if width == 0 || height == 0 {
        return mask;
    }

    for polygon in &boundary.polygons().0 {
        fill_interior(&mut mask, polygon, transform);
        for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
            trace_ring(&mut mask, ring, transform);
        }
    }

    mask
}

/// Mark pixels whose centres lie inside `polygon`.
fn fill_interior(mask: &mut Mask, polygon: &Polygon<f64>, transform: &AffineTransform) {
    let rings: Vec<Vec<(f64, f64)>> = std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(|ring| {
            ring.coords()
                .map(|c| transform.ground_to_pixel(c.x, c.y))
                .collect()
        })
        .collect();

    let mut crossings = Vec::new();
    for row in 0..mask.height {
        let yc = row as f64 + 0.5;
        crossings.clear();

        for ring in &rings {
            for edge in ring.windows(2) {
                let (x1, y1) = edge[0];
                let (x2, y2) = edge[1];
                if (y1 <= yc) != (y2 <= yc) {
                    crossings.push(x1 + (yc - y1) * (x2 - x1) / (y2 - y1));
                }
            }
        }

        crossings.sort_by(|a, b| a.total_cmp(b));
        for pair in crossings.chunks_exact(2) {
            // Columns whose centre (col + 0.5) lies within [pair[0], pair[1]].
            let first = (pair[0] - 0.5).ceil().max(0.0);
            let last = (pair[1] - 0.5).floor().min(mask.width as f64 - 1.0);
            if last < first {
                continue;
            }
            for col in first as i64..=last as i64 {
                mask.set(col, row as i64);
            }
        }
    }
}

/// Mark every pixel crossed by the segments of `ring`.
fn trace_ring(mask: &mut Mask, ring: &LineString<f64>, transform: &AffineTransform) {
    for line in ring.lines() {
        let start = transform.ground_to_pixel(line.start.x, line.start.y);
        let end = transform.ground_to_pixel(line.end.x, line.end.y);
        if let Some((start, end)) = clip_segment(start, end, mask.width, mask.height) {
            trace_segment(mask, start, end);
        }
    }
}

/// Grid traversal (Amanatides & Woo) marking each cell whose interior the
/// segment passes through.
///
/// Segments lying on a pixel border touch no interior and mark nothing.
/// Where the segment crosses a grid vertex it steps diagonally, so the two
/// cells that only share that corner stay unmarked.
fn trace_segment(mask: &mut Mask, start: (f64, f64), end: (f64, f64)) {
    let (x0, y0) = (snap(start.0), snap(start.1));
    let (x1, y1) = (snap(end.0), snap(end.1));
    let dx = x1 - x0;
    let dy = y1 - y0;

    if dx == 0.0 && dy == 0.0 {
        return;
    }
    if (dx == 0.0 && x0.fract() == 0.0) || (dy == 0.0 && y0.fract() == 0.0) {
        return;
    }

    let mut col = first_cell(x0, dx);
    let mut row = first_cell(y0, dy);
    let end_col = last_cell(x1, dx);
    let end_row = last_cell(y1, dy);

    let step_col: i64 = if dx > 0.0 { 1 } else { -1 };
    let step_row: i64 = if dy > 0.0 { 1 } else { -1 };

    let delta_x = if dx != 0.0 { 1.0 / dx.abs() } else { f64::INFINITY };
    let delta_y = if dy != 0.0 { 1.0 / dy.abs() } else { f64::INFINITY };

    let mut t_max_x = if dx > 0.0 {
        (col as f64 + 1.0 - x0) / dx
    } else if dx < 0.0 {
        (col as f64 - x0) / dx
    } else {
        f64::INFINITY
    };
    let mut t_max_y = if dy > 0.0 {
        (row as f64 + 1.0 - y0) / dy
    } else if dy < 0.0 {
        (row as f64 - y0) / dy
    } else {
        f64::INFINITY
    };

    // Tie tolerance in pixel units along the longer axis.
    let tie = SNAP_EPSILON / dx.abs().max(dy.abs());
    let max_steps = (end_col - col).abs() + (end_row - row).abs();
    mask.set(col, row);
    for _ in 0..max_steps {
        if col == end_col && row == end_row {
            break;
        }
        if (t_max_x - t_max_y).abs() < tie {
            t_max_x += delta_x;
            t_max_y += delta_y;
            col += step_col;
            row += step_row;
        } else if t_max_x < t_max_y {
            t_max_x += delta_x;
            col += step_col;
        } else {
            t_max_y += delta_y;
            row += step_row;
        }
        mask.set(col, row);
    }
}

/// Cell a segment leaves `v` through when moving with sign `d`.
fn first_cell(v: f64, d: f64) -> i64 {
    if d < 0.0 {
        v.ceil() as i64 - 1
    } else {
        v.floor() as i64
    }
}

/// Cell a segment arrives in at `v` when moving with sign `d`.
fn last_cell(v: f64, d: f64) -> i64 {
    if d > 0.0 {
        v.ceil() as i64 - 1
    } else {
        v.floor() as i64
    }
}

/// Liang-Barsky clip of a pixel-space segment to the raster plus a one pixel margin.
fn clip_segment(
    (x0, y0): (f64, f64),
    (x1, y1): (f64, f64),
    width: usize,
    height: usize,
) -> Option<((f64, f64), (f64, f64))> {
    let (min_x, min_y) = (-1.0, -1.0);
    let (max_x, max_y) = (width as f64 + 1.0, height as f64 + 1.0);
    let dx = x1 - x0;
    let dy = y1 - y0;

    let mut t0: f64 = 0.0;
    let mut t1: f64 = 1.0;
    for (p, q) in [
        (-dx, x0 - min_x),
        (dx, max_x - x0),
        (-dy, y0 - min_y),
        (dy, max_y - y0),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else {
            let r = q / p;
            if p < 0.0 {
                t0 = t0.max(r);
            } else {
                t1 = t1.min(r);
            }
        }
    }

    if t0 > t1 {
        return None;
    }

    Some((
        (x0 + t0 * dx, y0 + t0 * dy),
        (x0 + t1 * dx, y0 + t1 * dy),
    ))
}

fn snap(v: f64) -> f64 {
    let rounded = v.round();
    if (v - rounded).abs() < SNAP_EPSILON {
        rounded
    } else {
        v
    }
}

fn snap_floor(v: f64) -> f64 {
    let rounded = v.round();
    if (v - rounded).abs() < SNAP_EPSILON {
        rounded
    } else {
        v.floor()
    }
}

fn snap_ceil(v: f64) -> f64 {
    let rounded = v.round();
    if (v - rounded).abs() < SNAP_EPSILON {
        rounded
    } else {
        v.ceil()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use tile_common::Crs;

    fn square(min: f64, max: f64) -> BoundaryGeometry {
        BoundaryGeometry::from_polygon(
            polygon![
                (x: min, y: min),
                (x: max, y: min),
                (x: max, y: max),
                (x: min, y: max),
            ],
            Crs::WEB_MERCATOR,
        )
        .unwrap()
    }

    #[test]
    fn test_pixel_aligned_square() {
        // 10x10 raster, 1 unit pixels, origin at (0, 10).
        let transform = AffineTransform::new(0.0, 10.0, 1.0);
        let mask = rasterize_all_touched(&square(2.0, 5.0), &transform, 10, 10);

        // Edges lie on pixel borders, so exactly columns 2..=4 and rows
        // 5..=7 are covered.
        let mut expected = Mask::new(10, 10);
        for row in 5..=7 {
            for col in 2..=4 {
                expected.set(col, row);
            }
        }
        assert_eq!(mask, expected);
        assert_eq!(mask.count(), 9);
    }

    #[test]
    fn test_diagonal_through_vertices_skips_corner_neighbours() {
        // Right triangle whose hypotenuse runs through pixel corners.
        let triangle = BoundaryGeometry::from_polygon(
            polygon![(x: 0.0, y: 0.0), (x: 4.0, y: 0.0), (x: 0.0, y: 4.0)],
            Crs::WEB_MERCATOR,
        )
        .unwrap();
        let transform = AffineTransform::new(0.0, 4.0, 1.0);
        let mask = rasterize_all_touched(&triangle, &transform, 4, 4);

        for row in 0..4 {
            for col in 0..4 {
                assert_eq!(mask.get(col, row), col <= row, "pixel ({}, {})", col, row);
            }
        }
        assert_eq!(mask.count(), 10);
    }

    #[test]
    fn test_shared_edge_does_not_mark_neighbour() {
        let transform = AffineTransform::new(0.0, 10.0, 1.0);
        // Occupies x 2..3.5 so column 3 is partly covered and column 4 only
        // if the right edge leaks.
        let boundary = BoundaryGeometry::from_polygon(
            polygon![(x: 2.0, y: 2.0), (x: 3.5, y: 2.0), (x: 3.5, y: 4.0), (x: 2.0, y: 4.0)],
            Crs::WEB_MERCATOR,
        )
        .unwrap();
        let mask = rasterize_all_touched(&boundary, &transform, 10, 10);

        assert_eq!(mask.count(), 4);
        assert!(mask.get(2, 6) && mask.get(3, 6) && mask.get(2, 7) && mask.get(3, 7));
        assert!(!mask.get(1, 6));
        assert!(!mask.get(2, 8));
    }

    #[test]
    fn test_all_touched_includes_sliver_pixels() {
        // A square covering only the right tenth of pixel column 0.
        let transform = AffineTransform::new(0.0, 10.0, 1.0);
        let mask = rasterize_all_touched(&square(0.9, 1.5), &transform, 10, 10);

        // Pixel (0, 8) spans x 0..1, y 1..2: touched although its centre is outside.
        assert!(mask.get(0, 8));
        assert!(mask.get(1, 8));
    }

    #[test]
    fn test_polygon_inside_single_pixel() {
        let transform = AffineTransform::new(0.0, 10.0, 1.0);
        let mask = rasterize_all_touched(&square(3.2, 3.4), &transform, 10, 10);
        assert_eq!(mask.count(), 1);
        assert!(mask.get(3, 6));
    }

    #[test]
    fn test_bounding_window() {
        let transform = AffineTransform::new(0.0, 1500.0, 1.0);
        let bounds = BoundingBox::new(250.0, 0.0, 1750.0, 1500.0);
        let window = bounding_window(&bounds, &transform, 2000, 1500).unwrap();
        assert_eq!(
            window,
            PixelWindow {
                col: 250,
                row: 0,
                width: 1500,
                height: 1500
            }
        );

        let outside = BoundingBox::new(5000.0, 0.0, 6000.0, 10.0);
        assert!(bounding_window(&outside, &transform, 2000, 1500).is_err());
    }

    #[test]
    fn test_segment_clip_far_outside() {
        assert!(clip_segment((-50.0, -50.0), (-40.0, -10.0), 10, 10).is_none());
        let ((x0, y0), (x1, y1)) = clip_segment((-100.0, 5.0), (100.0, 5.0), 10, 10).unwrap();
        assert!((x0 + 1.0).abs() < 1e-9 && (x1 - 11.0).abs() < 1e-9);
        assert_eq!((y0, y1), (5.0, 5.0));
    }
}
