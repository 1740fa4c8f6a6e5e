//! Bounding box types and operations.

use serde::{Deserialize, Serialize};

use crate::crs::Crs;
use crate::error::{ExtractError, ExtractResult};

/// An axis-aligned extent in the units of the run CRS.
///
/// For projected CRS (EPSG:3857, etc.) coordinates are in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    ///
    /// No validation is performed; use [`BoundingBox::try_new`] for
    /// user-supplied values.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Create a bounding box, rejecting non-finite or empty extents.
    pub fn try_new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> ExtractResult<Self> {
        let bbox = Self::new(min_x, min_y, max_x, max_y);
        bbox.validate()?;
        Ok(bbox)
    }

    /// Check the `min < max` invariant on both axes.
    pub fn validate(&self) -> ExtractResult<()> {
        let values = [self.min_x, self.min_y, self.max_x, self.max_y];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ExtractError::configuration(format!(
                "bounding box has non-finite coordinates: {:?}",
                values
            )));
        }
        if self.min_x >= self.max_x {
            return Err(ExtractError::configuration(format!(
                "bounding box minx ({}) must be less than maxx ({})",
                self.min_x, self.max_x
            )));
        }
        if self.min_y >= self.max_y {
            return Err(ExtractError::configuration(format!(
                "bounding box miny ({}) must be less than maxy ({})",
                self.min_y, self.max_y
            )));
        }
        Ok(())
    }

    /// Width of the bounding box in coordinate units.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the bounding box in coordinate units.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Area in squared coordinate units.
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Check if this bbox intersects another. Shared edges count.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Check if the interiors of two boxes overlap (positive shared area).
    pub fn overlaps_interior(&self, other: &BoundingBox) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    /// Compute the intersection of two bounding boxes with positive area.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        if !self.overlaps_interior(other) {
            return None;
        }

        Some(BoundingBox {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        })
    }

    /// Smallest box covering both inputs.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Check if a point is contained within this bbox.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Check if `other` lies entirely inside this bbox.
    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    /// Encode as the renderer's extent string: `"minx,maxx,miny,maxy [EPSG:code]"`.
    ///
    /// Note the axis grouping differs from the usual corner order.
    pub fn to_extent_string(&self, crs: Crs) -> String {
        format!(
            "{},{},{},{} [{}]",
            self.min_x, self.max_x, self.min_y, self.max_y, crs
        )
    }
}
