//! Boundary geometry handling for vector-driven extraction.
//!
//! Boundaries are read from GeoJSON or ESRI shapefiles.
//!
//! A boundary geometry plays two roles in a run:
//!
//! - **Relevance filtering**: grid cells that do not touch the boundary are
//!   dropped before any render call is made.
//! - **Clipping**: the assembled mosaic is cropped to the boundary's bounds
//!   and every pixel the boundary does not touch is masked.

pub mod filter;
pub mod geojson;
pub mod geometry;
pub mod rasterize;
pub mod shp;

pub use filter::{filter_tiles, FilterOutcome};
pub use geojson::GeoJsonDocument;
pub use geometry::BoundaryGeometry;
pub use rasterize::{bounding_window, rasterize_all_touched, Mask, PixelWindow};
