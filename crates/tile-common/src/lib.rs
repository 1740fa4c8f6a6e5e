//! Common types shared by every stage of the raster extraction pipeline.

pub mod bbox;
pub mod crs;
pub mod error;
pub mod grid;
pub mod tile;
pub mod transform;

pub use bbox::BoundingBox;
pub use crs::Crs;
pub use error::{ExtractError, ExtractResult};
pub use grid::{EdgePolicy, TileGrid, MAX_TILES};
pub use tile::{RenderedTile, TileSpec};
pub use transform::AffineTransform;
