//! Mosaic assembly for rendered tile rasters.
//!
//! Per-tile GeoTIFFs are merged into one mosaic addressed by the run's
//! shared [`AffineTransform`](tile_common::AffineTransform) and CRS. Two
//! output shapes are supported:
//!
//! - **Flat**: a single GeoTIFF spanning the tile lattice, staged in a
//!   chunked level 0 and streamed out strip by strip
//! - **Chunked**: a Zarr V3 store with level 0 at native resolution and
//!   2x-downsampled pyramid levels
//!
//! # Architecture
//!
//! ```text
//! RenderedTile (owned)
//!      │
//!      ▼
//! LoadedTile::restamp / load ─► tile raster in memory (LiveTileGauge +1)
//!      │
//!      ▼
//! MosaicAssembler::add_tile
//!      │
//!      ├─► Verify CRS == run CRS
//!      │
//!      ├─► Write at the tile's own pixel offset into level 0
//!      │
//!      └─► Drop tile raster (LiveTileGauge -1)
//!
//! MosaicAssembler::finish ─► MosaicArtifact ─► (optional) clip
//! ```
//!
//! Because every tile is written at the offset derived from its own extent,
//! combination is order-independent and gaps stay at the fill value.

pub mod assembler;
pub mod chunked;
pub mod clip;
pub mod config;
pub mod downsample;
pub mod error;
pub mod flat;
pub mod gauge;
pub mod geotiff;
mod lattice;
pub mod raster;
pub mod zarr_store;

// Re-export commonly used types at crate root
pub use assembler::{
    check_mosaic_dims, create_assembler, LoadedTile, MosaicArtifact, MosaicAssembler,
    MosaicFormat, MAX_MOSAIC_DIMENSION,
};
pub use chunked::ChunkedMosaicAssembler;
pub use clip::{clip_artifact, clip_chunked, clip_flat};
pub use config::{MosaicConfig, PyramidConfig, ZarrCompression};
pub use downsample::{downsample_2x, DownsampleMethod};
pub use error::{MosaicError, MosaicResult};
pub use flat::FlatMosaicAssembler;
pub use gauge::{LiveTileGauge, TileGuard};
pub use geotiff::{
    read_geotiff, restamp_geotiff, strip_rows, write_geotiff, write_geotiff_strips, StripReader,
};
pub use raster::{Raster, RasterInfo, NODATA};
