//! Mosaic assembler trait and factory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use tile_common::{AffineTransform, BoundingBox, Crs, RenderedTile};

use crate::chunked::ChunkedMosaicAssembler;
use crate::config::MosaicConfig;
use crate::error::{MosaicError, MosaicResult};
use crate::flat::FlatMosaicAssembler;
use crate::gauge::{LiveTileGauge, TileGuard};
use crate::geotiff::{read_geotiff, restamp_geotiff};
use crate::raster::Raster;

/// Output shape of a mosaic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MosaicFormat {
    /// Single GeoTIFF.
    Flat,
    /// Multi-resolution Zarr V3 store.
    Chunked,
}

impl MosaicFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "flat" | "tif" | "geotiff" => Some(Self::Flat),
            "chunked" | "zarr" => Some(Self::Chunked),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Chunked => "chunked",
        }
    }

    /// File or directory name of the assembled mosaic.
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Flat => "mosaic.tif",
            Self::Chunked => "mosaic.zarr",
        }
    }

    /// File or directory name of the clipped mosaic.
    pub fn clipped_file_name(&self) -> &'static str {
        match self {
            Self::Flat => "mosaic_clipped.tif",
            Self::Chunked => "mosaic_clipped.zarr",
        }
    }
}

impl std::fmt::Display for MosaicFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A finished mosaic on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MosaicArtifact {
    pub format: MosaicFormat,
    pub path: PathBuf,
    pub width: usize,
    pub height: usize,
    pub bands: usize,
    pub transform: AffineTransform,
    pub crs: Crs,
    /// Pyramid levels, 1 for a flat mosaic.
    pub levels: usize,
    pub tiles_merged: usize,
    pub nodata: Option<u8>,
}

impl MosaicArtifact {
    /// Ground footprint of the mosaic.
    pub fn bbox(&self) -> BoundingBox {
        self.transform.window_bbox(0, 0, self.width, self.height)
    }
}

/// A rendered tile whose raster is held in memory.
///
/// Counts as one live tile on the gauge it was loaded with until dropped.
#[derive(Debug)]
pub struct LoadedTile {
    rendered: RenderedTile,
    raster: Raster,
    _guard: TileGuard,
}

impl LoadedTile {
    /// Read the tile raster as written.
    pub fn load(tile: RenderedTile, gauge: &LiveTileGauge) -> MosaicResult<Self> {
        let guard = gauge.acquire();
        let raster = read_geotiff(&tile.raster_path)?;
        Ok(Self {
            rendered: tile,
            raster,
            _guard: guard,
        })
    }

    /// Stamp the lattice transform and the tile's CRS onto the file, keeping
    /// the raster that was written.
    pub fn restamp(
        tile: RenderedTile,
        pixel_size: f64,
        gauge: &LiveTileGauge,
    ) -> MosaicResult<Self> {
        let guard = gauge.acquire();
        let raster = restamp_geotiff(
            &tile.raster_path,
            &tile.tile_spec.extent,
            pixel_size,
            tile.crs,
        )?;
        Ok(Self {
            rendered: tile,
            raster,
            _guard: guard,
        })
    }

    pub fn id(&self) -> &str {
        self.rendered.id()
    }

    pub fn rendered(&self) -> &RenderedTile {
        &self.rendered
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    /// Check the stamped and embedded CRS against the run CRS.
    ///
    /// A raster without embedded CRS is accepted on the strength of the
    /// stamp.
    pub fn check_crs(&self, run_crs: Crs) -> MosaicResult<()> {
        let found = if self.rendered.crs != run_crs {
            Some(self.rendered.crs)
        } else {
            self.raster.crs.filter(|&embedded| embedded != run_crs)
        };

        match found {
            Some(found) => Err(MosaicError::CrsMismatch {
                tile: self.id().to_string(),
                expected: run_crs,
                found,
            }),
            None => Ok(()),
        }
    }

    /// Release the raster, keeping the tile description.
    pub fn into_rendered(self) -> RenderedTile {
        self.rendered
    }
}

/// Folds rendered tiles into one mosaic.
///
/// Each tile is written at the offset derived from its own extent; the
/// assembler drops the loaded raster before `add_tile` returns.
pub trait MosaicAssembler: Send {
    /// Merge one loaded tile.
    fn add_tile(&mut self, tile: LoadedTile) -> MosaicResult<()>;

    /// Write the final mosaic.
    fn finish(self: Box<Self>) -> MosaicResult<MosaicArtifact>;

    /// Number of tiles merged so far.
    fn tiles_merged(&self) -> usize;

    /// Live tile accounting shared with the caller.
    fn gauge(&self) -> &LiveTileGauge;
}

/// Create an assembler writing into `work_dir`.
///
/// `extent` is the full lattice extent; the mosaic spans it at
/// `pixel_size` map units per pixel.
pub fn create_assembler(
    format: MosaicFormat,
    work_dir: &Path,
    extent: BoundingBox,
    pixel_size: f64,
    crs: Crs,
    config: &MosaicConfig,
    gauge: LiveTileGauge,
) -> MosaicResult<Box<dyn MosaicAssembler>> {
    if pixel_size <= 0.0 || !pixel_size.is_finite() {
        return Err(MosaicError::Config(format!(
            "pixel size must be positive, got {}",
            pixel_size
        )));
    }

    let transform = AffineTransform::from_bbox(&extent, pixel_size);
    let (width, height) = transform.pixel_dims(&extent);
    check_mosaic_dims(width, height)?;

    let path = work_dir.join(format.file_name());
    info!(
        format = %format,
        path = %path.display(),
        crs = %crs,
        width,
        height,
        "Creating mosaic assembler"
    );

    Ok(match format {
        MosaicFormat::Flat => Box::new(FlatMosaicAssembler::new(
            path,
            extent,
            pixel_size,
            crs,
            config.clone(),
            gauge,
        )?),
        MosaicFormat::Chunked => Box::new(ChunkedMosaicAssembler::new(
            path,
            extent,
            pixel_size,
            crs,
            config.clone(),
            gauge,
        )?),
    })
}

/// Largest mosaic side, the GeoTIFF dimension limit.
pub const MAX_MOSAIC_DIMENSION: usize = u32::MAX as usize;

/// Reject mosaic shapes no output format can hold.
pub fn check_mosaic_dims(width: usize, height: usize) -> MosaicResult<()> {
    if width > MAX_MOSAIC_DIMENSION || height > MAX_MOSAIC_DIMENSION {
        return Err(MosaicError::Config(format!(
            "mosaic of {}x{} pixels exceeds the {} pixel side limit",
            width, height, MAX_MOSAIC_DIMENSION
        )));
    }
    Ok(())
}
