//! Single-GeoTIFF mosaic.

use std::path::PathBuf;

use tracing::{debug, info, instrument};

use tile_common::{BoundingBox, Crs};

use crate::assembler::{LoadedTile, MosaicArtifact, MosaicAssembler, MosaicFormat};
use crate::config::MosaicConfig;
use crate::error::MosaicResult;
use crate::gauge::LiveTileGauge;
use crate::geotiff::{strip_rows, write_geotiff_strips};
use crate::lattice::LatticeWriter;
use crate::raster::{RasterInfo, NODATA};
use crate::zarr_store::read_window;

/// Merges tiles into a chunked staging array next to the output, then
/// streams it into a GeoTIFF strip by strip on finish.
///
/// Neither step holds more than one tile or one strip in memory.
pub struct FlatMosaicAssembler {
    path: PathBuf,
    lattice: LatticeWriter,
    gauge: LiveTileGauge,
}

impl FlatMosaicAssembler {
    pub fn new(
        path: PathBuf,
        extent: BoundingBox,
        pixel_size: f64,
        crs: Crs,
        config: MosaicConfig,
        gauge: LiveTileGauge,
    ) -> MosaicResult<Self> {
        let staging = path.with_extension("staging.zarr");
        Ok(Self {
            lattice: LatticeWriter::create(&staging, extent, pixel_size, crs, config)?,
            path,
            gauge,
        })
    }
}

impl MosaicAssembler for FlatMosaicAssembler {
    #[instrument(skip(self, tile), fields(tile = %tile.id()))]
    fn add_tile(&mut self, tile: LoadedTile) -> MosaicResult<()> {
        self.lattice.write_tile(tile)
    }

    fn finish(self: Box<Self>) -> MosaicResult<MosaicArtifact> {
        let Self { path, lattice, .. } = *self;
        let (level0, bands) = lattice.level0()?;
        let (width, height) = lattice.dims();

        let info = RasterInfo {
            width,
            height,
            bands,
            transform: lattice.transform(),
            crs: Some(lattice.crs()),
            nodata: Some(NODATA),
        };
        let rows = strip_rows(info.row_bytes(), lattice.store().config().zarr_chunk_size);
        write_geotiff_strips(&path, &info, rows, |row, count| {
            read_window(level0, 0, row, width, count)
        })?;

        let staging = lattice.store().root().to_path_buf();
        std::fs::remove_dir_all(&staging)?;
        debug!(path = %staging.display(), "Removed staging store");

        info!(
            path = %path.display(),
            width,
            height,
            rows_per_strip = rows,
            tiles = lattice.tiles_merged(),
            "Flat mosaic written"
        );

        Ok(MosaicArtifact {
            format: MosaicFormat::Flat,
            path,
            width,
            height,
            bands,
            transform: info.transform,
            crs: lattice.crs(),
            levels: 1,
            tiles_merged: lattice.tiles_merged(),
            nodata: Some(NODATA),
        })
    }

    fn tiles_merged(&self) -> usize {
        self.lattice.tiles_merged()
    }

    fn gauge(&self) -> &LiveTileGauge {
        &self.gauge
    }
}
