//! Chunked multi-resolution mosaic in a Zarr V3 store.

use std::path::PathBuf;

use tracing::{debug, info, instrument};

use tile_common::{BoundingBox, Crs};

use crate::assembler::{LoadedTile, MosaicArtifact, MosaicAssembler, MosaicFormat};
use crate::config::{MosaicConfig, PyramidConfig};
use crate::downsample::downsample_2x;
use crate::error::MosaicResult;
use crate::gauge::LiveTileGauge;
use crate::lattice::LatticeWriter;
use crate::raster::NODATA;
use crate::zarr_store::{read_window, write_window, MosaicAttributes, ZarrMosaicStore};

/// Writes each tile straight into the level 0 array at the pixel window
/// derived from the tile's own extent.
///
/// Only the tile being merged is held in memory. Pyramid levels are built
/// on [`finish`](MosaicAssembler::finish).
pub struct ChunkedMosaicAssembler {
    lattice: LatticeWriter,
    gauge: LiveTileGauge,
}

impl ChunkedMosaicAssembler {
    pub fn new(
        path: PathBuf,
        extent: BoundingBox,
        pixel_size: f64,
        crs: Crs,
        config: MosaicConfig,
        gauge: LiveTileGauge,
    ) -> MosaicResult<Self> {
        Ok(Self {
            lattice: LatticeWriter::create(&path, extent, pixel_size, crs, config)?,
            gauge,
        })
    }
}

impl MosaicAssembler for ChunkedMosaicAssembler {
    #[instrument(skip(self, tile), fields(tile = %tile.id()))]
    fn add_tile(&mut self, tile: LoadedTile) -> MosaicResult<()> {
        self.lattice.write_tile(tile)
    }

    fn finish(self: Box<Self>) -> MosaicResult<MosaicArtifact> {
        let lattice = self.lattice;
        let (_, bands) = lattice.level0()?;
        let (width, height) = lattice.dims();
        let transform = lattice.transform();
        let store = lattice.store();

        let levels = build_pyramid(store, width, height, bands)?;
        store.write_attributes(&MosaicAttributes {
            crs: lattice.crs().epsg(),
            transform,
            bbox: transform.window_bbox(0, 0, width, height),
            width,
            height,
            bands,
            levels,
            nodata: Some(NODATA),
        })?;

        info!(
            path = %store.root().display(),
            width,
            height,
            levels,
            tiles = lattice.tiles_merged(),
            "Chunked mosaic written"
        );

        Ok(MosaicArtifact {
            format: MosaicFormat::Chunked,
            path: store.root().to_path_buf(),
            width,
            height,
            bands,
            transform,
            crs: lattice.crs(),
            levels,
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

/// Build levels 1.. from level 0, returning the total level count.
///
/// Each output block of `chunk x chunk` pixels reads a `2*chunk` square
/// window of the previous level, so memory stays bounded by the chunk size.
pub(crate) fn build_pyramid(
    store: &ZarrMosaicStore,
    width: usize,
    height: usize,
    bands: usize,
) -> MosaicResult<usize> {
    let pyramid: &PyramidConfig = &store.config().pyramid;
    let levels = pyramid.calculate_num_levels(width, height);
    let chunk = store.config().zarr_chunk_size;

    let mut previous = store.open_level(0)?;
    for level in 1..levels {
        let (out_w, out_h) = (width >> level, height >> level);
        let array = store.create_level(level, out_w, out_h, bands)?;

        for block_row in (0..out_h).step_by(chunk) {
            for block_col in (0..out_w).step_by(chunk) {
                let bw = chunk.min(out_w - block_col);
                let bh = chunk.min(out_h - block_row);
                let input = read_window(&previous, block_col * 2, block_row * 2, bw * 2, bh * 2)?;
                let (output, _, _) = downsample_2x(&input, bw * 2, bh * 2, bands, pyramid.method);
                write_window(&array, block_col, block_row, bw, bh, &output)?;
            }
        }

        debug!(level, width = out_w, height = out_h, "Built pyramid level");
        previous = array;
    }

    Ok(levels)
}
