//! Level 0 tile placement shared by both mosaic formats.

use std::path::Path;

use boundary::PixelWindow;
use tracing::debug;

use tile_common::{AffineTransform, BoundingBox, Crs};

use crate::assembler::{check_mosaic_dims, LoadedTile};
use crate::config::MosaicConfig;
use crate::error::{MosaicError, MosaicResult};
use crate::zarr_store::{write_window, LevelArray, ZarrMosaicStore};

/// Writes tiles into a level 0 Zarr array at the pixel window derived from
/// each tile's own extent.
///
/// The array is created on the first tile, whose band count it takes.
/// Overlapping pixels are last-write-wins.
pub(crate) struct LatticeWriter {
    store: ZarrMosaicStore,
    transform: AffineTransform,
    width: usize,
    height: usize,
    crs: Crs,
    level0: Option<(LevelArray, usize)>,
    tiles_merged: usize,
}

impl LatticeWriter {
    pub(crate) fn create(
        root: &Path,
        extent: BoundingBox,
        pixel_size: f64,
        crs: Crs,
        config: MosaicConfig,
    ) -> MosaicResult<Self> {
        config.validate()?;
        let transform = AffineTransform::from_bbox(&extent, pixel_size);
        let (width, height) = transform.pixel_dims(&extent);
        check_mosaic_dims(width, height)?;
        if width == 0 || height == 0 {
            return Err(MosaicError::invalid_raster(format!(
                "mosaic extent {:?} is smaller than one pixel",
                extent
            )));
        }

        Ok(Self {
            store: ZarrMosaicStore::create(root, config)?,
            transform,
            width,
            height,
            crs,
            level0: None,
            tiles_merged: 0,
        })
    }

    pub(crate) fn store(&self) -> &ZarrMosaicStore {
        &self.store
    }

    pub(crate) fn transform(&self) -> AffineTransform {
        self.transform
    }

    pub(crate) fn dims(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub(crate) fn crs(&self) -> Crs {
        self.crs
    }

    pub(crate) fn tiles_merged(&self) -> usize {
        self.tiles_merged
    }

    /// Level 0 array and its band count, once a tile has been written.
    pub(crate) fn level0(&self) -> MosaicResult<(&LevelArray, usize)> {
        self.level0
            .as_ref()
            .map(|(array, bands)| (array, *bands))
            .ok_or_else(|| MosaicError::invalid_raster("no tiles were merged into the mosaic"))
    }

    /// Write the part of `tile` inside the mosaic; the raster is released on
    /// return.
    pub(crate) fn write_tile(&mut self, tile: LoadedTile) -> MosaicResult<()> {
        tile.check_crs(self.crs)?;
        let raster = tile.raster();

        if self.level0.is_none() {
            let array = self
                .store
                .create_level(0, self.width, self.height, raster.bands)?;
            self.level0 = Some((array, raster.bands));
        }
        let (array, bands) = self.level0()?;
        if raster.bands != bands {
            return Err(MosaicError::invalid_raster(format!(
                "tile {} has {} bands, mosaic has {}",
                tile.id(),
                raster.bands,
                bands
            )));
        }

        let (col, row) = self.transform.pixel_offset(&tile.rendered().tile_spec.extent);
        let col_start = col.max(0);
        let row_start = row.max(0);
        let col_end = (col + raster.width as i64).min(self.width as i64);
        let row_end = (row + raster.height as i64).min(self.height as i64);
        if col_end <= col_start || row_end <= row_start {
            debug!(col, row, "Tile lies outside the mosaic");
            self.tiles_merged += 1;
            return Ok(());
        }

        let inside = raster.window(&PixelWindow {
            col: (col_start - col) as usize,
            row: (row_start - row) as usize,
            width: (col_end - col_start) as usize,
            height: (row_end - row_start) as usize,
        })?;
        write_window(
            array,
            col_start as usize,
            row_start as usize,
            inside.width,
            inside.height,
            &inside.data,
        )?;
        self.tiles_merged += 1;

        debug!(
            col = col_start,
            row = row_start,
            width = inside.width,
            height = inside.height,
            "Merged tile into level 0"
        );
        Ok(())
    }
}
