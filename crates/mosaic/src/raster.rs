//! In-memory 8-bit raster.

use boundary::PixelWindow;
use tile_common::{AffineTransform, BoundingBox, Crs};

use crate::error::{MosaicError, MosaicResult};

/// Fill value of mosaic pixels no tile or boundary covers.
pub const NODATA: u8 = 0;

/// Samples in a `width x height x bands` buffer, if it is addressable.
pub fn sample_count(width: usize, height: usize, bands: usize) -> MosaicResult<usize> {
    width
        .checked_mul(height)
        .and_then(|pixels| pixels.checked_mul(bands))
        .ok_or_else(|| {
            MosaicError::Config(format!(
                "raster of {}x{}x{} samples is not addressable",
                width, height, bands
            ))
        })
}

/// Shape and georeferencing of a raster, without its samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterInfo {
    pub width: usize,
    pub height: usize,
    pub bands: usize,
    pub transform: AffineTransform,
    pub crs: Option<Crs>,
    pub nodata: Option<u8>,
}

impl RasterInfo {
    /// Bytes in one row of band-interleaved samples.
    pub fn row_bytes(&self) -> usize {
        self.width.saturating_mul(self.bands)
    }
}

/// Band-interleaved `u8` samples, row 0 at the top, georeferenced by a
/// north-up transform.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub width: usize,
    pub height: usize,
    pub bands: usize,
    pub data: Vec<u8>,
    pub transform: AffineTransform,
    /// `None` when the file carried no spatial reference.
    pub crs: Option<Crs>,
    pub nodata: Option<u8>,
}

impl Raster {
    /// Wrap existing samples, checking the buffer length.
    pub fn new(
        width: usize,
        height: usize,
        bands: usize,
        data: Vec<u8>,
        transform: AffineTransform,
        crs: Option<Crs>,
    ) -> MosaicResult<Self> {
        if bands == 0 {
            return Err(MosaicError::invalid_raster("raster has no bands"));
        }
        let expected = sample_count(width, height, bands)?;
        if data.len() != expected {
            return Err(MosaicError::invalid_raster(format!(
                "expected {} samples for {}x{}x{}, got {}",
                expected,
                width,
                height,
                bands,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            bands,
            data,
            transform,
            crs,
            nodata: None,
        })
    }

    /// A raster filled with [`NODATA`].
    pub fn blank(
        width: usize,
        height: usize,
        bands: usize,
        transform: AffineTransform,
        crs: Option<Crs>,
    ) -> MosaicResult<Self> {
        let samples = sample_count(width, height, bands)?;
        Self::new(width, height, bands, vec![NODATA; samples], transform, crs)
    }

    pub fn info(&self) -> RasterInfo {
        RasterInfo {
            width: self.width,
            height: self.height,
            bands: self.bands,
            transform: self.transform,
            crs: self.crs,
            nodata: self.nodata,
        }
    }

    /// Ground extent of the raster.
    pub fn bbox(&self) -> BoundingBox {
        self.transform.window_bbox(0, 0, self.width, self.height)
    }

    /// Samples of pixel `(col, row)`.
    pub fn pixel(&self, col: usize, row: usize) -> &[u8] {
        let start = (row * self.width + col) * self.bands;
        &self.data[start..start + self.bands]
    }

    pub fn pixel_mut(&mut self, col: usize, row: usize) -> &mut [u8] {
        let start = (row * self.width + col) * self.bands;
        &mut self.data[start..start + self.bands]
    }

    /// Copy `src` so its top-left pixel lands at `(col_off, row_off)`.
    ///
    /// Parts falling outside this raster are dropped. Returns the number of
    /// pixels written.
    pub fn blit(&mut self, src: &Raster, col_off: i64, row_off: i64) -> MosaicResult<usize> {
        if src.bands != self.bands {
            return Err(MosaicError::invalid_raster(format!(
                "band count {} does not match mosaic band count {}",
                src.bands, self.bands
            )));
        }

        let col_start = col_off.max(0);
        let row_start = row_off.max(0);
        let col_end = (col_off + src.width as i64).min(self.width as i64);
        let row_end = (row_off + src.height as i64).min(self.height as i64);
        if col_end <= col_start || row_end <= row_start {
            return Ok(0);
        }

        let run = (col_end - col_start) as usize * self.bands;
        for row in row_start..row_end {
            let src_row = (row - row_off) as usize;
            let src_col = (col_start - col_off) as usize;
            let src_idx = (src_row * src.width + src_col) * src.bands;
            let dst_idx = (row as usize * self.width + col_start as usize) * self.bands;
            self.data[dst_idx..dst_idx + run].copy_from_slice(&src.data[src_idx..src_idx + run]);
        }

        Ok((col_end - col_start) as usize * (row_end - row_start) as usize)
    }

    /// Copy out a window; the transform is shifted to the window origin.
    pub fn window(&self, window: &PixelWindow) -> MosaicResult<Raster> {
        if window.col + window.width > self.width || window.row + window.height > self.height {
            return Err(MosaicError::invalid_raster(format!(
                "window {:?} exceeds raster {}x{}",
                window, self.width, self.height
            )));
        }

        let mut data = Vec::with_capacity(window.width * window.height * self.bands);
        for row in window.row..window.row + window.height {
            let start = (row * self.width + window.col) * self.bands;
            data.extend_from_slice(&self.data[start..start + window.width * self.bands]);
        }

        Ok(Raster {
            width: window.width,
            height: window.height,
            bands: self.bands,
            data,
            transform: self.transform.shifted(window.col as i64, window.row as i64),
            crs: self.crs,
            nodata: self.nodata,
        })
    }
}
