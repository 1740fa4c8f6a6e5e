//! Boundary clipping of assembled mosaics.
//!
//! The mosaic is cropped to the smallest pixel window covering the
//! boundary bounds, then every pixel the boundary does not touch is set to
//! [`NODATA`]. Clipped output always carries [`NODATA`] as its no-data
//! value, whatever the source declared.

use std::path::Path;

use boundary::{bounding_window, rasterize_all_touched, BoundaryGeometry, Mask, PixelWindow};
use tracing::{info, instrument};

use crate::assembler::{MosaicArtifact, MosaicFormat};
use crate::chunked::build_pyramid;
use crate::config::MosaicConfig;
use crate::error::{MosaicError, MosaicResult};
use crate::geotiff::{strip_rows, write_geotiff_strips, StripReader};
use crate::raster::{RasterInfo, NODATA};
use crate::zarr_store::{read_window, write_window, MosaicAttributes, ZarrMosaicStore};

fn check_crs(boundary: &BoundaryGeometry, raster_crs: tile_common::Crs) -> MosaicResult<()> {
    if boundary.crs() != raster_crs {
        return Err(MosaicError::boundary(format!(
            "boundary is in {}, mosaic is in {}",
            boundary.crs(),
            raster_crs
        )));
    }
    Ok(())
}

fn clip_window(
    boundary: &BoundaryGeometry,
    transform: &tile_common::AffineTransform,
    width: usize,
    height: usize,
) -> MosaicResult<PixelWindow> {
    let bounds = boundary.bounds().map_err(MosaicError::boundary)?;
    bounding_window(&bounds, transform, width, height).map_err(MosaicError::boundary)
}

fn apply_mask(data: &mut [u8], bands: usize, mask: &Mask) {
    for (pixel, &inside) in data.chunks_exact_mut(bands).zip(mask.as_slice()) {
        if !inside {
            pixel.fill(NODATA);
        }
    }
}

/// Clip a flat mosaic into a new GeoTIFF at `out_path`, one strip at a
/// time.
#[instrument(skip(artifact, boundary), fields(source = %artifact.path.display()))]
pub fn clip_flat(
    artifact: &MosaicArtifact,
    boundary: &BoundaryGeometry,
    out_path: &Path,
) -> MosaicResult<MosaicArtifact> {
    let mut reader = StripReader::open(&artifact.path)?;
    let source = *reader.info();
    if let Some(crs) = source.crs {
        check_crs(boundary, crs)?;
    }

    let window = clip_window(boundary, &source.transform, source.width, source.height)?;
    let transform = source
        .transform
        .shifted(window.col as i64, window.row as i64);
    let info = RasterInfo {
        width: window.width,
        height: window.height,
        bands: source.bands,
        transform,
        crs: source.crs,
        nodata: Some(NODATA),
    };

    let row_bytes = info.row_bytes();
    let col_start = window.col * source.bands;
    let rows = strip_rows(source.row_bytes(), window.height);
    let mut inside = 0;
    write_geotiff_strips(out_path, &info, rows, |row, count| {
        let lines = reader.read_rows(window.row + row, count)?;
        let mut data = Vec::with_capacity(count * row_bytes);
        for line in lines.chunks_exact(source.row_bytes()) {
            data.extend_from_slice(&line[col_start..col_start + row_bytes]);
        }

        let mask = rasterize_all_touched(
            boundary,
            &transform.shifted(0, row as i64),
            window.width,
            count,
        );
        apply_mask(&mut data, source.bands, &mask);
        inside += mask.count();
        Ok(data)
    })?;

    info!(
        path = %out_path.display(),
        width = window.width,
        height = window.height,
        inside,
        "Clipped flat mosaic written"
    );

    Ok(MosaicArtifact {
        format: MosaicFormat::Flat,
        path: out_path.to_path_buf(),
        width: window.width,
        height: window.height,
        bands: source.bands,
        transform,
        crs: artifact.crs,
        levels: 1,
        tiles_merged: artifact.tiles_merged,
        nodata: Some(NODATA),
    })
}

/// Clip a chunked mosaic into a new store at `out_root`, one chunk-sized
/// block at a time.
#[instrument(skip(artifact, boundary, config), fields(source = %artifact.path.display()))]
pub fn clip_chunked(
    artifact: &MosaicArtifact,
    boundary: &BoundaryGeometry,
    out_root: &Path,
    config: &MosaicConfig,
) -> MosaicResult<MosaicArtifact> {
    let source = ZarrMosaicStore::open(&artifact.path)?;
    let attrs = source.read_attributes()?;
    check_crs(boundary, attrs.crs())?;

    let window = clip_window(boundary, &attrs.transform, attrs.width, attrs.height)?;
    let transform = attrs
        .transform
        .shifted(window.col as i64, window.row as i64);

    let source_level0 = source.open_level(0)?;
    let target = ZarrMosaicStore::create(out_root, config.clone())?;
    let target_level0 = target.create_level(0, window.width, window.height, attrs.bands)?;

    let chunk = config.zarr_chunk_size;
    let mut inside = 0;
    for block_row in (0..window.height).step_by(chunk) {
        for block_col in (0..window.width).step_by(chunk) {
            let bw = chunk.min(window.width - block_col);
            let bh = chunk.min(window.height - block_row);

            let mut data = read_window(
                &source_level0,
                window.col + block_col,
                window.row + block_row,
                bw,
                bh,
            )?;
            let block_transform = transform.shifted(block_col as i64, block_row as i64);
            let mask = rasterize_all_touched(boundary, &block_transform, bw, bh);
            apply_mask(&mut data, attrs.bands, &mask);
            inside += mask.count();

            write_window(&target_level0, block_col, block_row, bw, bh, &data)?;
        }
    }

    let levels = build_pyramid(&target, window.width, window.height, attrs.bands)?;
    target.write_attributes(&MosaicAttributes {
        crs: attrs.crs,
        transform,
        bbox: transform.window_bbox(0, 0, window.width, window.height),
        width: window.width,
        height: window.height,
        bands: attrs.bands,
        levels,
        nodata: Some(NODATA),
    })?;

    info!(
        path = %out_root.display(),
        width = window.width,
        height = window.height,
        inside,
        levels,
        "Clipped chunked mosaic written"
    );

    Ok(MosaicArtifact {
        format: MosaicFormat::Chunked,
        path: out_root.to_path_buf(),
        width: window.width,
        height: window.height,
        bands: attrs.bands,
        transform,
        crs: artifact.crs,
        levels,
        tiles_merged: artifact.tiles_merged,
        nodata: Some(NODATA),
    })
}

/// Clip `artifact` next to itself in `work_dir`, dispatching on its format.
pub fn clip_artifact(
    artifact: &MosaicArtifact,
    boundary: &BoundaryGeometry,
    work_dir: &Path,
    config: &MosaicConfig,
) -> MosaicResult<MosaicArtifact> {
    let out_path = work_dir.join(artifact.format.clipped_file_name());
    match artifact.format {
        MosaicFormat::Flat => clip_flat(artifact, boundary, &out_path),
        MosaicFormat::Chunked => clip_chunked(artifact, boundary, &out_path, config),
    }
}
