//! GeoTIFF read/write for 8-bit rasters.
//!
//! Only the tags needed for a north-up raster with an EPSG code are
//! handled: ModelPixelScale, ModelTiepoint, GeoKeyDirectory and the GDAL
//! no-data tag.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use tiff::decoder::{ChunkType, Decoder, DecodingResult};
use tiff::encoder::colortype::{self, ColorType as EncoderColorType};
use tiff::encoder::{DirectoryEncoder, ImageEncoder, TiffEncoder, TiffKind};
use tiff::tags::Tag;
use tiff::ColorType;
use tracing::debug;

use tile_common::{AffineTransform, BoundingBox, Crs};

use crate::error::{MosaicError, MosaicResult};
use crate::raster::{Raster, RasterInfo};

// GeoTIFF Tag IDs (not in standard tiff crate)
const GEOTIFF_MODELPIXELSCALE: u16 = 33550;
const GEOTIFF_MODELTIEPOINT: u16 = 33922;
const GEOTIFF_GEOKEYDIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

// GeoKey IDs
const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;

// GeoKey values
const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

/// Target size of one strip when streaming.
const STRIP_BUDGET_BYTES: usize = 8 * 1024 * 1024;

/// Sample bytes above which output switches to BigTIFF offsets.
const BIGTIFF_THRESHOLD: u64 = 4_000_000_000;

/// Rows per strip for rows of `row_bytes`, at most `max_rows`.
pub fn strip_rows(row_bytes: usize, max_rows: usize) -> usize {
    (STRIP_BUDGET_BYTES / row_bytes.max(1)).clamp(1, max_rows.max(1))
}

/// Write `raster` as a GeoTIFF. Supports 1, 3 and 4 bands.
pub fn write_geotiff(path: &Path, raster: &Raster) -> MosaicResult<()> {
    let info = raster.info();
    let row_bytes = info.row_bytes();
    let rows = strip_rows(row_bytes, info.height);

    write_geotiff_strips(path, &info, rows, |row, count| {
        raster
            .data
            .get(row * row_bytes..(row + count) * row_bytes)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| MosaicError::invalid_raster("raster buffer shorter than its shape"))
    })
}

/// Write a GeoTIFF one strip at a time.
///
/// `fill(row, rows)` returns the band-interleaved samples of `rows` rows
/// starting at `row`; only one strip is held at a time.
pub fn write_geotiff_strips<F>(
    path: &Path,
    info: &RasterInfo,
    rows_per_strip: usize,
    mut fill: F,
) -> MosaicResult<()>
where
    F: FnMut(usize, usize) -> MosaicResult<Vec<u8>>,
{
    if info.width == 0 || info.height == 0 {
        return Err(MosaicError::invalid_raster("raster has zero dimensions"));
    }
    let too_large =
        || MosaicError::Config(format!("{}x{} exceeds GeoTIFF limits", info.width, info.height));
    let width = u32::try_from(info.width).map_err(|_| too_large())?;
    let height = u32::try_from(info.height).map_err(|_| too_large())?;
    let rows = u32::try_from(rows_per_strip.clamp(1, info.height)).map_err(|_| too_large())?;

    let total = u64::from(width) * u64::from(height) * info.bands as u64;
    let writer = BufWriter::new(File::create(path)?);
    if total > BIGTIFF_THRESHOLD {
        let mut encoder = TiffEncoder::new_big(writer)?;
        encode_image(&mut encoder, info, (width, height), rows, &mut fill)
    } else {
        let mut encoder = TiffEncoder::new(writer)?;
        encode_image(&mut encoder, info, (width, height), rows, &mut fill)
    }
}

fn encode_image<W, K, F>(
    encoder: &mut TiffEncoder<W, K>,
    info: &RasterInfo,
    (width, height): (u32, u32),
    rows: u32,
    fill: &mut F,
) -> MosaicResult<()>
where
    W: Write + Seek,
    K: TiffKind,
    F: FnMut(usize, usize) -> MosaicResult<Vec<u8>>,
{
    match info.bands {
        1 => encode_strips(encoder.new_image::<colortype::Gray8>(width, height)?, info, rows, fill),
        3 => encode_strips(encoder.new_image::<colortype::RGB8>(width, height)?, info, rows, fill),
        4 => encode_strips(encoder.new_image::<colortype::RGBA8>(width, height)?, info, rows, fill),
        other => Err(MosaicError::invalid_raster(format!(
            "unsupported band count {}",
            other
        ))),
    }
}

fn encode_strips<W, C, K, F>(
    mut image: ImageEncoder<'_, W, C, K>,
    info: &RasterInfo,
    rows: u32,
    fill: &mut F,
) -> MosaicResult<()>
where
    W: Write + Seek,
    C: EncoderColorType<Inner = u8>,
    K: TiffKind,
    F: FnMut(usize, usize) -> MosaicResult<Vec<u8>>,
{
    image.rows_per_strip(rows)?;
    write_geotiff_tags(image.encoder(), info)?;

    let mut row = 0;
    while row < info.height {
        let count = (rows as usize).min(info.height - row);
        let strip = fill(row, count)?;
        image.write_strip(&strip)?;
        row += count;
    }

    image.finish()?;
    Ok(())
}

fn write_geotiff_tags<W: Write + Seek, K: TiffKind>(
    dir: &mut DirectoryEncoder<W, K>,
    info: &RasterInfo,
) -> MosaicResult<()> {
    let t = &info.transform;

    // ModelPixelScale: [ScaleX, ScaleY, ScaleZ]
    let pixel_scale = [t.pixel_size, t.pixel_size, 0.0];
    dir.write_tag(Tag::Unknown(GEOTIFF_MODELPIXELSCALE), &pixel_scale[..])?;

    // ModelTiepoint: pixel (0, 0) -> (origin_x, origin_y)
    let tiepoint = [0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0];
    dir.write_tag(Tag::Unknown(GEOTIFF_MODELTIEPOINT), &tiepoint[..])?;

    if let Some(crs) = info.crs {
        let geokeys = build_geokey_directory(crs)?;
        dir.write_tag(Tag::Unknown(GEOTIFF_GEOKEYDIRECTORY), &geokeys[..])?;
    }

    if let Some(nodata) = info.nodata {
        dir.write_tag(Tag::Unknown(GDAL_NODATA), nodata.to_string().as_str())?;
    }

    Ok(())
}

/// GeoKeyDirectory: header `[version, revision, minor, count]` then
/// `[key, location, count, value]` per key.
fn build_geokey_directory(crs: Crs) -> MosaicResult<Vec<u16>> {
    let code = u16::try_from(crs.epsg()).map_err(|_| {
        MosaicError::invalid_raster(format!("EPSG code {} does not fit a GeoKey", crs.epsg()))
    })?;

    let (model_type, crs_key) = if crs.is_geographic() {
        (MODEL_TYPE_GEOGRAPHIC, GEOGRAPHIC_TYPE_GEO_KEY)
    } else {
        (MODEL_TYPE_PROJECTED, PROJECTED_CS_TYPE_GEO_KEY)
    };

    Ok(vec![
        1, 1, 0, 3,
        GT_MODEL_TYPE_GEO_KEY, 0, 1, model_type,
        GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA,
        crs_key, 0, 1, code,
    ])
}

fn parse_geokey_crs(keys: &[u16]) -> Option<Crs> {
    let count = *keys.get(3)? as usize;
    keys.get(4..4 + count * 4)?
        .chunks_exact(4)
        .find(|entry| {
            (entry[0] == PROJECTED_CS_TYPE_GEO_KEY || entry[0] == GEOGRAPHIC_TYPE_GEO_KEY)
                && entry[1] == 0
        })
        .map(|entry| Crs::from_epsg(entry[3] as u32))
}

fn open_decoder(path: &Path) -> MosaicResult<Decoder<BufReader<File>>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(Decoder::new(reader)?)
}

/// Shape and georeferencing from the first image's tags.
fn read_info<R: Read + Seek>(decoder: &mut Decoder<R>, path: &Path) -> MosaicResult<RasterInfo> {
    let (width, height) = decoder.dimensions()?;
    let bands = match decoder.colortype()? {
        ColorType::Gray(8) => 1,
        ColorType::RGB(8) => 3,
        ColorType::RGBA(8) => 4,
        other => {
            return Err(MosaicError::invalid_raster(format!(
                "{}: unsupported colour type {:?}",
                path.display(),
                other
            )))
        }
    };

    let scale = decoder
        .find_tag(Tag::from_u16_exhaustive(GEOTIFF_MODELPIXELSCALE))?
        .map(|v| v.into_f64_vec())
        .transpose()?;
    let tiepoint = decoder
        .find_tag(Tag::from_u16_exhaustive(GEOTIFF_MODELTIEPOINT))?
        .map(|v| v.into_f64_vec())
        .transpose()?;
    let geokeys = decoder
        .find_tag(Tag::from_u16_exhaustive(GEOTIFF_GEOKEYDIRECTORY))?
        .map(|v| v.into_u16_vec())
        .transpose()?;
    let nodata = decoder
        .find_tag(Tag::from_u16_exhaustive(GDAL_NODATA))?
        .map(|v| v.into_string())
        .transpose()?
        .and_then(|s| s.trim_end_matches('\0').trim().parse::<u8>().ok());

    let transform = match (scale.as_deref(), tiepoint.as_deref()) {
        (Some([sx, ..]), Some([i, j, _, x, y, ..])) => {
            AffineTransform::new(x - i * sx, y + j * sx, *sx)
        }
        _ => AffineTransform::new(0.0, 0.0, 1.0),
    };

    Ok(RasterInfo {
        width: width as usize,
        height: height as usize,
        bands,
        transform,
        crs: geokeys.as_deref().and_then(parse_geokey_crs),
        nodata,
    })
}

/// Read an 8-bit TIFF, with georeferencing when present.
///
/// A file without tags gets an identity-like transform anchored at (0, 0)
/// and no CRS.
pub fn read_geotiff(path: &Path) -> MosaicResult<Raster> {
    let mut decoder = open_decoder(path)?;
    let info = read_info(&mut decoder, path)?;

    let data = match decoder.read_image()? {
        DecodingResult::U8(data) => data,
        _ => {
            return Err(MosaicError::invalid_raster(format!(
                "{}: expected 8-bit samples",
                path.display()
            )))
        }
    };

    let mut raster = Raster::new(
        info.width,
        info.height,
        info.bands,
        data,
        info.transform,
        info.crs,
    )?;
    raster.nodata = info.nodata;
    Ok(raster)
}

/// Row-range reader over a stripped, pixel-interleaved GeoTIFF.
///
/// Only the most recently decoded strip is kept.
pub struct StripReader {
    decoder: Decoder<BufReader<File>>,
    info: RasterInfo,
    rows_per_strip: usize,
    cached: Option<(usize, Vec<u8>)>,
}

impl StripReader {
    pub fn open(path: &Path) -> MosaicResult<Self> {
        let mut decoder = open_decoder(path)?;
        let info = read_info(&mut decoder, path)?;

        if decoder.get_chunk_type() != ChunkType::Strip {
            return Err(MosaicError::invalid_raster(format!(
                "{}: tiled TIFFs are not supported",
                path.display()
            )));
        }
        let planar = decoder.find_tag_unsigned::<u16>(Tag::PlanarConfiguration)?;
        if planar.unwrap_or(1) != 1 {
            return Err(MosaicError::invalid_raster(format!(
                "{}: band-separate TIFFs are not supported",
                path.display()
            )));
        }

        let rows_per_strip = (decoder.chunk_dimensions().1 as usize).clamp(1, info.height.max(1));
        Ok(Self {
            decoder,
            info,
            rows_per_strip,
            cached: None,
        })
    }

    pub fn info(&self) -> &RasterInfo {
        &self.info
    }

    /// Band-interleaved samples of `rows` full rows starting at `row`.
    pub fn read_rows(&mut self, row: usize, rows: usize) -> MosaicResult<Vec<u8>> {
        let end = row
            .checked_add(rows)
            .filter(|&end| end <= self.info.height)
            .ok_or_else(|| {
                MosaicError::invalid_raster(format!(
                    "rows {}..{} exceed raster height {}",
                    row,
                    row.saturating_add(rows),
                    self.info.height
                ))
            })?;

        let row_bytes = self.info.row_bytes();
        let mut out = Vec::with_capacity(rows * row_bytes);
        let mut next = row;
        while next < end {
            let strip = next / self.rows_per_strip;
            let strip_start = strip * self.rows_per_strip;
            let take_end = end.min(strip_start + self.rows_per_strip);

            let data = self.strip(strip)?;
            out.extend_from_slice(
                &data[(next - strip_start) * row_bytes..(take_end - strip_start) * row_bytes],
            );
            next = take_end;
        }
        Ok(out)
    }

    fn strip(&mut self, index: usize) -> MosaicResult<&[u8]> {
        let cached = matches!(&self.cached, Some((i, _)) if *i == index);
        if !cached {
            let start = index * self.rows_per_strip;
            let rows = self.rows_per_strip.min(self.info.height - start);
            let chunk = u32::try_from(index)
                .map_err(|_| MosaicError::invalid_raster(format!("strip {} out of range", index)))?;

            let data = match self.decoder.read_chunk(chunk)? {
                DecodingResult::U8(data) => data,
                _ => return Err(MosaicError::invalid_raster("expected 8-bit samples")),
            };
            if data.len() != rows * self.info.row_bytes() {
                return Err(MosaicError::invalid_raster(format!(
                    "strip {} holds {} bytes, expected {}",
                    index,
                    data.len(),
                    rows * self.info.row_bytes()
                )));
            }
            self.cached = Some((index, data));
        }

        match &self.cached {
            Some((_, data)) => Ok(data.as_slice()),
            None => Err(MosaicError::invalid_raster("strip cache empty")),
        }
    }
}

/// Re-open a rendered tile, stamp the lattice transform and run CRS onto
/// it, and rewrite it in place.
///
/// Whatever georeferencing the renderer wrote is discarded.
pub fn restamp_geotiff(
    path: &Path,
    extent: &BoundingBox,
    pixel_size: f64,
    crs: Crs,
) -> MosaicResult<Raster> {
    let mut raster = read_geotiff(path)?;
    raster.transform = AffineTransform::from_bbox(extent, pixel_size);
    raster.crs = Some(crs);

    // Write next to the target, then swap it in.
    let staging = path.with_extension("tif.restamp");
    write_geotiff(&staging, &raster)?;
    std::fs::rename(&staging, path)?;

    debug!(path = %path.display(), crs = %crs, "Re-stamped tile georeferencing");
    Ok(raster)
}
