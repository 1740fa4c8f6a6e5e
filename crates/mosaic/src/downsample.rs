//! Downsampling functions for generating pyramid levels.
//!
//! Input is band-interleaved `u8`. A pixel whose samples are all zero is
//! no-data and does not contribute to its block.

use serde::{Deserialize, Serialize};

use crate::raster::NODATA;

/// Method used to downsample raster data.
///
/// - **Mean**: smooth imagery, the default
/// - **Max**: keeps bright features visible at coarse levels
/// - **Nearest**: fast, preserves exact colours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DownsampleMethod {
    /// Average of the valid pixels in a 2x2 block
    #[default]
    Mean,
    /// Per-band maximum of the valid pixels in a 2x2 block
    Max,
    /// Top-left pixel of a 2x2 block
    Nearest,
}

impl DownsampleMethod {
    /// Parse from string (case-insensitive), falling back to Mean.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "max" => Self::Max,
            "nearest" => Self::Nearest,
            _ => Self::Mean,
        }
    }
}

/// Downsample a band-interleaved raster by a factor of 2.
///
/// Takes a raster of size (width, height) and produces one of size
/// (width/2, height/2), rounded down for odd dimensions.
///
/// # Returns
/// Tuple of (downsampled_data, new_width, new_height)
pub fn downsample_2x(
    data: &[u8],
    width: usize,
    height: usize,
    bands: usize,
    method: DownsampleMethod,
) -> (Vec<u8>, usize, usize) {
    let new_width = width / 2;
    let new_height = height / 2;

    if new_width == 0 || new_height == 0 || bands == 0 {
        return (vec![], 0, 0);
    }

    let mut output = vec![0u8; new_width * new_height * bands];
    let pixel = |col: usize, row: usize| pixel_at(data, width, bands, col, row);

    for out_y in 0..new_height {
        for out_x in 0..new_width {
            let (in_x, in_y) = (out_x * 2, out_y * 2);
            let block = [
                pixel(in_x, in_y),
                pixel(in_x + 1, in_y),
                pixel(in_x, in_y + 1),
                pixel(in_x + 1, in_y + 1),
            ];
            let out_start = (out_y * new_width + out_x) * bands;
            let out = &mut output[out_start..out_start + bands];

            match method {
                DownsampleMethod::Nearest => out.copy_from_slice(block[0]),
                DownsampleMethod::Mean => mean_of_block(&block, out),
                DownsampleMethod::Max => max_of_block(&block, out),
            }
        }
    }

    (output, new_width, new_height)
}

#[inline]
fn pixel_at(data: &[u8], width: usize, bands: usize, col: usize, row: usize) -> &[u8] {
    let start = (row * width + col) * bands;
    &data[start..start + bands]
}

fn is_nodata(pixel: &[u8]) -> bool {
    pixel.iter().all(|&v| v == NODATA)
}

/// Per-band mean of the valid pixels; all no-data gives no-data.
#[inline]
fn mean_of_block(block: &[&[u8]; 4], out: &mut [u8]) {
    let valid: Vec<&[u8]> = block.iter().copied().filter(|p| !is_nodata(p)).collect();
    if valid.is_empty() {
        return;
    }
    for (band, slot) in out.iter_mut().enumerate() {
        let sum: u32 = valid.iter().map(|p| p[band] as u32).sum();
        let count = valid.len() as u32;
        *slot = ((sum + count / 2) / count) as u8;
    }
    // A valid mean must not collapse into the no-data value.
    if is_nodata(out) {
        out[0] = 1;
    }
}

/// Per-band maximum of the valid pixels; all no-data gives no-data.
#[inline]
fn max_of_block(block: &[&[u8]; 4], out: &mut [u8]) {
    for pixel in block.iter().filter(|p| !is_nodata(p)) {
        for (slot, &v) in out.iter_mut().zip(pixel.iter()) {
            *slot = (*slot).max(v);
        }
    }
}
