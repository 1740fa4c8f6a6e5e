//! Synthetic raster generators.
//!
//! These generators create predictable, verifiable pixel patterns that can
//! be used across the test suite. All output is 8-bit, band-interleaved,
//! row-major with row 0 at the top.

/// Creates an RGB raster where each pixel encodes its position.
///
/// Pixel `(col, row)` holds `[col % 251 + 1, row % 251 + 1, 200]`, so no
/// sample is ever zero and a zero always means "not written".
///
/// # Example
///
/// ```
/// use test_utils::create_position_raster;
///
/// let data = create_position_raster(4, 2);
/// assert_eq!(data.len(), 4 * 2 * 3);
/// assert_eq!(&data[0..3], &[1, 1, 200]);
/// assert_eq!(&data[3..6], &[2, 1, 200]);
/// ```
pub fn create_position_raster(width: usize, height: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(width * height * 3);
    for row in 0..height {
        for col in 0..width {
            data.push((col % 251 + 1) as u8);
            data.push((row % 251 + 1) as u8);
            data.push(200);
        }
    }
    data
}

/// Creates a single-colour RGB raster.
pub fn create_solid_raster(width: usize, height: usize, rgb: [u8; 3]) -> Vec<u8> {
    rgb.iter()
        .copied()
        .cycle()
        .take(width * height * 3)
        .collect()
}

/// Colour that identifies tile `(i, j)`; never contains a zero sample.
pub fn tile_color(grid_i: usize, grid_j: usize) -> [u8; 3] {
    [
        (grid_i % 250 + 1) as u8,
        (grid_j % 250 + 1) as u8,
        ((grid_i * 31 + grid_j * 17) % 250 + 1) as u8,
    ]
}
