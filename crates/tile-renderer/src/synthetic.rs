//! Deterministic in-process renderer.
//!
//! Writes a solid-colour RGB TIFF per tile whose colour encodes the tile's
//! lattice coordinates. Like the external renderer, the output carries no
//! spatial reference; the orchestrator stamps one afterwards.

use async_trait::async_trait;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tiff::encoder::{colortype, TiffEncoder};
use tracing::{debug, instrument};

use crate::error::{RenderError, RenderResult};
use crate::renderer::TileRenderer;
use crate::request::RenderRequest;

/// Lifecycle and call counters shared with the caller.
#[derive(Debug, Clone, Default)]
pub struct SyntheticStats {
    initialized: Arc<AtomicUsize>,
    shutdowns: Arc<AtomicUsize>,
    renders: Arc<AtomicUsize>,
    failures: Arc<AtomicUsize>,
}

impl SyntheticStats {
    pub fn initialized(&self) -> usize {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    /// Successful renders.
    pub fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    /// Render attempts that failed, injected failures included.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub struct SyntheticRenderer {
    fail_on: HashSet<String>,
    /// Tiles that fail this many times before succeeding.
    flaky: Option<(HashSet<String>, usize)>,
    flaky_attempts: std::sync::Mutex<std::collections::HashMap<String, usize>>,
    delay: Option<Duration>,
    stats: SyntheticStats,
}

impl SyntheticRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always fail rendering the given tile ids.
    pub fn failing_on<I, S>(mut self, tiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fail_on = tiles.into_iter().map(Into::into).collect();
        self
    }

    /// Fail the first `failures` attempts of each given tile, then succeed.
    pub fn flaky_on<I, S>(mut self, tiles: I, failures: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flaky = Some((tiles.into_iter().map(Into::into).collect(), failures));
        self
    }

    /// Sleep before each render.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn stats(&self) -> SyntheticStats {
        self.stats.clone()
    }

    fn injected_failure(&self, tile_id: &str) -> bool {
        if self.fail_on.contains(tile_id) {
            return true;
        }
        let Some((tiles, failures)) = &self.flaky else {
            return false;
        };
        if !tiles.contains(tile_id) {
            return false;
        }
        let mut attempts = match self.flaky_attempts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let seen = attempts.entry(tile_id.to_string()).or_insert(0);
        *seen += 1;
        *seen <= *failures
    }
}

/// Colour of tile `(i, j)`; no sample is ever zero.
pub fn tile_color(grid_i: usize, grid_j: usize) -> [u8; 3] {
    [
        (grid_i % 250 + 1) as u8,
        (grid_j % 250 + 1) as u8,
        ((grid_i * 31 + grid_j * 17) % 250 + 1) as u8,
    ]
}

#[async_trait]
impl TileRenderer for SyntheticRenderer {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn initialize(&self) -> RenderResult<()> {
        self.stats.initialized.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    #[instrument(skip(self, request), fields(tile = %request.tile_id))]
    async fn render(&self, request: &RenderRequest) -> RenderResult<PathBuf> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.injected_failure(&request.tile_id) {
            self.stats.failures.fetch_add(1, Ordering::SeqCst);
            return Err(RenderError::failed(&request.tile_id, "injected failure"));
        }

        let (width, height) = request.pixel_dims();
        let color = tile_color(request.grid_i, request.grid_j);
        let path = request.output_path.clone();

        let written = path.clone();
        tokio::task::spawn_blocking(move || write_solid_tiff(&written, width, height, color))
            .await
            .map_err(|e| RenderError::failed(&request.tile_id, e.to_string()))??;

        self.stats.renders.fetch_add(1, Ordering::SeqCst);
        debug!(width, height, path = %path.display(), "Synthetic tile written");
        Ok(path)
    }

    fn shutdown(&self) {
        self.stats.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

fn write_solid_tiff(path: &Path, width: usize, height: usize, color: [u8; 3]) -> RenderResult<()> {
    let data: Vec<u8> = color
        .iter()
        .copied()
        .cycle()
        .take(width * height * 3)
        .collect();

    let file = BufWriter::new(File::create(path)?);
    let mut encoder =
        TiffEncoder::new(file).map_err(|e| RenderError::failed(path.display().to_string(), e.to_string()))?;
    encoder
        .write_image::<colortype::RGB8>(width as u32, height as u32, &data)
        .map_err(|e| RenderError::failed(path.display().to_string(), e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tile_common::{BoundingBox, Crs, TileSpec};

    fn request(dir: &Path, i: usize, j: usize) -> RenderRequest {
        let extent = BoundingBox::new(i as f64 * 10.0, j as f64 * 10.0, (i + 1) as f64 * 10.0, (j + 1) as f64 * 10.0);
        let tile = TileSpec::new(i, j, extent);
        RenderRequest::for_tile(&tile, Crs::WEB_MERCATOR, 10.0, 0.5, "test", dir)
    }

    #[tokio::test]
    async fn test_writes_tile_raster() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = SyntheticRenderer::new();
        let path = renderer.render(&request(dir.path(), 2, 1)).await.unwrap();

        assert_eq!(path, dir.path().join("raster_2_1.tif"));
        let mut decoder = tiff::decoder::Decoder::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(decoder.dimensions().unwrap(), (20, 20));
        match decoder.read_image().unwrap() {
            tiff::decoder::DecodingResult::U8(data) => {
                assert_eq!(&data[0..3], &tile_color(2, 1));
            }
            _ => panic!("expected 8-bit samples"),
        }
        assert_eq!(renderer.stats().renders(), 1);
    }

    #[tokio::test]
    async fn test_flaky_tile_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = SyntheticRenderer::new().flaky_on(["raster_0_0"], 2);
        let req = request(dir.path(), 0, 0);

        assert!(renderer.render(&req).await.is_err());
        assert!(renderer.render(&req).await.is_err());
        assert!(renderer.render(&req).await.is_ok());
        assert_eq!(renderer.stats().failures(), 2);
    }

    #[test]
    fn test_tile_colors_match_test_fixtures() {
        for (i, j) in [(0, 0), (1, 0), (7, 3), (300, 12)] {
            assert_eq!(tile_color(i, j), test_utils::tile_color(i, j));
        }
    }
}
