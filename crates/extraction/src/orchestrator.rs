//! Per-tile render orchestration.
//!
//! Renders retained tiles through a bounded pool and folds each one into the
//! mosaic as soon as it is ready. Every rendered raster is re-stamped with
//! the run CRS and the tile's own extent before it reaches the assembler.

use std::path::PathBuf;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use mosaic::{LiveTileGauge, LoadedTile, MosaicAssembler};
use tile_common::{Crs, ExtractError, ExtractResult, RenderedTile, TileSpec};
use tile_renderer::{RenderRequest, RendererSession};

use crate::config::{FailurePolicy, RunConfig};

/// Base delay between render attempts, multiplied by the attempt number.
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Values shared by every render request of a run.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub crs: Crs,
    pub tile_size: f64,
    pub pixel_size: f64,
    pub layer: String,
    pub work_dir: PathBuf,
    pub retries: u32,
    pub keep_tiles: bool,
}

impl RenderContext {
    pub fn from_config(config: &RunConfig, crs: Crs) -> Self {
        Self {
            crs,
            tile_size: config.tile_size,
            pixel_size: config.pixel_size,
            layer: config.layer.clone(),
            work_dir: config.work_dir.clone(),
            retries: config.render_retries,
            keep_tiles: config.keep_tiles,
        }
    }

    pub fn request(&self, tile: &TileSpec) -> RenderRequest {
        RenderRequest::for_tile(
            tile,
            self.crs,
            self.tile_size,
            self.pixel_size,
            &self.layer,
            &self.work_dir,
        )
    }
}

/// A tile left out of a partial mosaic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedTile {
    pub id: String,
    pub grid_i: usize,
    pub grid_j: usize,
    pub kind: String,
    pub error: String,
}

/// Tiles merged and skipped by one orchestration pass, in `(i, j)` order.
#[derive(Debug, Clone, Default)]
pub struct RenderOutcome {
    pub merged: Vec<TileSpec>,
    pub skipped: Vec<SkippedTile>,
}

impl RenderOutcome {
    pub fn merged_ids(&self) -> Vec<String> {
        self.merged.iter().map(|t| t.output_id.clone()).collect()
    }
}

/// Fans render calls out over a bounded pool and fans results into the assembler.
pub struct RenderOrchestrator<'a> {
    session: &'a RendererSession,
    context: RenderContext,
    concurrency: usize,
    failure_policy: FailurePolicy,
}

impl<'a> RenderOrchestrator<'a> {
    pub fn new(
        session: &'a RendererSession,
        context: RenderContext,
        concurrency: usize,
        failure_policy: FailurePolicy,
    ) -> Self {
        Self {
            session,
            context,
            concurrency: concurrency.max(1),
            failure_policy,
        }
    }

    /// Render every tile and merge it into `assembler`.
    ///
    /// Render and re-stamp failures follow the failure policy. Merge
    /// failures always abort. Returning early drops the in-flight renders.
    pub async fn run(
        &self,
        tiles: Vec<TileSpec>,
        assembler: &mut dyn MosaicAssembler,
    ) -> ExtractResult<RenderOutcome> {
        let total = tiles.len();
        let mut outcome = RenderOutcome::default();

        info!(
            tiles = total,
            concurrency = self.concurrency,
            renderer = self.session.renderer_name(),
            "Rendering tiles"
        );

        // Re-stamped rasters count as live tiles from load until merged.
        let gauge = assembler.gauge().clone();
        let mut results = stream::iter(
            tiles
                .into_iter()
                .map(|tile| self.render_tile(tile, gauge.clone())),
        )
        .buffer_unordered(self.concurrency);

        while let Some((tile, result)) = results.next().await {
            let done = outcome.merged.len() + outcome.skipped.len() + 1;
            match result {
                Ok(loaded) => {
                    let path = loaded.rendered().raster_path.clone();
                    assembler.add_tile(loaded)?;
                    if !self.context.keep_tiles {
                        if let Err(e) = std::fs::remove_file(&path) {
                            warn!(path = %path.display(), error = %e, "Could not remove merged tile");
                        }
                    }
                    info!(tile = %tile.output_id, done, total, "Tile rendered and merged");
                    outcome.merged.push(tile);
                }
                Err(e) => match self.failure_policy {
                    FailurePolicy::FailFast => {
                        error!(tile = %tile.output_id, error = %e, "Tile failed, aborting run");
                        return Err(e);
                    }
                    FailurePolicy::SkipFailed => {
                        warn!(tile = %tile.output_id, error = %e, done, total, "Tile skipped");
                        self.remove_partial_output(&tile);
                        outcome.skipped.push(SkippedTile {
                            id: tile.output_id.clone(),
                            grid_i: tile.grid_i,
                            grid_j: tile.grid_j,
                            kind: e.kind().to_string(),
                            error: e.to_string(),
                        });
                    }
                },
            }
        }

        outcome.merged.sort_by_key(|t| (t.grid_i, t.grid_j));
        outcome.skipped.sort_by_key(|t| (t.grid_i, t.grid_j));
        Ok(outcome)
    }

    /// Drop whatever a failed render left at the tile's output path.
    fn remove_partial_output(&self, tile: &TileSpec) {
        let path = tile.output_path(&self.context.work_dir);
        match std::fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "Removed partial tile output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Could not remove partial tile"),
        }
    }

    /// Render, retry and re-stamp one tile.
    #[instrument(skip(self, tile, gauge), fields(tile = %tile.output_id))]
    async fn render_tile(
        &self,
        tile: TileSpec,
        gauge: LiveTileGauge,
    ) -> (TileSpec, ExtractResult<LoadedTile>) {
        let result = self.render_and_stamp(&tile, gauge).await;
        (tile, result)
    }

    async fn render_and_stamp(
        &self,
        tile: &TileSpec,
        gauge: LiveTileGauge,
    ) -> ExtractResult<LoadedTile> {
        let request = self.context.request(tile);

        let mut attempt: u32 = 0;
        let path = loop {
            match self.session.render(&request).await {
                Ok(path) => break path,
                Err(e) if e.is_retryable() && attempt < self.context.retries => {
                    attempt += 1;
                    warn!(
                        attempt,
                        retries = self.context.retries,
                        error = %e,
                        "Render failed, retrying"
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(e) => return Err(e.into()),
            }
        };

        let pixel_size = self.context.pixel_size;
        let crs = self.context.crs;
        let rendered = RenderedTile::new(tile.clone(), path, crs);
        let loaded = tokio::task::spawn_blocking(move || {
            LoadedTile::restamp(rendered, pixel_size, &gauge)
        })
        .await
        .map_err(|e| ExtractError::render(&tile.output_id, format!("re-stamp task failed: {}", e)))??;

        debug!(path = %loaded.rendered().raster_path.display(), crs = %crs, "Tile re-stamped");
        Ok(loaded)
    }
}
