//! End-to-end extraction run.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument};

use boundary::filter_tiles;
use mosaic::{clip_artifact, create_assembler, LiveTileGauge, MosaicArtifact, MosaicFormat};
use storage::{BlobStore, ObjectBlobStore, UploadSummary};
use tile_common::{ExtractError, ExtractResult, TileGrid};
use tile_renderer::{RendererSession, TileRenderer};

use crate::config::RunConfig;
use crate::manifest::{RunManifest, MANIFEST_FILE};
use crate::orchestrator::{RenderContext, RenderOrchestrator};
use crate::publisher::Publisher;
use crate::resolver::{resolve, AreaOfInterest};

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub manifest: RunManifest,
    pub manifest_path: std::path::PathBuf,
    /// Unset when no destination was configured.
    pub upload: Option<UploadSummary>,
    /// Most tile rasters the assembler held at once.
    pub peak_live_tiles: usize,
}

impl RunReport {
    /// The artifact a consumer should use: the clipped mosaic when present.
    pub fn final_artifact(&self) -> &MosaicArtifact {
        self.manifest.clipped.as_ref().unwrap_or(&self.manifest.mosaic)
    }
}

/// Resolve, partition, filter, render, assemble, clip and publish.
///
/// The working directory must not be shared with a concurrent run.
pub struct ExtractionPipeline {
    config: RunConfig,
    renderer: Arc<dyn TileRenderer>,
    publisher: Publisher,
}

impl ExtractionPipeline {
    pub fn new(config: RunConfig, renderer: Arc<dyn TileRenderer>) -> Self {
        let publisher = Publisher::new(Arc::new(ObjectBlobStore::new(config.storage.clone())));
        Self {
            config,
            renderer,
            publisher,
        }
    }

    /// Replace the blob store used for publishing.
    pub fn with_blob_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.publisher = Publisher::new(store);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    #[instrument(skip(self, aoi), fields(work_dir = %self.config.work_dir.display()))]
    pub async fn run(&self, aoi: AreaOfInterest) -> ExtractResult<RunReport> {
        let config = &self.config;
        config.validate()?;

        let format = config.format.unwrap_or(if aoi.is_boundary() {
            MosaicFormat::Chunked
        } else {
            MosaicFormat::Flat
        });

        let resolved = resolve(aoi, config.crs)?;
        let crs = resolved.crs;

        let grid = TileGrid::new(resolved.bbox, config.tile_size, config.edge_policy)?;
        info!(
            tiles = grid.len(),
            nx = grid.nx,
            ny = grid.ny,
            edge_policy = ?config.edge_policy,
            "Grid computed"
        );

        let filtered = filter_tiles(grid.iter(), resolved.boundary.as_ref());
        info!(
            kept = filtered.kept.len(),
            discarded = filtered.discarded.len(),
            "Relevance filter applied"
        );
        if filtered.kept.is_empty() {
            return Err(ExtractError::data_integrity(
                "no tile intersects the area of interest",
            ));
        }
        let discarded = filtered
            .discarded
            .iter()
            .map(|t| t.output_id.clone())
            .collect();

        std::fs::create_dir_all(&config.work_dir)?;
        clear_previous_outputs(&config.work_dir)?;

        let gauge = LiveTileGauge::new();
        let mut assembler = create_assembler(
            format,
            &config.work_dir,
            grid.extent(),
            config.pixel_size,
            crs,
            &config.mosaic,
            gauge.clone(),
        )?;

        let outcome = {
            let session = RendererSession::open(self.renderer.clone(), config.render_timeout).await?;
            let orchestrator = RenderOrchestrator::new(
                &session,
                RenderContext::from_config(config, crs),
                config.concurrency,
                config.failure_policy,
            );
            orchestrator.run(filtered.kept, assembler.as_mut()).await?
        };

        let mosaic = tokio::task::spawn_blocking(move || assembler.finish())
            .await
            .map_err(|e| ExtractError::Raster(format!("mosaic task failed: {}", e)))??;
        info!(
            path = %mosaic.path.display(),
            width = mosaic.width,
            height = mosaic.height,
            levels = mosaic.levels,
            tiles = mosaic.tiles_merged,
            "Mosaic assembled"
        );

        let clipped = match resolved.boundary.clone() {
            Some(boundary) => {
                let artifact = mosaic.clone();
                let work_dir = config.work_dir.clone();
                let mosaic_config = config.mosaic.clone();
                let clipped = tokio::task::spawn_blocking(move || {
                    clip_artifact(&artifact, &boundary, &work_dir, &mosaic_config)
                })
                .await
                .map_err(|e| ExtractError::Raster(format!("clip task failed: {}", e)))??;
                info!(
                    path = %clipped.path.display(),
                    width = clipped.width,
                    height = clipped.height,
                    "Clip complete"
                );
                Some(clipped)
            }
            None => None,
        };

        let manifest = RunManifest {
            created_at: Utc::now(),
            crs,
            bbox: resolved.bbox,
            lattice_extent: grid.extent(),
            tile_size: config.tile_size,
            pixel_size: config.pixel_size,
            edge_policy: config.edge_policy,
            grid_shape: grid.shape(),
            tiles: outcome.merged_ids(),
            discarded,
            skipped: outcome.skipped,
            mosaic,
            clipped,
        };
        let manifest_path = manifest.write(&config.work_dir)?;

        let upload = match &config.destination {
            Some(destination) => Some(self.publisher.publish(&config.work_dir, destination).await?),
            None => {
                info!("No destination configured, skipping publish");
                None
            }
        };

        info!(
            tiles = manifest.tiles.len(),
            skipped = manifest.skipped.len(),
            peak_live_tiles = gauge.peak(),
            "Extraction complete"
        );

        Ok(RunReport {
            manifest,
            manifest_path,
            upload,
            peak_live_tiles: gauge.peak(),
        })
    }
}

/// Whether `name` is a file or store this pipeline writes into the working
/// directory.
fn is_run_output(name: &str) -> bool {
    name == MANIFEST_FILE
        || name.starts_with("mosaic.")
        || name.starts_with("mosaic_clipped.")
        || (name.starts_with("raster_") && (name.ends_with(".tif") || name.ends_with(".tif.restamp")))
}

/// Remove what an earlier run left in `work_dir` so it cannot be merged or
/// published with this one.
fn clear_previous_outputs(work_dir: &Path) -> ExtractResult<()> {
    for entry in std::fs::read_dir(work_dir)? {
        let entry = entry?;
        if !is_run_output(&entry.file_name().to_string_lossy()) {
            continue;
        }

        let path = entry.path();
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
        debug!(path = %path.display(), "Removed previous run output");
    }
    Ok(())
}
