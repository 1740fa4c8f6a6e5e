//! Raster extraction service.
//!
//! Partitions a bounding box or boundary into tiles, renders each tile
//! through a GIS renderer, assembles the mosaic, clips it to the boundary
//! and uploads the working directory to object storage.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{ArgGroup, Parser, ValueEnum};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use extraction::{AreaOfInterest, ExtractionPipeline, FailurePolicy, RunConfig};
use mosaic::MosaicFormat;
use tile_common::{BoundingBox, Crs, EdgePolicy};
use tile_renderer::{ProcessRenderer, SyntheticRenderer, TileRenderer, DEFAULT_PROGRAM};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RendererKind {
    /// External GIS processing binary
    Process,
    /// Deterministic solid-colour tiles, no external dependency
    Synthetic,
}

#[derive(Parser, Debug)]
#[command(name = "extractor")]
#[command(about = "Render an area of interest into a georeferenced mosaic")]
#[command(allow_negative_numbers = true)]
#[command(group(ArgGroup::new("area").required(true).args(["minx", "boundary"])))]
struct Args {
    /// Minimum X of the bounding box
    #[arg(long, requires_all = ["maxx", "miny", "maxy"])]
    minx: Option<f64>,

    /// Maximum X of the bounding box
    #[arg(long, requires = "minx")]
    maxx: Option<f64>,

    /// Minimum Y of the bounding box
    #[arg(long, requires = "minx")]
    miny: Option<f64>,

    /// Maximum Y of the bounding box
    #[arg(long, requires = "minx")]
    maxy: Option<f64>,

    /// Boundary file: GeoJSON, or an ESRI shapefile (.shp)
    #[arg(long)]
    boundary: Option<PathBuf>,

    /// CRS of the boundary coordinates when the file does not declare one, e.g. EPSG:3857
    #[arg(long, requires = "boundary")]
    boundary_crs: Option<String>,

    /// Tile edge length in CRS units
    #[arg(long, env = "TILE_SIZE", default_value_t = 1000.0)]
    tile_size: f64,

    /// Map units per pixel
    #[arg(long, env = "RESOLUTION", default_value_t = 0.3)]
    resolution: f64,

    /// Working directory for tiles, mosaic and manifest
    #[arg(long, env = "WORK_DIR", default_value = "./extract")]
    out_path: PathBuf,

    /// Destination URI (s3://bucket/prefix or file:///dir)
    #[arg(long, env = "DEST_URI")]
    dest: Option<String>,

    /// Output CRS, e.g. EPSG:3857
    #[arg(long, env = "OUTPUT_CRS")]
    crs: Option<String>,

    /// Layer reference handed to the renderer
    #[arg(long, env = "LAYER_SOURCE")]
    source: Option<String>,

    /// Renderer implementation
    #[arg(long, value_enum, default_value_t = RendererKind::Process)]
    renderer: RendererKind,

    /// Program run by the process renderer
    #[arg(long, env = "RENDERER_PROGRAM", default_value = DEFAULT_PROGRAM)]
    renderer_program: PathBuf,

    /// Mosaic format: flat or chunked (default: flat for a bbox, chunked for a boundary)
    #[arg(long, env = "MOSAIC_FORMAT")]
    format: Option<String>,

    /// Edge tiles: overshoot or clip
    #[arg(long, env = "EDGE_POLICY", default_value = "overshoot")]
    edge_policy: String,

    /// Renders in flight at once
    #[arg(long, env = "RENDER_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Per-tile render timeout in seconds
    #[arg(long, env = "RENDER_TIMEOUT_SECS")]
    render_timeout_secs: Option<u64>,

    /// Extra attempts for a failed render
    #[arg(long, env = "RENDER_RETRIES", default_value_t = 0)]
    render_retries: u32,

    /// Leave failed tiles out instead of aborting
    #[arg(long)]
    skip_failed_tiles: bool,

    /// Delete per-tile rasters once merged
    #[arg(long)]
    drop_tiles: bool,

    /// Do not upload even when a destination is set
    #[arg(long)]
    skip_publish: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn area_of_interest(&self) -> Result<AreaOfInterest> {
        let bbox = match (self.minx, self.maxx, self.miny, self.maxy) {
            (Some(minx), Some(maxx), Some(miny), Some(maxy)) => {
                Some(BoundingBox::new(minx, miny, maxx, maxy))
            }
            _ => None,
        };
        let boundary_crs = self
            .boundary_crs
            .as_deref()
            .map(Crs::parse)
            .transpose()
            .map_err(|e| anyhow!("invalid --boundary-crs: {}", e))?;
        Ok(AreaOfInterest::from_inputs(
            bbox,
            self.boundary.clone(),
            boundary_crs,
        )?)
    }

    fn run_config(&self) -> Result<RunConfig> {
        let mut config = RunConfig::from_env()?;

        config.tile_size = self.tile_size;
        config.pixel_size = self.resolution;
        config.work_dir = self.out_path.clone();
        config.destination = if self.skip_publish {
            None
        } else {
            self.dest.clone()
        };
        config.crs = self
            .crs
            .as_deref()
            .map(Crs::parse)
            .transpose()
            .map_err(|e| anyhow!("invalid --crs: {}", e))?;
        if let Some(source) = &self.source {
            config.layer = source.clone();
        }
        config.format = self
            .format
            .as_deref()
            .map(|f| MosaicFormat::from_str(f).ok_or_else(|| anyhow!("unknown --format: {}", f)))
            .transpose()?;
        config.edge_policy = EdgePolicy::from_str(&self.edge_policy)
            .ok_or_else(|| anyhow!("unknown --edge-policy: {}", self.edge_policy))?;
        config.concurrency = self.concurrency;
        config.render_timeout = self.render_timeout_secs.map(Duration::from_secs);
        config.render_retries = self.render_retries;
        config.failure_policy = if self.skip_failed_tiles {
            FailurePolicy::SkipFailed
        } else {
            FailurePolicy::FailFast
        };
        config.keep_tiles = !self.drop_tiles;

        config.validate()?;
        Ok(config)
    }

    fn renderer(&self) -> Arc<dyn TileRenderer> {
        match self.renderer {
            RendererKind::Process => Arc::new(ProcessRenderer::new(&self.renderer_program)),
            RendererKind::Synthetic => Arc::new(SyntheticRenderer::new()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting raster extractor");

    let config = args.run_config().context("invalid configuration")?;
    let aoi = args.area_of_interest().context("invalid area of interest")?;
    info!(
        work_dir = %config.work_dir.display(),
        tile_size = config.tile_size,
        resolution = config.pixel_size,
        renderer = ?args.renderer,
        "Loaded configuration"
    );

    let pipeline = ExtractionPipeline::new(config, args.renderer());
    let report = match pipeline.run(aoi).await {
        Ok(report) => report,
        Err(e) => {
            error!(kind = e.kind(), error = %e, "Extraction failed");
            return Err(e.into());
        }
    };

    let artifact = report.final_artifact();
    info!(
        manifest = %report.manifest_path.display(),
        mosaic = %artifact.path.display(),
        tiles = report.manifest.tiles.len(),
        skipped = report.manifest.skipped.len(),
        uploaded = report.upload.as_ref().map(|u| u.objects).unwrap_or(0),
        "Extraction finished"
    );

    Ok(())
}
