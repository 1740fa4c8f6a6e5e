//! Run configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use mosaic::{MosaicConfig, MosaicFormat};
use storage::{ObjectStorageConfig, RemoteUri};
use tile_common::{Crs, EdgePolicy, ExtractError, ExtractResult};
use tile_renderer::DEFAULT_LAYER;

/// Largest tile side in pixels; a tile raster is decoded whole.
pub const MAX_TILE_PIXELS: f64 = 8192.0;

/// What to do when a tile cannot be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the run on the first failed tile.
    #[default]
    FailFast,
    /// Leave the tile out and produce a partial mosaic.
    SkipFailed,
}

/// Settings for one extraction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Tile edge length in CRS units
    pub tile_size: f64,
    /// Map units per pixel
    pub pixel_size: f64,
    /// Working directory, owned by one run at a time
    pub work_dir: PathBuf,
    /// Upload target (`s3://bucket/prefix` or `file:///dir`); unset skips publishing
    pub destination: Option<String>,
    /// Output CRS; unset lets the resolver decide
    pub crs: Option<Crs>,
    /// Layer reference handed to the renderer
    pub layer: String,
    /// Mosaic shape; unset picks flat for bbox input and chunked for boundary input
    pub format: Option<MosaicFormat>,
    pub edge_policy: EdgePolicy,
    /// Renders in flight at once
    pub concurrency: usize,
    /// Per-call render timeout
    pub render_timeout: Option<Duration>,
    /// Extra attempts for a failed render
    pub render_retries: u32,
    pub failure_policy: FailurePolicy,
    /// Keep per-tile rasters after they are merged
    pub keep_tiles: bool,
    pub mosaic: MosaicConfig,
    pub storage: ObjectStorageConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            tile_size: 1000.0,
            pixel_size: 0.3,
            work_dir: PathBuf::from("./extract"),
            destination: None,
            crs: None,
            layer: DEFAULT_LAYER.to_string(),
            format: None,
            edge_policy: EdgePolicy::default(),
            concurrency: 1,
            render_timeout: None,
            render_retries: 0,
            failure_policy: FailurePolicy::default(),
            keep_tiles: true,
            mosaic: MosaicConfig::default(),
            storage: ObjectStorageConfig::default(),
        }
    }
}

impl RunConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> ExtractResult<Self> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("TILE_SIZE") {
            config.tile_size = parse_env("TILE_SIZE", &val)?;
        }

        if let Ok(val) = std::env::var("RESOLUTION") {
            config.pixel_size = parse_env("RESOLUTION", &val)?;
        }

        if let Ok(val) = std::env::var("WORK_DIR") {
            config.work_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("DEST_URI") {
            config.destination = Some(val);
        }

        if let Ok(val) = std::env::var("OUTPUT_CRS") {
            config.crs = Some(Crs::parse(&val)?);
        }

        if let Ok(val) = std::env::var("LAYER_SOURCE") {
            config.layer = val;
        }

        if let Ok(val) = std::env::var("MOSAIC_FORMAT") {
            config.format = Some(MosaicFormat::from_str(&val).ok_or_else(|| {
                ExtractError::configuration(format!("unknown mosaic format: {}", val))
            })?);
        }

        if let Ok(val) = std::env::var("EDGE_POLICY") {
            config.edge_policy = EdgePolicy::from_str(&val).ok_or_else(|| {
                ExtractError::configuration(format!("unknown edge policy: {}", val))
            })?;
        }

        if let Ok(val) = std::env::var("RENDER_CONCURRENCY") {
            config.concurrency = parse_env("RENDER_CONCURRENCY", &val)?;
        }

        if let Ok(val) = std::env::var("RENDER_TIMEOUT_SECS") {
            config.render_timeout = Some(Duration::from_secs(parse_env("RENDER_TIMEOUT_SECS", &val)?));
        }

        if let Ok(val) = std::env::var("RENDER_RETRIES") {
            config.render_retries = parse_env("RENDER_RETRIES", &val)?;
        }

        if let Ok(val) = std::env::var("SKIP_FAILED_TILES") {
            if val.to_lowercase() == "true" || val == "1" {
                config.failure_policy = FailurePolicy::SkipFailed;
            }
        }

        config.mosaic = MosaicConfig::from_env();
        config.storage = ObjectStorageConfig::from_env();
        Ok(config)
    }

    /// Check every setting before any rendering starts.
    pub fn validate(&self) -> ExtractResult<()> {
        if !self.tile_size.is_finite() || self.tile_size <= 0.0 {
            return Err(ExtractError::configuration(format!(
                "tile size must be a positive number, got {}",
                self.tile_size
            )));
        }

        if !self.pixel_size.is_finite() || self.pixel_size <= 0.0 {
            return Err(ExtractError::configuration(format!(
                "resolution must be a positive number, got {}",
                self.pixel_size
            )));
        }

        if self.pixel_size > self.tile_size {
            return Err(ExtractError::configuration(format!(
                "resolution {} is coarser than the tile size {}",
                self.pixel_size, self.tile_size
            )));
        }

        let tile_pixels = (self.tile_size / self.pixel_size).ceil();
        if tile_pixels > MAX_TILE_PIXELS {
            return Err(ExtractError::configuration(format!(
                "tiles of {} pixels per side exceed the limit of {}",
                tile_pixels, MAX_TILE_PIXELS
            )));
        }

        if self.concurrency == 0 {
            return Err(ExtractError::configuration("concurrency must be at least 1"));
        }

        if self.render_timeout == Some(Duration::ZERO) {
            return Err(ExtractError::configuration("render timeout must be non-zero"));
        }

        if self.work_dir.as_os_str().is_empty() {
            return Err(ExtractError::configuration("working directory is required"));
        }

        if self.layer.trim().is_empty() {
            return Err(ExtractError::configuration("layer reference is empty"));
        }

        if let Some(destination) = &self.destination {
            RemoteUri::parse(destination).map_err(|e| {
                ExtractError::configuration(format!("invalid destination: {}", e))
            })?;
        }

        self.mosaic
            .validate()
            .map_err(|e| ExtractError::configuration(e.to_string()))
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, val: &str) -> ExtractResult<T> {
    val.trim()
        .parse()
        .map_err(|_| ExtractError::configuration(format!("invalid value for {}: {}", name, val)))
}
