//! Run manifest written next to the artifacts.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use mosaic::MosaicArtifact;
use tile_common::{BoundingBox, Crs, EdgePolicy, ExtractResult};

use crate::orchestrator::SkippedTile;

/// File name of the manifest inside the working directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Summary of one run, uploaded with the artifacts it describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub created_at: DateTime<Utc>,
    pub crs: Crs,
    /// Resolved area of interest
    pub bbox: BoundingBox,
    /// Extent of the whole tile lattice
    pub lattice_extent: BoundingBox,
    pub tile_size: f64,
    pub pixel_size: f64,
    pub edge_policy: EdgePolicy,
    /// `(nx, ny)`
    pub grid_shape: (usize, usize),
    /// Merged tile ids in `(i, j)` order
    pub tiles: Vec<String>,
    /// Tiles dropped by the relevance filter
    pub discarded: Vec<String>,
    pub skipped: Vec<SkippedTile>,
    pub mosaic: MosaicArtifact,
    pub clipped: Option<MosaicArtifact>,
}

impl RunManifest {
    /// Write the manifest into `work_dir`.
    pub fn write(&self, work_dir: &Path) -> ExtractResult<PathBuf> {
        let path = work_dir.join(MANIFEST_FILE);
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(&path, json)?;
        debug!(path = %path.display(), "Wrote run manifest");
        Ok(path)
    }

    pub fn read(path: &Path) -> ExtractResult<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
