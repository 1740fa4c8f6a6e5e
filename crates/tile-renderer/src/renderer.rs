//! Tile renderer trait.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::RenderResult;
use crate::request::RenderRequest;

/// Something that turns a render request into a raster file on disk.
///
/// Implementations must be safe to call concurrently for distinct requests;
/// output paths are unique per tile so no two calls share a file.
#[async_trait]
pub trait TileRenderer: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Prepare the rendering engine. Called once per run before any render.
    async fn initialize(&self) -> RenderResult<()>;

    /// Render one tile and return the path of the written raster.
    async fn render(&self, request: &RenderRequest) -> RenderResult<PathBuf>;

    /// Release the rendering engine. Must be idempotent.
    fn shutdown(&self);
}
