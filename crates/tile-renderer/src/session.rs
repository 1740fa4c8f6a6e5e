//! Scoped renderer lifecycle.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{RenderError, RenderResult};
use crate::renderer::TileRenderer;
use crate::request::RenderRequest;

/// An initialized renderer that is shut down when the session is dropped.
///
/// Opened once per run. Every exit path, including early returns on error
/// and panics unwinding through the pipeline, releases the renderer.
pub struct RendererSession {
    renderer: Arc<dyn TileRenderer>,
    timeout: Option<Duration>,
}

impl RendererSession {
    /// Initialize `renderer` and wrap it in a session.
    pub async fn open(
        renderer: Arc<dyn TileRenderer>,
        timeout: Option<Duration>,
    ) -> RenderResult<Self> {
        renderer.initialize().await?;
        info!(renderer = renderer.name(), timeout = ?timeout, "Renderer initialized");
        Ok(Self { renderer, timeout })
    }

    pub fn renderer_name(&self) -> &str {
        self.renderer.name()
    }

    /// Render one tile, bounded by the session timeout when set.
    pub async fn render(&self, request: &RenderRequest) -> RenderResult<PathBuf> {
        match self.timeout {
            None => self.renderer.render(request).await,
            Some(limit) => match tokio::time::timeout(limit, self.renderer.render(request)).await {
                Ok(result) => result,
                Err(_) => Err(RenderError::Timeout {
                    tile: request.tile_id.clone(),
                    timeout: limit,
                }),
            },
        }
    }
}

impl Drop for RendererSession {
    fn drop(&mut self) {
        self.renderer.shutdown();
        debug!(renderer = self.renderer.name(), "Renderer shut down");
    }
}
