//! External-process renderer.
//!
//! Drives a GIS processing command line such as
//! `qgis_process run native:rasterize --EXTENT=... --OUTPUT=...`. The child
//! runs headless and is killed if the render future is dropped, so a
//! session timeout also terminates a hung process.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::error::{RenderError, RenderResult};
use crate::renderer::TileRenderer;
use crate::request::RenderRequest;

pub const DEFAULT_PROGRAM: &str = "qgis_process";
pub const DEFAULT_ALGORITHM: &str = "native:rasterize";

#[derive(Debug, Clone)]
pub struct ProcessRenderer {
    program: PathBuf,
    algorithm: String,
    env: Vec<(String, String)>,
}

impl ProcessRenderer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            algorithm: DEFAULT_ALGORITHM.to_string(),
            // Headless Qt
            env: vec![("QT_QPA_PLATFORM".to_string(), "offscreen".to_string())],
        }
    }

    pub fn with_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.algorithm = algorithm.into();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Arguments passed to the program for `request`.
    pub fn command_args(&self, request: &RenderRequest) -> Vec<String> {
        let mut args = vec!["run".to_string(), self.algorithm.clone()];
        args.extend(
            request
                .to_parameters()
                .into_iter()
                .map(|(name, value)| format!("--{}={}", name, value)),
        );
        args
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

impl Default for ProcessRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

#[async_trait]
impl TileRenderer for ProcessRenderer {
    fn name(&self) -> &str {
        "process"
    }

    /// Probe the program so a missing installation fails before any tile.
    async fn initialize(&self) -> RenderResult<()> {
        let output = self
            .command()
            .arg("--version")
            .output()
            .await
            .map_err(|e| {
                RenderError::Unavailable(format!(
                    "cannot start {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(RenderError::Unavailable(format!(
                "{} --version exited with {}",
                self.program.display(),
                output.status
            )));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        info!(
            program = %self.program.display(),
            version = %version.lines().next().unwrap_or("").trim(),
            "Render process available"
        );
        Ok(())
    }

    #[instrument(skip(self, request), fields(tile = %request.tile_id))]
    async fn render(&self, request: &RenderRequest) -> RenderResult<PathBuf> {
        let args = self.command_args(request);
        debug!(program = %self.program.display(), ?args, "Spawning render process");

        let output = self
            .command()
            .args(&args)
            .output()
            .await
            .map_err(|e| RenderError::failed(&request.tile_id, format!("spawn failed: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, stderr = %stderr.trim(), "Render process failed");
            return Err(RenderError::failed(
                &request.tile_id,
                format!("{} exited with {}: {}", self.algorithm, output.status, stderr.trim()),
            ));
        }

        if !request.output_path.exists() {
            return Err(RenderError::failed(
                &request.tile_id,
                format!(
                    "process succeeded but {} was not written",
                    request.output_path.display()
                ),
            ));
        }

        Ok(request.output_path.clone())
    }

    fn shutdown(&self) {
        // Each render is its own process; nothing persists between calls.
        debug!(program = %self.program.display(), "Process renderer released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tile_common::{BoundingBox, Crs, TileSpec};

    #[test]
    fn test_command_args() {
        let tile = TileSpec::new(0, 1, BoundingBox::new(0.0, 1000.0, 1000.0, 2000.0));
        let request =
            RenderRequest::for_tile(&tile, Crs::WEB_MERCATOR, 1000.0, 0.3, "layer", Path::new("/w"));
        let args = ProcessRenderer::default().command_args(&request);

        assert_eq!(args[0], "run");
        assert_eq!(args[1], "native:rasterize");
        assert_eq!(args[2], "--EXTENT=0,1000,1000,2000 [EPSG:3857]");
        assert!(args.contains(&"--OUTPUT=/w/raster_0_1.tif".to_string()));
        assert!(args.contains(&"--MAKE_BACKGROUND_TRANSPARENT=false".to_string()));
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let renderer = ProcessRenderer::new("/nonexistent/qgis_process_binary");
        let err = renderer.initialize().await.unwrap_err();
        assert!(matches!(err, RenderError::Unavailable(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_process_is_render_error() {
        let dir = tempfile::tempdir().unwrap();
        let tile = TileSpec::new(0, 0, BoundingBox::new(0.0, 0.0, 10.0, 10.0));
        let request =
            RenderRequest::for_tile(&tile, Crs::WEB_MERCATOR, 10.0, 1.0, "layer", dir.path());

        // `false` ignores its arguments and exits 1.
        let err = ProcessRenderer::new("false").render(&request).await.unwrap_err();
        assert!(matches!(err, RenderError::Failed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_success_without_output_is_render_error() {
        let dir = tempfile::tempdir().unwrap();
        let tile = TileSpec::new(0, 0, BoundingBox::new(0.0, 0.0, 10.0, 10.0));
        let request =
            RenderRequest::for_tile(&tile, Crs::WEB_MERCATOR, 10.0, 1.0, "layer", dir.path());

        let err = ProcessRenderer::new("true").render(&request).await.unwrap_err();
        assert!(matches!(err, RenderError::Failed { ref message, .. } if message.contains("not written")));
    }
}
