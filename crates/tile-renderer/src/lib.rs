//! Tile Renderer collaborator.
//!
//! The extraction pipeline never draws pixels itself. Each retained tile is
//! handed to a [`TileRenderer`] as a [`RenderRequest`]; the renderer writes a
//! raster file at the requested output path.
//!
//! Implementations:
//! - [`ProcessRenderer`]: runs an external GIS processing binary
//!   (`qgis_process run native:rasterize` by default)
//! - [`SyntheticRenderer`]: writes deterministic solid-colour rasters, used
//!   for dry runs and tests
//!
//! Renderer lifecycle is scoped with [`RendererSession`]: initialized once per
//! run and shut down on every exit path.

pub mod error;
pub mod process;
pub mod renderer;
pub mod request;
pub mod session;
pub mod synthetic;

pub use error::{RenderError, RenderResult};
pub use process::{ProcessRenderer, DEFAULT_PROGRAM};
pub use renderer::TileRenderer;
pub use request::{RenderRequest, DEFAULT_LAYER};
pub use session::RendererSession;
pub use synthetic::{tile_color, SyntheticRenderer, SyntheticStats};
