//! Raster extraction pipeline.
//!
//! Turns an area of interest into a published mosaic:
//!
//! ```text
//! AreaOfInterest ─► resolve ─► TileGrid ─► filter_tiles
//!                                              │
//!                        RendererSession ◄─────┤ (bounded pool)
//!                              │               │
//!                        restamp GeoTIFF ─► MosaicAssembler
//!                                              │
//!                                   clip (boundary input only)
//!                                              │
//!                                manifest.json + Publisher
//! ```
//!
//! # Architecture
//!
//! The crate is used by the `extractor` service and by integration tests
//! driving the pipeline with the synthetic renderer. It handles:
//!
//! - Normalizing bbox or boundary input into one extent and CRS
//! - Rendering tiles concurrently with per-call timeout and retry
//! - Merging each tile as soon as it is rendered
//! - Writing a run manifest and uploading the working directory

pub mod config;
pub mod manifest;
pub mod orchestrator;
pub mod pipeline;
pub mod publisher;
pub mod resolver;

// Re-exports
pub use config::{FailurePolicy, RunConfig};
pub use manifest::{RunManifest, MANIFEST_FILE};
pub use orchestrator::{RenderContext, RenderOrchestrator, RenderOutcome, SkippedTile};
pub use pipeline::{ExtractionPipeline, RunReport};
pub use publisher::Publisher;
pub use resolver::{resolve, AreaOfInterest, ResolvedExtent};
pub use tile_common::{ExtractError, ExtractResult};
