//! End-to-end runs of the extraction pipeline with the synthetic renderer.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use geo::polygon;
use extraction::{
    AreaOfInterest, ExtractError, ExtractionPipeline, FailurePolicy, RunConfig, RunManifest,
    MANIFEST_FILE,
};
use mosaic::zarr_store::{read_window, ZarrMosaicStore};
use mosaic::{read_geotiff, MosaicFormat};
use storage::{BlobStore, StorageError, StorageResult, UploadSummary};
use test_utils::{
    bbox_of, extent, list_file_names, rectangle_polygon, scenario_circle, write_boundary_file,
    write_boundary_shapefile, ScratchDir,
};
use tile_common::{BoundingBox, Crs, EdgePolicy};
use tile_renderer::{tile_color, SyntheticRenderer};

// ============================================================================
// Helpers
// ============================================================================

fn config(scratch: &ScratchDir, pixel_size: f64) -> RunConfig {
    RunConfig {
        tile_size: 1000.0,
        pixel_size,
        work_dir: scratch.work_dir(),
        ..Default::default()
    }
}

fn scenario_bbox() -> AreaOfInterest {
    AreaOfInterest::BoundingBox(bbox_of(extent::SCENARIO))
}

fn boundary_input(scratch: &ScratchDir, polygon: &geo::Polygon<f64>) -> AreaOfInterest {
    let path = write_boundary_file(scratch.root(), "aoi.geojson", polygon, Some(3857));
    AreaOfInterest::from_inputs(None, Some(path), None).unwrap()
}

struct FailingStore;

#[async_trait]
impl BlobStore for FailingStore {
    async fn put(
        &self,
        _local_path: &Path,
        _remote_uri: &str,
        _recursive: bool,
    ) -> StorageResult<UploadSummary> {
        Err(StorageError::Client("connection refused".to_string()))
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_bbox_scenario_builds_flat_mosaic() {
    let scratch = ScratchDir::new();
    let renderer = Arc::new(SyntheticRenderer::new());
    let pipeline = ExtractionPipeline::new(config(&scratch, 10.0), renderer.clone());

    let report = pipeline.run(scenario_bbox()).await.unwrap();
    let manifest = &report.manifest;

    assert_eq!(manifest.grid_shape, (2, 2));
    assert_eq!(
        manifest.tiles,
        ["raster_0_0", "raster_0_1", "raster_1_0", "raster_1_1"]
    );
    assert!(manifest.discarded.is_empty());
    assert!(manifest.clipped.is_none());
    assert_eq!(manifest.crs, Crs::WEB_MERCATOR);

    let mosaic = &manifest.mosaic;
    assert_eq!(mosaic.format, MosaicFormat::Flat);
    assert_eq!(mosaic.crs, Crs::WEB_MERCATOR);
    assert!(mosaic.bbox().contains(&bbox_of(extent::SCENARIO)));
    assert_eq!((mosaic.width, mosaic.height), (200, 200));

    let raster = read_geotiff(&mosaic.path).unwrap();
    assert_eq!(raster.crs, Some(Crs::WEB_MERCATOR));
    assert_eq!(raster.pixel(150, 150), tile_color(1, 0));

    assert_eq!(renderer.stats().renders(), 4);
    assert_eq!(renderer.stats().shutdowns(), 1);
    assert!(report.upload.is_none());
}

#[tokio::test]
async fn test_lower_left_boundary_renders_one_tile() {
    let scratch = ScratchDir::new();
    let renderer = Arc::new(SyntheticRenderer::new());
    let pipeline = ExtractionPipeline::new(config(&scratch, 10.0), renderer.clone());

    let aoi = boundary_input(&scratch, &rectangle_polygon(100.0, 100.0, 900.0, 700.0));
    let report = pipeline.run(aoi).await.unwrap();
    let manifest = &report.manifest;

    assert_eq!(manifest.tiles, ["raster_0_0"]);
    assert!(manifest.discarded.is_empty());
    assert_eq!(renderer.stats().renders(), 1);
    assert_eq!(manifest.mosaic.format, MosaicFormat::Chunked);

    let clipped = manifest.clipped.as_ref().unwrap();
    assert_eq!((clipped.width, clipped.height), (80, 60));
    assert_eq!(clipped.nodata, Some(0));
    assert_eq!(clipped.bbox(), BoundingBox::new(100.0, 100.0, 900.0, 700.0));

    let attrs = ZarrMosaicStore::open(&clipped.path)
        .unwrap()
        .read_attributes()
        .unwrap();
    assert_eq!(attrs.crs(), Crs::WEB_MERCATOR);
    assert_eq!((attrs.width, attrs.height), (80, 60));
}

#[tokio::test]
async fn test_boundary_skips_untouched_tiles() {
    // Triangle under y = 0.75x: its bounds are the scenario box, but it
    // never reaches the upper-left cell of the 2x2 grid.
    let scratch = ScratchDir::new();
    let renderer = Arc::new(SyntheticRenderer::new());
    let pipeline = ExtractionPipeline::new(config(&scratch, 10.0), renderer.clone());

    let triangle = geo::polygon![
        (x: 0.0, y: 0.0),
        (x: 2000.0, y: 0.0),
        (x: 2000.0, y: 1500.0),
    ];
    let report = pipeline.run(boundary_input(&scratch, &triangle)).await.unwrap();
    let manifest = &report.manifest;

    assert_eq!(manifest.bbox, bbox_of(extent::SCENARIO));
    assert_eq!(manifest.grid_shape, (2, 2));
    assert_eq!(manifest.tiles, ["raster_0_0", "raster_1_0", "raster_1_1"]);
    assert_eq!(manifest.discarded, ["raster_0_1"]);
    assert_eq!(renderer.stats().renders(), 3);
    assert!(!scratch.work_dir().join("raster_0_1.tif").exists());
}

#[tokio::test]
async fn test_circle_clip_footprint_matches_circle_bounds() {
    let scratch = ScratchDir::new();
    let mut config = config(&scratch, 1.0);
    config.format = Some(MosaicFormat::Flat);
    config.edge_policy = EdgePolicy::ClipToExact;
    let pipeline = ExtractionPipeline::new(config, Arc::new(SyntheticRenderer::new()));

    let report = pipeline.run(boundary_input(&scratch, &scenario_circle())).await.unwrap();
    let manifest = &report.manifest;

    assert_eq!(manifest.bbox, BoundingBox::new(250.0, 0.0, 1750.0, 1500.0));

    let clipped = manifest.clipped.as_ref().unwrap();
    assert_eq!((clipped.width, clipped.height), (1500, 1500));
    assert_eq!(clipped.bbox(), BoundingBox::new(250.0, 0.0, 1750.0, 1500.0));

    let raster = read_geotiff(&clipped.path).unwrap();
    assert_eq!(raster.nodata, Some(0));
    assert_eq!(raster.pixel(0, 0), [0, 0, 0]);
    assert_eq!(raster.pixel(1499, 1499), [0, 0, 0]);
    assert!(raster.pixel(750, 750).iter().all(|&v| v != 0));
    assert!(raster.pixel(0, 750).iter().all(|&v| v != 0));
}

// ============================================================================
// Determinism and memory
// ============================================================================

#[tokio::test]
async fn test_reruns_are_identical() {
    let first = ScratchDir::new();
    let second = ScratchDir::new();

    let mut reports = Vec::new();
    for scratch in [&first, &second] {
        let mut config = config(scratch, 10.0);
        config.concurrency = 4;
        let pipeline = ExtractionPipeline::new(config, Arc::new(SyntheticRenderer::new()));
        reports.push(pipeline.run(scenario_bbox()).await.unwrap());
    }

    assert_eq!(reports[0].manifest.tiles, reports[1].manifest.tiles);
    assert_eq!(
        reports[0].manifest.mosaic.transform,
        reports[1].manifest.mosaic.transform
    );
    assert_eq!(
        std::fs::read(&reports[0].manifest.mosaic.path).unwrap(),
        std::fs::read(&reports[1].manifest.mosaic.path).unwrap()
    );
}

#[tokio::test]
async fn test_live_tiles_stay_bounded() {
    for format in [MosaicFormat::Flat, MosaicFormat::Chunked] {
        for concurrency in [1, 4] {
            let scratch = ScratchDir::new();
            let config = RunConfig {
                tile_size: 100.0,
                pixel_size: 10.0,
                work_dir: scratch.work_dir(),
                format: Some(format),
                concurrency,
                keep_tiles: false,
                ..Default::default()
            };
            let pipeline = ExtractionPipeline::new(config, Arc::new(SyntheticRenderer::new()));

            let aoi = AreaOfInterest::BoundingBox(BoundingBox::new(0.0, 0.0, 1200.0, 1000.0));
            let report = pipeline.run(aoi).await.unwrap();

            assert_eq!(report.manifest.tiles.len(), 120);
            // Every in-flight restamp plus the tile being merged.
            assert!(
                report.peak_live_tiles >= 1 && report.peak_live_tiles <= concurrency + 1,
                "{} mosaic at concurrency {}: peak {}",
                format,
                concurrency,
                report.peak_live_tiles
            );
            if concurrency == 1 {
                assert_eq!(report.peak_live_tiles, 1, "{} mosaic", format);
            }
        }
    }
}

#[tokio::test]
async fn test_rerun_in_same_work_dir_starts_clean() {
    let scratch = ScratchDir::new();
    let mut first = config(&scratch, 10.0);
    first.format = Some(MosaicFormat::Chunked);
    ExtractionPipeline::new(first, Arc::new(SyntheticRenderer::new()))
        .run(scenario_bbox())
        .await
        .unwrap();
    assert!(scratch.work_dir().join("raster_1_0.tif").exists());

    let mut second = config(&scratch, 10.0);
    second.format = Some(MosaicFormat::Chunked);
    second.failure_policy = FailurePolicy::SkipFailed;
    let renderer = Arc::new(SyntheticRenderer::new().failing_on(["raster_1_0"]));
    let report = ExtractionPipeline::new(second, renderer)
        .run(scenario_bbox())
        .await
        .unwrap();

    assert_eq!(report.manifest.tiles, ["raster_0_0", "raster_0_1", "raster_1_1"]);
    assert_eq!(report.manifest.mosaic.tiles_merged, 3);
    assert_eq!(
        list_file_names(&scratch.work_dir()),
        ["manifest.json", "raster_0_0.tif", "raster_0_1.tif", "raster_1_1.tif"]
    );

    // The failed tile's cells hold no data from the first run.
    let store = ZarrMosaicStore::open(&report.manifest.mosaic.path).unwrap();
    let level0 = store.open_level(0).unwrap();
    assert_eq!(read_window(&level0, 150, 150, 1, 1).unwrap(), [0, 0, 0]);
    assert_eq!(read_window(&level0, 50, 150, 1, 1).unwrap(), tile_color(0, 0));
}

// ============================================================================
// Failure handling
// ============================================================================

#[tokio::test]
async fn test_render_failure_aborts_by_default() {
    let scratch = ScratchDir::new();
    let renderer = Arc::new(SyntheticRenderer::new().failing_on(["raster_1_0"]));
    let pipeline = ExtractionPipeline::new(config(&scratch, 10.0), renderer.clone());

    let err = pipeline.run(scenario_bbox()).await.unwrap_err();
    match err {
        ExtractError::Render { tile, .. } => assert_eq!(tile, "raster_1_0"),
        other => panic!("unexpected {:?}", other),
    }

    assert_eq!(renderer.stats().initialized(), 1);
    assert_eq!(renderer.stats().shutdowns(), 1);
    assert!(!scratch.work_dir().join(MANIFEST_FILE).exists());
}

#[tokio::test]
async fn test_skip_failed_produces_partial_mosaic() {
    let scratch = ScratchDir::new();
    let mut config = config(&scratch, 10.0);
    config.failure_policy = FailurePolicy::SkipFailed;
    let renderer = Arc::new(SyntheticRenderer::new().failing_on(["raster_1_0"]));
    let pipeline = ExtractionPipeline::new(config, renderer);

    let report = pipeline.run(scenario_bbox()).await.unwrap();
    let manifest = RunManifest::read(&report.manifest_path).unwrap();

    assert_eq!(manifest.tiles, ["raster_0_0", "raster_0_1", "raster_1_1"]);
    assert_eq!(manifest.skipped.len(), 1);
    assert_eq!(manifest.skipped[0].id, "raster_1_0");

    assert_eq!(manifest.mosaic.format, MosaicFormat::Flat);
    assert_eq!(manifest.mosaic.nodata, Some(0));

    // The gap is declared as nodata through the GDAL_NODATA tag.
    let raster = read_geotiff(&manifest.mosaic.path).unwrap();
    assert_eq!(raster.nodata, Some(0));
    assert_eq!(raster.pixel(150, 150), [0, 0, 0]);
    assert_ne!(raster.pixel(50, 150), [0, 0, 0]);
    assert!(!scratch.work_dir().join("raster_1_0.tif").exists());
}

#[tokio::test]
async fn test_flaky_render_recovers_with_retries() {
    let scratch = ScratchDir::new();
    let mut config = config(&scratch, 10.0);
    config.render_retries = 2;
    let renderer = Arc::new(SyntheticRenderer::new().flaky_on(["raster_0_1"], 2));
    let pipeline = ExtractionPipeline::new(config, renderer.clone());

    let report = pipeline.run(scenario_bbox()).await.unwrap();
    assert_eq!(report.manifest.tiles.len(), 4);
    assert_eq!(renderer.stats().failures(), 2);

    let scratch = ScratchDir::new();
    let mut config = self::config(&scratch, 10.0);
    config.render_retries = 1;
    let renderer = Arc::new(SyntheticRenderer::new().flaky_on(["raster_0_1"], 2));
    let err = ExtractionPipeline::new(config, renderer)
        .run(scenario_bbox())
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::Render { .. }));
}

#[tokio::test]
async fn test_hung_render_times_out() {
    let scratch = ScratchDir::new();
    let mut config = config(&scratch, 10.0);
    config.render_timeout = Some(Duration::from_millis(20));
    let renderer = Arc::new(SyntheticRenderer::new().with_delay(Duration::from_secs(5)));
    let pipeline = ExtractionPipeline::new(config, renderer.clone());

    let err = pipeline.run(scenario_bbox()).await.unwrap_err();
    match err {
        ExtractError::Render { message, .. } => assert!(message.contains("timed out")),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(renderer.stats().shutdowns(), 1);
}

#[tokio::test]
async fn test_invalid_config_fails_before_rendering() {
    let scratch = ScratchDir::new();
    let mut config = config(&scratch, 10.0);
    config.tile_size = 0.0;
    let renderer = Arc::new(SyntheticRenderer::new());
    let pipeline = ExtractionPipeline::new(config, renderer.clone());

    let err = pipeline.run(scenario_bbox()).await.unwrap_err();
    assert!(matches!(err, ExtractError::Configuration(_)));
    assert_eq!(renderer.stats().initialized(), 0);
}

#[tokio::test]
async fn test_oversized_grid_fails_before_rendering() {
    let scratch = ScratchDir::new();
    let renderer = Arc::new(SyntheticRenderer::new());
    let pipeline = ExtractionPipeline::new(config(&scratch, 10.0), renderer.clone());

    // 2000 x 2000 cells of 1000 units.
    let aoi = AreaOfInterest::BoundingBox(BoundingBox::new(0.0, 0.0, 2_000_000.0, 2_000_000.0));
    let err = pipeline.run(aoi).await.unwrap_err();

    assert!(matches!(err, ExtractError::Configuration(_)));
    assert_eq!(renderer.stats().initialized(), 0);
    assert!(!scratch.work_dir().join(MANIFEST_FILE).exists());
}

#[tokio::test]
async fn test_shapefile_boundary_with_caller_crs() {
    let scratch = ScratchDir::new();
    let renderer = Arc::new(SyntheticRenderer::new());
    let pipeline = ExtractionPipeline::new(config(&scratch, 10.0), renderer.clone());

    let path = write_boundary_shapefile(
        scratch.root(),
        "aoi.shp",
        &[rectangle_polygon(100.0, 100.0, 900.0, 700.0)],
        None,
    );
    let aoi = AreaOfInterest::from_inputs(None, Some(path), Some(Crs::WEB_MERCATOR)).unwrap();
    let report = pipeline.run(aoi).await.unwrap();

    assert_eq!(report.manifest.tiles, ["raster_0_0"]);
    assert_eq!(renderer.stats().renders(), 1);
    let clipped = report.manifest.clipped.as_ref().unwrap();
    assert_eq!(clipped.bbox(), BoundingBox::new(100.0, 100.0, 900.0, 700.0));
}

#[tokio::test]
async fn test_boundary_with_unsupported_crs_is_configuration_error() {
    let scratch = ScratchDir::new();
    let mut config = config(&scratch, 10.0);
    config.crs = Some(Crs::from_epsg(32633));
    let pipeline = ExtractionPipeline::new(config, Arc::new(SyntheticRenderer::new()));

    let aoi = boundary_input(&scratch, &rectangle_polygon(0.0, 0.0, 500.0, 500.0));
    let err = pipeline.run(aoi).await.unwrap_err();
    assert!(matches!(err, ExtractError::Configuration(_)));
}

// ============================================================================
// Publishing
// ============================================================================

#[tokio::test]
async fn test_publishes_work_dir_to_destination() {
    let scratch = ScratchDir::new();
    let mut config = config(&scratch, 10.0);
    config.destination = Some(scratch.remote_uri());
    let pipeline = ExtractionPipeline::new(config, Arc::new(SyntheticRenderer::new()));

    let report = pipeline.run(scenario_bbox()).await.unwrap();
    let upload = report.upload.unwrap();

    let expected = [
        "manifest.json",
        "mosaic.tif",
        "raster_0_0.tif",
        "raster_0_1.tif",
        "raster_1_0.tif",
        "raster_1_1.tif",
    ];
    assert_eq!(upload.objects, expected.len() as u64);
    assert_eq!(list_file_names(&scratch.root().join("remote")), expected);
    assert_eq!(list_file_names(&scratch.work_dir()), expected);
}

#[tokio::test]
async fn test_dropped_tiles_are_not_published() {
    let scratch = ScratchDir::new();
    let mut config = config(&scratch, 10.0);
    config.keep_tiles = false;
    config.destination = Some(scratch.remote_uri());
    let pipeline = ExtractionPipeline::new(config, Arc::new(SyntheticRenderer::new()));

    pipeline.run(scenario_bbox()).await.unwrap();
    assert_eq!(
        list_file_names(&scratch.root().join("remote")),
        ["manifest.json", "mosaic.tif"]
    );
}

#[tokio::test]
async fn test_publish_failure_keeps_local_artifacts() {
    let scratch = ScratchDir::new();
    let mut config = config(&scratch, 10.0);
    config.destination = Some("s3://bucket/run-1".to_string());
    let pipeline = ExtractionPipeline::new(config, Arc::new(SyntheticRenderer::new()))
        .with_blob_store(Arc::new(FailingStore));

    let err = pipeline.run(scenario_bbox()).await.unwrap_err();
    assert!(matches!(err, ExtractError::Storage(_)));
    assert!(scratch.work_dir().join(MANIFEST_FILE).exists());
    assert!(scratch.work_dir().join("mosaic.tif").exists());
}
