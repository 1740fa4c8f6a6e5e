//! Scratch directory helpers.
//!
//! Extraction runs need a work directory for per-tile rasters and an output
//! directory for the mosaic; both live under one temporary root that is
//! cleaned up on drop.

use std::path::{Path, PathBuf};

/// A temporary root holding `work/` and `out/` subdirectories.
pub struct ScratchDir {
    root: tempfile::TempDir,
}

impl ScratchDir {
    /// Creates the root and both subdirectories.
    pub fn new() -> Self {
        let root = temp_test_dir_with_prefix("tile_extract_");
        std::fs::create_dir_all(root.path().join("work")).expect("Failed to create work dir");
        std::fs::create_dir_all(root.path().join("out")).expect("Failed to create out dir");
        Self { root }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Directory for per-tile rasters.
    pub fn work_dir(&self) -> PathBuf {
        self.root.path().join("work")
    }

    /// Directory for the assembled output.
    pub fn out_dir(&self) -> PathBuf {
        self.root.path().join("out")
    }

    /// A `file://` URI pointing at `remote/` inside the root, for publish tests.
    pub fn remote_uri(&self) -> String {
        format!("file://{}", self.root.path().join("remote").display())
    }
}

impl Default for ScratchDir {
    fn default() -> Self {
        Self::new()
    }
}

/// Creates a temporary directory for test output.
///
/// The directory is automatically cleaned up when the returned `TempDir` is dropped.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temporary test directory")
}

/// Creates a temporary directory with a specific prefix.
pub fn temp_test_dir_with_prefix(prefix: &str) -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .expect("Failed to create temporary test directory")
}

/// Lists the file names directly inside `dir`, sorted.
pub fn list_file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_file())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
