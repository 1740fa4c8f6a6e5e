//! Zarr V3 store backing the chunked mosaic.
//!
//! Layout on disk:
//!
//! ```text
//! mosaic.zarr/
//!   zarr.json      group metadata, attributes = MosaicAttributes
//!   0/             level 0, native resolution, shape [height, width, bands]
//!   1/             level 1, 2x downsampled
//!   ...
//! ```
//!
//! Every level is chunked `[chunk, chunk, bands]` with fill value
//! [`NODATA`], so chunks that no tile touched read back as no-data.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::{Group, GroupBuilder};
use zarrs_filesystem::FilesystemStore;

use tile_common::{AffineTransform, BoundingBox, Crs};
use tracing::debug;

use crate::config::{MosaicConfig, ZarrCompression};
use crate::error::{MosaicError, MosaicResult};
use crate::raster::NODATA;

/// Array handle for one pyramid level.
pub type LevelArray = Array<FilesystemStore>;

/// Group-level description of a chunked mosaic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MosaicAttributes {
    /// EPSG code of the mosaic CRS.
    pub crs: u32,
    /// Level 0 transform.
    pub transform: AffineTransform,
    pub bbox: BoundingBox,
    pub width: usize,
    pub height: usize,
    pub bands: usize,
    pub levels: usize,
    /// Value of pixels no tile or boundary covers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodata: Option<u8>,
}

impl MosaicAttributes {
    pub fn crs(&self) -> Crs {
        Crs::from_epsg(self.crs)
    }

    /// Transform of pyramid level `level`.
    pub fn level_transform(&self, level: usize) -> AffineTransform {
        self.transform.scaled(1 << level)
    }

    /// Pixel dimensions of pyramid level `level`.
    pub fn level_shape(&self, level: usize) -> (usize, usize) {
        (self.width >> level, self.height >> level)
    }
}

/// Path of a level array inside the store.
pub fn level_path(level: usize) -> String {
    format!("/{}", level)
}

/// A chunked mosaic store on the local filesystem.
pub struct ZarrMosaicStore {
    root: PathBuf,
    store: Arc<FilesystemStore>,
    config: MosaicConfig,
}

impl ZarrMosaicStore {
    /// Create an empty store at `root`, replacing anything already there.
    pub fn create(root: &Path, config: MosaicConfig) -> MosaicResult<Self> {
        if root.exists() {
            debug!(path = %root.display(), "Removing previous Zarr store");
            std::fs::remove_dir_all(root)?;
        }
        std::fs::create_dir_all(root)?;
        Self::at(root, config)
    }

    fn at(root: &Path, config: MosaicConfig) -> MosaicResult<Self> {
        let store = FilesystemStore::new(root).map_err(MosaicError::zarr)?;
        Ok(Self {
            root: root.to_path_buf(),
            store: Arc::new(store),
            config,
        })
    }

    /// Open an existing store.
    pub fn open(root: &Path) -> MosaicResult<Self> {
        if !root.is_dir() {
            return Err(MosaicError::zarr(format!(
                "no Zarr store at {}",
                root.display()
            )));
        }
        Self::at(root, MosaicConfig::default())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &MosaicConfig {
        &self.config
    }

    /// Create the array for a level and write its metadata.
    pub fn create_level(
        &self,
        level: usize,
        width: usize,
        height: usize,
        bands: usize,
    ) -> MosaicResult<LevelArray> {
        let chunk_size = self.config.zarr_chunk_size as u64;

        let chunk_grid: zarrs::array::ChunkGrid = vec![chunk_size, chunk_size, bands as u64]
            .try_into()
            .map_err(|e| MosaicError::Config(format!("{:?}", e)))?;

        let mut attrs = serde_json::Map::new();
        attrs.insert("level".to_string(), serde_json::json!(level));

        let mut binding = ArrayBuilder::new(
            vec![height as u64, width as u64, bands as u64], // [rows, cols, bands]
            DataType::UInt8,
            chunk_grid,
            FillValue::from(NODATA),
        );
        let mut builder = binding.attributes(attrs);

        if self.config.zarr_compression != ZarrCompression::None {
            let codec = self.create_compression_codec()?;
            builder = builder.bytes_to_bytes_codecs(vec![codec]);
        }

        let array = builder
            .build(self.store.clone(), &level_path(level))
            .map_err(MosaicError::zarr)?;
        array.store_metadata().map_err(MosaicError::zarr)?;

        Ok(array)
    }

    /// Open the array of an existing level.
    pub fn open_level(&self, level: usize) -> MosaicResult<LevelArray> {
        Array::open(self.store.clone(), &level_path(level)).map_err(MosaicError::zarr)
    }

    /// Write the root group with the mosaic description.
    pub fn write_attributes(&self, attributes: &MosaicAttributes) -> MosaicResult<()> {
        let attrs = match serde_json::to_value(attributes)? {
            serde_json::Value::Object(map) => map,
            _ => return Err(MosaicError::zarr("mosaic attributes must be an object")),
        };

        let mut binding = GroupBuilder::new();
        let group = binding
            .attributes(attrs)
            .build(self.store.clone(), "/")
            .map_err(MosaicError::zarr)?;
        group.store_metadata().map_err(MosaicError::zarr)?;
        Ok(())
    }

    /// Read the root group description.
    pub fn read_attributes(&self) -> MosaicResult<MosaicAttributes> {
        let group = Group::open(self.store.clone(), "/").map_err(MosaicError::zarr)?;
        let value = serde_json::Value::Object(group.attributes().clone());
        Ok(serde_json::from_value(value)?)
    }

    /// Create the compression codec based on configuration.
    fn create_compression_codec(
        &self,
    ) -> MosaicResult<Arc<dyn zarrs::array::codec::BytesToBytesCodecTraits>> {
        let level = BloscCompressionLevel::try_from(self.config.zarr_compression_level)
            .map_err(|_| MosaicError::Config("Invalid compression level".to_string()))?;

        let shuffle = if self.config.zarr_shuffle {
            BloscShuffleMode::Shuffle
        } else {
            BloscShuffleMode::NoShuffle
        };

        // typesize is required when shuffle is enabled
        let typesize = if self.config.zarr_shuffle {
            Some(1) // u8
        } else {
            None
        };

        let compressor = match self.config.zarr_compression {
            ZarrCompression::None => {
                return Err(MosaicError::Config("No compression configured".to_string()))
            }
            ZarrCompression::Lz4 | ZarrCompression::BloscLz4 => BloscCompressor::LZ4,
            ZarrCompression::Zstd | ZarrCompression::BloscZstd => BloscCompressor::Zstd,
        };

        let codec = BloscCodec::new(compressor, level, None, shuffle, typesize)
            .map_err(|e| MosaicError::Config(e.to_string()))?;

        Ok(Arc::new(codec))
    }
}

fn window_subset(
    col: usize,
    row: usize,
    width: usize,
    height: usize,
    bands: usize,
) -> MosaicResult<ArraySubset> {
    // Zarr uses [row, col, band] indexing
    ArraySubset::new_with_start_shape(
        vec![row as u64, col as u64, 0],
        vec![height as u64, width as u64, bands as u64],
    )
    .map_err(MosaicError::zarr)
}

/// Number of bands of a level array.
pub fn array_bands(array: &LevelArray) -> MosaicResult<usize> {
    array
        .shape()
        .get(2)
        .map(|&b| b as usize)
        .ok_or_else(|| MosaicError::zarr("level array must have 3 dimensions"))
}

/// Read a pixel window (band-interleaved, row-major).
pub fn read_window(
    array: &LevelArray,
    col: usize,
    row: usize,
    width: usize,
    height: usize,
) -> MosaicResult<Vec<u8>> {
    let subset = window_subset(col, row, width, height, array_bands(array)?)?;
    array
        .retrieve_array_subset_elements::<u8>(&subset)
        .map_err(MosaicError::zarr)
}

/// Write a pixel window (band-interleaved, row-major).
pub fn write_window(
    array: &LevelArray,
    col: usize,
    row: usize,
    width: usize,
    height: usize,
    data: &[u8],
) -> MosaicResult<()> {
    let subset = window_subset(col, row, width, height, array_bands(array)?)?;
    array
        .store_array_subset_elements::<u8>(&subset, data)
        .map_err(MosaicError::zarr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attributes() -> MosaicAttributes {
        MosaicAttributes {
            crs: 3857,
            transform: AffineTransform::new(0.0, 1500.0, 1.0),
            bbox: BoundingBox::new(0.0, 0.0, 2000.0, 1500.0),
            width: 2000,
            height: 1500,
            bands: 3,
            levels: 3,
            nodata: Some(NODATA),
        }
    }

    #[test]
    fn test_level_geometry() {
        let attrs = attributes();
        assert_eq!(attrs.level_shape(1), (1000, 750));
        assert_eq!(attrs.level_transform(2).pixel_size, 4.0);
        assert_eq!(attrs.crs(), Crs::WEB_MERCATOR);
        assert_eq!(level_path(1), "/1");
    }

    #[test]
    fn test_window_write_read() {
        let dir = tempfile::tempdir().unwrap();
        let config = MosaicConfig {
            zarr_chunk_size: 4,
            ..Default::default()
        };
        let store = ZarrMosaicStore::create(&dir.path().join("m.zarr"), config).unwrap();
        let array = store.create_level(0, 10, 6, 3).unwrap();

        let data: Vec<u8> = (1..=2 * 3 * 3).map(|v| v as u8).collect();
        write_window(&array, 3, 2, 3, 2, &data).unwrap();

        let reopened = store.open_level(0).unwrap();
        assert_eq!(read_window(&reopened, 3, 2, 3, 2).unwrap(), data);
        // Untouched pixels read back as the fill value.
        assert_eq!(read_window(&reopened, 0, 0, 2, 2).unwrap(), vec![0; 12]);
    }

    #[test]
    fn test_create_replaces_previous_store() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("m.zarr");
        let config = MosaicConfig {
            zarr_chunk_size: 4,
            ..Default::default()
        };

        let first = ZarrMosaicStore::create(&root, config.clone()).unwrap();
        let array = first.create_level(0, 8, 8, 1).unwrap();
        write_window(&array, 0, 0, 8, 8, &[9u8; 64]).unwrap();
        first.create_level(1, 4, 4, 1).unwrap();
        first.write_attributes(&attributes()).unwrap();

        let second = ZarrMosaicStore::create(&root, config).unwrap();
        let array = second.create_level(0, 8, 8, 1).unwrap();
        assert_eq!(read_window(&array, 0, 0, 8, 8).unwrap(), vec![NODATA; 64]);
        assert!(second.open_level(1).is_err());
        assert!(second.read_attributes().is_err());
    }

    #[test]
    fn test_open_keeps_existing_store() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("m.zarr");
        let store = ZarrMosaicStore::create(&root, MosaicConfig::default()).unwrap();
        let array = store.create_level(0, 4, 4, 1).unwrap();
        write_window(&array, 0, 0, 4, 4, &[5u8; 16]).unwrap();

        let reopened = ZarrMosaicStore::open(&root).unwrap();
        let level0 = reopened.open_level(0).unwrap();
        assert_eq!(read_window(&level0, 0, 0, 4, 4).unwrap(), vec![5u8; 16]);
        assert!(ZarrMosaicStore::open(&dir.path().join("missing.zarr")).is_err());
    }

    #[test]
    fn test_group_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            ZarrMosaicStore::create(&dir.path().join("m.zarr"), MosaicConfig::default()).unwrap();
        store.write_attributes(&attributes()).unwrap();

        let reopened = ZarrMosaicStore::open(store.root()).unwrap();
        assert_eq!(reopened.read_attributes().unwrap(), attributes());
    }
}
