//! Area-of-interest normalization.

use std::path::PathBuf;

use boundary::BoundaryGeometry;
use tracing::{debug, info};

use tile_common::{BoundingBox, Crs, ExtractError, ExtractResult};

/// Default working CRS when nothing else decides it.
pub const DEFAULT_CRS: Crs = Crs::WEB_MERCATOR;

/// What the run should cover.
#[derive(Debug, Clone, PartialEq)]
pub enum AreaOfInterest {
    /// Corners in the output CRS.
    BoundingBox(BoundingBox),
    /// Exact boundary, used for tile filtering and final clipping.
    Boundary(BoundaryGeometry),
}

impl AreaOfInterest {
    /// Build from the two mutually exclusive optional inputs.
    ///
    /// Exactly one of `bbox` and `boundary_path` must be given. The boundary
    /// file is GeoJSON or an ESRI shapefile; `boundary_crs` overrides the CRS
    /// it declares.
    pub fn from_inputs(
        bbox: Option<BoundingBox>,
        boundary_path: Option<PathBuf>,
        boundary_crs: Option<Crs>,
    ) -> ExtractResult<Self> {
        match (bbox, boundary_path) {
            (Some(bbox), None) => {
                if boundary_crs.is_some() {
                    return Err(ExtractError::configuration(
                        "a boundary CRS needs a boundary file",
                    ));
                }
                bbox.validate()?;
                Ok(Self::BoundingBox(bbox))
            }
            (None, Some(path)) => Ok(Self::Boundary(BoundaryGeometry::load_with_crs(
                &path,
                boundary_crs,
            )?)),
            (Some(_), Some(_)) => Err(ExtractError::configuration(
                "a bounding box and a boundary file are mutually exclusive",
            )),
            (None, None) => Err(ExtractError::configuration(
                "either a bounding box or a boundary file is required",
            )),
        }
    }

    pub fn is_boundary(&self) -> bool {
        matches!(self, Self::Boundary(_))
    }
}

/// Canonical extent of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedExtent {
    pub bbox: BoundingBox,
    pub crs: Crs,
    /// Boundary reprojected into `crs`.
    pub boundary: Option<BoundaryGeometry>,
}

/// Resolve `aoi` into a bounding box and CRS.
///
/// The CRS is `explicit_crs` when given. Otherwise a boundary keeps its own
/// CRS when that is projected, and everything else uses [`DEFAULT_CRS`].
/// A boundary is reprojected before its bounds are taken.
pub fn resolve(aoi: AreaOfInterest, explicit_crs: Option<Crs>) -> ExtractResult<ResolvedExtent> {
    let resolved = match aoi {
        AreaOfInterest::BoundingBox(bbox) => {
            bbox.validate()?;
            ResolvedExtent {
                bbox,
                crs: explicit_crs.unwrap_or(DEFAULT_CRS),
                boundary: None,
            }
        }
        AreaOfInterest::Boundary(geometry) => {
            let native = geometry.crs();
            let crs = explicit_crs.unwrap_or(if native.is_geographic() {
                DEFAULT_CRS
            } else {
                native
            });

            let geometry = geometry.reproject(crs)?;
            let bbox = geometry.bounds()?;
            debug!(native = %native, target = %crs, "Boundary resolved");

            ResolvedExtent {
                bbox,
                crs,
                boundary: Some(geometry),
            }
        }
    };

    info!(
        crs = %resolved.crs,
        bbox = ?resolved.bbox,
        boundary = resolved.boundary.is_some(),
        "Area of interest resolved"
    );
    Ok(resolved)
}
