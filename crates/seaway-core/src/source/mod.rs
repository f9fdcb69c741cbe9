//! Interchangeable backends answering "what is beneath this point".

pub mod raster;
pub mod shapefile;
pub mod vector;

use crate::geo::{BoundingBox, GeoPoint};
use crate::models::WaterClassification;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use raster::{RasterSource, RasterTile, TileId};
pub use shapefile::{IndexEntry, PolygonIndex};
pub use vector::{VectorLayer, VectorSource};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is truncated: {detail}")]
    Truncated { path: PathBuf, detail: String },
    #[error("{path} record {record}: unexpected shape type {shape_type}")]
    UnexpectedShapeType {
        path: PathBuf,
        record: usize,
        shape_type: i32,
    },
    #[error("{path} index is corrupt: {detail}")]
    CorruptIndex { path: PathBuf, detail: String },
    #[error("tile {path} is invalid: {detail}")]
    BadTile { path: PathBuf, detail: String },
    #[error("bounds {0:?} are invalid or cross the antimeridian")]
    InvalidBounds(BoundingBox),
    #[error("bounds need {needed} tiles but only {capacity} may be resident")]
    TooManyTiles { needed: usize, capacity: usize },
}

impl SourceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SourceError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceStats {
    pub kind: String,
    /// Polygons indexed (vector) or tiles resident (raster).
    pub resident_units: usize,
    /// Configured layers (vector) or tile capacity (raster).
    pub capacity: usize,
    pub ready: bool,
}

/// A backend the classifier can query.
///
/// `classify` must not do I/O beyond reading already-indexed data and returns
/// `None` when nothing covering the point is resident. `preload` makes the data
/// for a box resident and reports how many units it newly loaded.
pub trait WaterSource {
    fn classify(&self, point: GeoPoint) -> Option<WaterClassification>;

    fn preload(&mut self, bounds: &BoundingBox) -> Result<usize, SourceError>;

    fn stats(&self) -> SourceStats;
}

pub(crate) fn check_bounds(bounds: &BoundingBox) -> Result<(), SourceError> {
    if !bounds.is_valid() || bounds.crosses_antimeridian() {
        return Err(SourceError::InvalidBounds(*bounds));
    }
    Ok(())
}
