pub mod cache;
pub mod classifier;
pub mod geo;
pub mod models;
pub mod planner;
pub mod source;

pub use cache::{CacheKey, ClassificationCache};
pub use classifier::{ClassifierStats, WaterClassifier, DEFAULT_CACHE_CAPACITY};
pub use geo::{haversine_distance, haversine_nm, path_length_nm, BoundingBox, GeoPoint};
pub use models::{FailureReason, RouteRequest, RouteResult, WaterClassification};
pub use planner::{base_grid_deg, PlannerConfig, RoutePlanner};
pub use source::{
    RasterSource, RasterTile, SourceError, SourceStats, TileId, VectorLayer, VectorSource,
    WaterSource,
};
