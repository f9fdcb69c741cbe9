//! Server configuration from environment.

use seaway_core::{
    PlannerConfig, RasterSource, SourceError, VectorLayer, VectorSource, WaterClassification,
    WaterClassifier, DEFAULT_CACHE_CAPACITY,
};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::worker::WorkerConfig;

/// Which water dataset backs the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaterSourceKind {
    Vector,
    Raster,
    None,
}

impl WaterSourceKind {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "vector" | "shapefile" => Some(Self::Vector),
            "raster" | "tiles" => Some(Self::Raster),
            "none" | "off" => Some(Self::None),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub water_source: WaterSourceKind,
    pub ocean_shp: Option<PathBuf>,
    pub lake_shp: Option<PathBuf>,
    pub tile_dir: Option<PathBuf>,
    pub max_tiles: usize,
    pub cache_capacity: usize,
    pub lazy_index: bool,
    pub route_timeout_s: u64,
    pub worker_max_restarts: u32,
    pub worker_backoff_ms: u64,
    pub worker_queue: usize,
    pub max_iterations: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            water_source: WaterSourceKind::None,
            ocean_shp: None,
            lake_shp: None,
            tile_dir: None,
            max_tiles: 64,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            lazy_index: false,
            route_timeout_s: 30,
            worker_max_restarts: 3,
            worker_backoff_ms: 250,
            worker_queue: 64,
            max_iterations: 50_000,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let ocean_shp = env_path("SEAWAY_OCEAN_SHP");
        let lake_shp = env_path("SEAWAY_LAKE_SHP");
        let tile_dir = env_path("SEAWAY_TILE_DIR");

        let inferred = if ocean_shp.is_some() || lake_shp.is_some() {
            WaterSourceKind::Vector
        } else if tile_dir.is_some() {
            WaterSourceKind::Raster
        } else {
            WaterSourceKind::None
        };
        let water_source = match env::var("SEAWAY_WATER_SOURCE") {
            Ok(value) => WaterSourceKind::parse(&value).unwrap_or_else(|| {
                tracing::warn!("Unknown SEAWAY_WATER_SOURCE '{}', using {:?}", value, inferred);
                inferred
            }),
            Err(_) => inferred,
        };

        Self {
            server_port: env_parse("SEAWAY_PORT").unwrap_or(defaults.server_port),
            water_source,
            ocean_shp,
            lake_shp,
            tile_dir,
            max_tiles: env_parse("SEAWAY_MAX_TILES").unwrap_or(defaults.max_tiles),
            cache_capacity: env_parse("SEAWAY_CACHE_CAPACITY").unwrap_or(defaults.cache_capacity),
            lazy_index: env::var("SEAWAY_LAZY_INDEX")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.lazy_index),
            route_timeout_s: env_parse("SEAWAY_ROUTE_TIMEOUT_S")
                .unwrap_or(defaults.route_timeout_s),
            worker_max_restarts: env_parse("SEAWAY_WORKER_MAX_RESTARTS")
                .unwrap_or(defaults.worker_max_restarts),
            worker_backoff_ms: env_parse("SEAWAY_WORKER_BACKOFF_MS")
                .unwrap_or(defaults.worker_backoff_ms),
            worker_queue: env_parse("SEAWAY_WORKER_QUEUE").unwrap_or(defaults.worker_queue),
            max_iterations: env_parse("SEAWAY_MAX_ITERATIONS").unwrap_or(defaults.max_iterations),
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        let backoff_base = Duration::from_millis(self.worker_backoff_ms);
        WorkerConfig {
            request_timeout: Duration::from_secs(self.route_timeout_s.max(1)),
            max_restarts: self.worker_max_restarts,
            backoff_base,
            backoff_max: backoff_base.saturating_mul(16),
            queue_capacity: self.worker_queue.max(1),
            planner: PlannerConfig {
                default_max_iterations: self.max_iterations,
                ..PlannerConfig::default()
            },
        }
    }

    /// Build a classifier for the configured dataset. Runs on the worker
    /// thread, once per worker generation.
    pub fn build_classifier(&self) -> Result<WaterClassifier, SourceError> {
        match self.water_source {
            WaterSourceKind::Vector => {
                let mut layers = Vec::new();
                if let Some(path) = &self.ocean_shp {
                    layers.push(VectorLayer::new(path, WaterClassification::Ocean));
                }
                if let Some(path) = &self.lake_shp {
                    layers.push(VectorLayer::new(path, WaterClassification::Lake));
                }
                if layers.is_empty() {
                    tracing::warn!("Vector water source selected but no shapefiles configured");
                    return Ok(WaterClassifier::unavailable());
                }
                let source = if self.lazy_index {
                    VectorSource::lazy(layers)
                } else {
                    VectorSource::open(layers)?
                };
                Ok(WaterClassifier::new(Box::new(source), self.cache_capacity))
            }
            WaterSourceKind::Raster => match &self.tile_dir {
                Some(dir) => {
                    let source = RasterSource::new(dir, self.max_tiles);
                    Ok(WaterClassifier::new(Box::new(source), self.cache_capacity))
                }
                None => {
                    tracing::warn!("Raster water source selected but SEAWAY_TILE_DIR is not set");
                    Ok(WaterClassifier::unavailable())
                }
            },
            WaterSourceKind::None => Ok(WaterClassifier::unavailable()),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_kind_aliases() {
        assert_eq!(WaterSourceKind::parse("Vector"), Some(WaterSourceKind::Vector));
        assert_eq!(WaterSourceKind::parse("tiles"), Some(WaterSourceKind::Raster));
        assert_eq!(WaterSourceKind::parse(" none "), Some(WaterSourceKind::None));
        assert_eq!(WaterSourceKind::parse("lidar"), None);
    }

    #[test]
    fn no_source_builds_unavailable_classifier() {
        let config = Config::default();
        let classifier = config.build_classifier().unwrap();
        assert!(!classifier.has_source());
    }

    #[test]
    fn missing_shapefile_is_a_load_error() {
        let config = Config {
            water_source: WaterSourceKind::Vector,
            ocean_shp: Some(std::env::temp_dir().join("seaway-does-not-exist.shp")),
            ..Config::default()
        };
        assert!(config.build_classifier().is_err());
    }

    #[test]
    fn worker_config_carries_limits() {
        let config = Config {
            route_timeout_s: 5,
            max_iterations: 1234,
            ..Config::default()
        };
        let worker = config.worker_config();
        assert_eq!(worker.request_timeout, Duration::from_secs(5));
        assert_eq!(worker.planner.default_max_iterations, 1234);
    }
}
