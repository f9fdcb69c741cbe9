//! Point classification with a fail-closed default.

use crate::cache::ClassificationCache;
use crate::geo::{BoundingBox, GeoPoint};
use crate::models::WaterClassification;
use crate::source::{SourceError, SourceStats, WaterSource};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CACHE_CAPACITY: usize = 100_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassifierStats {
    pub source: Option<SourceStats>,
    pub queries: u64,
    pub source_queries: u64,
    pub unknown_answers: u64,
    pub cache_entries: usize,
    pub cache_capacity: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

/// Answers "ocean, lake or land" for a point.
///
/// Points the source has no data for classify as land and are not cached, so a
/// later `preload` can still correct them.
pub struct WaterClassifier {
    source: Option<Box<dyn WaterSource + Send>>,
    cache: ClassificationCache,
    queries: u64,
    source_queries: u64,
    unknown_answers: u64,
    warned_unavailable: bool,
}

impl WaterClassifier {
    pub fn new(source: Box<dyn WaterSource + Send>, cache_capacity: usize) -> Self {
        Self {
            source: Some(source),
            cache: ClassificationCache::new(cache_capacity),
            queries: 0,
            source_queries: 0,
            unknown_answers: 0,
            warned_unavailable: false,
        }
    }

    /// A classifier with no data: every point is land.
    pub fn unavailable() -> Self {
        Self {
            source: None,
            cache: ClassificationCache::new(0),
            queries: 0,
            source_queries: 0,
            unknown_answers: 0,
            warned_unavailable: false,
        }
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn classify(&mut self, point: GeoPoint) -> WaterClassification {
        self.queries += 1;
        if !point.is_finite() {
            return WaterClassification::Land;
        }
        if let Some(hit) = self.cache.get(point) {
            return hit;
        }

        let Some(source) = self.source.as_ref() else {
            self.unknown_answers += 1;
            self.warn_once("no water source configured");
            return WaterClassification::Land;
        };

        self.source_queries += 1;
        match source.classify(point) {
            Some(class) => {
                self.cache.insert(point, class);
                class
            }
            None => {
                self.unknown_answers += 1;
                self.warn_once("water data not resident; call preload before classifying");
                WaterClassification::Land
            }
        }
    }

    pub fn is_water(&mut self, point: GeoPoint) -> bool {
        self.classify(point).is_water()
    }

    /// Make data for `bounds` resident. Returns the number of newly loaded units.
    pub fn preload(&mut self, bounds: &BoundingBox) -> Result<usize, SourceError> {
        let Some(source) = self.source.as_mut() else {
            self.warn_once("no water source configured");
            return Ok(0);
        };
        let loaded = source.preload(bounds)?;
        if loaded > 0 {
            self.warned_unavailable = false;
        }
        Ok(loaded)
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn stats(&self) -> ClassifierStats {
        ClassifierStats {
            source: self.source.as_ref().map(|source| source.stats()),
            queries: self.queries,
            source_queries: self.source_queries,
            unknown_answers: self.unknown_answers,
            cache_entries: self.cache.len(),
            cache_capacity: self.cache.capacity(),
            cache_hits: self.cache.hits(),
            cache_misses: self.cache.misses(),
        }
    }

    fn warn_once(&mut self, message: &str) {
        if !self.warned_unavailable {
            tracing::warn!("Classifying as land: {}", message);
            self.warned_unavailable = true;
        }
    }
}

impl std::fmt::Debug for WaterClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaterClassifier")
            .field("has_source", &self.source.is_some())
            .field("cache_entries", &self.cache.len())
            .field("queries", &self.queries)
            .finish()
    }
}
