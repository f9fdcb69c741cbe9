//! Bounded classification cache keyed by rounded coordinates.

use crate::geo::GeoPoint;
use crate::models::WaterClassification;
use std::collections::{HashMap, VecDeque};

/// Rounding applied to cache keys: 1e-4 degrees, about 11 m.
pub const KEY_SCALE: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    lat: i64,
    lon: i64,
}

impl CacheKey {
    pub fn from_point(point: GeoPoint) -> Self {
        Self {
            lat: (point.lat * KEY_SCALE).round() as i64,
            lon: (point.lon * KEY_SCALE).round() as i64,
        }
    }
}

/// Evicts the oldest insertion once `capacity` is reached. Lookups do not
/// refresh an entry's position.
#[derive(Debug)]
pub struct ClassificationCache {
    capacity: usize,
    entries: HashMap<CacheKey, WaterClassification>,
    order: VecDeque<CacheKey>,
    hits: u64,
    misses: u64,
}

impl ClassificationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity.min(1 << 16)),
            order: VecDeque::with_capacity(capacity.min(1 << 16)),
            hits: 0,
            misses: 0,
        }
    }

    pub fn get(&mut self, point: GeoPoint) -> Option<WaterClassification> {
        let found = self.entries.get(&CacheKey::from_point(point)).copied();
        if found.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        found
    }

    pub fn insert(&mut self, point: GeoPoint, class: WaterClassification) {
        if self.capacity == 0 {
            return;
        }
        let key = CacheKey::from_point(point);
        if self.entries.insert(key, class).is_some() {
            return;
        }
        self.order.push_back(key);
        while self.entries.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}
