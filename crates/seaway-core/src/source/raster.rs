//! Water source backed by a directory of classification tiles.
//!
//! Each tile covers one degree square and is named after its south-west corner
//! (`N47W123.wtile`). Layout, little-endian:
//!
//! ```text
//! "WTIL" | version u8 | 3 reserved | cols u32 | rows u32
//! min_lat f64 | min_lon f64 | max_lat f64 | max_lon f64
//! rows * cols cell codes (u8), row 0 northmost
//! ```

use super::{check_bounds, SourceError, SourceStats, WaterSource};
use crate::geo::{BoundingBox, GeoPoint};
use crate::models::WaterClassification;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

const MAGIC: &[u8; 4] = b"WTIL";
const VERSION: u8 = 1;
const HEADER_LEN: usize = 48;
const BOUNDS_TOLERANCE_DEG: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    pub lat: i32,
    pub lon: i32,
}

impl TileId {
    pub fn containing(point: GeoPoint) -> Self {
        Self {
            lat: (point.lat.floor() as i32).clamp(-90, 89),
            lon: (point.lon.floor() as i32).clamp(-180, 179),
        }
    }

    /// Every tile overlapping `bounds`, row-major from the south-west.
    pub fn covering(bounds: &BoundingBox) -> Vec<TileId> {
        let south = TileId::containing(GeoPoint::new(bounds.min_lat, bounds.min_lon));
        let north = TileId::containing(GeoPoint::new(bounds.max_lat, bounds.max_lon));
        let mut ids = Vec::new();
        for lat in south.lat..=north.lat {
            for lon in south.lon..=north.lon {
                ids.push(TileId { lat, lon });
            }
        }
        ids
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}{:02}{}{:03}.wtile",
            if self.lat >= 0 { 'N' } else { 'S' },
            self.lat.unsigned_abs(),
            if self.lon >= 0 { 'E' } else { 'W' },
            self.lon.unsigned_abs()
        )
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::new(
            self.lat as f64,
            self.lon as f64,
            self.lat as f64 + 1.0,
            self.lon as f64 + 1.0,
        )
    }
}

/// An immutable grid of cell codes over its own bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterTile {
    bounds: BoundingBox,
    rows: usize,
    cols: usize,
    cells: Vec<u8>,
}

impl RasterTile {
    pub fn new(bounds: BoundingBox, rows: usize, cols: usize, cells: Vec<u8>) -> Option<Self> {
        if rows == 0
            || cols == 0
            || cells.len() != rows.saturating_mul(cols)
            || !bounds.is_valid()
        {
            return None;
        }
        Some(Self {
            bounds,
            rows,
            cols,
            cells,
        })
    }

    /// Build a tile for `id` by classifying each cell centre with `classify`.
    pub fn from_fn<F>(id: TileId, rows: usize, cols: usize, mut classify: F) -> Self
    where
        F: FnMut(GeoPoint) -> WaterClassification,
    {
        let bounds = id.bounds();
        let rows = rows.max(1);
        let cols = cols.max(1);
        let lat_step = 1.0 / rows as f64;
        let lon_step = 1.0 / cols as f64;
        let mut cells = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            let lat = bounds.max_lat - (row as f64 + 0.5) * lat_step;
            for col in 0..cols {
                let lon = bounds.min_lon + (col as f64 + 0.5) * lon_step;
                cells.push(classify(GeoPoint::new(lat, lon)).code());
            }
        }
        Self {
            bounds,
            rows,
            cols,
            cells,
        }
    }

    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    /// `(rows, cols)`
    pub fn dimensions(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Raw cell codes, row-major from the north-west corner.
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    /// Cell size in degrees as `(lat, lon)`.
    pub fn resolution_deg(&self) -> (f64, f64) {
        (
            (self.bounds.max_lat - self.bounds.min_lat) / self.rows as f64,
            (self.bounds.max_lon - self.bounds.min_lon) / self.cols as f64,
        )
    }

    /// Nearest-cell lookup; points outside the tile clamp to its edge.
    pub fn classify(&self, point: GeoPoint) -> WaterClassification {
        if !point.is_finite() {
            return WaterClassification::Land;
        }
        let (lat_step, lon_step) = self.resolution_deg();
        let row = ((self.bounds.max_lat - point.lat) / lat_step.max(1e-12)).floor();
        let col = ((point.lon - self.bounds.min_lon) / lon_step.max(1e-12)).floor();
        let row = (row.max(0.0) as usize).min(self.rows - 1);
        let col = (col.max(0.0) as usize).min(self.cols - 1);
        WaterClassification::from_code(self.cells[row * self.cols + col])
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.cells.len());
        out.extend_from_slice(MAGIC);
        out.push(VERSION);
        out.extend_from_slice(&[0u8; 3]);
        out.extend_from_slice(&(self.cols as u32).to_le_bytes());
        out.extend_from_slice(&(self.rows as u32).to_le_bytes());
        for value in [
            self.bounds.min_lat,
            self.bounds.min_lon,
            self.bounds.max_lat,
            self.bounds.max_lon,
        ] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out.extend_from_slice(&self.cells);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() < HEADER_LEN {
            return Err(format!("{} bytes, header needs {}", bytes.len(), HEADER_LEN));
        }
        if &bytes[0..4] != MAGIC {
            return Err("bad magic".to_string());
        }
        if bytes[4] != VERSION {
            return Err(format!("unsupported version {}", bytes[4]));
        }
        let cols = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let rows = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) as usize;
        let f = |at: usize| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[at..at + 8]);
            f64::from_le_bytes(raw)
        };
        let bounds = BoundingBox::new(f(16), f(24), f(32), f(40));
        let expected = rows.saturating_mul(cols);
        let cells = &bytes[HEADER_LEN..];
        if cells.len() != expected {
            return Err(format!("{} cells, header says {}x{}", cells.len(), rows, cols));
        }
        RasterTile::new(bounds, rows, cols, cells.to_vec())
            .ok_or_else(|| format!("invalid dimensions {}x{} or bounds {:?}", rows, cols, bounds))
    }

    pub fn read(path: &Path) -> Result<Self, SourceError> {
        let bytes = std::fs::read(path).map_err(|err| SourceError::io(path, err))?;
        Self::decode(&bytes).map_err(|detail| SourceError::BadTile {
            path: path.to_path_buf(),
            detail,
        })
    }

    pub fn write(&self, path: &Path) -> Result<(), SourceError> {
        std::fs::write(path, self.encode()).map_err(|err| SourceError::io(path, err))
    }
}

/// Write `tile` into `dir` under the name the raster source looks for.
pub fn write_tile(dir: &Path, id: TileId, tile: &RasterTile) -> Result<PathBuf, SourceError> {
    let path = dir.join(id.file_name());
    tile.write(&path)?;
    Ok(path)
}

#[derive(Debug)]
enum TileSlot {
    Loaded(RasterTile),
    /// No file for this cell; everything inside classifies as land.
    Missing,
}

#[derive(Debug)]
pub struct RasterSource {
    dir: PathBuf,
    capacity: usize,
    tiles: HashMap<TileId, TileSlot>,
    inserted: VecDeque<TileId>,
}

impl RasterSource {
    pub fn new(dir: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            dir: dir.into(),
            capacity: capacity.max(1),
            tiles: HashMap::new(),
            inserted: VecDeque::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_resident(&self, id: TileId) -> bool {
        self.tiles.contains_key(&id)
    }

    fn load(&self, id: TileId) -> Result<TileSlot, SourceError> {
        let path = self.dir.join(id.file_name());
        let tile = match RasterTile::read(&path) {
            Ok(tile) => tile,
            Err(SourceError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                tracing::debug!("No tile file {}, treating cell as land", path.display());
                return Ok(TileSlot::Missing);
            }
            Err(err) => return Err(err),
        };

        let expected = id.bounds();
        let actual = tile.bounds();
        let matches = (expected.min_lat - actual.min_lat).abs() < BOUNDS_TOLERANCE_DEG
            && (expected.min_lon - actual.min_lon).abs() < BOUNDS_TOLERANCE_DEG
            && (expected.max_lat - actual.max_lat).abs() < BOUNDS_TOLERANCE_DEG
            && (expected.max_lon - actual.max_lon).abs() < BOUNDS_TOLERANCE_DEG;
        if !matches {
            return Err(SourceError::BadTile {
                path,
                detail: format!("bounds {:?} do not match cell {:?}", actual, expected),
            });
        }
        Ok(TileSlot::Loaded(tile))
    }

    fn insert(&mut self, id: TileId, slot: TileSlot, keep: &HashSet<TileId>) {
        self.tiles.insert(id, slot);
        self.inserted.push_back(id);
        let mut rotations = 0;
        while self.tiles.len() > self.capacity && rotations <= self.inserted.len() {
            let Some(oldest) = self.inserted.pop_front() else {
                break;
            };
            if keep.contains(&oldest) {
                self.inserted.push_back(oldest);
                rotations += 1;
                continue;
            }
            self.tiles.remove(&oldest);
            tracing::trace!("Evicted tile {}", oldest.file_name());
        }
    }
}

impl WaterSource for RasterSource {
    fn classify(&self, point: GeoPoint) -> Option<WaterClassification> {
        match self.tiles.get(&TileId::containing(point))? {
            TileSlot::Loaded(tile) => Some(tile.classify(point)),
            TileSlot::Missing => Some(WaterClassification::Land),
        }
    }

    fn preload(&mut self, bounds: &BoundingBox) -> Result<usize, SourceError> {
        check_bounds(bounds)?;
        let needed = TileId::covering(bounds);
        if needed.len() > self.capacity {
            return Err(SourceError::TooManyTiles {
                needed: needed.len(),
                capacity: self.capacity,
            });
        }

        let keep: HashSet<TileId> = needed.iter().copied().collect();
        let mut loaded = 0;
        for id in needed {
            if self.tiles.contains_key(&id) {
                continue;
            }
            let slot = self.load(id)?;
            if matches!(slot, TileSlot::Loaded(_)) {
                loaded += 1;
            }
            self.insert(id, slot, &keep);
        }
        if loaded > 0 {
            tracing::debug!("Loaded {} tiles from {}", loaded, self.dir.display());
        }
        Ok(loaded)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            kind: "raster".to_string(),
            resident_units: self
                .tiles
                .values()
                .filter(|slot| matches!(slot, TileSlot::Loaded(_)))
                .count(),
            capacity: self.capacity,
            ready: self.dir.is_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("seaway-{}-{}", name, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// West half ocean, east half land.
    fn half_tile(id: TileId) -> RasterTile {
        let mid = id.lon as f64 + 0.5;
        RasterTile::from_fn(id, 10, 10, |p| {
            if p.lon < mid {
                WaterClassification::Ocean
            } else {
                WaterClassification::Land
            }
        })
    }

    #[test]
    fn tile_names_follow_corner() {
        assert_eq!(TileId { lat: 47, lon: -123 }.file_name(), "N47W123.wtile");
        assert_eq!(TileId { lat: -5, lon: 7 }.file_name(), "S05E007.wtile");
        assert_eq!(
            TileId::containing(GeoPoint::new(47.6, -122.3)),
            TileId { lat: 47, lon: -123 }
        );
    }

    #[test]
    fn covering_spans_box() {
        let ids = TileId::covering(&BoundingBox::new(46.5, -123.5, 47.5, -122.5));
        assert_eq!(ids.len(), 4);
        assert!(ids.contains(&TileId { lat: 47, lon: -122 }));
    }

    #[test]
    fn encode_decode_preserves_cells() {
        let id = TileId { lat: 10, lon: 20 };
        let tile = half_tile(id);
        let decoded = RasterTile::decode(&tile.encode()).unwrap();
        assert_eq!(decoded, tile);
        assert!(RasterTile::decode(&tile.encode()[..60]).is_err());
    }

    #[test]
    fn preload_then_classify() {
        let dir = temp_dir("raster");
        let id = TileId { lat: 10, lon: 20 };
        write_tile(&dir, id, &half_tile(id)).unwrap();

        let mut source = RasterSource::new(&dir, 8);
        let west = GeoPoint::new(10.5, 20.2);
        let east = GeoPoint::new(10.5, 20.8);
        assert_eq!(source.classify(west), None);

        let loaded = source.preload(&BoundingBox::new(10.1, 20.1, 10.9, 21.5)).unwrap();
        assert_eq!(loaded, 1, "second tile has no file");
        assert_eq!(source.classify(west), Some(WaterClassification::Ocean));
        assert_eq!(source.classify(east), Some(WaterClassification::Land));
        assert_eq!(
            source.classify(GeoPoint::new(10.5, 21.5)),
            Some(WaterClassification::Land)
        );
        assert_eq!(source.preload(&BoundingBox::new(10.1, 20.1, 10.9, 20.9)).unwrap(), 0);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn resident_set_is_bounded() {
        let dir = temp_dir("evict");
        for lon in 0..4 {
            let id = TileId { lat: 0, lon };
            write_tile(&dir, id, &half_tile(id)).unwrap();
        }
        let mut source = RasterSource::new(&dir, 2);
        source.preload(&BoundingBox::new(0.2, 0.2, 0.8, 1.8)).unwrap();
        source.preload(&BoundingBox::new(0.2, 2.2, 0.8, 3.8)).unwrap();
        assert_eq!(source.stats().resident_units, 2);
        assert!(!source.is_resident(TileId { lat: 0, lon: 0 }));
        assert!(source.is_resident(TileId { lat: 0, lon: 3 }));

        let err = source.preload(&BoundingBox::new(0.2, 0.2, 0.8, 3.8)).unwrap_err();
        assert!(matches!(err, SourceError::TooManyTiles { needed: 4, capacity: 2 }));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn misplaced_tile_is_rejected() {
        let dir = temp_dir("misplaced");
        let tile = half_tile(TileId { lat: 1, lon: 1 });
        tile.write(&dir.join(TileId { lat: 0, lon: 0 }.file_name())).unwrap();
        let mut source = RasterSource::new(&dir, 4);
        let err = source.preload(&BoundingBox::new(0.1, 0.1, 0.2, 0.2)).unwrap_err();
        assert!(matches!(err, SourceError::BadTile { .. }));
        std::fs::remove_dir_all(&dir).ok();
    }
}
