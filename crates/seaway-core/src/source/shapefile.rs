//! Polygon shapefile index.
//!
//! Only record headers are read while indexing, so memory grows with the number
//! of polygons and not with their vertex count. Geometry is read back from disk
//! one record at a time when a point lands inside a candidate's bounding box.

use super::SourceError;
use crate::geo::GeoPoint;
use rstar::{RTree, RTreeObject, AABB};
use std::cell::RefCell;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const FILE_CODE: i32 = 9994;
const HEADER_LEN: u64 = 100;
const SHX_RECORD_LEN: usize = 8;
const RECORD_HEADER_LEN: u64 = 8;
/// Shape type tag plus four bbox doubles.
const SHAPE_HEADER_LEN: u64 = 36;

const SHAPE_NULL: i32 = 0;
const SHAPE_POLYGON: i32 = 5;
const SHAPE_POLYGON_Z: i32 = 15;
const SHAPE_POLYGON_M: i32 = 25;

pub type Ring = Vec<[f64; 2]>;

/// Where one polygon lives in the `.shp` file and the box that encloses it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexEntry {
    /// `[min_x, min_y, max_x, max_y]`, x = longitude.
    pub bbox: [f64; 4],
    /// Byte offset of the record content (past the 8-byte record header).
    pub offset: u64,
    /// Content length in bytes.
    pub length: u64,
    pub record: usize,
}

impl RTreeObject for IndexEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners([self.bbox[0], self.bbox[1]], [self.bbox[2], self.bbox[3]])
    }
}

pub struct PolygonIndex {
    path: PathBuf,
    file: RefCell<File>,
    tree: RTree<IndexEntry>,
    len: usize,
}

impl std::fmt::Debug for PolygonIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolygonIndex")
            .field("path", &self.path)
            .field("len", &self.len)
            .finish()
    }
}

impl PolygonIndex {
    /// Build the index for `shp_path`; the sibling `.shx` must exist.
    pub fn open(shp_path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let shp_path = shp_path.as_ref().to_path_buf();
        let shx_path = shp_path.with_extension("shx");
        let records = read_shx(&shx_path)?;
        let entries = scan_record_headers(&shp_path, &records)?;
        let len = entries.len();

        let started = std::time::Instant::now();
        let tree = RTree::bulk_load(entries);
        tracing::debug!(
            "Indexed {} polygons from {} in {:?}",
            len,
            shp_path.display(),
            started.elapsed()
        );

        let file = File::open(&shp_path).map_err(|err| SourceError::io(&shp_path, err))?;
        Ok(Self {
            path: shp_path,
            file: RefCell::new(file),
            tree,
            len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Entries whose bounding box contains `point`, in record order.
    pub fn candidates(&self, point: GeoPoint) -> Vec<IndexEntry> {
        let probe = AABB::from_point([point.lon, point.lat]);
        let mut found: Vec<IndexEntry> = self
            .tree
            .locate_in_envelope_intersecting(&probe)
            .copied()
            .collect();
        found.sort_by_key(|entry| entry.record);
        found
    }

    /// True when any polygon contains `point` (inside the exterior ring and
    /// outside every hole).
    pub fn contains(&self, point: GeoPoint) -> Result<bool, SourceError> {
        for entry in self.candidates(point) {
            let rings = self.read_rings(&entry)?;
            if polygon_contains(&rings, point.lon, point.lat) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Read and split one record into rings. Nothing is retained.
    pub fn read_rings(&self, entry: &IndexEntry) -> Result<Vec<Ring>, SourceError> {
        let mut buf = vec![0u8; entry.length as usize];
        {
            let mut file = self.file.borrow_mut();
            file.seek(SeekFrom::Start(entry.offset))
                .map_err(|err| SourceError::io(&self.path, err))?;
            file.read_exact(&mut buf).map_err(|err| match err.kind() {
                std::io::ErrorKind::UnexpectedEof => SourceError::Truncated {
                    path: self.path.clone(),
                    detail: format!("record {} ends past end of file", entry.record),
                },
                _ => SourceError::io(&self.path, err),
            })?;
        }
        parse_polygon(&buf).map_err(|detail| SourceError::Truncated {
            path: self.path.clone(),
            detail: format!("record {}: {}", entry.record, detail),
        })
    }
}

/// `(offset, content_length)` in bytes for every record listed in a `.shx`.
fn read_shx(path: &Path) -> Result<Vec<(u64, u64)>, SourceError> {
    let bytes = std::fs::read(path).map_err(|err| SourceError::io(path, err))?;
    if bytes.len() < HEADER_LEN as usize {
        return Err(SourceError::Truncated {
            path: path.to_path_buf(),
            detail: format!("{} byte header, expected {}", bytes.len(), HEADER_LEN),
        });
    }
    if be_i32(&bytes, 0) != FILE_CODE {
        return Err(SourceError::CorruptIndex {
            path: path.to_path_buf(),
            detail: "bad file code".to_string(),
        });
    }

    let body = &bytes[HEADER_LEN as usize..];
    if body.len() % SHX_RECORD_LEN != 0 {
        return Err(SourceError::Truncated {
            path: path.to_path_buf(),
            detail: format!("{} trailing bytes", body.len() % SHX_RECORD_LEN),
        });
    }

    let mut records = Vec::with_capacity(body.len() / SHX_RECORD_LEN);
    for (idx, chunk) in body.chunks_exact(SHX_RECORD_LEN).enumerate() {
        let offset_words = be_i32(chunk, 0);
        let length_words = be_i32(chunk, 4);
        if offset_words < 0 || length_words < 0 || (offset_words as u64) * 2 < HEADER_LEN {
            return Err(SourceError::CorruptIndex {
                path: path.to_path_buf(),
                detail: format!(
                    "record {} has offset {} length {}",
                    idx, offset_words, length_words
                ),
            });
        }
        records.push((offset_words as u64 * 2, length_words as u64 * 2));
    }
    Ok(records)
}

/// One forward pass over the `.shp`, reading the 36-byte shape header of each record.
fn scan_record_headers(
    path: &Path,
    records: &[(u64, u64)],
) -> Result<Vec<IndexEntry>, SourceError> {
    let file = File::open(path).map_err(|err| SourceError::io(path, err))?;
    let file_len = file
        .metadata()
        .map_err(|err| SourceError::io(path, err))?
        .len();
    let mut reader = BufReader::new(file);
    let mut position = 0u64;
    let mut entries = Vec::with_capacity(records.len());

    for (record, &(offset, length)) in records.iter().enumerate() {
        let content = offset + RECORD_HEADER_LEN;
        if content + 4 > file_len || content + length > file_len {
            return Err(SourceError::Truncated {
                path: path.to_path_buf(),
                detail: format!("record {} at byte {} runs past {}", record, offset, file_len),
            });
        }

        move_to(&mut reader, &mut position, content).map_err(|err| SourceError::io(path, err))?;
        let mut tag = [0u8; 4];
        reader
            .read_exact(&mut tag)
            .map_err(|err| SourceError::io(path, err))?;
        position += 4;

        let shape_type = i32::from_le_bytes(tag);
        match shape_type {
            SHAPE_NULL => continue,
            SHAPE_POLYGON | SHAPE_POLYGON_Z | SHAPE_POLYGON_M => {}
            other => {
                return Err(SourceError::UnexpectedShapeType {
                    path: path.to_path_buf(),
                    record,
                    shape_type: other,
                })
            }
        }
        if length < SHAPE_HEADER_LEN {
            return Err(SourceError::Truncated {
                path: path.to_path_buf(),
                detail: format!("record {} is {} bytes, shorter than its header", record, length),
            });
        }

        let mut raw = [0u8; 32];
        reader
            .read_exact(&mut raw)
            .map_err(|err| SourceError::io(path, err))?;
        position += 32;

        entries.push(IndexEntry {
            bbox: [
                le_f64(&raw, 0),
                le_f64(&raw, 8),
                le_f64(&raw, 16),
                le_f64(&raw, 24),
            ],
            offset: content,
            length,
            record,
        });
    }

    Ok(entries)
}

fn move_to(reader: &mut BufReader<File>, position: &mut u64, target: u64) -> std::io::Result<()> {
    if target >= *position {
        reader.seek_relative((target - *position) as i64)?;
    } else {
        reader.seek(SeekFrom::Start(target))?;
    }
    *position = target;
    Ok(())
}

fn parse_polygon(buf: &[u8]) -> Result<Vec<Ring>, String> {
    if buf.len() < 44 {
        return Err(format!("{} bytes, need at least 44", buf.len()));
    }
    let num_parts = le_i32(buf, 36);
    let num_points = le_i32(buf, 40);
    if num_parts < 0 || num_points < 0 {
        return Err(format!("negative counts {} / {}", num_parts, num_points));
    }
    let num_parts = num_parts as usize;
    let num_points = num_points as usize;
    let parts_at = 44;
    let points_at = parts_at + num_parts * 4;
    let needed = points_at + num_points * 16;
    if buf.len() < needed {
        return Err(format!("{} bytes, need {}", buf.len(), needed));
    }

    let parts: Vec<usize> = (0..num_parts)
        .map(|i| le_i32(buf, parts_at + i * 4).max(0) as usize)
        .collect();

    let mut rings = Vec::with_capacity(num_parts);
    for (idx, &start) in parts.iter().enumerate() {
        let end = parts.get(idx + 1).copied().unwrap_or(num_points);
        if start > end || end > num_points {
            return Err(format!("part {} spans {}..{} of {}", idx, start, end, num_points));
        }
        let ring: Ring = (start..end)
            .map(|p| {
                let at = points_at + p * 16;
                [le_f64(buf, at), le_f64(buf, at + 8)]
            })
            .collect();
        rings.push(ring);
    }
    Ok(rings)
}

/// Exterior ring containment and no hole containment. The first ring is the
/// exterior; every later ring is a hole.
pub fn polygon_contains(rings: &[Ring], x: f64, y: f64) -> bool {
    let Some((exterior, holes)) = rings.split_first() else {
        return false;
    };
    if !ring_contains(exterior, x, y) {
        return false;
    }
    !holes.iter().any(|hole| ring_contains(hole, x, y))
}

/// Even-odd ray cast towards +x.
pub fn ring_contains(ring: &[[f64; 2]], x: f64, y: f64) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let [xi, yi] = ring[i];
        let [xj, yj] = ring[j];
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Write polygons as a `.shp`/`.shx` pair. Each polygon is a list of rings,
/// exterior first, coordinates as `[lon, lat]`.
pub fn write_polygons(
    shp_path: impl AsRef<Path>,
    polygons: &[Vec<Ring>],
) -> Result<(), SourceError> {
    let shp_path = shp_path.as_ref();
    let shx_path = shp_path.with_extension("shx");

    let mut contents: Vec<Vec<u8>> = Vec::with_capacity(polygons.len());
    let mut total = [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY];
    for rings in polygons {
        let bbox = rings_bbox(rings);
        total = [
            total[0].min(bbox[0]),
            total[1].min(bbox[1]),
            total[2].max(bbox[2]),
            total[3].max(bbox[3]),
        ];
        let num_points: usize = rings.iter().map(Vec::len).sum();
        let mut content = Vec::with_capacity(44 + rings.len() * 4 + num_points * 16);
        content.extend_from_slice(&SHAPE_POLYGON.to_le_bytes());
        for value in bbox {
            content.extend_from_slice(&value.to_le_bytes());
        }
        content.extend_from_slice(&(rings.len() as i32).to_le_bytes());
        content.extend_from_slice(&(num_points as i32).to_le_bytes());
        let mut start = 0i32;
        for ring in rings {
            content.extend_from_slice(&start.to_le_bytes());
            start += ring.len() as i32;
        }
        for ring in rings {
            for [x, y] in ring {
                content.extend_from_slice(&x.to_le_bytes());
                content.extend_from_slice(&y.to_le_bytes());
            }
        }
        contents.push(content);
    }
    if polygons.is_empty() {
        total = [0.0; 4];
    }

    let shp_len: usize = HEADER_LEN as usize
        + contents.iter().map(|c| c.len() + RECORD_HEADER_LEN as usize).sum::<usize>();
    let shx_len = HEADER_LEN as usize + contents.len() * SHX_RECORD_LEN;

    let mut shp =
        BufWriter::new(File::create(shp_path).map_err(|err| SourceError::io(shp_path, err))?);
    let mut shx =
        BufWriter::new(File::create(&shx_path).map_err(|err| SourceError::io(&shx_path, err))?);

    let result = (|| -> std::io::Result<()> {
        shp.write_all(&file_header(shp_len, total))?;
        shx.write_all(&file_header(shx_len, total))?;
        let mut offset = HEADER_LEN as usize;
        for (idx, content) in contents.iter().enumerate() {
            let words = (content.len() / 2) as i32;
            shp.write_all(&((idx + 1) as i32).to_be_bytes())?;
            shp.write_all(&words.to_be_bytes())?;
            shp.write_all(content)?;
            shx.write_all(&((offset / 2) as i32).to_be_bytes())?;
            shx.write_all(&words.to_be_bytes())?;
            offset += RECORD_HEADER_LEN as usize + content.len();
        }
        shp.flush()?;
        shx.flush()
    })();
    result.map_err(|err| SourceError::io(shp_path, err))
}

fn file_header(total_len: usize, bbox: [f64; 4]) -> [u8; HEADER_LEN as usize] {
    let mut header = [0u8; HEADER_LEN as usize];
    header[0..4].copy_from_slice(&FILE_CODE.to_be_bytes());
    header[24..28].copy_from_slice(&((total_len / 2) as i32).to_be_bytes());
    header[28..32].copy_from_slice(&1000i32.to_le_bytes());
    header[32..36].copy_from_slice(&SHAPE_POLYGON.to_le_bytes());
    for (i, value) in bbox.iter().enumerate() {
        let at = 36 + i * 8;
        header[at..at + 8].copy_from_slice(&value.to_le_bytes());
    }
    header
}

fn rings_bbox(rings: &[Ring]) -> [f64; 4] {
    let mut bbox = [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY];
    for [x, y] in rings.iter().flatten() {
        bbox[0] = bbox[0].min(*x);
        bbox[1] = bbox[1].min(*y);
        bbox[2] = bbox[2].max(*x);
        bbox[3] = bbox[3].max(*y);
    }
    if !bbox[0].is_finite() {
        return [0.0; 4];
    }
    bbox
}

fn be_i32(buf: &[u8], at: usize) -> i32 {
    i32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn le_i32(buf: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn le_f64(buf: &[u8], at: usize) -> f64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[at..at + 8]);
    f64::from_le_bytes(raw)
}
