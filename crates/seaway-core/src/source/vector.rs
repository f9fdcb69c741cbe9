//! Water source backed by polygon shapefiles.

use super::shapefile::PolygonIndex;
use super::{check_bounds, SourceError, SourceStats, WaterSource};
use crate::geo::{BoundingBox, GeoPoint};
use crate::models::WaterClassification;
use std::path::{Path, PathBuf};

/// One polygon dataset and the classification its polygons stand for.
#[derive(Debug)]
pub struct VectorLayer {
    path: PathBuf,
    class: WaterClassification,
    index: Option<PolygonIndex>,
}

impl VectorLayer {
    pub fn new(path: impl Into<PathBuf>, class: WaterClassification) -> Self {
        Self {
            path: path.into(),
            class,
            index: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_built(&self) -> bool {
        self.index.is_some()
    }

    fn build(&mut self) -> Result<usize, SourceError> {
        if self.index.is_some() {
            return Ok(0);
        }
        let index = PolygonIndex::open(&self.path)?;
        let count = index.len();
        tracing::info!(
            "Vector layer {} ready ({:?}, {} polygons)",
            self.path.display(),
            self.class,
            count
        );
        self.index = Some(index);
        Ok(count)
    }
}

/// Layers are consulted in order; the first one with a polygon containing the
/// point decides. A point no layer contains is land.
#[derive(Debug, Default)]
pub struct VectorSource {
    layers: Vec<VectorLayer>,
}

impl VectorSource {
    /// Configure layers without reading them. The first `preload` builds them.
    pub fn lazy(layers: Vec<VectorLayer>) -> Self {
        Self { layers }
    }

    /// Configure and index every layer now.
    pub fn open(layers: Vec<VectorLayer>) -> Result<Self, SourceError> {
        let mut source = Self::lazy(layers);
        source.build_all()?;
        Ok(source)
    }

    pub fn layers(&self) -> &[VectorLayer] {
        &self.layers
    }

    fn build_all(&mut self) -> Result<usize, SourceError> {
        let mut indexed = 0;
        for layer in &mut self.layers {
            indexed += layer.build()?;
        }
        Ok(indexed)
    }
}

impl WaterSource for VectorSource {
    fn classify(&self, point: GeoPoint) -> Option<WaterClassification> {
        let mut any_unbuilt = false;
        for layer in &self.layers {
            let Some(index) = layer.index.as_ref() else {
                any_unbuilt = true;
                continue;
            };
            match index.contains(point) {
                Ok(true) => return Some(layer.class),
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(
                        "Polygon read failed in {} at ({:.5}, {:.5}): {}",
                        layer.path.display(),
                        point.lat,
                        point.lon,
                        err
                    );
                }
            }
        }
        if any_unbuilt || self.layers.is_empty() {
            None
        } else {
            Some(WaterClassification::Land)
        }
    }

    /// The index covers whole datasets, so the box is only validated; unbuilt
    /// layers are indexed and their polygon count returned.
    fn preload(&mut self, bounds: &BoundingBox) -> Result<usize, SourceError> {
        check_bounds(bounds)?;
        self.build_all()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            kind: "vector".to_string(),
            resident_units: self
                .layers
                .iter()
                .filter_map(|layer| layer.index.as_ref().map(PolygonIndex::len))
                .sum(),
            capacity: self.layers.len(),
            ready: !self.layers.is_empty() && self.layers.iter().all(VectorLayer::is_built),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::shapefile::{write_polygons, Ring};

    fn square(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Ring {
        vec![
            [min_x, min_y],
            [min_x, max_y],
            [max_x, max_y],
            [max_x, min_y],
            [min_x, min_y],
        ]
    }

    fn write_layer(name: &str, polygons: &[Vec<Ring>]) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "seaway-{}-{}.shp",
            name,
            uuid::Uuid::new_v4()
        ));
        write_polygons(&path, polygons).unwrap();
        path
    }

    #[test]
    fn layers_resolve_ocean_lake_and_land() {
        let ocean = write_layer("ocean", &[vec![square(0.0, 0.0, 1.0, 1.0)]]);
        let lake = write_layer("lake", &[vec![square(5.0, 5.0, 6.0, 6.0)]]);
        let source = VectorSource::open(vec![
            VectorLayer::new(&ocean, WaterClassification::Ocean),
            VectorLayer::new(&lake, WaterClassification::Lake),
        ])
        .unwrap();

        assert_eq!(source.classify(GeoPoint::new(0.5, 0.5)), Some(WaterClassification::Ocean));
        assert_eq!(source.classify(GeoPoint::new(5.5, 5.5)), Some(WaterClassification::Lake));
        assert_eq!(source.classify(GeoPoint::new(3.0, 3.0)), Some(WaterClassification::Land));
        assert_eq!(source.stats().resident_units, 2);
        assert!(source.stats().ready);
    }

    #[test]
    fn lazy_source_knows_nothing_until_preloaded() {
        let ocean = write_layer("lazy", &[vec![square(0.0, 0.0, 1.0, 1.0)]]);
        let mut source =
            VectorSource::lazy(vec![VectorLayer::new(&ocean, WaterClassification::Ocean)]);
        assert_eq!(source.classify(GeoPoint::new(0.5, 0.5)), None);
        assert!(!source.stats().ready);

        let bounds = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!(source.preload(&bounds).unwrap(), 1);
        assert_eq!(source.preload(&bounds).unwrap(), 0);
        assert_eq!(source.classify(GeoPoint::new(0.5, 0.5)), Some(WaterClassification::Ocean));
    }

    #[test]
    fn antimeridian_box_is_rejected() {
        let mut source = VectorSource::default();
        let err = source
            .preload(&BoundingBox::new(0.0, 179.5, 1.0, -179.5))
            .unwrap_err();
        assert!(matches!(err, SourceError::InvalidBounds(_)));
    }
}
