//! Aquifer boundary lookup and selection geometry conversion.

use crate::error::AnalysisError;
use crate::models::AquiferId;

use geo::{Geometry, MultiPolygon};
use geojson::{feature::Id, Feature, FeatureCollection, GeoJson};
use serde_json::Value as JsonValue;
use std::path::Path;

/// Converts a GeoJSON Polygon or MultiPolygon geometry to a region.
///
/// Any other geometry type is an [AnalysisError::InvalidGeometry].
pub fn region_from_geometry(
    geometry: &geojson::Geometry,
) -> Result<MultiPolygon<f64>, AnalysisError> {
    let geometry = Geometry::<f64>::try_from(&geometry.value).map_err(|err| {
        AnalysisError::InvalidGeometry {
            reason: err.to_string(),
        }
    })?;
    match geometry {
        Geometry::Polygon(polygon) => Ok(MultiPolygon::new(vec![polygon])),
        Geometry::MultiPolygon(multi_polygon) => Ok(multi_polygon),
        _ => Err(AnalysisError::InvalidGeometry {
            reason: "expected Polygon or MultiPolygon".to_string(),
        }),
    }
}

/// Returns the text form of an id property, if it is a string or number.
fn id_key(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(id) => Some(id.clone()),
        JsonValue::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Returns the id of a boundary feature.
///
/// The `id` property takes precedence over the feature's own id.
fn feature_id(feature: &Feature) -> Option<String> {
    if let Some(id) = feature.property("id").and_then(id_key) {
        return Some(id);
    }
    match &feature.id {
        Some(Id::String(id)) => Some(id.clone()),
        Some(Id::Number(id)) => Some(id.to_string()),
        None => None,
    }
}

/// An aquifer boundary
#[derive(Clone, Debug, PartialEq)]
pub struct Boundary {
    pub id: String,
    /// Aquifer name, from the `n` or `name` property
    pub name: Option<String>,
    pub region: MultiPolygon<f64>,
}

/// Aquifer boundaries indexed by id
#[derive(Clone, Debug, Default)]
pub struct BoundaryIndex {
    boundaries: Vec<Boundary>,
}

impl BoundaryIndex {
    /// Build an index from a GeoJSON FeatureCollection document.
    ///
    /// Features without an id or without a polygonal geometry are skipped.
    pub fn from_geojson(document: &str) -> Result<Self, AnalysisError> {
        let load_error = |error: geojson::Error| AnalysisError::BoundaryLoad {
            error: error.to_string(),
        };
        let geojson = document.parse::<GeoJson>().map_err(load_error)?;
        let collection = FeatureCollection::try_from(geojson).map_err(load_error)?;
        let mut boundaries = vec![];
        for feature in &collection.features {
            let Some(id) = feature_id(feature) else {
                tracing::warn!("skipping boundary feature without an id");
                continue;
            };
            let region = match feature.geometry.as_ref().map(region_from_geometry) {
                Some(Ok(region)) => region,
                Some(Err(err)) => {
                    tracing::warn!(id = %id, "skipping boundary feature: {}", err);
                    continue;
                }
                None => {
                    tracing::warn!(id = %id, "skipping boundary feature without geometry");
                    continue;
                }
            };
            let name = ["n", "name"]
                .iter()
                .find_map(|key| feature.property(key).and_then(JsonValue::as_str))
                .map(str::to_string);
            boundaries.push(Boundary { id, name, region });
        }
        Ok(Self { boundaries })
    }

    /// Load an index from a GeoJSON file.
    pub fn load(path: &Path) -> Result<Self, AnalysisError> {
        let document =
            std::fs::read_to_string(path).map_err(|err| AnalysisError::BoundaryLoad {
                error: format!("{}: {}", path.display(), err),
            })?;
        let index = Self::from_geojson(&document)?;
        tracing::info!(
            path = %path.display(),
            count = index.len(),
            "loaded aquifer boundaries"
        );
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    /// Returns the region of an aquifer.
    ///
    /// All features sharing the id contribute their polygons. Fails with
    /// [AnalysisError::BoundaryNotFound] if no feature has the id.
    pub fn lookup(&self, id: &AquiferId) -> Result<MultiPolygon<f64>, AnalysisError> {
        let key = id.to_string();
        let polygons: Vec<_> = self
            .boundaries
            .iter()
            .filter(|boundary| boundary.id == key)
            .flat_map(|boundary| boundary.region.0.iter().cloned())
            .collect();
        if polygons.is_empty() {
            return Err(AnalysisError::BoundaryNotFound { id: key });
        }
        Ok(MultiPolygon::new(polygons))
    }

    /// Returns the name of an aquifer, if its boundary has one.
    pub fn name(&self, id: &AquiferId) -> Option<&str> {
        let key = id.to_string();
        self.boundaries
            .iter()
            .find(|boundary| boundary.id == key)
            .and_then(|boundary| boundary.name.as_deref())
    }
}
