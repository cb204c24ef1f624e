//! Finest-level boundary geometry loaded from a GeoJSON feature collection.

use geo::{BoundingRect, Coord, LineString, MultiPolygon, Polygon};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info};

use super::HierarchyBuilder;
use crate::error::ReferenceDataError;
use crate::models::{AdminLevel, AdministrativeUnit};

/// A single finest-level unit polygon
#[derive(Debug, Clone)]
pub struct AdminBoundary {
    pub unit: AdministrativeUnit,
    pub geometry: MultiPolygon<f64>,
}

impl AdminBoundary {
    pub fn new(name: &str, geometry: MultiPolygon<f64>) -> Self {
        Self {
            unit: AdministrativeUnit::new(name, AdminLevel::Lad),
            geometry,
        }
    }

    /// Get the bounding box of this boundary
    pub fn bbox(&self) -> Option<(f64, f64, f64, f64)> {
        self.geometry
            .bounding_rect()
            .map(|rect| (rect.min().x, rect.min().y, rect.max().x, rect.max().y))
    }
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: HashMap<String, serde_json::Value>,
    geometry: Option<Geometry>,
}

/// Positions may carry a third (altitude) ordinate, which is ignored.
type Ring = Vec<Vec<f64>>;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon { coordinates: Vec<Ring> },
    MultiPolygon { coordinates: Vec<Vec<Ring>> },
    #[serde(other)]
    Unsupported,
}

fn to_line_string(ring: &Ring) -> Option<LineString<f64>> {
    let coords: Vec<Coord<f64>> = ring
        .iter()
        .filter_map(|pos| match pos.as_slice() {
            [x, y, ..] => Some(Coord { x: *x, y: *y }),
            _ => None,
        })
        .collect();
    // LineString closes itself when wrapped in a Polygon
    (coords.len() >= 3).then(|| LineString::new(coords))
}

fn to_polygon(rings: &[Ring]) -> Option<Polygon<f64>> {
    let (exterior, interiors) = rings.split_first()?;
    let exterior = to_line_string(exterior)?;
    let interiors = interiors.iter().filter_map(to_line_string).collect();
    Some(Polygon::new(exterior, interiors))
}

impl Geometry {
    fn to_multi_polygon(&self) -> Option<MultiPolygon<f64>> {
        let polygons: Vec<Polygon<f64>> = match self {
            Geometry::Polygon { coordinates } => to_polygon(coordinates).into_iter().collect(),
            Geometry::MultiPolygon { coordinates } => {
                coordinates.iter().filter_map(|p| to_polygon(p)).collect()
            }
            Geometry::Unsupported => Vec::new(),
        };
        (!polygons.is_empty()).then(|| MultiPolygon::new(polygons))
    }
}

/// Parse boundaries from a GeoJSON reader.
pub fn parse_boundaries<R: std::io::Read>(
    reader: R,
    name_property: &str,
) -> Result<Vec<AdminBoundary>, serde_json::Error> {
    let collection: FeatureCollection = serde_json::from_reader(reader)?;

    let mut boundaries = Vec::with_capacity(collection.features.len());
    for feature in collection.features {
        let name = match feature
            .properties
            .get(name_property)
            .and_then(|v| v.as_str())
        {
            Some(n) if !n.trim().is_empty() => n.trim().to_string(),
            _ => {
                debug!("Skipping feature without '{}' property", name_property);
                continue;
            }
        };

        match feature.geometry.as_ref().and_then(Geometry::to_multi_polygon) {
            Some(geometry) => boundaries.push(AdminBoundary::new(&name, geometry)),
            None => debug!("Could not build geometry for boundary '{}'", name),
        }
    }

    Ok(boundaries)
}

/// Load finest-level boundaries into the hierarchy builder.
pub fn load_boundaries(
    builder: &mut HierarchyBuilder,
    path: &Path,
    name_property: &str,
) -> Result<usize, ReferenceDataError> {
    info!("Loading boundaries from {}", path.display());

    let file = File::open(path).map_err(|source| ReferenceDataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let boundaries = parse_boundaries(BufReader::new(file), name_property).map_err(|source| {
        ReferenceDataError::Geometry {
            path: path.to_path_buf(),
            source,
        }
    })?;

    let count = boundaries.len();
    for boundary in boundaries {
        builder.add_boundary(boundary);
    }

    info!("Found {} boundaries", count);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Area;

    const SAMPLE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"LAD21NM": "Dundee City"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0, 0], [2, 0], [2, 2], [0, 2], [0, 0]]]
                }
            },
            {
                "type": "Feature",
                "properties": {"LAD21NM": "Orkney Islands"},
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [
                        [[[10, 10, 0], [11, 10, 0], [11, 11, 0], [10, 10, 0]]],
                        [[[20, 20], [21, 20], [21, 21], [20, 21], [20, 20]]]
                    ]
                }
            },
            {
                "type": "Feature",
                "properties": {"LAD21NM": "Line Only"},
                "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]}
            },
            {
                "type": "Feature",
                "properties": {"OTHER": "No name"},
                "geometry": null
            }
        ]
    }"#;

    #[test]
    fn test_parse_polygon_and_multipolygon() {
        let boundaries = parse_boundaries(SAMPLE.as_bytes(), "LAD21NM").unwrap();
        assert_eq!(boundaries.len(), 2);

        let dundee = &boundaries[0];
        assert_eq!(dundee.unit.name, "Dundee City");
        assert!((dundee.geometry.unsigned_area() - 4.0).abs() < 1e-9);
        assert_eq!(dundee.bbox(), Some((0.0, 0.0, 2.0, 2.0)));

        let orkney = &boundaries[1];
        assert_eq!(orkney.geometry.0.len(), 2);
    }

    #[test]
    fn test_malformed_json_is_error() {
        assert!(parse_boundaries("{\"features\": 3}".as_bytes(), "LAD21NM").is_err());
    }
}
