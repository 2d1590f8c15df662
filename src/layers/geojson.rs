//! GeoJSON serialization for layers.

use geojson::{FeatureCollection, Geometry as GeoJsonGeometry, Value};

use super::vector::{Feature, Geometry, VectorLayer};
use crate::projection::GeoPos;

fn geo_pos_to_vec(gp: &GeoPos) -> Vec<f64> {
    vec![gp.lon, gp.lat]
}

impl From<&Geometry> for GeoJsonGeometry {
    fn from(geometry: &Geometry) -> Self {
        let value = match geometry {
            Geometry::Point(pos) => Value::Point(geo_pos_to_vec(pos)),
            Geometry::LineString(path) => Value::LineString(path.iter().map(geo_pos_to_vec).collect()),
            Geometry::Polygon(ring) => Value::Polygon(vec![
                ring.iter()
                    // GeoJSON rings must be closed, so the first and last points must be the same.
                    .chain(ring.first())
                    .map(geo_pos_to_vec)
                    .collect(),
            ]),
        };
        GeoJsonGeometry::new(value)
    }
}

impl From<&Feature> for geojson::Feature {
    fn from(feature: &Feature) -> Self {
        geojson::Feature {
            geometry: Some(GeoJsonGeometry::from(&feature.geometry)),
            properties: Some(feature.properties.clone()),
            ..Default::default()
        }
    }
}

impl VectorLayer {
    /// The features of the layer as a GeoJSON feature collection.
    pub fn to_feature_collection(&self) -> FeatureCollection {
        FeatureCollection {
            bbox: None,
            features: self.features().iter().map(geojson::Feature::from).collect(),
            foreign_members: None,
        }
    }
}
