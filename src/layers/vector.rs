//! A layer of styled vector features.
//!
//! # Example
//!
//! ```no_run
//! use eframe::egui;
//! use valhalla_locate_view::{Map, config::OpenStreetMapConfig, projection::GeoPos};
//! use valhalla_locate_view::layers::{Feature, VectorLayer};
//!
//! struct MyApp {
//!     map: Map,
//! }
//!
//! impl Default for MyApp {
//!     fn default() -> Self {
//!         let mut map = Map::new(OpenStreetMapConfig::default());
//!
//!         let mut points = VectorLayer::default();
//!         points.add_feature(Feature::point(GeoPos { lon: 8.54, lat: 47.37 }));
//!         map.add_layer("points", points);
//!
//!         Self { map }
//!     }
//! }
//!
//! impl eframe::App for MyApp {
//!     fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
//!         egui::CentralPanel::default().show(ctx, |ui| {
//!             ui.add(&mut self.map);
//!         });
//!     }
//! }
//! ```

use egui::{Color32, Mesh, Painter, Pos2, Response, Shape, Stroke};
use log::warn;
use serde_json::{Map, Value as JsonValue};
use std::any::Any;

use crate::layers::{Layer, dist_sq_to_segment, point_in_ring};
use crate::projection::{GeoPos, MapProjection};
use crate::style::{CircleStyle, Expression, StrokeStyle};

// Extra screen distance within which a feature counts as hovered.
const HIT_TOLERANCE: f32 = 4.0;

/// The geometry of a feature.
#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    /// A single position.
    Point(GeoPos),
    /// An open path.
    LineString(Vec<GeoPos>),
    /// A closed ring. The first position is not repeated at the end.
    Polygon(Vec<GeoPos>),
}

/// A geometry with properties that styles are evaluated against.
#[derive(Clone, Debug, PartialEq)]
pub struct Feature {
    /// The shape of the feature.
    pub geometry: Geometry,
    /// Free-form properties.
    pub properties: Map<String, JsonValue>,
}

impl Feature {
    /// A point feature without properties.
    pub fn point(pos: GeoPos) -> Self {
        Self::new(Geometry::Point(pos))
    }

    /// A line feature without properties.
    pub fn line(path: Vec<GeoPos>) -> Self {
        Self::new(Geometry::LineString(path))
    }

    /// A polygon feature without properties.
    pub fn polygon(ring: Vec<GeoPos>) -> Self {
        Self::new(Geometry::Polygon(ring))
    }

    fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            properties: Map::new(),
        }
    }

    /// Sets a property, returning the feature.
    pub fn with_property(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

/// How the features of a layer are drawn.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VectorStyle {
    /// Style of point features.
    pub circle: CircleStyle,
    /// Style of lines and polygon outlines.
    pub stroke: StrokeStyle,
    /// Fill colour of polygons.
    pub fill: Option<Expression>,
}

/// A layer that draws points, lines and polygons with expression based styles.
#[derive(Clone)]
pub struct VectorLayer {
    features: Vec<Feature>,

    /// The style of the features.
    pub style: VectorStyle,

    /// Whether the layer is drawn.
    pub visible: bool,

    hovered: Option<usize>,
}

impl Default for VectorLayer {
    fn default() -> Self {
        Self::new(VectorStyle::default())
    }
}

impl VectorLayer {
    /// Creates a new, visible `VectorLayer` with the given style.
    pub fn new(style: VectorStyle) -> Self {
        Self {
            features: Vec::new(),
            style,
            visible: true,
            hovered: None,
        }
    }

    /// Adds a feature on top of the existing ones.
    pub fn add_feature(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    /// Adds several features on top of the existing ones.
    pub fn add_features(&mut self, features: impl IntoIterator<Item = Feature>) {
        self.features.extend(features);
    }

    /// Removes all features.
    pub fn clear(&mut self) {
        self.features.clear();
        self.hovered = None;
    }

    /// The features of the layer, bottom first.
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// The feature under the mouse pointer, if any.
    pub fn hovered_feature(&self) -> Option<&Feature> {
        self.hovered.and_then(|i| self.features.get(i))
    }

    /// Finds the topmost feature drawn at `screen_pos`.
    pub fn feature_at(&self, screen_pos: Pos2, projection: &MapProjection) -> Option<usize> {
        self.features
            .iter()
            .enumerate()
            .rev()
            .find(|(_, feature)| self.hit(feature, screen_pos, projection))
            .map(|(i, _)| i)
    }

    fn hit(&self, feature: &Feature, screen_pos: Pos2, projection: &MapProjection) -> bool {
        match &feature.geometry {
            Geometry::Point(pos) => {
                let circle = self.style.circle.resolve(&feature.properties);
                let reach = circle.radius + circle.stroke.width / 2.0 + HIT_TOLERANCE;
                projection.project(*pos).distance_sq(screen_pos) <= reach * reach
            }
            Geometry::LineString(path) => {
                let stroke = self.style.stroke.resolve(&feature.properties);
                let reach = stroke.width / 2.0 + HIT_TOLERANCE;
                let points: Vec<Pos2> = path.iter().map(|p| projection.project(*p)).collect();
                points
                    .windows(2)
                    .any(|w| dist_sq_to_segment(screen_pos, w[0], w[1]) <= reach * reach)
            }
            Geometry::Polygon(ring) => {
                let points: Vec<Pos2> = ring.iter().map(|p| projection.project(*p)).collect();
                point_in_ring(screen_pos, &points)
            }
        }
    }

    fn draw_polygon(&self, painter: &Painter, points: Vec<Pos2>, feature: &Feature, stroke: Stroke) {
        if points.len() < 3 {
            warn!("Skipping polygon with {} points", points.len());
            return;
        }

        let fill = self
            .style
            .fill
            .as_ref()
            .and_then(|fill| fill.evaluate(&feature.properties).as_color())
            .unwrap_or(Color32::TRANSPARENT);

        if fill != Color32::TRANSPARENT {
            let flat_points: Vec<f64> = points
                .iter()
                .flat_map(|p| [p.x as f64, p.y as f64])
                .collect();
            match earcutr::earcut(&flat_points, &[], 2) {
                Ok(indices) => {
                    let mut mesh = Mesh::default();
                    mesh.vertices = points
                        .iter()
                        .map(|p| egui::epaint::Vertex {
                            pos: *p,
                            uv: Default::default(),
                            color: fill,
                        })
                        .collect();
                    mesh.indices = indices.into_iter().map(|i| i as u32).collect();
                    painter.add(Shape::Mesh(mesh.into()));
                }
                Err(e) => warn!("Failed to triangulate polygon: {:?}", e),
            }
        }

        painter.add(Shape::closed_line(points, stroke));
    }
}

impl Layer for VectorLayer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn handle_input(&mut self, response: &Response, projection: &MapProjection) -> bool {
        self.hovered = if self.visible {
            response
                .hover_pos()
                .and_then(|pos| self.feature_at(pos, projection))
        } else {
            None
        };

        // The layer only inspects, so the map keeps panning and zooming.
        false
    }

    fn draw(&self, painter: &Painter, projection: &MapProjection) {
        if !self.visible {
            return;
        }

        for (i, feature) in self.features.iter().enumerate() {
            let highlight = if self.hovered == Some(i) { 2.0 } else { 0.0 };
            match &feature.geometry {
                Geometry::Point(pos) => {
                    let circle = self.style.circle.resolve(&feature.properties);
                    painter.circle(
                        projection.project(*pos),
                        circle.radius + highlight,
                        circle.fill,
                        circle.stroke,
                    );
                }
                Geometry::LineString(path) => {
                    if path.len() > 1 {
                        let mut stroke = self.style.stroke.resolve(&feature.properties);
                        stroke.width += highlight;
                        let points = path.iter().map(|p| projection.project(*p)).collect();
                        painter.add(Shape::line(points, stroke));
                    }
                }
                Geometry::Polygon(ring) => {
                    let mut stroke = self.style.stroke.resolve(&feature.properties);
                    stroke.width += highlight;
                    let points = ring.iter().map(|p| projection.project(*p)).collect();
                    self.draw_polygon(painter, points, feature, stroke);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::Expression;
    use egui::{Rect, pos2, vec2};

    fn projection() -> MapProjection {
        let rect = Rect::from_min_size(pos2(0.0, 0.0), vec2(800.0, 600.0));
        MapProjection::new(15, GeoPos { lon: 8.0, lat: 47.0 }, rect)
    }

    #[test]
    fn vector_layer_new() {
        let layer = VectorLayer::new(VectorStyle::default());
        assert!(layer.visible);
        assert!(layer.features().is_empty());
        assert!(layer.hovered_feature().is_none());
    }

    #[test]
    fn vector_layer_as_any() {
        let mut layer = VectorLayer::default();
        assert!(layer.as_any().is::<VectorLayer>());
        assert!(layer.as_any_mut().is::<VectorLayer>());
    }

    #[test]
    fn feature_properties() {
        let feature = Feature::point(GeoPos::default())
            .with_property("id", 3)
            .with_property("forward", true);
        assert_eq!(feature.properties["id"], JsonValue::from(3));
        assert_eq!(feature.properties["forward"], JsonValue::from(true));
    }

    #[test]
    fn add_and_clear_features() {
        let mut layer = VectorLayer::default();
        layer.add_feature(Feature::point(GeoPos::default()));
        layer.add_features(vec![
            Feature::line(vec![GeoPos::default(); 2]),
            Feature::polygon(vec![GeoPos::default(); 3]),
        ]);
        assert_eq!(layer.features().len(), 3);

        layer.clear();
        assert!(layer.features().is_empty());
    }

    #[test]
    fn hit_testing_prefers_the_topmost_feature() {
        let projection = projection();
        let center = GeoPos { lon: 8.0, lat: 47.0 };
        let screen_center = projection.project(center);

        let mut layer = VectorLayer::default();
        layer.add_feature(Feature::polygon(vec![
            GeoPos { lon: 7.99, lat: 46.99 },
            GeoPos { lon: 8.01, lat: 46.99 },
            GeoPos { lon: 8.01, lat: 47.01 },
            GeoPos { lon: 7.99, lat: 47.01 },
        ]));
        layer.add_feature(Feature::point(center));

        assert_eq!(layer.feature_at(screen_center, &projection), Some(1));
        assert_eq!(
            layer.feature_at(screen_center + vec2(30.0, 30.0), &projection),
            Some(0)
        );
        assert_eq!(
            layer.feature_at(screen_center + vec2(390.0, 290.0), &projection),
            None
        );
    }

    #[test]
    fn lines_are_hit_along_their_segments() {
        let projection = projection();
        let a = GeoPos { lon: 7.999, lat: 47.0 };
        let b = GeoPos { lon: 8.001, lat: 47.0 };

        let mut layer = VectorLayer::default();
        layer.style.stroke.width = Expression::literal(6.0);
        layer.add_feature(Feature::line(vec![a, b]));

        let mid = projection.project(GeoPos { lon: 8.0, lat: 47.0 });
        assert_eq!(layer.feature_at(mid + vec2(0.0, 5.0), &projection), Some(0));
        assert_eq!(layer.feature_at(mid + vec2(0.0, 20.0), &projection), None);
    }
}
