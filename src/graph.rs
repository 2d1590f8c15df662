//! Turns locate results into features that can be drawn on the map.

use log::{debug, warn};

use crate::layers::Feature;
use crate::polyline;
use crate::projection::{GeoPos, geodesic_circle};
use crate::valhalla::LocateResult;

/// Number of vertices used to approximate a bounding circle.
pub const CIRCLE_STEPS: usize = 64;

/// The drawable graph found around the requested locations.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LocateGraph {
    /// Edge shapes, with `id` and `forward` properties.
    pub edges: Vec<Feature>,
    /// Bounding circles of the edges, with `edge` and `radius` properties.
    pub circles: Vec<Feature>,
    /// Candidate nodes, with `id` and, when known, `deadend` properties.
    pub nodes: Vec<Feature>,
    /// Number of edge shapes that could not be decoded.
    pub skipped_shapes: usize,
}

impl LocateGraph {
    /// Builds the graph for `results`, decoding edge shapes with `precision` digits.
    ///
    /// Edges are numbered in response order across all locations, whether or not they carry a
    /// shape. Locations without edges contribute nothing. An edge whose shape fails to decode is
    /// left out and counted in `skipped_shapes`.
    pub fn from_results(results: &[LocateResult], precision: u32) -> Self {
        let mut graph = Self::default();
        let mut id: u64 = 0;

        for (location_idx, location) in results.iter().enumerate() {
            let Some(edges) = &location.edges else {
                debug!("Location {} has no edges", location_idx);
                continue;
            };

            for edge in edges {
                if let Some(shape) = &edge.edge_info.shape {
                    match polyline::decode_with_precision(shape, precision) {
                        Ok(path) => graph.edges.push(
                            Feature::line(path)
                                .with_property("id", id)
                                .with_property("forward", edge.edge.forward),
                        ),
                        Err(e) => {
                            warn!("Skipping shape of edge {}: {}", id, e);
                            graph.skipped_shapes += 1;
                        }
                    }
                }

                for circle in &edge.bounding_circle {
                    let center = GeoPos {
                        lon: circle.lon,
                        lat: circle.lat,
                    };
                    graph.circles.push(
                        Feature::polygon(geodesic_circle(center, circle.radius, CIRCLE_STEPS))
                            .with_property("edge", id)
                            .with_property("radius", circle.radius),
                    );
                }

                id += 1;
            }

            for node in location.nodes.iter().flatten() {
                let mut feature = Feature::point(GeoPos {
                    lon: node.lon,
                    lat: node.lat,
                })
                .with_property("id", node.node_id.id);
                if let Some(deadend) = node.deadend {
                    feature = feature.with_property("deadend", deadend);
                }
                graph.nodes.push(feature);
            }
        }

        graph
    }

    /// Whether nothing drawable was found.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty() && self.circles.is_empty() && self.nodes.is_empty()
    }
}
