//! Request and response model for Valhalla's locate endpoint, and a blocking client for it.

use log::{debug, error};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::LocateConfig;
use crate::projection::GeoPos;

/// Service actions the viewer knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    /// Returns the graph edges and nodes near each location.
    Locate,
    /// Map-matches a trace onto the graph.
    TraceRoute,
}

impl Action {
    /// The URL path of the action.
    pub fn path(self) -> &'static str {
        match self {
            Action::Locate => "/locate",
            Action::TraceRoute => "/trace_route",
        }
    }
}

/// Which side of the street a location prefers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferredSide {
    /// The same side as the location.
    #[default]
    Same,
    /// The opposite side.
    Opposite,
    /// Either side.
    Either,
}

/// A location in a request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Location {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Preferred side of the street.
    pub preferred_side: PreferredSide,
    /// Cut-off of the candidate search in meters.
    pub search_cutoff: u32,
}

impl Location {
    /// A location at `pos` with the default search settings.
    pub fn from_pos(pos: GeoPos) -> Self {
        Self {
            lat: pos.lat,
            lon: pos.lon,
            preferred_side: PreferredSide::Same,
            search_cutoff: 50,
        }
    }
}

/// Body of a `/locate` request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LocateRequest {
    /// The locations to look up.
    pub locations: Vec<Location>,
    /// Costing model used to filter edges.
    pub costing: String,
    /// Whether to return full edge and node details.
    pub verbose: bool,
    /// Search radius in meters.
    pub radius: u32,
    /// Node snapping tolerance in meters.
    pub node_snap_tolerance: u32,
}

impl LocateRequest {
    /// A verbose request for `points`, using the search settings of `config`.
    pub fn new(points: &[GeoPos], config: &LocateConfig) -> Self {
        Self {
            locations: points
                .iter()
                .map(|p| Location {
                    search_cutoff: config.search_cutoff,
                    ..Location::from_pos(*p)
                })
                .collect(),
            costing: config.costing.clone(),
            verbose: true,
            radius: config.radius,
            node_snap_tolerance: config.node_snap_tolerance,
        }
    }
}

/// The result for one requested location.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct LocateResult {
    /// Latitude of the requested location.
    #[serde(default)]
    pub input_lat: f64,
    /// Longitude of the requested location.
    #[serde(default)]
    pub input_lon: f64,
    /// Candidate edges, `null` when nothing was found.
    #[serde(default)]
    pub edges: Option<Vec<LocatedEdge>>,
    /// Candidate nodes, `null` when nothing was found.
    #[serde(default)]
    pub nodes: Option<Vec<LocatedNode>>,
}

/// A candidate edge.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct LocatedEdge {
    /// Shared edge information.
    #[serde(default)]
    pub edge_info: EdgeInfo,
    /// Directed edge attributes.
    #[serde(default)]
    pub edge: EdgeAttributes,
    /// Circles bounding the edge shape.
    #[serde(default)]
    pub bounding_circle: Vec<BoundingCircle>,
}

/// Edge information shared by both directions of an edge.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct EdgeInfo {
    /// The encoded shape of the edge.
    #[serde(default)]
    pub shape: Option<String>,
    /// The OSM way the edge was built from.
    #[serde(default)]
    pub way_id: Option<u64>,
}

/// Directed edge attributes.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct EdgeAttributes {
    /// Whether the edge runs in the direction of its shape.
    #[serde(default)]
    pub forward: bool,
}

/// A circle bounding part of an edge shape.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
pub struct BoundingCircle {
    /// Latitude of the center.
    pub lat: f64,
    /// Longitude of the center.
    pub lon: f64,
    /// Radius in meters.
    pub radius: f64,
}

/// A candidate node.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct LocatedNode {
    /// Latitude of the node.
    pub lat: f64,
    /// Longitude of the node.
    pub lon: f64,
    /// Graph id of the node.
    #[serde(default)]
    pub node_id: NodeId,
    /// Whether the node is a dead end, when the service reports it.
    #[serde(default)]
    pub deadend: Option<bool>,
}

/// A graph id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct NodeId {
    /// Index within the tile.
    #[serde(default)]
    pub id: u64,
    /// Tile index.
    #[serde(default)]
    pub tile_id: u64,
    /// Hierarchy level.
    #[serde(default)]
    pub level: u8,
}

/// A parsed `/locate` response.
#[derive(Clone, Debug, PartialEq)]
pub struct LocateResponse {
    /// One result per requested location, in request order.
    pub results: Vec<LocateResult>,
    /// The response as received.
    pub raw: serde_json::Value,
}

impl LocateResponse {
    /// Parses a response body.
    pub fn from_json(raw: serde_json::Value) -> Result<Self, ValhallaError> {
        let results = serde_json::from_value(raw.clone())?;
        Ok(Self { results, raw })
    }

    /// The raw response pretty-printed for display.
    pub fn pretty(&self) -> String {
        serde_json::to_string_pretty(&self.raw).unwrap_or_else(|_| self.raw.to_string())
    }
}

/// Errors that can occur while talking to the service.
#[derive(Error, Debug)]
pub enum ValhallaError {
    /// The request could not be sent or the body could not be read.
    #[error("Request to the routing service failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered with an error status.
    #[error("Routing service answered with HTTP {status}: {body}")]
    Status {
        /// The HTTP status.
        status: reqwest::StatusCode,
        /// The response body, usually a JSON error document.
        body: String,
    },

    /// The body was not the expected JSON.
    #[error("Failed to parse routing service response: {0}")]
    Parse(#[from] serde_json::Error),

    /// The request contained no locations.
    #[error("No locations to look up")]
    NoLocations,
}

/// A blocking client for a Valhalla service.
#[derive(Clone, Debug)]
pub struct ValhallaClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl ValhallaClient {
    /// A client for the service configured in `config`.
    pub fn new(config: &LocateConfig) -> Result<Self, ValhallaError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            base_url: config.service_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// The URL of `action` on this service.
    pub fn url(&self, action: Action) -> String {
        format!("{}{}", self.base_url, action.path())
    }

    /// Looks up the graph around the request's locations.
    pub fn locate(&self, request: &LocateRequest) -> Result<LocateResponse, ValhallaError> {
        if request.locations.is_empty() {
            return Err(ValhallaError::NoLocations);
        }

        let raw = self.post(Action::Locate, request)?;
        LocateResponse::from_json(raw)
    }

    fn post<B: Serialize>(&self, action: Action, body: &B) -> Result<serde_json::Value, ValhallaError> {
        let url = self.url(action);
        debug!("POST {}", url);

        let response = self.client.post(&url).json(body).send()?;
        let status = response.status();
        let text = response.text()?;

        if !status.is_success() {
            error!("{} answered with {}: {}", url, status, text);
            return Err(ValhallaError::Status { status, body: text });
        }

        serde_json::from_str(&text).map_err(|e| {
            error!("Failed to parse response from {}: {}. Body: {}", url, e, text);
            ValhallaError::from(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_paths() {
        assert_eq!(Action::Locate.path(), "/locate");
        assert_eq!(Action::TraceRoute.path(), "/trace_route");
    }

    #[test]
    fn location_from_clicked_position() {
        let location = Location::from_pos(GeoPos { lon: 8.5, lat: 47.3 });
        assert_eq!(
            serde_json::to_value(&location).unwrap(),
            json!({
                "lat": 47.3,
                "lon": 8.5,
                "preferred_side": "same",
                "search_cutoff": 50,
            })
        );
    }

    #[test]
    fn locate_request_body() {
        let points = [GeoPos { lon: 8.5, lat: 47.3 }, GeoPos { lon: 8.6, lat: 47.4 }];
        let request = LocateRequest::new(&points, &LocateConfig::default());

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["costing"], json!("auto"));
        assert_eq!(body["verbose"], json!(true));
        assert_eq!(body["radius"], json!(1));
        assert_eq!(body["node_snap_tolerance"], json!(0));
        assert_eq!(body["locations"].as_array().unwrap().len(), 2);
        assert_eq!(body["locations"][1]["lon"], json!(8.6));
    }

    #[test]
    fn parses_verbose_locate_response() {
        let raw = json!([
            {
                "input_lat": 47.3,
                "input_lon": 8.5,
                "edges": [
                    {
                        "edge_id": { "id": 12, "level": 2, "tile_id": 7 },
                        "edge_info": { "shape": "_p~iF~ps|U", "way_id": 42, "names": ["Main"] },
                        "edge": { "forward": true, "speed": 50 },
                        "bounding_circle": [{ "lat": 47.3, "lon": 8.5, "radius": 12.5 }],
                        "percent_along": 0.5
                    }
                ],
                "nodes": [
                    { "lat": 47.31, "lon": 8.51, "node_id": { "id": 3, "tile_id": 7, "level": 2, "value": 1 } }
                ]
            },
            { "input_lat": 0.0, "input_lon": 0.0, "edges": null, "nodes": null }
        ]);

        let response = LocateResponse::from_json(raw.clone()).unwrap();
        assert_eq!(response.raw, raw);
        assert_eq!(response.results.len(), 2);

        let first = &response.results[0];
        let edges = first.edges.as_ref().unwrap();
        assert_eq!(edges[0].edge_info.shape.as_deref(), Some("_p~iF~ps|U"));
        assert_eq!(edges[0].edge_info.way_id, Some(42));
        assert!(edges[0].edge.forward);
        assert_eq!(edges[0].bounding_circle[0].radius, 12.5);

        let nodes = first.nodes.as_ref().unwrap();
        assert_eq!(nodes[0].node_id.id, 3);
        assert_eq!(nodes[0].deadend, None);

        assert!(response.results[1].edges.is_none());
    }

    #[test]
    fn missing_optional_fields_default() {
        let raw = json!([{ "edges": [{}] }]);
        let response = LocateResponse::from_json(raw).unwrap();
        let edge = &response.results[0].edges.as_ref().unwrap()[0];
        assert!(edge.edge_info.shape.is_none());
        assert!(!edge.edge.forward);
        assert!(edge.bounding_circle.is_empty());
    }

    #[test]
    fn non_array_response_is_a_parse_error() {
        let result = LocateResponse::from_json(json!({ "error": "No suitable edges" }));
        assert!(matches!(result, Err(ValhallaError::Parse(_))));
    }

    #[test]
    fn client_urls() {
        let config = LocateConfig {
            service_url: "http://valhalla:8002/".to_string(),
            ..LocateConfig::default()
        };
        let client = ValhallaClient::new(&config).unwrap();
        assert_eq!(client.url(Action::Locate), "http://valhalla:8002/locate");
    }

    #[test]
    fn empty_request_is_rejected_without_a_call() {
        let client = ValhallaClient::new(&LocateConfig::default()).unwrap();
        let request = LocateRequest::new(&[], &LocateConfig::default());
        assert!(matches!(
            client.locate(&request),
            Err(ValhallaError::NoLocations)
        ));
    }
}
