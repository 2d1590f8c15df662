//! The state of a locate session, driven by the viewer's events.
//!
//! ```text
//!                 map clicked (adds a point)
//!                   ┌──────┐
//!                   ▼      │
//!  ┌────────────────────┐  │   results received   ┌────────────────┐
//!  │   AwaitingInput    ├──┴─────────────────────►│ ShowingResults │
//!  └────────────────────┘◄─────────────────────────┴────────────────┘
//!                     map clicked (starts over) / cleared
//! ```

use log::debug;

use crate::config::LocateConfig;
use crate::graph::LocateGraph;
use crate::projection::GeoPos;
use crate::valhalla::LocateRequest;

/// Where the session is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Points are being collected.
    #[default]
    AwaitingInput,
    /// A response is on display.
    ShowingResults,
}

/// Clicked points and the graph found for them.
#[derive(Clone, Debug, Default)]
pub struct LocateSession {
    state: SessionState,
    points: Vec<GeoPos>,
    graph: LocateGraph,
}

impl LocateSession {
    /// A session without points.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The clicked points, in click order.
    pub fn points(&self) -> &[GeoPos] {
        &self.points
    }

    /// The graph on display. Empty unless the session is showing results.
    pub fn graph(&self) -> &LocateGraph {
        &self.graph
    }

    /// Handles a click on the map. A click while results are shown starts a new set of points.
    ///
    /// Returns `true` if the previous results were discarded.
    pub fn map_clicked(&mut self, pos: GeoPos) -> bool {
        let discarded = self.state == SessionState::ShowingResults;
        if discarded {
            debug!("Starting over after showing results");
            self.clear();
        }
        self.points.push(pos);
        discarded
    }

    /// The request for the points clicked so far, or `None` if there are none.
    pub fn locate_requested(&self, config: &LocateConfig) -> Option<LocateRequest> {
        (!self.points.is_empty()).then(|| LocateRequest::new(&self.points, config))
    }

    /// Shows `graph` for the current points.
    pub fn results_received(&mut self, graph: LocateGraph) {
        self.graph = graph;
        self.state = SessionState::ShowingResults;
    }

    /// Forgets points and results.
    pub fn clear(&mut self) {
        self.points.clear();
        self.graph = LocateGraph::default();
        self.state = SessionState::AwaitingInput;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::Feature;

    fn graph_with_node() -> LocateGraph {
        LocateGraph {
            nodes: vec![Feature::point(GeoPos::default())],
            ..Default::default()
        }
    }

    #[test]
    fn collects_points_while_awaiting_input() {
        let mut session = LocateSession::new();
        assert_eq!(session.state(), SessionState::AwaitingInput);

        assert!(!session.map_clicked(GeoPos { lon: 1.0, lat: 2.0 }));
        assert!(!session.map_clicked(GeoPos { lon: 3.0, lat: 4.0 }));
        assert_eq!(session.points().len(), 2);
        assert_eq!(session.state(), SessionState::AwaitingInput);
    }

    #[test]
    fn no_request_without_points() {
        let session = LocateSession::new();
        assert!(session.locate_requested(&LocateConfig::default()).is_none());
    }

    #[test]
    fn request_contains_points_in_click_order() {
        let mut session = LocateSession::new();
        session.map_clicked(GeoPos { lon: 1.0, lat: 2.0 });
        session.map_clicked(GeoPos { lon: 3.0, lat: 4.0 });

        let request = session.locate_requested(&LocateConfig::default()).unwrap();
        assert_eq!(request.locations.len(), 2);
        assert_eq!(request.locations[0].lon, 1.0);
        assert_eq!(request.locations[1].lat, 4.0);
    }

    #[test]
    fn click_after_results_starts_over() {
        let mut session = LocateSession::new();
        session.map_clicked(GeoPos { lon: 1.0, lat: 2.0 });
        session.results_received(graph_with_node());
        assert_eq!(session.state(), SessionState::ShowingResults);
        assert_eq!(session.graph().nodes.len(), 1);

        assert!(session.map_clicked(GeoPos { lon: 5.0, lat: 6.0 }));
        assert_eq!(session.state(), SessionState::AwaitingInput);
        assert_eq!(session.points(), &[GeoPos { lon: 5.0, lat: 6.0 }]);
        assert!(session.graph().is_empty());
    }

    #[test]
    fn clear_resets_everything() {
        let mut session = LocateSession::new();
        session.map_clicked(GeoPos::default());
        session.results_received(graph_with_node());

        session.clear();
        assert_eq!(session.state(), SessionState::AwaitingInput);
        assert!(session.points().is_empty());
        assert!(session.graph().is_empty());
    }
}
