//! The locate viewer: click points on the map, look them up, and inspect the graph around them.

use eframe::egui;
use log::{error, info};
use poll_promise::Promise;

use crate::Map;
use crate::config::{LocateConfig, MapConfig, osm_permalink};
use crate::graph::LocateGraph;
use crate::layers::{Feature, VectorLayer, VectorStyle};
use crate::projection::GeoPos;
use crate::session::{LocateSession, SessionState};
use crate::style::{CircleStyle, DEFAULT_PALETTE, Expression, StrokeStyle, Value, make_match_expression};
use crate::valhalla::{LocateResponse, ValhallaClient, ValhallaError};

/// Layer with the bounding circles and decoded edge shapes.
pub const EDGE_LAYER: &str = "edges";
/// Layer with the candidate nodes.
pub const NODE_LAYER: &str = "nodes";
/// Layer with the clicked locations.
pub const CLICKED_LAYER: &str = "clicked";

/// Style of the clicked locations: small translucent red dots.
pub fn clicked_style() -> VectorStyle {
    VectorStyle::default()
}

/// Style of the candidate nodes: even ids are drawn larger, dead ends get a thick outline.
pub fn node_style() -> VectorStyle {
    VectorStyle {
        circle: CircleStyle {
            radius: Expression::get("id")
                .modulo(Expression::literal(2.0))
                .matching(
                    vec![(Value::Number(0.0), Expression::literal(12.0))],
                    Expression::literal(7.0),
                ),
            fill_color: make_match_expression(&DEFAULT_PALETTE, Some(0.5), "id"),
            stroke_color: make_match_expression(&DEFAULT_PALETTE, None, "id"),
            stroke_width: Expression::get("deadend").matching(
                vec![
                    (Value::Bool(true), Expression::literal(5.0)),
                    (Value::Bool(false), Expression::literal(2.0)),
                ],
                Expression::literal(2.0),
            ),
        },
        ..Default::default()
    }
}

/// Style of the edges, coloured by direction, and of their bounding circles.
pub fn edge_style() -> VectorStyle {
    VectorStyle {
        stroke: StrokeStyle {
            color: make_match_expression(&DEFAULT_PALETTE, Some(0.7), "forward"),
            width: Expression::literal(5.0),
        },
        fill: Some(Expression::literal("rgba(255, 255, 255, 0.4)")),
        ..Default::default()
    }
}

/// The locate viewer application.
pub struct LocateApp {
    map: Map,
    session: LocateSession,
    config: LocateConfig,
    client: Result<ValhallaClient, String>,
    pending: Option<Promise<Result<LocateResponse, ValhallaError>>>,
    json_output: String,
    status: String,
}

impl LocateApp {
    /// Creates the viewer for the given tile provider and locate service.
    pub fn new(map_config: impl MapConfig + 'static, config: LocateConfig) -> Self {
        let mut map = Map::new(map_config);
        map.add_layer(EDGE_LAYER, VectorLayer::new(edge_style()));
        map.add_layer(NODE_LAYER, VectorLayer::new(node_style()));
        map.add_layer(CLICKED_LAYER, VectorLayer::new(clicked_style()));

        let client = ValhallaClient::new(&config).map_err(|e| {
            error!("Unable to create the routing service client: {}", e);
            e.to_string()
        });

        Self {
            map,
            session: LocateSession::new(),
            config,
            client,
            pending: None,
            json_output: String::new(),
            status: "Click on the map to add locations".to_string(),
        }
    }

    /// Feeds a click on the map into the session and mirrors the result on the layers.
    fn handle_map_click(&mut self, pos: GeoPos) {
        if self.session.map_clicked(pos) {
            self.json_output.clear();
        }
        self.sync_layers();
        self.status = format!("{} location(s) selected", self.session.points().len());
    }

    /// Starts a locate request for the clicked points in the background.
    fn start_locate(&mut self) {
        let Some(request) = self.session.locate_requested(&self.config) else {
            self.status = "Click on the map to add locations first".to_string();
            return;
        };
        let client = match &self.client {
            Ok(client) => client.clone(),
            Err(e) => {
                self.status = e.clone();
                return;
            }
        };

        info!("Locating {} point(s)", request.locations.len());
        self.status = "Locating…".to_string();
        self.pending = Some(Promise::spawn_thread("locate", move || {
            client.locate(&request)
        }));
    }

    /// Picks up a finished locate request.
    fn poll_locate(&mut self, ctx: &egui::Context) {
        let Some(promise) = &self.pending else {
            return;
        };
        let Some(result) = promise.ready() else {
            ctx.request_repaint();
            return;
        };

        match result {
            Ok(response) => {
                self.json_output = response.pretty();
                let graph = LocateGraph::from_results(&response.results, self.config.precision);
                self.status = format!(
                    "{} edge(s), {} node(s)",
                    graph.edges.len(),
                    graph.nodes.len()
                );
                if graph.skipped_shapes > 0 {
                    self.status
                        .push_str(&format!(", {} shape(s) not decodable", graph.skipped_shapes));
                }
                self.session.results_received(graph);
            }
            Err(e) => {
                error!("Locate failed: {}", e);
                self.status = e.to_string();
            }
        }
        self.pending = None;
        self.sync_layers();
    }

    /// Forgets the clicked points and results.
    fn clear(&mut self) {
        self.session.clear();
        self.json_output.clear();
        self.sync_layers();
        self.status = "Click on the map to add locations".to_string();
    }

    /// Rebuilds the layers from the session.
    fn sync_layers(&mut self) {
        let graph = self.session.graph();
        if let Some(edges) = self.map.layer_mut::<VectorLayer>(EDGE_LAYER) {
            edges.clear();
            edges.add_features(graph.circles.iter().cloned());
            edges.add_features(graph.edges.iter().cloned());
        }
        if let Some(nodes) = self.map.layer_mut::<VectorLayer>(NODE_LAYER) {
            nodes.clear();
            nodes.add_features(graph.nodes.iter().cloned());
        }
        if let Some(clicked) = self.map.layer_mut::<VectorLayer>(CLICKED_LAYER) {
            clicked.clear();
            clicked.add_features(self.session.points().iter().copied().map(Feature::point));
        }
    }

    fn hovered_feature(&self) -> Option<&Feature> {
        [CLICKED_LAYER, NODE_LAYER, EDGE_LAYER]
            .into_iter()
            .filter_map(|key| self.map.layer::<VectorLayer>(key))
            .find_map(|layer| layer.hovered_feature())
    }

    fn side_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("Locate");
        ui.label(format!("Service: {}", self.config.service_url));

        ui.horizontal(|ui| {
            let busy = self.pending.is_some();
            let can_locate = !busy && !self.session.points().is_empty();
            if ui
                .add_enabled(can_locate, egui::Button::new("Locate"))
                .clicked()
            {
                self.start_locate();
            }
            if ui.add_enabled(!busy, egui::Button::new("Clear")).clicked() {
                self.clear();
            }
        });

        ui.label(match self.session.state() {
            SessionState::AwaitingInput => "Selecting locations",
            SessionState::ShowingResults => "Showing results, click the map to start over",
        });
        ui.label(&self.status);
        ui.hyperlink_to("Open in OpenStreetMap", osm_permalink(self.map.center, self.map.zoom));

        if let Some(pos) = self.map.mouse_pos {
            ui.label(format!("{:.6}, {:.6}", pos.lat, pos.lon));
        }

        if let Some(feature) = self.hovered_feature() {
            ui.separator();
            ui.label("Hovered feature");
            ui.monospace(serde_json::Value::Object(feature.properties.clone()).to_string());
        }

        ui.separator();
        self.geojson_button(ui);

        egui::ScrollArea::vertical().show(ui, |ui| {
            ui.add(
                egui::TextEdit::multiline(&mut self.json_output.as_str())
                    .code_editor()
                    .desired_width(f32::INFINITY),
            );
        });
    }

    #[cfg(feature = "geojson")]
    fn geojson_button(&self, ui: &mut egui::Ui) {
        if ui
            .add_enabled(!self.session.graph().is_empty(), egui::Button::new("Copy GeoJSON"))
            .clicked()
        {
            self.copy_geojson(ui.ctx());
        }
    }

    #[cfg(not(feature = "geojson"))]
    fn geojson_button(&self, _ui: &mut egui::Ui) {}

    #[cfg(feature = "geojson")]
    fn copy_geojson(&self, ctx: &egui::Context) {
        let mut combined = VectorLayer::default();
        for key in [EDGE_LAYER, NODE_LAYER, CLICKED_LAYER] {
            if let Some(layer) = self.map.layer::<VectorLayer>(key) {
                combined.add_features(layer.features().iter().cloned());
            }
        }
        match serde_json::to_string_pretty(&combined.to_feature_collection()) {
            Ok(json) => ctx.copy_text(json),
            Err(e) => error!("Failed to serialize GeoJSON: {}", e),
        }
    }
}

impl eframe::App for LocateApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_locate(ctx);

        egui::SidePanel::right("locate_panel")
            .default_width(320.0)
            .show(ctx, |ui| self.side_panel(ui));

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                ui.add(&mut self.map);
            });

        if let Some(pos) = self.map.take_click() {
            self.handle_map_click(pos);
        }
    }
}
