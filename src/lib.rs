#![warn(missing_docs)]

//! A map viewer for inspecting the graph around locations, as returned by Valhalla's `locate`
//! endpoint.
//!
//! The crate is built from a few independent pieces:
//!
//! * [`polyline`] decodes the encoded shapes found in routing service responses.
//! * [`valhalla`] builds locate requests and parses their responses.
//! * [`graph`] turns those responses into features, and [`style`] decides how they look.
//! * [`Map`] is an `egui` slippy map widget that draws [`layers`] of features over tiles.
//! * [`app::LocateApp`] wires everything into an `eframe` application.
//!
//! # Example
//!
//! ```no_run
//! use eframe::egui;
//! use valhalla_locate_view::{Map, config::OpenStreetMapConfig};
//!
//! struct MyApp {
//!     map: Map,
//! }
//!
//! impl Default for MyApp {
//!     fn default() -> Self {
//!         Self {
//!             map: Map::new(OpenStreetMapConfig::default()),
//!         }
//!     }
//! }
//!
//! impl eframe::App for MyApp {
//!     fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
//!         egui::CentralPanel::default()
//!             .frame(egui::Frame::NONE)
//!             .show(ctx, |ui| {
//!                 ui.add(&mut self.map);
//!                 if let Some(pos) = self.map.take_click() {
//!                     println!("clicked at {:?}", pos);
//!                 }
//!             });
//!     }
//! }
//! ```

/// The locate viewer application.
pub mod app;

/// Configuration traits and types for the map widget and the locate service.
pub mod config;

/// Conversion of locate responses into drawable features.
pub mod graph;

/// Map layers.
pub mod layers;

/// Encoded polyline decoding.
pub mod polyline;

/// Map projection and geodesic helpers.
pub mod projection;

/// Explicit state of a locate session.
pub mod session;

/// Style expressions.
pub mod style;

/// Basemap tiles.
pub mod tiles;

/// Locate requests, responses and client.
pub mod valhalla;

use egui::{Color32, Rect, Response, Sense, Ui, Widget};

use crate::config::MapConfig;
use crate::layers::Layer;
use crate::projection::{GeoPos, MapProjection, TILE_SIZE, lat_to_y, lon_to_x, x_to_lon, y_to_lat};
use crate::tiles::{TileCache, visible_tiles};

/// The minimum zoom level.
pub const MIN_ZOOM: u8 = 0;
/// The maximum zoom level.
pub const MAX_ZOOM: u8 = 19;

/// The map widget.
pub struct Map {
    /// The geographical center of the map.
    pub center: GeoPos,

    /// The zoom level of the map.
    pub zoom: u8,

    /// The geographical position under the mouse pointer, if any.
    pub mouse_pos: Option<GeoPos>,

    tiles: TileCache,
    layers: Vec<(String, Box<dyn Layer>)>,
    clicked: Option<GeoPos>,
}

impl Map {
    /// Creates a new `Map` widget.
    ///
    /// # Arguments
    ///
    /// * `config` - A type that implements `MapConfig`, which provides configuration for the map.
    pub fn new<C: MapConfig + 'static>(config: C) -> Self {
        let center = config.default_center();
        let zoom = config.default_zoom();
        Self {
            center,
            zoom,
            mouse_pos: None,
            tiles: TileCache::new(Box::new(config)),
            layers: Vec::new(),
            clicked: None,
        }
    }

    /// Adds a layer on top of the existing ones. A layer with the same key is replaced in place.
    pub fn add_layer(&mut self, key: impl Into<String>, layer: impl Layer) {
        let key = key.into();
        let layer: Box<dyn Layer> = Box::new(layer);
        match self.layers.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = layer,
            None => self.layers.push((key, layer)),
        }
    }

    /// Removes a layer, returning whether it existed.
    pub fn remove_layer(&mut self, key: &str) -> bool {
        let before = self.layers.len();
        self.layers.retain(|(k, _)| k != key);
        self.layers.len() != before
    }

    /// The layer keys, bottom first.
    pub fn layer_keys(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().map(|(k, _)| k.as_str())
    }

    /// Gets a layer by key, if it exists and has type `T`.
    pub fn layer<T: Layer>(&self, key: &str) -> Option<&T> {
        self.layers
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, layer)| layer.as_any().downcast_ref::<T>())
    }

    /// Gets a mutable layer by key, if it exists and has type `T`.
    pub fn layer_mut<T: Layer>(&mut self, key: &str) -> Option<&mut T> {
        self.layers
            .iter_mut()
            .find(|(k, _)| k == key)
            .and_then(|(_, layer)| layer.as_any_mut().downcast_mut::<T>())
    }

    /// Returns the position of the last single click on the map, once.
    pub fn take_click(&mut self) -> Option<GeoPos> {
        self.clicked.take()
    }

    /// The projection of the map drawn into `rect`.
    pub fn projection(&self, rect: Rect) -> MapProjection {
        MapProjection::new(self.zoom, self.center, rect)
    }

    /// Handles user input for panning, zooming and clicking.
    fn handle_input(&mut self, ui: &Ui, rect: &Rect, response: &Response) {
        let projection = self.projection(*rect);

        // Topmost layers get the first say.
        let mut consumed = false;
        for (_, layer) in self.layers.iter_mut().rev() {
            if layer.handle_input(response, &projection) {
                consumed = true;
                break;
            }
        }

        self.mouse_pos = response.hover_pos().map(|pos| projection.unproject(pos));

        if consumed {
            return;
        }

        if response.dragged() {
            let delta = response.drag_delta();
            let (center_x, center_y) = projection.center_tile();
            self.set_center_clamped(
                center_x - delta.x as f64 / TILE_SIZE as f64,
                center_y - delta.y as f64 / TILE_SIZE as f64,
                rect,
            );
        }

        if response.clicked() {
            if let Some(pointer_pos) = response.interact_pointer_pos() {
                self.clicked = Some(projection.unproject(pointer_pos));
            }
        }

        if response.double_clicked() {
            if let Some(pointer_pos) = response.interact_pointer_pos() {
                // Zoom in and center the map on the clicked location.
                if self.zoom < MAX_ZOOM {
                    self.center = projection.unproject(pointer_pos);
                    self.zoom += 1;
                }
            }
        }

        if let Some(hover_pos) = response.hover_pos() {
            let scroll = ui.input(|i| i.raw_scroll_delta.y);
            if scroll != 0.0 {
                let new_zoom = (self.zoom as i32 + scroll.signum() as i32)
                    .clamp(MIN_ZOOM as i32, MAX_ZOOM as i32) as u8;
                self.zoom_around(hover_pos, new_zoom, rect);
            }
        }
    }

    /// Changes the zoom level while keeping the geographical position under `anchor` in place.
    fn zoom_around(&mut self, anchor: egui::Pos2, new_zoom: u8, rect: &Rect) {
        if new_zoom == self.zoom {
            return;
        }

        // Refuse to zoom out further than the world fills the widget.
        let world_pixel_size = 2.0_f64.powi(new_zoom as i32) * TILE_SIZE as f64;
        if new_zoom < self.zoom
            && (world_pixel_size < rect.width() as f64 || world_pixel_size < rect.height() as f64)
        {
            return;
        }

        let target = self.projection(*rect).unproject(anchor);
        let offset = anchor - rect.center();

        self.zoom = new_zoom;
        self.set_center_clamped(
            lon_to_x(target.lon, new_zoom) - offset.x as f64 / TILE_SIZE as f64,
            lat_to_y(target.lat, new_zoom) - offset.y as f64 / TILE_SIZE as f64,
            rect,
        );
    }

    /// Sets the center from tile coordinates, keeping the world inside the widget.
    fn set_center_clamped(&mut self, x: f64, y: f64, rect: &Rect) {
        let world = 2.0_f64.powi(self.zoom as i32);
        let clamp = |value: f64, view: f64| {
            let (min, max) = (view / 2.0, world - view / 2.0);
            // If the map is smaller than the viewport, center it.
            if min > max {
                world / 2.0
            } else {
                value.clamp(min, max)
            }
        };

        let x = clamp(x, rect.width() as f64 / TILE_SIZE as f64);
        let y = clamp(y, rect.height() as f64 / TILE_SIZE as f64);
        self.center = GeoPos {
            lon: x_to_lon(x, self.zoom),
            lat: y_to_lat(y, self.zoom),
        };
    }

    /// Draws the tiles, the layers and the attribution.
    fn draw(&mut self, ui: &mut Ui, rect: &Rect) {
        let painter = ui.painter_at(*rect);
        painter.rect_filled(*rect, 0.0, Color32::from_gray(220));

        let projection = self.projection(*rect);
        for (tile_id, tile_pos) in visible_tiles(&projection) {
            self.tiles.load(ui.ctx(), tile_id);
            self.tiles.draw(&painter, &tile_id, tile_pos);

            if let Some(e) = self.tiles.error(&tile_id) {
                let tile_rect = Rect::from_min_size(
                    tile_pos,
                    egui::vec2(TILE_SIZE as f32, TILE_SIZE as f32),
                );
                ui.interact(tile_rect, ui.id().with(tile_id), Sense::hover())
                    .on_hover_text(format!("{}", e));
            }
        }

        for (_, layer) in &self.layers {
            layer.draw(&painter, &projection);
        }

        self.draw_attribution(ui, rect);
    }

    /// Draws the attribution text.
    fn draw_attribution(&self, ui: &mut Ui, rect: &Rect) {
        let config = self.tiles.config();
        let Some(attribution) = config.attribution() else {
            return;
        };

        let bg_color = if ui.visuals().dark_mode {
            Color32::from_black_alpha(150)
        } else {
            Color32::from_white_alpha(150)
        };

        let frame = egui::Frame::NONE
            .inner_margin(egui::Margin::same(5))
            .fill(bg_color)
            .corner_radius(3.0);

        egui::Area::new(ui.id().with("attribution"))
            .fixed_pos(rect.left_bottom())
            .anchor(egui::Align2::LEFT_BOTTOM, egui::vec2(5.0, -5.0))
            .show(ui.ctx(), |ui| {
                frame.show(ui, |ui| {
                    ui.style_mut().override_text_style = Some(egui::TextStyle::Small);
                    ui.style_mut().wrap_mode = Some(egui::TextWrapMode::Extend); // Don't wrap attribution text.

                    if let Some(url) = config.attribution_url() {
                        ui.hyperlink_to(attribution, url);
                    } else {
                        ui.label(attribution);
                    }
                });
            });
    }
}

impl Widget for &mut Map {
    fn ui(self, ui: &mut Ui) -> Response {
        let (rect, response) =
            ui.allocate_exact_size(ui.available_size(), Sense::drag().union(Sense::click()));
        self.handle_input(ui, &rect, &response);
        self.draw(ui, &rect);

        response
    }
}
