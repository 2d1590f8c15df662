//! Map projection.
//!
//! Conversions between geographical coordinates, Web Mercator tile coordinates and screen
//! positions, and a few geodesic helpers used when turning service responses into shapes.

use egui::{Pos2, Rect};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// The size of a map tile in pixels.
pub(crate) const TILE_SIZE: u32 = 256;

/// Mean earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// A geographical position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPos {
    /// Longitude in degrees.
    pub lon: f64,
    /// Latitude in degrees.
    pub lat: f64,
}

impl From<(f64, f64)> for GeoPos {
    /// Converts a `(longitude, latitude)` tuple.
    fn from((lon, lat): (f64, f64)) -> Self {
        Self { lon, lat }
    }
}

impl From<GeoPos> for (f64, f64) {
    fn from(pos: GeoPos) -> Self {
        (pos.lon, pos.lat)
    }
}

/// Converts longitude to the x-coordinate of a tile at a given zoom level.
pub(crate) fn lon_to_x(lon: f64, zoom: u8) -> f64 {
    (lon + 180.0) / 360.0 * (2.0_f64.powi(zoom as i32))
}

/// Converts latitude to the y-coordinate of a tile at a given zoom level.
pub(crate) fn lat_to_y(lat: f64, zoom: u8) -> f64 {
    (1.0 - lat.to_radians().tan().asinh() / PI) / 2.0 * (2.0_f64.powi(zoom as i32))
}

/// Converts the x-coordinate of a tile to longitude at a given zoom level.
pub(crate) fn x_to_lon(x: f64, zoom: u8) -> f64 {
    x / (2.0_f64.powi(zoom as i32)) * 360.0 - 180.0
}

/// Converts the y-coordinate of a tile to latitude at a given zoom level.
pub(crate) fn y_to_lat(y: f64, zoom: u8) -> f64 {
    let n = PI - 2.0 * PI * y / (2.0_f64.powi(zoom as i32));
    n.sinh().atan().to_degrees()
}

/// A helper for converting between geographical and screen coordinates.
#[derive(Clone, Copy, Debug)]
pub struct MapProjection {
    zoom: u8,
    center: GeoPos,
    widget_rect: Rect,
}

impl MapProjection {
    /// Creates a new `MapProjection` for a map centered at `center` and drawn into `widget_rect`.
    pub fn new(zoom: u8, center: GeoPos, widget_rect: Rect) -> Self {
        Self {
            zoom,
            center,
            widget_rect,
        }
    }

    /// The zoom level this projection was made for.
    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// The screen rectangle of the map widget.
    pub fn widget_rect(&self) -> Rect {
        self.widget_rect
    }

    /// The center of the map in tile coordinates.
    pub(crate) fn center_tile(&self) -> (f64, f64) {
        (
            lon_to_x(self.center.lon, self.zoom),
            lat_to_y(self.center.lat, self.zoom),
        )
    }

    /// Projects a geographical coordinate to a screen coordinate.
    pub fn project(&self, geo_pos: GeoPos) -> Pos2 {
        let (center_x, center_y) = self.center_tile();

        let dx = (lon_to_x(geo_pos.lon, self.zoom) - center_x) * TILE_SIZE as f64;
        let dy = (lat_to_y(geo_pos.lat, self.zoom) - center_y) * TILE_SIZE as f64;

        self.widget_rect.center() + egui::vec2(dx as f32, dy as f32)
    }

    /// Un-projects a screen coordinate to a geographical coordinate.
    pub fn unproject(&self, screen_pos: Pos2) -> GeoPos {
        let (center_x, center_y) = self.center_tile();
        let offset = screen_pos - self.widget_rect.center();

        let target_x = center_x + offset.x as f64 / TILE_SIZE as f64;
        let target_y = center_y + offset.y as f64 / TILE_SIZE as f64;

        GeoPos {
            lon: x_to_lon(target_x, self.zoom),
            lat: y_to_lat(target_y, self.zoom),
        }
    }
}

/// The position reached by travelling `distance_m` meters from `origin` along the initial
/// `bearing_deg` (clockwise from north) on a spherical earth.
pub fn destination(origin: GeoPos, distance_m: f64, bearing_deg: f64) -> GeoPos {
    let lat1 = origin.lat.to_radians();
    let lon1 = origin.lon.to_radians();
    let bearing = bearing_deg.to_radians();
    let angular = distance_m / EARTH_RADIUS_M;

    let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
    let lon2 = lon1
        + (bearing.sin() * angular.sin() * lat1.cos()).atan2(angular.cos() - lat1.sin() * lat2.sin());

    GeoPos {
        lon: lon2.to_degrees(),
        lat: lat2.to_degrees(),
    }
}

/// Great-circle distance between two positions in meters.
pub fn haversine_distance(a: GeoPos, b: GeoPos) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Approximates a circle of `radius_m` meters around `center` with `steps` vertices.
///
/// The ring is open: the first vertex is not repeated at the end. Vertices run
/// counter-clockwise, starting due north.
pub fn geodesic_circle(center: GeoPos, radius_m: f64, steps: usize) -> Vec<GeoPos> {
    (0..steps)
        .map(|i| destination(center, radius_m, -360.0 * i as f64 / steps as f64))
        .collect()
}
