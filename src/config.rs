//! Configuration for tile providers and for the locate service.

use log::warn;
use std::time::Duration;

use crate::polyline::DEFAULT_PRECISION;
use crate::projection::GeoPos;
use crate::tiles::TileId;

/// Configuration for a map provider.
pub trait MapConfig {
    /// Returns the URL for a given tile.
    fn tile_url(&self, tile: &TileId) -> String;

    /// Returns the attribution text to be displayed on the map. If returns `None`, no attribution is shown.
    fn attribution(&self) -> Option<&str>;

    /// Returns the attribution URL to be linked from the attribution text.
    fn attribution_url(&self) -> Option<&str>;

    /// The default geographical center of the map.
    fn default_center(&self) -> GeoPos;

    /// The default zoom level of the map.
    fn default_zoom(&self) -> u8;
}

/// Configuration for the OpenStreetMap tile server.
///
/// # Example
///
/// ```
/// use valhalla_locate_view::config::OpenStreetMapConfig;
/// let config = OpenStreetMapConfig::default();
/// ```
#[cfg(feature = "openstreetmap")]
pub struct OpenStreetMapConfig {
    base_url: String,
    attribution: String,
    attribution_url: String,
    default_center: GeoPos,
    default_zoom: u8,
}

#[cfg(feature = "openstreetmap")]
impl Default for OpenStreetMapConfig {
    fn default() -> Self {
        Self {
            base_url: "https://tile.openstreetmap.org".to_string(),
            attribution: "© OpenStreetMap contributors".to_string(),
            attribution_url: "https://www.openstreetmap.org/copyright".to_string(),
            default_center: GeoPos { lon: 8.0, lat: 47.0 }, // Central Switzerland
            default_zoom: 11,
        }
    }
}

#[cfg(feature = "openstreetmap")]
impl OpenStreetMapConfig {
    /// Starts the map at `center` and `zoom` instead of the defaults.
    pub fn with_view(mut self, center: GeoPos, zoom: u8) -> Self {
        self.default_center = center;
        self.default_zoom = zoom;
        self
    }
}

#[cfg(feature = "openstreetmap")]
impl MapConfig for OpenStreetMapConfig {
    fn tile_url(&self, tile: &TileId) -> String {
        format!("{}/{}/{}/{}.png", self.base_url, tile.z, tile.x, tile.y)
    }

    fn attribution(&self) -> Option<&str> {
        Some(&self.attribution)
    }

    fn attribution_url(&self) -> Option<&str> {
        Some(&self.attribution_url)
    }

    fn default_center(&self) -> GeoPos {
        self.default_center
    }

    fn default_zoom(&self) -> u8 {
        self.default_zoom
    }
}

/// A dynamic map configuration that allows defining a custom tile URL function at runtime.
///
/// # Example
///
/// ```
/// use valhalla_locate_view::config::DynMapConfig;
/// let config = DynMapConfig::new(|tile| format!("http://localhost:8080/{}/{}/{}.png", tile.z, tile.x, tile.y));
/// ```
pub struct DynMapConfig {
    tile_url: Box<dyn Fn(&TileId) -> String>,
    default_center: GeoPos,
    default_zoom: u8,
}

impl DynMapConfig {
    /// Creates a new `DynMapConfig` with a custom tile URL function.
    pub fn new(tile_url: impl Fn(&TileId) -> String + 'static) -> Self {
        Self {
            tile_url: Box::new(tile_url),
            default_center: GeoPos { lon: 8.0, lat: 47.0 },
            default_zoom: 11,
        }
    }
}

impl MapConfig for DynMapConfig {
    fn tile_url(&self, tile: &TileId) -> String {
        (self.tile_url)(tile)
    }

    fn attribution(&self) -> Option<&str> {
        None
    }

    fn attribution_url(&self) -> Option<&str> {
        None
    }

    fn default_center(&self) -> GeoPos {
        self.default_center
    }

    fn default_zoom(&self) -> u8 {
        self.default_zoom
    }
}

/// Settings for talking to the Valhalla service.
#[derive(Clone, Debug, PartialEq)]
pub struct LocateConfig {
    /// Base URL of the service, without a trailing action path.
    pub service_url: String,
    /// Costing model used to filter edges.
    pub costing: String,
    /// Search radius around each location in meters.
    pub radius: u32,
    /// Distance in meters within which a location snaps to a node.
    pub node_snap_tolerance: u32,
    /// Per-location cut-off in meters for the candidate search.
    pub search_cutoff: u32,
    /// Decimal digits of the edge shapes in the response.
    pub precision: u32,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for LocateConfig {
    fn default() -> Self {
        Self {
            service_url: "http://localhost:8002".to_string(),
            costing: "auto".to_string(),
            radius: 1,
            node_snap_tolerance: 0,
            search_cutoff: 50,
            precision: DEFAULT_PRECISION,
            timeout: Duration::from_secs(30),
        }
    }
}

impl LocateConfig {
    /// Environment variable overriding [`LocateConfig::service_url`].
    pub const URL_VAR: &'static str = "VALHALLA_URL";
    /// Environment variable overriding [`LocateConfig::timeout`], in whole seconds.
    pub const TIMEOUT_VAR: &'static str = "VALHALLA_TIMEOUT_SECS";

    /// The defaults, overridden by the `VALHALLA_URL` and `VALHALLA_TIMEOUT_SECS` environment
    /// variables when they are set.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup(Self::URL_VAR) {
            config.service_url = url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = lookup(Self::TIMEOUT_VAR) {
            match secs.parse::<u64>() {
                Ok(secs) => config.timeout = Duration::from_secs(secs),
                Err(e) => warn!("Ignoring {}={:?}: {}", Self::TIMEOUT_VAR, secs, e),
            }
        }

        config
    }
}

/// A link to the same view on openstreetmap.org.
pub fn osm_permalink(center: GeoPos, zoom: u8) -> String {
    format!(
        "https://osm.org/#map={}/{:.5}/{:.5}",
        zoom, center.lat, center.lon
    )
}
