//! Basemap tiles: identification, background download and drawing.

use egui::{Color32, Painter, Pos2, Rect, Vec2, pos2};
use eyre::{Context, Result};
use log::{debug, error};
use once_cell::sync::Lazy;
use poll_promise::Promise;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::config::MapConfig;
use crate::projection::{MapProjection, TILE_SIZE};

// Reuse the reqwest client for all tile downloads by making it a static variable.
static CLIENT: Lazy<reqwest::blocking::Client> = Lazy::new(|| {
    reqwest::blocking::Client::builder()
        .user_agent(format!(
            "{}/{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ))
        .build()
        .unwrap_or_default()
});

/// Errors that can occur while fetching map tiles.
#[derive(Error, Debug)]
pub enum MapError {
    /// An error occurred while making a web request.
    #[error("Connection error")]
    ConnectionError(#[from] reqwest::Error),

    /// A map tile failed to download.
    #[error("A map tile failed to download. HTTP Status: `{0}`")]
    TileDownloadError(String),

    /// The downloaded tile bytes could not be converted to an image.
    #[error("Unable to convert downloaded map tile bytes as image")]
    TileBytesConversionError(#[from] image::ImageError),
}

/// A unique identifier for a map tile.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct TileId {
    /// The zoom level.
    pub z: u8,

    /// The x-coordinate of the tile.
    pub x: u32,

    /// The y-coordinate of the tile.
    pub y: u32,
}

/// The state of a tile in the cache.
enum Tile {
    /// The tile is being downloaded.
    Loading(Promise<Result<egui::ColorImage, Arc<eyre::Report>>>),

    /// The tile is in memory.
    Loaded(egui::TextureHandle),

    /// The tile failed to download.
    Failed(Arc<eyre::Report>),
}

/// Returns the tiles covering the projection's widget, with the screen position of their top
/// left corner. Tiles outside of the world are left out.
pub(crate) fn visible_tiles(projection: &MapProjection) -> impl Iterator<Item = (TileId, Pos2)> {
    let rect = projection.widget_rect();
    let zoom = projection.zoom();
    let (center_x, center_y) = projection.center_tile();
    let half_w = rect.width() as f64 / 2.0 / TILE_SIZE as f64;
    let half_h = rect.height() as f64 / 2.0 / TILE_SIZE as f64;
    let world = 1_i64 << zoom;

    let x_min = ((center_x - half_w).floor() as i64).max(0);
    let y_min = ((center_y - half_h).floor() as i64).max(0);
    let x_max = ((center_x + half_w).ceil() as i64).min(world - 1);
    let y_max = ((center_y + half_h).ceil() as i64).min(world - 1);

    let widget_center = rect.center();
    (x_min..=x_max).flat_map(move |x| {
        (y_min..=y_max).map(move |y| {
            let offset = Vec2::new(
                ((x as f64 - center_x) * TILE_SIZE as f64) as f32,
                ((y as f64 - center_y) * TILE_SIZE as f64) as f32,
            );
            let tile_id = TileId {
                z: zoom,
                x: x as u32,
                y: y as u32,
            };
            (tile_id, widget_center + offset)
        })
    })
}

/// Downloaded tiles for one tile provider.
pub(crate) struct TileCache {
    tiles: HashMap<TileId, Tile>,
    config: Box<dyn MapConfig>,
}

impl TileCache {
    pub(crate) fn new(config: Box<dyn MapConfig>) -> Self {
        Self {
            tiles: HashMap::new(),
            config,
        }
    }

    pub(crate) fn config(&self) -> &dyn MapConfig {
        self.config.as_ref()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Starts downloading `tile_id` if it is not known yet, and turns finished downloads into
    /// textures.
    pub(crate) fn load(&mut self, ctx: &egui::Context, tile_id: TileId) {
        let config = self.config.as_ref();
        let tile_state = self.tiles.entry(tile_id).or_insert_with(|| {
            let url = config.tile_url(&tile_id);
            Tile::Loading(Promise::spawn_thread("download_tile", move || {
                download_tile(&url)
                    .with_context(|| format!("Failed to download tile from {}", &url))
                    .map_err(Arc::new)
            }))
        });

        if let Tile::Loading(promise) = tile_state {
            if let Some(result) = promise.ready() {
                *tile_state = match result {
                    Ok(color_image) => Tile::Loaded(ctx.load_texture(
                        format!("tile_{}_{}_{}", tile_id.z, tile_id.x, tile_id.y),
                        color_image.clone(),
                        Default::default(),
                    )),
                    Err(e) => {
                        error!("{:?}", e);
                        Tile::Failed(e.clone())
                    }
                };
            } else {
                // Keep polling until the download finishes.
                ctx.request_repaint();
            }
        }
    }

    /// Draws a tile, or a placeholder while it is missing.
    pub(crate) fn draw(&self, painter: &Painter, tile_id: &TileId, tile_pos: Pos2) {
        let tile_rect =
            Rect::from_min_size(tile_pos, Vec2::new(TILE_SIZE as f32, TILE_SIZE as f32));

        match self.tiles.get(tile_id) {
            Some(Tile::Loaded(texture)) => {
                painter.image(
                    texture.id(),
                    tile_rect,
                    Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0)),
                    Color32::WHITE,
                );
            }
            Some(Tile::Failed(_)) => draw_placeholder(painter, tile_rect, "!", Color32::RED),
            Some(Tile::Loading(_)) | None => {
                draw_placeholder(painter, tile_rect, "?", Color32::ORANGE)
            }
        }
    }

    /// The error of a failed tile, for hover text.
    pub(crate) fn error(&self, tile_id: &TileId) -> Option<&eyre::Report> {
        match self.tiles.get(tile_id) {
            Some(Tile::Failed(e)) => Some(e.as_ref()),
            _ => None,
        }
    }
}

fn download_tile(url: &str) -> Result<egui::ColorImage> {
    debug!("Downloading tile from {}", url);
    let response = CLIENT.get(url).send().map_err(MapError::from)?;

    if !response.status().is_success() {
        return Err(MapError::TileDownloadError(response.status().to_string()).into());
    }

    let bytes = response.bytes().map_err(MapError::from)?;
    let image = image::load_from_memory(&bytes)
        .map_err(MapError::from)?
        .to_rgba8();

    let size = [image.width() as _, image.height() as _];
    Ok(egui::ColorImage::from_rgba_unmultiplied(
        size,
        &image.into_raw(),
    ))
}

fn draw_placeholder(painter: &Painter, tile_rect: Rect, mark: &str, color: Color32) {
    painter.rect_filled(tile_rect, 0.0, Color32::from_gray(220));
    painter.rect_stroke(
        tile_rect,
        0.0,
        egui::Stroke::new(1.0, Color32::GRAY),
        egui::StrokeKind::Inside,
    );
    painter.text(
        tile_rect.center(),
        egui::Align2::CENTER_CENTER,
        mark,
        egui::FontId::proportional(40.0),
        color,
    );
}
