#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // hide console window on Windows in release

use eframe::egui;
use log::info;
use valhalla_locate_view::app::LocateApp;
use valhalla_locate_view::config::{LocateConfig, OpenStreetMapConfig};

fn main() -> eframe::Result {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = LocateConfig::from_env();
    info!("Using routing service at {}", config.service_url);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1200.0, 800.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Valhalla locate viewer",
        options,
        Box::new(|_cc| Ok(Box::new(LocateApp::new(OpenStreetMapConfig::default(), config)))),
    )
}
