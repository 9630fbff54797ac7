#![allow(clippy::too_many_arguments)]

mod app;

use app::LineFillApp;
use eframe::egui;
use linefill::settings::EngineSettings;
use linefill::{cli, log_info, logger};

fn main() -> Result<(), eframe::Error> {
    // -- CLI / headless mode ---------------------------------------------
    if cli::CliArgs::is_cli_mode() {
        use clap::Parser;
        let args = cli::CliArgs::parse();
        let code = cli::run(args);
        std::process::exit(if code == std::process::ExitCode::SUCCESS {
            0
        } else {
            1
        });
    }

    // -- GUI mode -----------------------------------------------------

    // Initialize session log (overwrites previous session log)
    logger::init();

    let settings = EngineSettings::load();
    log_info!("Settings: {}", EngineSettings::settings_path().display());

    // A lone positional argument is an image, URL or manifest to open
    let initial = std::env::args().nth(1).filter(|a| !a.starts_with('-'));

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 760.0])
            .with_title("LineFill"),
        ..Default::default()
    };

    eframe::run_native(
        "LineFill",
        options,
        Box::new(move |cc| Box::new(LineFillApp::new(cc, settings, initial))),
    )
}
