// CLI mode (--input/-i flag present) is routed before any window is created.

use colorsplash::app::PuzzleApp;
use colorsplash::{cli, logger};
use eframe::egui;

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

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 1000.0])
            .with_min_inner_size([360.0, 480.0])
            .with_title("ColorSplash"),
        ..Default::default()
    };

    eframe::run_native(
        "ColorSplash",
        options,
        Box::new(|cc| Box::new(PuzzleApp::new(cc))),
    )
}
