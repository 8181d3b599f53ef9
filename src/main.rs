// Headless front-end: every run is a short CLI session over a directory store.
// Interactive hosts embed the library and drive `Project` directly.

mod cli;

use std::process::ExitCode;

use clap::Parser;

fn main() -> ExitCode {
    // Initialize session log (overwrites previous session log)
    maskpaint::logger::init();
    maskpaint::log_info!("MaskPaint {} starting", env!("CARGO_PKG_VERSION"));

    let args = cli::CliArgs::parse();
    cli::run(args)
}
