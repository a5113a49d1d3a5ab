mod app;
mod cli;

use std::process;
use anyhow::Result;
use log::error;
use modulebus::logging;

fn main() {
    // Log only: handler and filter panics are caught and reported by the bus,
    // anything uncaught still unwinds to a non-zero exit.
    std::panic::set_hook(Box::new(|panic_info| {
        error!("Panic: {}", panic_info);
    }));

    if let Err(e) = run() {
        error!("Application error: {:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = cli::args::parse_args();
    cli::args::validate_args(&args)?;

    let config_manager = app::load_configuration(&args)?;
    let log_config = app::configure_logging(&args, &config_manager)?;
    logging::init_logger(log_config)?;

    let colours = app::create_colour_manager(&args, &config_manager);

    // A single runtime for the whole command
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(app::run_command(&args, &config_manager, &colours))
}
