//! Application initialization and configuration

use anyhow::Result;
use log::{debug, LevelFilter};
use modulebus::config::ConfigManager;
use modulebus::display::ColourManager;
use modulebus::logging::{self, LogConfig, LogDestination, LogFormat};
use crate::cli::Args;

pub fn load_configuration(args: &Args) -> Result<ConfigManager> {
    match &args.config_file {
        Some(config_file) => {
            debug!("Loading configuration from explicit file: {}", config_file.display());
            ConfigManager::load_from_file(config_file.clone())
        }
        None => ConfigManager::load(),
    }
}

/// Build the logger configuration
///
/// Precedence: command line flags, then the config file's `[base]` section,
/// then defaults.
pub fn configure_logging(args: &Args, config: &ConfigManager) -> Result<LogConfig> {
    let console_level = if args.debug {
        LevelFilter::Trace
    } else if args.verbose {
        LevelFilter::Debug
    } else if args.quiet {
        LevelFilter::Error
    } else {
        config.get_log_level("base", "console-level")?.unwrap_or(LevelFilter::Info)
    };

    let format = match args.log_format.as_deref().or_else(|| config.get_value("base", "log-format").map(String::as_str)) {
        Some(format) => format.parse::<LogFormat>().map_err(|e| anyhow::anyhow!(e))?,
        None => LogFormat::Text,
    };

    let log_file_path = args.log_file.clone().or_else(|| config.get_path("base", "log-file"));
    let file_log_level = match &args.log_file_level {
        Some(level) => Some(logging::parse_log_level(level)?),
        None => config.get_log_level("base", "file-log-level")?,
    };

    let (destination, file_level) = match (log_file_path, file_log_level) {
        (Some(file_path), level) => {
            let level = level.unwrap_or(console_level);
            (LogDestination::Both(file_path), Some(level))
        }
        (None, None) => (LogDestination::Console, None),
        (None, Some(_)) => {
            return Err(anyhow::anyhow!("Log file level specified without log file"));
        }
    };

    Ok(LogConfig { console_level, file_level, format, destination })
}

pub fn create_colour_manager(args: &Args, config: &ConfigManager) -> ColourManager {
    let config_no_color = config.get_bool("base", "no-color").unwrap_or(None);
    ColourManager::from_args_and_config(args.no_color, config_no_color)
}
