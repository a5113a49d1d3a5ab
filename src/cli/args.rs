use std::path::PathBuf;
use anyhow::Result;
use clap::{Parser, Subcommand};
use log::debug;

/// Module-aware event bus runner
#[derive(Parser, Debug)]
#[command(name = "modulebus")]
#[command(about = "Plan, check and run module topologies on an in-process event bus")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output (debug level logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet output (error level logging only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Debug output (trace level logging)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Log format: text or json
    #[arg(long, value_name = "FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Log file path for file output
    #[arg(long, value_name = "FILE", global = true)]
    pub log_file: Option<PathBuf>,

    /// Log level for file output (independent of console level)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_file_level: Option<String>,

    /// Configuration file path
    #[arg(long, value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Disable coloured output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Print reports as JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Print the activation order for a module
    Plan {
        /// Topology file
        topology: PathBuf,

        /// Module to activate
        module: String,
    },

    /// Validate a topology: unknown dependencies, cycles, unresolved handlers
    Check {
        topology: PathBuf,
    },

    /// Activate modules, emit the seed events, report health and shut down
    Run {
        topology: PathBuf,

        /// Modules to activate (defaults to all, in file order)
        #[arg(short = 'm', long = "module", value_name = "ID")]
        modules: Vec<String>,

        /// Bound on graceful shutdown (overrides the config file)
        #[arg(long, value_name = "MS")]
        shutdown_timeout_ms: Option<u64>,

        /// Bound on waiting for detached cascades after the seed events
        #[arg(long, value_name = "MS", default_value_t = 5000)]
        settle_timeout_ms: u64,
    },
}

pub fn parse_args() -> Args {
    let args = Args::parse();
    debug!("Parsed CLI arguments: {:?}", args);
    args
}

/// Validate CLI argument combinations
pub fn validate_args(args: &Args) -> Result<()> {
    let log_flags_count = [args.verbose, args.quiet, args.debug]
        .iter()
        .filter(|&&flag| flag)
        .count();

    if log_flags_count > 1 {
        return Err(anyhow::anyhow!(
            "Conflicting log level flags: only one of --verbose, --quiet, or --debug may be specified"
        ));
    }

    if let Some(format) = &args.log_format {
        match format.to_lowercase().as_str() {
            "text" | "json" => {}
            _ => return Err(anyhow::anyhow!("Invalid log format '{}'. Valid options: text, json", format)),
        }
    }

    if let Some(level) = &args.log_file_level {
        match level.to_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(anyhow::anyhow!(
                    "Invalid log file level '{}'. Valid levels: error, warn, info, debug, trace",
                    level
                ))
            }
        }
    }

    if args.log_file_level.is_some() && args.log_file.is_none() {
        return Err(anyhow::anyhow!("--log-file-level requires --log-file to be specified"));
    }

    Ok(())
}
