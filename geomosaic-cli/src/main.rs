//! geomosaic CLI - tiled raster acquisition and mosaicking
//!
//! Thin command-line front end over the `geomosaic` library: every command
//! maps to one library entry point.

mod commands;
mod error;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use geomosaic::config::ConfigFile;
use geomosaic::logging::init_logging;

use commands::config::ConfigCommands;
use commands::plan::PlanArgs;
use commands::run::RunArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "geomosaic")]
#[command(author, version, about = "Tiled raster acquisition and seamless mosaicking", long_about = None)]
struct Cli {
    /// Log at debug level (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute an action and print the merged raster path
    Run(RunArgs),

    /// Show the tile grid for a region without exporting anything
    Plan(PlanArgs),

    /// Probe the compute backend
    Health,

    /// View or modify configuration settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Create the configuration file and output directories
    Init,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logging settings come from the file; a broken file is reported by the
    // command itself.
    let mut logging = ConfigFile::load().unwrap_or_default().logging_config();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    let _guard = match init_logging(&logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Warning: {}", e);
            None
        }
    };

    match dispatch(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            e.exit_code()
        }
    }
}

fn dispatch(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Run(args) => commands::run::run(args),
        Commands::Plan(args) => commands::plan::run(args),
        Commands::Health => commands::health::run(),
        Commands::Config { command } => commands::config::run(command),
        Commands::Init => commands::init::run(),
    }
}
