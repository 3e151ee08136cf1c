//! Init command - write a configuration file and create output directories.

use std::fs;

use geomosaic::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Run the init command.
pub fn run() -> Result<(), CliError> {
    // Existing settings survive; missing ones get defaults.
    let config = ConfigFile::load()?;
    config.save()?;

    let layout = config.output_layout();
    for dir in [layout.base_dir().to_path_buf(), layout.merged_dir()] {
        fs::create_dir_all(&dir).map_err(|e| {
            CliError::Config(format!("cannot create {}: {}", dir.display(), e))
        })?;
    }

    println!("Configuration file: {}", config_file_path().display());
    println!("Output directory:   {}", layout.base_dir().display());
    println!("Backend:            {}", config.backend.url);
    println!();
    println!("Edit this file to customize geomosaic settings.");
    println!("GEE_PLUGIN_URL overrides backend.url when set.");
    Ok(())
}
