//! Helpers shared across CLI commands.

use std::time::Duration;

use geomosaic::config::{ConfigFile, PlanningMode};
use geomosaic::download::ProgressCallback;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;

use crate::error::CliError;

/// Loads `config.ini` with environment overrides applied.
pub fn load_config() -> Result<ConfigFile, CliError> {
    Ok(ConfigFile::load_with_env()?)
}

/// CLI value wins over the configured planning mode.
pub fn resolve_planning(cli: Option<&str>, config: &ConfigFile) -> Result<PlanningMode, CliError> {
    match cli {
        Some(mode) => mode
            .parse()
            .map_err(|e: String| CliError::Usage(format!("--planning: {}", e))),
        None => Ok(config.backend.planning),
    }
}

/// Parses `key=value`. Values that are JSON arrays, numbers or booleans keep
/// their type; anything else is a string.
pub fn parse_param(input: &str) -> Result<(String, Value), String> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", input))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{}'", input));
    }

    let value = value.trim();
    let parsed = match serde_json::from_str::<Value>(value) {
        Ok(v @ (Value::Array(_) | Value::Number(_) | Value::Bool(_))) => v,
        _ => Value::String(value.to_string()),
    };
    Ok((key.to_string(), parsed))
}

/// Tile download progress bar; length is set on the first report.
pub fn tile_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} tiles {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.enable_steady_tick(Duration::from_millis(200));
    pb
}

/// Adapts a progress bar to the downloader's callback.
pub fn progress_callback(pb: &ProgressBar) -> ProgressCallback {
    let pb = pb.clone();
    Box::new(move |done, total, bytes| {
        pb.set_length(total as u64);
        pb.set_position(done as u64);
        pb.set_message(format_bytes(bytes));
    })
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
