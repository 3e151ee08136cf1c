//! Typed access to individual `section.key` settings.

use std::path::PathBuf;
use std::str::FromStr;

use super::{ConfigError, ConfigFile, PlanningMode};

/// Every setting in `config.ini`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    BackendUrl,
    BackendTimeoutSecs,
    BackendPlanning,
    OutputBaseDir,
    OutputTilesSubdir,
    OutputMergedSubdir,
    ExportPayloadCeilingBytes,
    ExportTileSizePx,
    ExportMaxTiles,
    LoggingLevel,
    LoggingDirectory,
}

impl ConfigKey {
    pub fn all() -> &'static [ConfigKey] {
        &[
            ConfigKey::BackendUrl,
            ConfigKey::BackendTimeoutSecs,
            ConfigKey::BackendPlanning,
            ConfigKey::OutputBaseDir,
            ConfigKey::OutputTilesSubdir,
            ConfigKey::OutputMergedSubdir,
            ConfigKey::ExportPayloadCeilingBytes,
            ConfigKey::ExportTileSizePx,
            ConfigKey::ExportMaxTiles,
            ConfigKey::LoggingLevel,
            ConfigKey::LoggingDirectory,
        ]
    }

    /// `section.key`
    pub fn name(&self) -> &'static str {
        match self {
            ConfigKey::BackendUrl => "backend.url",
            ConfigKey::BackendTimeoutSecs => "backend.timeout_secs",
            ConfigKey::BackendPlanning => "backend.planning",
            ConfigKey::OutputBaseDir => "output.base_dir",
            ConfigKey::OutputTilesSubdir => "output.tiles_subdir",
            ConfigKey::OutputMergedSubdir => "output.merged_subdir",
            ConfigKey::ExportPayloadCeilingBytes => "export.payload_ceiling_bytes",
            ConfigKey::ExportTileSizePx => "export.tile_size_px",
            ConfigKey::ExportMaxTiles => "export.max_tiles",
            ConfigKey::LoggingLevel => "logging.level",
            ConfigKey::LoggingDirectory => "logging.directory",
        }
    }

    pub fn section(&self) -> &'static str {
        self.name().split('.').next().unwrap_or_default()
    }

    pub fn key_name(&self) -> &'static str {
        self.name().split('.').nth(1).unwrap_or_default()
    }

    /// Current value as a string; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        match self {
            ConfigKey::BackendUrl => config.backend.url.clone(),
            ConfigKey::BackendTimeoutSecs => config.backend.timeout_secs.to_string(),
            ConfigKey::BackendPlanning => config.backend.planning.to_string(),
            ConfigKey::OutputBaseDir => config.output.base_dir.display().to_string(),
            ConfigKey::OutputTilesSubdir => config.output.tiles_subdir.clone(),
            ConfigKey::OutputMergedSubdir => config.output.merged_subdir.clone(),
            ConfigKey::ExportPayloadCeilingBytes => config.export.payload_ceiling_bytes.to_string(),
            ConfigKey::ExportTileSizePx => config.export.tile_size_px.to_string(),
            ConfigKey::ExportMaxTiles => config.export.max_tiles.to_string(),
            ConfigKey::LoggingLevel => config.logging.level.clone(),
            ConfigKey::LoggingDirectory => config
                .logging
                .directory
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_default(),
        }
    }

    /// Parses and stores `value`.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        let invalid = |reason: &str| ConfigError::InvalidValue {
            key: self.name().to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        };

        match self {
            ConfigKey::BackendUrl => {
                if !(value.starts_with("http://") || value.starts_with("https://")) {
                    return Err(invalid("expected an http:// or https:// URL"));
                }
                config.backend.url = value.trim_end_matches('/').to_string();
            }
            ConfigKey::BackendTimeoutSecs => {
                config.backend.timeout_secs = value
                    .parse()
                    .map_err(|_| invalid("expected whole seconds (0 for the client default)"))?;
            }
            ConfigKey::BackendPlanning => {
                config.backend.planning = value
                    .parse::<PlanningMode>()
                    .map_err(|e| invalid(&e))?;
            }
            ConfigKey::OutputBaseDir => {
                if value.is_empty() {
                    return Err(invalid("must not be empty"));
                }
                config.output.base_dir = PathBuf::from(value);
            }
            ConfigKey::OutputTilesSubdir => {
                config.output.tiles_subdir = subdir(value).map_err(|r| invalid(r))?;
            }
            ConfigKey::OutputMergedSubdir => {
                config.output.merged_subdir = subdir(value).map_err(|r| invalid(r))?;
            }
            ConfigKey::ExportPayloadCeilingBytes => {
                config.export.payload_ceiling_bytes = positive::<u64>(value)
                    .ok_or_else(|| invalid("expected a positive number of bytes"))?;
            }
            ConfigKey::ExportTileSizePx => {
                config.export.tile_size_px = positive::<u32>(value)
                    .ok_or_else(|| invalid("expected a positive number of pixels"))?;
            }
            ConfigKey::ExportMaxTiles => {
                config.export.max_tiles =
                    positive::<usize>(value).ok_or_else(|| invalid("expected a positive count"))?;
            }
            ConfigKey::LoggingLevel => {
                if value.is_empty() {
                    return Err(invalid("must not be empty"));
                }
                config.logging.level = value.to_string();
            }
            ConfigKey::LoggingDirectory => {
                config.logging.directory = (!value.is_empty()).then(|| PathBuf::from(value));
            }
        }
        Ok(())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        ConfigKey::all()
            .iter()
            .copied()
            .find(|k| k.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

fn subdir(value: &str) -> Result<String, &'static str> {
    if value.is_empty() || value.contains('/') || value.contains('\\') || value == ".." {
        return Err("expected a single directory name");
    }
    Ok(value.to_string())
}

fn positive<T: FromStr + PartialOrd + Default>(value: &str) -> Option<T> {
    value.parse::<T>().ok().filter(|v| *v > T::default())
}
