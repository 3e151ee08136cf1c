//! INI configuration file.
//!
//! Lives at `~/.config/geomosaic/config.ini` unless `GEOMOSAIC_CONFIG`
//! points elsewhere. A missing file means defaults. `GEE_PLUGIN_URL`
//! overrides `backend.url` at run time without being written back.
//!
//! ```ini
//! [backend]
//! url = http://gee:8000
//! timeout_secs = 180
//! planning = local
//!
//! [output]
//! base_dir = /home/user/.local/share/geomosaic
//! tiles_subdir = tiles
//! merged_subdir = merged
//!
//! [export]
//! payload_ceiling_bytes = 47185920
//! tile_size_px = 1024
//! max_tiles = 64
//!
//! [logging]
//! level = info
//! ```

mod keys;

pub use keys::ConfigKey;

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ini::Ini;
use thiserror::Error;

use crate::backend::{DEFAULT_BACKEND_URL, DEFAULT_TIMEOUT_SECS};
use crate::download::OutputLayout;
use crate::export::{PayloadPolicy, DEFAULT_PAYLOAD_CEILING_BYTES};
use crate::grid::{GridPlanner, DEFAULT_MAX_TILES, DEFAULT_TILE_SIZE_PX};
use crate::logging::LoggingConfig;

/// Environment variable overriding `backend.url`.
pub const ENV_BACKEND_URL: &str = "GEE_PLUGIN_URL";
/// Environment variable pointing at an alternate config file.
pub const ENV_CONFIG_PATH: &str = "GEOMOSAIC_CONFIG";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Where tiles are planned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlanningMode {
    /// Grid planned here, one export call per tile.
    #[default]
    Local,
    /// The backend's named operation plans and exports the tiles.
    Remote,
}

impl PlanningMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanningMode::Local => "local",
            PlanningMode::Remote => "remote",
        }
    }
}

impl fmt::Display for PlanningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanningMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(PlanningMode::Local),
            "remote" => Ok(PlanningMode::Remote),
            _ => Err("expected 'local' or 'remote'".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackendSettings {
    pub url: String,
    /// `0` keeps the HTTP client's default.
    pub timeout_secs: u64,
    pub planning: PlanningMode,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_BACKEND_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            planning: PlanningMode::Local,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputSettings {
    pub base_dir: PathBuf,
    pub tiles_subdir: String,
    pub merged_subdir: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            base_dir: dirs::data_dir()
                .map(|d| d.join("geomosaic"))
                .unwrap_or_else(|| PathBuf::from("geomosaic-output")),
            tiles_subdir: "tiles".to_string(),
            merged_subdir: "merged".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportSettings {
    pub payload_ceiling_bytes: u64,
    pub tile_size_px: u32,
    pub max_tiles: usize,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            payload_ceiling_bytes: DEFAULT_PAYLOAD_CEILING_BYTES,
            tile_size_px: DEFAULT_TILE_SIZE_PX,
            max_tiles: DEFAULT_MAX_TILES,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
    /// Daily-rolling log files are written here when set.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

/// Contents of `config.ini`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub backend: BackendSettings,
    pub output: OutputSettings,
    pub export: ExportSettings,
    pub logging: LoggingSettings,
}

/// Path of the config file: `$GEOMOSAIC_CONFIG`, else
/// `{config_dir}/geomosaic/config.ini`.
pub fn config_file_path() -> PathBuf {
    if let Some(path) = env::var_os(ENV_CONFIG_PATH).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("geomosaic")
        .join("config.ini")
}

impl ConfigFile {
    /// Loads the config file, or defaults if it does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_file_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Like [`ConfigFile::load`], with environment overrides applied.
    pub fn load_with_env() -> Result<Self, ConfigError> {
        let mut config = Self::load()?;
        config.apply_overrides(env::var(ENV_BACKEND_URL).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for key in ConfigKey::all() {
            if let Some(value) = ini.get_from(Some(key.section()), key.key_name()) {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    /// Replaces `backend.url` when an override is present and non-empty.
    pub fn apply_overrides(&mut self, backend_url: Option<String>) {
        if let Some(url) = backend_url.filter(|u| !u.trim().is_empty()) {
            self.backend.url = url.trim().to_string();
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |e| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        self.to_ini().write_to_file(path).map_err(write_err)
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }
        ini
    }

    pub fn output_layout(&self) -> OutputLayout {
        OutputLayout::with_subdirs(
            &self.output.base_dir,
            &self.output.tiles_subdir,
            &self.output.merged_subdir,
        )
    }

    pub fn payload_policy(&self) -> PayloadPolicy {
        PayloadPolicy::new(self.export.payload_ceiling_bytes)
    }

    pub fn grid_planner(&self) -> GridPlanner {
        GridPlanner::new(self.export.tile_size_px, self.export.max_tiles)
    }

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.logging.level.clone(),
            directory: self.logging.directory.clone(),
            ..LoggingConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ConfigFile::default();
        assert_eq!(config.backend.url, "http://gee:8000");
        assert_eq!(config.backend.timeout_secs, 180);
        assert_eq!(config.backend.planning, PlanningMode::Local);
        assert_eq!(config.export.tile_size_px, 1024);
        assert_eq!(config.export.max_tiles, 64);
        assert_eq!(config.export.payload_ceiling_bytes, 45 * 1024 * 1024);
        assert_eq!(config.output.tiles_subdir, "tiles");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        config.backend.url = "http://localhost:9000".to_string();
        config.backend.planning = PlanningMode::Remote;
        config.output.base_dir = temp.path().join("out");
        config.export.tile_size_px = 512;
        config.logging.directory = Some(temp.path().join("logs"));
        config.save_to(&path).unwrap();

        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        fs::write(&path, "[export]\nmax_tiles = 16\n").unwrap();

        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded.export.max_tiles, 16);
        assert_eq!(loaded.export.tile_size_px, 1024);
        assert_eq!(loaded.backend, BackendSettings::default());
    }

    #[test]
    fn test_malformed_value() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        fs::write(&path, "[backend]\ntimeout_secs = soon\n").unwrap();

        let err = ConfigFile::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "backend.timeout_secs"));
    }

    #[test]
    fn test_overrides() {
        let mut config = ConfigFile::default();
        config.apply_overrides(Some("  ".to_string()));
        assert_eq!(config.backend.url, "http://gee:8000");

        config.apply_overrides(Some("http://plugin:8080".to_string()));
        assert_eq!(config.backend.url, "http://plugin:8080");
    }

    #[test]
    fn test_derived_components() {
        let mut config = ConfigFile::default();
        config.output.base_dir = PathBuf::from("/data");
        config.export.tile_size_px = 256;

        assert_eq!(config.output_layout().merged_dir(), PathBuf::from("/data/merged"));
        assert_eq!(config.grid_planner().tile_size_px(), 256);
        assert_eq!(
            config.payload_policy().ceiling_bytes(),
            DEFAULT_PAYLOAD_CEILING_BYTES
        );
    }

    #[test]
    fn test_planning_mode_parse() {
        assert_eq!("Remote".parse::<PlanningMode>().unwrap(), PlanningMode::Remote);
        assert!("hybrid".parse::<PlanningMode>().is_err());
    }
}
