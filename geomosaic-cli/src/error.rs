//! CLI error type.

use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;

use geomosaic::backend::BackendError;
use geomosaic::config::ConfigError;
use geomosaic::PipelineError;

/// Errors surfaced to the user by a CLI command.
#[derive(Debug)]
pub enum CliError {
    /// Bad or unreadable configuration.
    Config(String),
    /// Invalid command-line input.
    Usage(String),
    /// Action file could not be read or parsed.
    ActionFile { path: PathBuf, reason: String },
    /// Backend unreachable or unhealthy.
    Backend(BackendError),
    /// Pipeline failure outside the action contract (planning, setup).
    Pipeline(PipelineError),
    /// Failure string returned by the executor.
    Action(String),
}

impl CliError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Config(_) | CliError::Usage(_) | CliError::ActionFile { .. } => {
                ExitCode::from(2)
            }
            CliError::Backend(_) | CliError::Pipeline(_) | CliError::Action(_) => ExitCode::FAILURE,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Usage(msg) => write!(f, "{}", msg),
            CliError::ActionFile { path, reason } => {
                write!(f, "Cannot read action file {}: {}", path.display(), reason)
            }
            CliError::Backend(e) => write!(f, "Backend error: {}", e),
            CliError::Pipeline(e) => write!(f, "{}", e),
            // Printed verbatim; callers match on it.
            CliError::Action(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Backend(e) => Some(e),
            CliError::Pipeline(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<BackendError> for CliError {
    fn from(e: BackendError) -> Self {
        CliError::Backend(e)
    }
}

impl From<PipelineError> for CliError {
    fn from(e: PipelineError) -> Self {
        CliError::Pipeline(e)
    }
}
