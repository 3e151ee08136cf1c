//! Health command - probe the compute backend.

use geomosaic::backend::{ComputeBackend, ReqwestBackend};

use super::common::load_config;
use crate::error::CliError;

pub fn run() -> Result<(), CliError> {
    let config = load_config()?;
    let backend = ReqwestBackend::with_timeout(&config.backend.url, config.backend.timeout_secs)?;

    backend.health()?;
    println!("Backend {} is healthy", backend.base_url());
    Ok(())
}
