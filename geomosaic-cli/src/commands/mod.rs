//! CLI command implementations.

pub mod common;
pub mod config;
pub mod health;
pub mod init;
pub mod plan;
pub mod run;
