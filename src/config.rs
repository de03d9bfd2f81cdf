//! Application configuration.
//!
//! Front ends build an explicit [`AppConfig`] from their own inputs (CLI
//! flags, GUI settings) and hand it to the core. The core never reads
//! process-wide globals.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::cli::Cli;

/// Default base API endpoint for MiningHQ.
pub const DEFAULT_API_ENDPOINT: &str = "http://mininghq.local/api/v1";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// User's home directory; the pointer file and OS-conventional install
    /// directory both hang off it.
    pub home_dir: PathBuf,
    /// OS identifier for artifact selection and adapter choice.
    pub operating_system: String,
    /// Base API endpoint the installer fetches manifests from.
    pub api_endpoint: String,
    /// Verbose logging requested.
    pub debug: bool,
}

impl AppConfig {
    /// Resolve configuration from CLI flags and the environment.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let home_dir = dirs::home_dir().context("unable to determine the user home directory")?;

        Ok(Self {
            home_dir,
            operating_system: std::env::consts::OS.to_string(),
            api_endpoint: cli.api_endpoint.clone(),
            debug: cli.debug,
        })
    }
}
