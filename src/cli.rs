//! Command-line arguments for the miner manager.

use clap::Parser;

use crate::config::DEFAULT_API_ENDPOINT;

#[derive(Parser, Debug, Clone)]
#[command(name = "mhq-manager")]
#[command(version, about = "Install and manage the MiningHQ rig services")]
pub struct Cli {
    /// Run the manager without the desktop GUI
    #[arg(long)]
    pub no_gui: bool,

    /// Run the manager in debug mode with verbose logging
    #[arg(long)]
    pub debug: bool,

    /// The base API endpoint for MiningHQ
    #[arg(long, default_value = DEFAULT_API_ENDPOINT)]
    pub api_endpoint: String,

    /// Completely remove the MiningHQ services from this system
    #[arg(long)]
    pub uninstall: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
