//! Platform abstraction for service registration and directory layout.
//!
//! One adapter per supported operating system, selected once at construction
//! by an OS identifier. All OS-specific behavior funnels through
//! [`PlatformAdapter`] so the installer core contains no OS-conditional
//! branching.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::error::InstallerError;

mod linux;
mod macos;
mod windows;

pub use linux::SystemdAdapter;
pub use macos::LaunchdAdapter;
pub use windows::ScmAdapter;

/// Supported operating systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingSystem {
    Linux,
    MacOs,
    Windows,
}

impl OperatingSystem {
    /// Parse an OS identifier. Accepts `darwin` as an alias for macOS, the
    /// identifier the MiningHQ API has always used for it.
    pub fn parse(id: &str) -> Result<Self, InstallerError> {
        match id.to_ascii_lowercase().as_str() {
            "linux" => Ok(Self::Linux),
            "macos" | "darwin" => Ok(Self::MacOs),
            "windows" => Ok(Self::Windows),
            other => Err(InstallerError::Configuration(format!(
                "unsupported operating system '{other}'"
            ))),
        }
    }

    /// Identifier of the host operating system.
    pub fn current() -> Result<Self, InstallerError> {
        Self::parse(std::env::consts::OS)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::MacOs => "macos",
            Self::Windows => "windows",
        }
    }
}

impl std::fmt::Display for OperatingSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Description of a background service to register with the OS.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    /// Logical service name, e.g. `mhq-miner-controller`.
    pub name: String,
    /// Human-readable name shown by the OS service manager.
    pub display_name: String,
    /// Absolute path of the service binary.
    pub binary: PathBuf,
    /// Arguments passed to the binary.
    pub args: Vec<String>,
}

/// OS-specific primitives used by the installer core.
///
/// `register_service` must be idempotent and `unregister_service` must
/// tolerate an already-absent service, because the install and uninstall
/// flows are both safely re-runnable.
pub trait PlatformAdapter: Send + Sync {
    /// OS-conventional application-data directory for the services.
    fn install_dir(&self) -> PathBuf;

    fn register_service(&self, spec: &ServiceSpec) -> Result<(), InstallerError>;

    fn unregister_service(&self, name: &str) -> Result<(), InstallerError>;

    fn is_service_registered(&self, name: &str) -> Result<bool, InstallerError>;
}

/// Select the adapter for `os`, rooted at `home_dir`.
pub fn adapter_for(os: OperatingSystem, home_dir: &Path) -> Box<dyn PlatformAdapter> {
    match os {
        OperatingSystem::Linux => Box::new(SystemdAdapter::new(home_dir)),
        OperatingSystem::MacOs => Box::new(LaunchdAdapter::new(home_dir)),
        OperatingSystem::Windows => Box::new(ScmAdapter::new(home_dir)),
    }
}

/// Run a service-manager command, mapping spawn failures and non-zero exits
/// to a `Registration` error for `service`.
pub(crate) fn run_service_command(
    service: &str,
    program: &str,
    args: &[&str],
) -> Result<std::process::Output, InstallerError> {
    Command::new(program)
        .args(args)
        .output()
        .map_err(|e| InstallerError::Registration {
            service: service.to_string(),
            reason: format!("failed to execute {program}: {e}"),
        })
}

/// Stderr of a failed command, for error messages.
pub(crate) fn stderr_text(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_identifiers() {
        assert_eq!(
            OperatingSystem::parse("linux").expect("linux"),
            OperatingSystem::Linux
        );
        assert_eq!(
            OperatingSystem::parse("darwin").expect("darwin"),
            OperatingSystem::MacOs
        );
        assert_eq!(
            OperatingSystem::parse("Windows").expect("windows"),
            OperatingSystem::Windows
        );
    }

    #[test]
    fn rejects_unknown_identifier() {
        assert!(matches!(
            OperatingSystem::parse("plan9"),
            Err(InstallerError::Configuration(_))
        ));
    }
}
