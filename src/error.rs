//! Installer error taxonomy.
//!
//! Every failure carries enough context (phase plus underlying cause) for a
//! front end to render a useful message. Idempotent tolerance of
//! already-done conditions happens at the call sites, not here.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstallerError {
    /// Bad constructor inputs. Fatal to the call, never retried.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Network failure fetching an artifact, after retries were exhausted.
    #[error("failed to fetch artifact '{artifact}': {reason}")]
    Fetch { artifact: String, reason: String },

    /// Downloaded artifact does not match its manifest checksum.
    #[error("checksum mismatch for artifact '{artifact}': expected {expected}, got {actual}")]
    Integrity {
        artifact: String,
        expected: String,
        actual: String,
    },

    /// OS service-manager failure, with the OS-level cause.
    #[error("failed to register service '{service}': {reason}")]
    Registration { service: String, reason: String },

    /// Uninstall requested but no installation record was found.
    #[error("no MiningHQ installation found on this system")]
    NotInstalled,

    /// A lifecycle operation is already running on this handle.
    #[error("another install or uninstall is already in progress")]
    Busy,

    /// Failed to persist the installation record or pointer file.
    #[error("failed to persist installation state: {0}")]
    StatePersist(#[source] io::Error),

    /// The caller cancelled the operation before registration began.
    #[error("operation cancelled")]
    Cancelled,

    /// Residual OS or filesystem failure.
    #[error("{0}")]
    System(String),
}
