//! Installation progress events.
//!
//! Progress delivery is advisory: a closed or full channel must never affect
//! the outcome of the operation that emitted the event.

use tokio::sync::mpsc;

/// Phase boundaries of an install, in order of emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    FetchStarted,
    FetchDone,
    Registering,
    Done,
}

/// Per-artifact detail attached to download events.
#[derive(Debug, Clone)]
pub struct ArtifactProgress {
    /// Artifact name from the manifest.
    pub name: String,
    /// 1-based index of this artifact.
    pub index: usize,
    /// Total artifacts in the manifest.
    pub total: usize,
    /// True once the artifact is verified and staged.
    pub complete: bool,
}

/// A single progress update sent to the front end.
#[derive(Debug, Clone)]
pub struct InstallProgress {
    pub phase: InstallPhase,
    pub message: String,
    /// Download detail, present only during the fetch phase.
    pub artifact: Option<ArtifactProgress>,
}

impl InstallProgress {
    pub fn phase(phase: InstallPhase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
            artifact: None,
        }
    }

    pub fn artifact(name: &str, index: usize, total: usize, complete: bool) -> Self {
        let message = if complete {
            format!("fetched {name} ({index}/{total})")
        } else {
            format!("fetching {name} ({index}/{total})")
        };
        Self {
            phase: InstallPhase::FetchStarted,
            message,
            artifact: Some(ArtifactProgress {
                name: name.to_string(),
                index,
                total,
                complete,
            }),
        }
    }
}

/// Best-effort sender for progress events.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    tx: Option<mpsc::Sender<InstallProgress>>,
}

impl ProgressReporter {
    pub fn new(tx: mpsc::Sender<InstallProgress>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Reporter that drops every event, for headless callers without a hook.
    pub fn none() -> Self {
        Self { tx: None }
    }

    /// Send an event without blocking. A full or closed channel is logged
    /// and otherwise ignored.
    pub fn send(&self, progress: InstallProgress) {
        if let Some(tx) = &self.tx
            && let Err(e) = tx.try_send(progress)
        {
            log::debug!("progress event dropped: {e}");
        }
    }
}
