//! Artifact fetching: bounded-parallel downloads with retry, backoff, and
//! integrity verification.
//!
//! Artifacts stage to `<name>.partial` and are renamed into place only after
//! their checksum matches the manifest; a failed or cancelled download
//! discards the partial file so a future install can never mistake it for a
//! complete artifact.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::InstallerError;

use super::platform::OperatingSystem;
use super::progress::{InstallProgress, ProgressReporter};
use super::remote::{ArtifactSpec, RemoteEndpoint};

/// Download attempts per artifact before giving up.
const MAX_ATTEMPTS: u32 = 3;
/// Backoff before the second attempt; doubles per retry.
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
/// Ceiling on concurrent downloads.
const MAX_PARALLEL: usize = 4;

pub struct ArtifactFetcher {
    endpoint: Arc<dyn RemoteEndpoint>,
}

impl ArtifactFetcher {
    pub fn new(endpoint: Arc<dyn RemoteEndpoint>) -> Self {
        Self { endpoint }
    }

    /// Fetch the manifest for `os` and stage every artifact into
    /// `target_dir`. Returns the manifest entries in manifest order once all
    /// artifacts are verified on disk.
    ///
    /// The first hard failure cancels in-flight downloads and is surfaced.
    pub async fn fetch_all(
        &self,
        os: OperatingSystem,
        target_dir: &Path,
        cancel: &CancellationToken,
        progress: &ProgressReporter,
    ) -> Result<Vec<ArtifactSpec>, InstallerError> {
        let manifest = self.endpoint.manifest(os).await?;
        let total = manifest.artifacts.len();
        if total == 0 {
            return Ok(manifest.artifacts);
        }

        let semaphore = Arc::new(Semaphore::new(total.min(MAX_PARALLEL)));
        let mut tasks: JoinSet<Result<(), InstallerError>> = JoinSet::new();

        // Downloads watch a child token: cancelling the fan-out on a sibling
        // failure must not cancel the caller's token, which outlives this
        // call and would otherwise abort every later re-run of the install.
        let fan_out = cancel.child_token();

        for (i, artifact) in manifest.artifacts.iter().enumerate() {
            let endpoint = Arc::clone(&self.endpoint);
            let semaphore = Arc::clone(&semaphore);
            let cancel = fan_out.clone();
            let progress = progress.clone();
            let artifact = artifact.clone();
            let target_dir = target_dir.to_path_buf();

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| InstallerError::Cancelled)?;
                fetch_one(
                    endpoint.as_ref(),
                    &artifact,
                    i + 1,
                    total,
                    &target_dir,
                    &cancel,
                    &progress,
                )
                .await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let result = joined
                .map_err(|e| InstallerError::System(format!("download task failed: {e}")))?;

            if let Err(e) = result {
                // Stop the remaining downloads; wasted work helps nobody.
                fan_out.cancel();
                tasks.abort_all();
                while tasks.join_next().await.is_some() {}
                return Err(e);
            }
        }

        Ok(manifest.artifacts)
    }
}

/// Download one artifact with retries, verify it, and move it into place.
async fn fetch_one(
    endpoint: &dyn RemoteEndpoint,
    artifact: &ArtifactSpec,
    index: usize,
    total: usize,
    target_dir: &Path,
    cancel: &CancellationToken,
    progress: &ProgressReporter,
) -> Result<(), InstallerError> {
    let partial_path = target_dir.join(format!("{}.partial", artifact.name));
    let final_path = target_dir.join(&artifact.name);

    progress.send(InstallProgress::artifact(&artifact.name, index, total, false));

    let mut attempt = 1;
    loop {
        if cancel.is_cancelled() {
            discard(&partial_path);
            return Err(InstallerError::Cancelled);
        }

        match endpoint.download(artifact, &partial_path).await {
            Ok(()) => break,
            Err(e) => {
                discard(&partial_path);
                if attempt >= MAX_ATTEMPTS {
                    return Err(match e {
                        InstallerError::Fetch { artifact, reason } => InstallerError::Fetch {
                            artifact,
                            reason: format!("{reason} (after {MAX_ATTEMPTS} attempts)"),
                        },
                        other => other,
                    });
                }

                let backoff = INITIAL_BACKOFF * 2u32.pow(attempt - 1);
                warn!(
                    "download of {} failed (attempt {attempt}/{MAX_ATTEMPTS}), retrying in {:?}: {e}",
                    artifact.name, backoff
                );

                // Cancellation is honored between retry attempts.
                tokio::select! {
                    _ = cancel.cancelled() => return Err(InstallerError::Cancelled),
                    _ = tokio::time::sleep(backoff) => {}
                }
                attempt += 1;
            }
        }
    }

    // Checksum mismatch is surfaced immediately: re-fetching a corrupt
    // source in a tight loop would not make it match.
    if let Err(e) = verify_sha256(&partial_path, artifact).await {
        discard(&partial_path);
        return Err(e);
    }

    tokio::fs::rename(&partial_path, &final_path)
        .await
        .map_err(|e| InstallerError::System(format!(
            "failed to activate artifact {}: {e}",
            artifact.name
        )))?;

    #[cfg(unix)]
    {
        if artifact.service {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o755);
            tokio::fs::set_permissions(&final_path, perms)
                .await
                .map_err(|e| InstallerError::System(format!(
                    "failed to set permissions on {}: {e}",
                    final_path.display()
                )))?;
        }
    }

    debug!("staged artifact {} at {}", artifact.name, final_path.display());
    progress.send(InstallProgress::artifact(&artifact.name, index, total, true));
    Ok(())
}

/// Compare the staged file's SHA-256 against the manifest entry.
async fn verify_sha256(path: &Path, artifact: &ArtifactSpec) -> Result<(), InstallerError> {
    let content = tokio::fs::read(path).await.map_err(|e| InstallerError::Fetch {
        artifact: artifact.name.clone(),
        reason: format!("failed to read staged file: {e}"),
    })?;

    let actual = hex::encode(Sha256::digest(&content));
    if actual.eq_ignore_ascii_case(&artifact.sha256) {
        Ok(())
    } else {
        Err(InstallerError::Integrity {
            artifact: artifact.name.clone(),
            expected: artifact.sha256.to_ascii_lowercase(),
            actual,
        })
    }
}

/// Remove a partial download, best-effort.
fn discard(partial_path: &Path) {
    if partial_path.exists()
        && let Err(e) = std::fs::remove_file(partial_path)
    {
        warn!("failed to discard partial download {}: {e}", partial_path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(sha256: &str) -> ArtifactSpec {
        ArtifactSpec {
            name: "mhq-miner-controller".to_string(),
            source: "https://example.invalid/mhq-miner-controller".to_string(),
            sha256: sha256.to_string(),
            service: true,
            display_name: None,
        }
    }

    #[tokio::test]
    async fn verify_accepts_matching_checksum() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("artifact");
        tokio::fs::write(&path, b"rig service binary").await.expect("write");

        let expected = hex::encode(Sha256::digest(b"rig service binary"));
        verify_sha256(&path, &artifact(&expected)).await.expect("match");
    }

    #[tokio::test]
    async fn verify_rejects_mismatch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("artifact");
        tokio::fs::write(&path, b"tampered content").await.expect("write");

        let expected = hex::encode(Sha256::digest(b"rig service binary"));
        let err = verify_sha256(&path, &artifact(&expected))
            .await
            .expect_err("mismatch");
        assert!(matches!(err, InstallerError::Integrity { .. }));
    }
}
