//! Install/uninstall engine for the MiningHQ rig services.
//!
//! The [`Installer`] is the only component with business logic and
//! failure-recovery policy. Both lifecycle operations are blocking from the
//! caller's perspective, re-runnable, and converge toward a consistent state
//! rather than attempting rollback: a partially completed install is
//! recovered by running `install_sync` again.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use log::{info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::InstallerError;

pub mod fetch;
pub mod platform;
pub mod progress;
pub mod record;
pub mod remote;
pub mod state;

use fetch::ArtifactFetcher;
use platform::{adapter_for, OperatingSystem, PlatformAdapter, ServiceSpec};
use progress::{InstallPhase, InstallProgress, ProgressReporter};
use record::InstallationRecord;
use remote::{ArtifactSpec, HttpEndpoint, RemoteEndpoint};
use state::StateStore;

pub struct Installer {
    home_dir: PathBuf,
    os: OperatingSystem,
    adapter: Box<dyn PlatformAdapter>,
    fetcher: ArtifactFetcher,
    state: StateStore,
    progress: ProgressReporter,
    cancel: CancellationToken,
    runtime: tokio::runtime::Runtime,
    // One in-flight lifecycle operation per handle; the pointer file and the
    // OS service manager are single shared mutable resources.
    op_guard: Mutex<()>,
}

impl Installer {
    /// Build an installer for `operating_system` talking to `api_endpoint`.
    ///
    /// Fails with [`InstallerError::Configuration`] if the home directory is
    /// not a writable directory, the OS identifier is unsupported, or the
    /// endpoint is not a valid URL.
    pub fn new(
        home_dir: impl Into<PathBuf>,
        operating_system: &str,
        api_endpoint: &str,
    ) -> Result<Self, InstallerError> {
        let home_dir = home_dir.into();
        let os = OperatingSystem::parse(operating_system)?;
        let endpoint: Arc<dyn RemoteEndpoint> = Arc::new(HttpEndpoint::new(api_endpoint)?);
        let adapter = adapter_for(os, &home_dir);
        Self::with_components(home_dir, os, adapter, endpoint)
    }

    /// Dependency-injecting constructor used by front ends and tests.
    pub fn with_components(
        home_dir: PathBuf,
        os: OperatingSystem,
        adapter: Box<dyn PlatformAdapter>,
        endpoint: Arc<dyn RemoteEndpoint>,
    ) -> Result<Self, InstallerError> {
        validate_home_dir(&home_dir)?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| InstallerError::System(format!("failed to build runtime: {e}")))?;

        let state = StateStore::for_home(&home_dir);
        Ok(Self {
            home_dir,
            os,
            adapter,
            fetcher: ArtifactFetcher::new(endpoint),
            state,
            progress: ProgressReporter::none(),
            cancel: CancellationToken::new(),
            runtime,
            op_guard: Mutex::new(()),
        })
    }

    /// Attach an advisory progress hook, invoked at phase boundaries and for
    /// per-artifact download events. Delivery failures never affect the
    /// operation's outcome.
    pub fn with_progress(mut self, tx: mpsc::Sender<InstallProgress>) -> Self {
        self.progress = ProgressReporter::new(tx);
        self
    }

    /// Token a caller may trigger to abort an in-progress install. Honored
    /// between download retry attempts and before service registration
    /// begins; once registration has started the operation runs to
    /// completion or failure. Cancellation applies to the handle, not a
    /// single call: construct a new installer to start fresh.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    /// Path of the pointer file this installer reads and writes.
    pub fn state_file_path(&self) -> &Path {
        self.state.path()
    }

    /// The single installed/not-installed determination used by both flows.
    pub fn is_installed(&self) -> bool {
        match self.state.read() {
            Ok(path) => is_valid_installation(&path),
            Err(_) => false,
        }
    }

    /// Installation directory named by the pointer file.
    pub fn installed_path(&self) -> Result<PathBuf, InstallerError> {
        self.state.read()
    }

    /// Synchronous, idempotent full install.
    ///
    /// Fetches the artifact manifest, stages and verifies every artifact,
    /// registers the service artifacts with the OS, and writes the pointer
    /// file last. Re-running after a partial failure converges: an existing
    /// valid installation short-circuits with success, and every step
    /// tolerates already-done conditions.
    pub fn install_sync(&self) -> Result<(), InstallerError> {
        let _guard = self.acquire_op_guard()?;
        self.runtime.block_on(self.install_inner())
    }

    /// Synchronous, idempotent removal of the installation at
    /// `installed_path`.
    ///
    /// Each step tolerates absence (services already unregistered, directory
    /// already deleted, pointer file already removed), so the operation is
    /// safe to repeat and safe after manual partial cleanup. It fails only
    /// when something demonstrably still exists but cannot be removed.
    pub fn uninstall_sync(
        &self,
        installed_path: &Path,
        state_file_path: &Path,
    ) -> Result<(), InstallerError> {
        let _guard = self.acquire_op_guard()?;
        self.uninstall_inner(installed_path, state_file_path)
    }

    /// Remove the installation named by the pointer file.
    ///
    /// Signals [`InstallerError::NotInstalled`] when no pointer file can be
    /// found or read; the front end decides whether that is a "nothing to
    /// do" message or a hard failure.
    pub fn uninstall(&self) -> Result<(), InstallerError> {
        let _guard = self.acquire_op_guard()?;
        let installed_path = self.state.read()?;
        self.uninstall_inner(&installed_path, self.state.path())
    }

    /// Claim the single-operation guard without blocking.
    ///
    /// A guard poisoned by a panicked prior operation is reclaimed: the
    /// poison carries no state worth protecting here, and a wedged handle
    /// that reports `Busy` forever would be strictly worse.
    fn acquire_op_guard(&self) -> Result<MutexGuard<'_, ()>, InstallerError> {
        match self.op_guard.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => Err(InstallerError::Busy),
        }
    }

    async fn install_inner(&self) -> Result<(), InstallerError> {
        let target_dir = self.adapter.install_dir();

        // Re-runnable by design: a prior complete installation is success,
        // not an error.
        if let Ok(existing) = self.state.read()
            && is_valid_installation(&existing)
        {
            info!("services already installed at {}", existing.display());
            self.progress.send(InstallProgress::phase(
                InstallPhase::Done,
                "services already installed",
            ));
            return Ok(());
        }

        std::fs::create_dir_all(&target_dir).map_err(|e| {
            InstallerError::System(format!(
                "failed to create install directory {}: {e}",
                target_dir.display()
            ))
        })?;

        info!(
            "installing MiningHQ services for {} into {}",
            self.os,
            target_dir.display()
        );

        self.progress.send(InstallProgress::phase(
            InstallPhase::FetchStarted,
            "fetching service artifacts",
        ));

        let artifacts = self
            .fetcher
            .fetch_all(self.os, &target_dir, &self.cancel, &self.progress)
            .await?;

        self.progress.send(InstallProgress::phase(
            InstallPhase::FetchDone,
            "all artifacts fetched and verified",
        ));

        // Last cancellation checkpoint: a partially registered service is
        // worse than a short unwanted delay.
        if self.cancel.is_cancelled() {
            return Err(InstallerError::Cancelled);
        }

        self.progress.send(InstallProgress::phase(
            InstallPhase::Registering,
            "registering services",
        ));

        // Registration is ordered and single-threaded; the OS service
        // manager expects no concurrent writers.
        let service_ids = self.register_services(&target_dir, &artifacts)?;

        let record = InstallationRecord::new(target_dir.clone(), self.os, service_ids);
        record
            .write_to(&target_dir)
            .map_err(InstallerError::StatePersist)?;

        // The pointer file is written last: an installation exists only once
        // it is functionally complete.
        self.state.write(&target_dir)?;

        info!("installation complete at {}", target_dir.display());
        self.progress
            .send(InstallProgress::phase(InstallPhase::Done, "installation complete"));
        Ok(())
    }

    fn register_services(
        &self,
        target_dir: &Path,
        artifacts: &[ArtifactSpec],
    ) -> Result<Vec<String>, InstallerError> {
        let mut service_ids = Vec::new();
        for artifact in artifacts.iter().filter(|a| a.service) {
            let spec = ServiceSpec {
                name: artifact.name.clone(),
                display_name: artifact.display_name().to_string(),
                binary: target_dir.join(&artifact.name),
                args: Vec::new(),
            };
            self.adapter.register_service(&spec)?;
            info!("registered service {}", spec.name);
            service_ids.push(artifact.name.clone());
        }
        Ok(service_ids)
    }

    fn uninstall_inner(
        &self,
        installed_path: &Path,
        state_file_path: &Path,
    ) -> Result<(), InstallerError> {
        info!("removing MiningHQ services from {}", installed_path.display());

        // The record names the registered services. Without it the services
        // are assumed already removed; the adapter tolerates absence anyway.
        let service_ids = match InstallationRecord::load_from(installed_path) {
            Ok(Some(record)) => record.service_identifiers,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("could not read installation record: {e}");
                Vec::new()
            }
        };

        for service in &service_ids {
            self.adapter.unregister_service(service)?;
            info!("unregistered service {service}");
        }

        match std::fs::remove_dir_all(installed_path) {
            Ok(()) => info!("removed {}", installed_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(InstallerError::System(format!(
                    "failed to remove {}: {e}",
                    installed_path.display()
                )));
            }
        }

        StateStore::new(state_file_path).remove()?;

        info!("uninstall complete");
        Ok(())
    }
}

/// Whether `path` holds a live installation: the directory exists and
/// contains a readable installation record.
fn is_valid_installation(path: &Path) -> bool {
    path.is_dir()
        && matches!(InstallationRecord::load_from(path), Ok(Some(_)))
}

fn validate_home_dir(home_dir: &Path) -> Result<(), InstallerError> {
    let metadata = std::fs::metadata(home_dir).map_err(|e| {
        InstallerError::Configuration(format!(
            "home directory {} is not usable: {e}",
            home_dir.display()
        ))
    })?;

    if !metadata.is_dir() {
        return Err(InstallerError::Configuration(format!(
            "{} is not a directory",
            home_dir.display()
        )));
    }
    if metadata.permissions().readonly() {
        return Err(InstallerError::Configuration(format!(
            "home directory {} is not writable",
            home_dir.display()
        )));
    }
    Ok(())
}
