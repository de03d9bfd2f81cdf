//! Headless install/uninstall flows.
//!
//! Drives the installer core from the terminal: the blocking lifecycle call
//! runs on the current thread while a side thread drains the advisory
//! progress channel into an indicatif bar.

use std::thread;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::warn;
use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::error::InstallerError;
use crate::installer::progress::{InstallPhase, InstallProgress};
use crate::installer::Installer;

/// Run a full headless install.
pub fn run_install(config: &AppConfig) -> Result<()> {
    let (tx, rx) = mpsc::channel::<InstallProgress>(100);

    let installer = Installer::new(
        config.home_dir.clone(),
        &config.operating_system,
        &config.api_endpoint,
    )
    .context("unable to create installer")?
    .with_progress(tx);

    let progress_thread = thread::spawn(move || drain_progress(rx));

    let result = installer.install_sync();

    // Dropping the installer closes the progress channel and lets the
    // drain thread finish.
    drop(installer);
    if progress_thread.join().is_err() {
        warn!("progress thread panicked");
    }

    result.context("installation failed")?;
    println!("The MiningHQ services were installed successfully.");
    Ok(())
}

/// Remove the installation recorded by the pointer file.
pub fn run_uninstall(config: &AppConfig) -> Result<()> {
    let installer = Installer::new(
        config.home_dir.clone(),
        &config.operating_system,
        &config.api_endpoint,
    )
    .context("unable to create installer")?;

    let installed_path = match installer.installed_path() {
        Ok(path) => path,
        Err(InstallerError::NotInstalled) => {
            println!(
                "We were unable to find the installed location for the MiningHQ \
services. If any files remain, please remove them manually from where you \
installed the services."
            );
            return Ok(());
        }
        Err(e) => return Err(e).context("unable to read installation state"),
    };

    installer
        .uninstall_sync(&installed_path, installer.state_file_path())
        .context("uninstall failed")?;

    println!("The MiningHQ services were removed from this system.");
    Ok(())
}

/// Render progress events until the channel closes.
fn drain_progress(mut rx: mpsc::Receiver<InstallProgress>) {
    let bar = ProgressBar::new(100);
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{bar:50.cyan/blue}] {pos:>3}%  {msg}")
    {
        bar.set_style(style.progress_chars("█▓░"));
    }

    while let Some(progress) = rx.blocking_recv() {
        if let Some(artifact) = &progress.artifact {
            let done = if artifact.complete { artifact.index } else { artifact.index - 1 };
            // Fetching spans the first 70% of the bar.
            bar.set_position((done * 70 / artifact.total.max(1)) as u64);
        } else {
            bar.set_position(match progress.phase {
                InstallPhase::FetchStarted => 0,
                InstallPhase::FetchDone => 70,
                InstallPhase::Registering => 80,
                InstallPhase::Done => 100,
            });
        }
        bar.set_message(progress.message.clone());
    }

    bar.finish_and_clear();
}
