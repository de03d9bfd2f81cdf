//! Linux adapter backed by systemd user units.
//!
//! Services are registered as user-level units under
//! `~/.config/systemd/user` and controlled with `systemctl --user`, so no
//! elevation is required for a per-user rig installation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::InstallerError;

use super::{run_service_command, stderr_text, PlatformAdapter, ServiceSpec};

pub struct SystemdAdapter {
    home_dir: PathBuf,
}

impl SystemdAdapter {
    pub fn new(home_dir: &Path) -> Self {
        Self {
            home_dir: home_dir.to_path_buf(),
        }
    }

    fn unit_dir(&self) -> PathBuf {
        self.home_dir.join(".config/systemd/user")
    }

    fn unit_path(&self, name: &str) -> PathBuf {
        self.unit_dir().join(format!("{name}.service"))
    }

    fn systemctl(&self, service: &str, args: &[&str]) -> Result<(), InstallerError> {
        let mut full_args = vec!["--user"];
        full_args.extend_from_slice(args);

        let output = run_service_command(service, "systemctl", &full_args)?;
        if !output.status.success() {
            return Err(InstallerError::Registration {
                service: service.to_string(),
                reason: format!("systemctl --user {} failed: {}", args[0], stderr_text(&output)),
            });
        }
        Ok(())
    }
}

impl PlatformAdapter for SystemdAdapter {
    fn install_dir(&self) -> PathBuf {
        self.home_dir.join(".local/share/mininghq")
    }

    fn register_service(&self, spec: &ServiceSpec) -> Result<(), InstallerError> {
        let unit_path = self.unit_path(&spec.name);
        if let Some(parent) = unit_path.parent() {
            fs::create_dir_all(parent).map_err(|e| InstallerError::Registration {
                service: spec.name.clone(),
                reason: format!("failed to create unit directory: {e}"),
            })?;
        }

        // Rewriting an existing unit is the idempotent path: the content is
        // derived from the same spec, and enable/start below are no-ops on a
        // unit that is already enabled and running.
        let content = generate_unit(spec);
        write_unit_atomic(&unit_path, &content).map_err(|e| InstallerError::Registration {
            service: spec.name.clone(),
            reason: format!("failed to write unit file: {e}"),
        })?;

        self.systemctl(&spec.name, &["daemon-reload"])?;
        self.systemctl(&spec.name, &["enable", &format!("{}.service", spec.name)])?;
        self.systemctl(&spec.name, &["start", &format!("{}.service", spec.name)])?;

        debug!("registered systemd user unit {}", unit_path.display());
        Ok(())
    }

    fn unregister_service(&self, name: &str) -> Result<(), InstallerError> {
        // Stop and disable are tolerant: the unit may already be gone or the
        // user session's systemd may not be reachable. A failure here does
        // not indicate an inability to remove the installation.
        if let Err(e) = self.systemctl(name, &["stop", &format!("{name}.service")]) {
            warn!("could not stop service {name}: {e}");
        }
        if let Err(e) = self.systemctl(name, &["disable", &format!("{name}.service")]) {
            warn!("could not disable service {name}: {e}");
        }

        let unit_path = self.unit_path(name);
        match fs::remove_file(&unit_path) {
            Ok(()) => {
                if let Err(e) = self.systemctl(name, &["daemon-reload"]) {
                    warn!("daemon-reload after unregister failed: {e}");
                }
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(InstallerError::Registration {
                service: name.to_string(),
                reason: format!("failed to remove unit file {}: {e}", unit_path.display()),
            }),
        }
    }

    fn is_service_registered(&self, name: &str) -> Result<bool, InstallerError> {
        Ok(self.unit_path(name).exists())
    }
}

/// Generate the unit file content for a rig service.
fn generate_unit(spec: &ServiceSpec) -> String {
    let mut content = String::with_capacity(512);

    content.push_str("[Unit]\n");
    content.push_str(&format!("Description={}\n", spec.display_name));
    content.push_str("After=network-online.target\n");
    content.push_str("Wants=network-online.target\n");
    content.push('\n');

    content.push_str("[Service]\n");
    if spec.args.is_empty() {
        content.push_str(&format!("ExecStart={}\n", spec.binary.display()));
    } else {
        content.push_str(&format!(
            "ExecStart={} {}\n",
            spec.binary.display(),
            spec.args.join(" ")
        ));
    }
    content.push_str("Restart=on-failure\n");
    content.push_str("RestartSec=5s\n");
    content.push_str("StandardOutput=journal\n");
    content.push_str("StandardError=journal\n");
    content.push_str(&format!("SyslogIdentifier={}\n", spec.name));
    content.push('\n');

    content.push_str("[Install]\n");
    content.push_str("WantedBy=default.target\n");

    content
}

/// Write the unit file atomically with 0644 permissions.
fn write_unit_atomic(path: &Path, content: &str) -> Result<(), io::Error> {
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&temp_path)?.permissions();
        perms.set_mode(0o644);
        fs::set_permissions(&temp_path, perms)?;
    }

    fs::rename(&temp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ServiceSpec {
        ServiceSpec {
            name: "mhq-miner-controller".to_string(),
            display_name: "MiningHQ Miner Controller".to_string(),
            binary: PathBuf::from("/home/u/.local/share/mininghq/mhq-miner-controller"),
            args: vec!["--foreground".to_string()],
        }
    }

    #[test]
    fn unit_content_has_exec_and_install_sections() {
        let content = generate_unit(&spec());

        assert!(content.contains(
            "ExecStart=/home/u/.local/share/mininghq/mhq-miner-controller --foreground"
        ));
        assert!(content.contains("Description=MiningHQ Miner Controller"));
        assert!(content.contains("WantedBy=default.target"));
        assert!(content.contains("Restart=on-failure"));
    }

    #[test]
    fn unregister_tolerates_missing_unit() {
        let home = tempfile::tempdir().expect("tempdir");
        let adapter = SystemdAdapter::new(home.path());

        adapter
            .unregister_service("mhq-never-installed")
            .expect("tolerated");
        assert!(!adapter
            .is_service_registered("mhq-never-installed")
            .expect("query"));
    }
}
