//! Windows adapter backed by the Service Control Manager, driven through
//! `sc.exe`.
//!
//! SCM error codes that mean "the desired end state already holds" are
//! treated as success: 1073 (service exists) on create, 1056 (already
//! running) on start, 1060 (does not exist) and 1062 (not started) on the
//! removal path.

use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::InstallerError;

use super::{run_service_command, stderr_text, PlatformAdapter, ServiceSpec};

const ERROR_SERVICE_EXISTS: &str = "1073";
const ERROR_SERVICE_ALREADY_RUNNING: &str = "1056";
const ERROR_SERVICE_DOES_NOT_EXIST: &str = "1060";
const ERROR_SERVICE_NOT_ACTIVE: &str = "1062";

pub struct ScmAdapter {
    home_dir: PathBuf,
}

impl ScmAdapter {
    pub fn new(home_dir: &Path) -> Self {
        Self {
            home_dir: home_dir.to_path_buf(),
        }
    }

    fn sc(&self, service: &str, args: &[&str]) -> Result<ScOutcome, InstallerError> {
        let output = run_service_command(service, "sc.exe", args)?;
        let text = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            stderr_text(&output)
        );
        Ok(ScOutcome {
            success: output.status.success(),
            text,
        })
    }
}

struct ScOutcome {
    success: bool,
    text: String,
}

impl ScOutcome {
    fn tolerated(&self, codes: &[&str]) -> bool {
        self.success || codes.iter().any(|c| self.text.contains(c))
    }
}

impl PlatformAdapter for ScmAdapter {
    fn install_dir(&self) -> PathBuf {
        self.home_dir.join("AppData").join("Roaming").join("MiningHQ")
    }

    fn register_service(&self, spec: &ServiceSpec) -> Result<(), InstallerError> {
        let bin_path = bin_path_value(spec);

        // `sc.exe create` rejects a duplicate name with 1073; that is the
        // idempotent success path for a re-entered install.
        let create = self.sc(
            &spec.name,
            &[
                "create",
                &spec.name,
                &format!("binPath= {bin_path}"),
                "start= auto",
                &format!("DisplayName= {}", spec.display_name),
            ],
        )?;
        if !create.tolerated(&[ERROR_SERVICE_EXISTS]) {
            return Err(InstallerError::Registration {
                service: spec.name.clone(),
                reason: format!("sc.exe create failed: {}", create.text.trim()),
            });
        }
        if !create.success {
            debug!("service {} already registered with SCM", spec.name);
        }

        let start = self.sc(&spec.name, &["start", &spec.name])?;
        if !start.tolerated(&[ERROR_SERVICE_ALREADY_RUNNING]) {
            return Err(InstallerError::Registration {
                service: spec.name.clone(),
                reason: format!("sc.exe start failed: {}", start.text.trim()),
            });
        }

        Ok(())
    }

    fn unregister_service(&self, name: &str) -> Result<(), InstallerError> {
        let stop = self.sc(name, &["stop", name])?;
        if !stop.tolerated(&[ERROR_SERVICE_DOES_NOT_EXIST, ERROR_SERVICE_NOT_ACTIVE]) {
            warn!("could not stop service {name}: {}", stop.text.trim());
        }

        let delete = self.sc(name, &["delete", name])?;
        if !delete.tolerated(&[ERROR_SERVICE_DOES_NOT_EXIST]) {
            return Err(InstallerError::Registration {
                service: name.to_string(),
                reason: format!("sc.exe delete failed: {}", delete.text.trim()),
            });
        }

        Ok(())
    }

    fn is_service_registered(&self, name: &str) -> Result<bool, InstallerError> {
        let query = self.sc(name, &["query", name])?;
        Ok(query.success)
    }
}

/// The `binPath=` value for `sc.exe create`. The binary path is quoted so
/// install directories containing spaces (the usual case under `C:\Users`)
/// parse as one path.
fn bin_path_value(spec: &ServiceSpec) -> String {
    let binary = format!("\"{}\"", spec.binary.display());
    if spec.args.is_empty() {
        binary
    } else {
        format!("{} {}", binary, spec.args.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_tolerates_listed_codes() {
        let outcome = ScOutcome {
            success: false,
            text: "CreateService FAILED 1073:\nThe specified service already exists.".to_string(),
        };
        assert!(outcome.tolerated(&[ERROR_SERVICE_EXISTS]));
        assert!(!outcome.tolerated(&[ERROR_SERVICE_DOES_NOT_EXIST]));
    }

    #[test]
    fn bin_path_quotes_binary_with_spaces() {
        let spec = ServiceSpec {
            name: "mhq-miner-controller".to_string(),
            display_name: "MiningHQ Miner Controller".to_string(),
            binary: PathBuf::from(
                r"C:\Users\John Doe\AppData\Roaming\MiningHQ\mhq-miner-controller.exe",
            ),
            args: vec!["--foreground".to_string()],
        };

        assert_eq!(
            bin_path_value(&spec),
            r#""C:\Users\John Doe\AppData\Roaming\MiningHQ\mhq-miner-controller.exe" --foreground"#
        );
    }

    #[test]
    fn install_dir_is_under_roaming_appdata() {
        let adapter = ScmAdapter::new(Path::new(r"C:\Users\u"));
        assert!(adapter
            .install_dir()
            .ends_with(Path::new("AppData/Roaming/MiningHQ")));
    }
}
