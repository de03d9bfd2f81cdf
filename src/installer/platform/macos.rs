//! macOS adapter backed by launchd launch agents.
//!
//! Services are registered as per-user launch agents under
//! `~/Library/LaunchAgents` with the label `io.mininghq.<service>` and
//! controlled with `launchctl`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::InstallerError;

use super::{run_service_command, stderr_text, PlatformAdapter, ServiceSpec};

pub struct LaunchdAdapter {
    home_dir: PathBuf,
}

impl LaunchdAdapter {
    pub fn new(home_dir: &Path) -> Self {
        Self {
            home_dir: home_dir.to_path_buf(),
        }
    }

    fn label(name: &str) -> String {
        format!("io.mininghq.{name}")
    }

    fn plist_path(&self, name: &str) -> PathBuf {
        self.home_dir
            .join("Library/LaunchAgents")
            .join(format!("{}.plist", Self::label(name)))
    }
}

impl PlatformAdapter for LaunchdAdapter {
    fn install_dir(&self) -> PathBuf {
        self.home_dir.join("Library/Application Support/MiningHQ")
    }

    fn register_service(&self, spec: &ServiceSpec) -> Result<(), InstallerError> {
        let plist_path = self.plist_path(&spec.name);
        if let Some(parent) = plist_path.parent() {
            fs::create_dir_all(parent).map_err(|e| InstallerError::Registration {
                service: spec.name.clone(),
                reason: format!("failed to create LaunchAgents directory: {e}"),
            })?;
        }

        let already_loaded = plist_path.exists();

        let content = generate_plist(spec);
        let temp_path = plist_path.with_extension("plist.tmp");
        fs::write(&temp_path, &content)
            .and_then(|()| fs::rename(&temp_path, &plist_path))
            .map_err(|e| InstallerError::Registration {
                service: spec.name.clone(),
                reason: format!("failed to write plist: {e}"),
            })?;

        if already_loaded {
            // Re-registering an agent that launchd already knows about is a
            // success, not an error. The refreshed plist takes effect on the
            // next load.
            debug!("launch agent {} already registered", Self::label(&spec.name));
            return Ok(());
        }

        let path_str = plist_path.display().to_string();
        let output = run_service_command(&spec.name, "launchctl", &["load", "-w", &path_str])?;
        if !output.status.success() {
            let stderr = stderr_text(&output);
            if stderr.contains("already loaded") {
                return Ok(());
            }
            return Err(InstallerError::Registration {
                service: spec.name.clone(),
                reason: format!("launchctl load failed: {stderr}"),
            });
        }

        Ok(())
    }

    fn unregister_service(&self, name: &str) -> Result<(), InstallerError> {
        let plist_path = self.plist_path(name);

        if plist_path.exists() {
            let path_str = plist_path.display().to_string();
            match run_service_command(name, "launchctl", &["unload", "-w", &path_str]) {
                Ok(output) if !output.status.success() => {
                    warn!(
                        "could not unload launch agent {}: {}",
                        Self::label(name),
                        stderr_text(&output)
                    );
                }
                Err(e) => warn!("could not run launchctl for {name}: {e}"),
                Ok(_) => {}
            }
        }

        match fs::remove_file(&plist_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(InstallerError::Registration {
                service: name.to_string(),
                reason: format!("failed to remove plist {}: {e}", plist_path.display()),
            }),
        }
    }

    fn is_service_registered(&self, name: &str) -> Result<bool, InstallerError> {
        Ok(self.plist_path(name).exists())
    }
}

/// Generate the launch agent plist for a rig service.
fn generate_plist(spec: &ServiceSpec) -> String {
    let mut args_xml = String::new();
    args_xml.push_str(&format!(
        "    <string>{}</string>\n",
        xml_escape(&spec.binary.display().to_string())
    ));
    for arg in &spec.args {
        args_xml.push_str(&format!("    <string>{}</string>\n", xml_escape(arg)));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
  <key>Label</key>
  <string>{label}</string>
  <key>ProgramArguments</key>
  <array>
{args_xml}  </array>
  <key>RunAtLoad</key>
  <true/>
  <key>KeepAlive</key>
  <dict>
    <key>SuccessfulExit</key>
    <false/>
  </dict>
</dict>
</plist>
"#,
        label = LaunchdAdapter::label(&spec.name),
        args_xml = args_xml,
    )
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plist_contains_label_and_program_arguments() {
        let spec = ServiceSpec {
            name: "mhq-rig-agent".to_string(),
            display_name: "MiningHQ Rig Agent".to_string(),
            binary: PathBuf::from("/Users/u/Library/Application Support/MiningHQ/mhq-rig-agent"),
            args: vec![],
        };

        let plist = generate_plist(&spec);
        assert!(plist.contains("<string>io.mininghq.mhq-rig-agent</string>"));
        assert!(plist.contains(
            "<string>/Users/u/Library/Application Support/MiningHQ/mhq-rig-agent</string>"
        ));
        assert!(plist.contains("<key>RunAtLoad</key>"));
    }

    #[test]
    fn unregister_tolerates_missing_agent() {
        let home = tempfile::tempdir().expect("tempdir");
        let adapter = LaunchdAdapter::new(home.path());

        adapter.unregister_service("mhq-rig-agent").expect("tolerated");
    }
}
