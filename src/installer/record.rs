//! Persisted installation record.
//!
//! `installation.json` lives inside the installation directory and describes
//! what was installed: where, for which OS, and which services were
//! registered. The pointer file remains the source of truth for *whether*
//! an installation exists; the record supplies the detail once one is found.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::platform::OperatingSystem;

/// Record file name inside the installation directory.
pub const RECORD_FILE_NAME: &str = "installation.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationRecord {
    /// Absolute directory where the service files live.
    pub install_path: PathBuf,
    /// OS identifier captured at install time.
    pub operating_system: OperatingSystem,
    /// Logical service names, in registration order.
    pub service_identifiers: Vec<String>,
    /// Informational only.
    pub installed_at: DateTime<Utc>,
}

impl InstallationRecord {
    pub fn new(
        install_path: PathBuf,
        operating_system: OperatingSystem,
        service_identifiers: Vec<String>,
    ) -> Self {
        Self {
            install_path,
            operating_system,
            service_identifiers,
            installed_at: Utc::now(),
        }
    }

    /// Write the record into `dir`, atomically.
    pub fn write_to(&self, dir: &Path) -> Result<(), io::Error> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let path = dir.join(RECORD_FILE_NAME);
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, path)
    }

    /// Load the record from `dir`, tolerating its absence.
    ///
    /// An unreadable or malformed record is reported as an error so callers
    /// can decide whether that matters for their flow.
    pub fn load_from(dir: &Path) -> Result<Option<Self>, io::Error> {
        let path = dir.join(RECORD_FILE_NAME);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_and_loads_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let record = InstallationRecord::new(
            dir.path().to_path_buf(),
            OperatingSystem::Linux,
            vec!["mhq-miner-controller".to_string(), "mhq-rig-agent".to_string()],
        );

        record.write_to(dir.path()).expect("write");
        let loaded = InstallationRecord::load_from(dir.path())
            .expect("load")
            .expect("present");

        assert_eq!(loaded.install_path, dir.path());
        assert_eq!(
            loaded.service_identifiers,
            vec!["mhq-miner-controller", "mhq-rig-agent"]
        );
    }

    #[test]
    fn load_tolerates_missing_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(
            InstallationRecord::load_from(dir.path())
                .expect("load")
                .is_none()
        );
    }
}
