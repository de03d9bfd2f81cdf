//! Pointer-file state store.
//!
//! A single small file (`.mhqpath` in the home directory) whose entire
//! content is the absolute installation path. It is the sole source of truth
//! for locating a prior installation: if the file is missing the system is
//! not installed, regardless of what is left on disk.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::InstallerError;

/// Name of the pointer file, relative to the home directory.
pub const STATE_FILE_NAME: &str = ".mhqpath";

pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the well-known location under `home_dir`.
    pub fn for_home(home_dir: &Path) -> Self {
        Self::new(home_dir.join(STATE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically replace the pointer file content with `install_path`.
    ///
    /// Write-to-temp-then-rename so a concurrent reader never observes a
    /// torn write.
    pub fn write(&self, install_path: &Path) -> Result<(), InstallerError> {
        write_atomic(&self.path, &install_path.display().to_string())
            .map_err(InstallerError::StatePersist)
    }

    /// Read the stored installation path, trimming trailing whitespace.
    ///
    /// A missing or empty file maps to `NotInstalled`.
    pub fn read(&self) -> Result<PathBuf, InstallerError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(InstallerError::NotInstalled);
            }
            Err(e) => {
                return Err(InstallerError::System(format!(
                    "failed to read state file {}: {e}",
                    self.path.display()
                )));
            }
        };

        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(InstallerError::NotInstalled);
        }
        Ok(PathBuf::from(trimmed))
    }

    /// Delete the pointer file, tolerating its absence.
    pub fn remove(&self) -> Result<(), InstallerError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(InstallerError::System(format!(
                "failed to remove state file {}: {e}",
                self.path.display()
            ))),
        }
    }
}

/// Write file atomically to prevent a torn read.
fn write_atomic(path: &Path, content: &str) -> Result<(), io::Error> {
    let temp_path = path.with_extension("tmp");

    {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
    }

    fs::rename(&temp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_exact_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = StateStore::new(dir.path().join(".mhqpath"));

        store.write(Path::new("/home/u/.mhq/svc")).expect("write");
        let read = store.read().expect("read");
        assert_eq!(read, PathBuf::from("/home/u/.mhq/svc"));
    }

    #[test]
    fn trims_trailing_whitespace() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(".mhqpath");
        fs::write(&path, "/opt/mininghq/services\n  ").expect("seed");

        let store = StateStore::new(path);
        assert_eq!(
            store.read().expect("read"),
            PathBuf::from("/opt/mininghq/services")
        );
    }

    #[test]
    fn missing_file_reads_as_not_installed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = StateStore::new(dir.path().join(".mhqpath"));

        assert!(matches!(store.read(), Err(InstallerError::NotInstalled)));
    }

    #[test]
    fn empty_file_reads_as_not_installed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(".mhqpath");
        fs::write(&path, "   \n").expect("seed");

        let store = StateStore::new(path);
        assert!(matches!(store.read(), Err(InstallerError::NotInstalled)));
    }

    #[test]
    fn remove_tolerates_absence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = StateStore::new(dir.path().join(".mhqpath"));

        store.write(Path::new("/tmp/x")).expect("write");
        store.remove().expect("first remove");
        store.remove().expect("second remove");
    }
}
