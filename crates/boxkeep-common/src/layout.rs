//! On-disk contract of a snapshot directory:
//!
//! ```text
//! <backup_dir>/
//!   container_image.tar.gz
//!   container_config.json
//!   volumes/
//!     <volume_name>.tar.gz
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::{BoxkeepError, Result};

pub const IMAGE_ARCHIVE: &str = "container_image.tar.gz";
pub const CONFIG_DOCUMENT: &str = "container_config.json";
pub const VOLUMES_DIR: &str = "volumes";
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// A named volume's archive inside a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSnapshot {
    pub name: String,
    pub archive_path: PathBuf,
}

impl VolumeSnapshot {
    pub fn archive_name(name: &str) -> String {
        format!("{name}{ARCHIVE_SUFFIX}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotLayout {
    root: PathBuf,
}

impl SnapshotLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Layout for a new snapshot of `workload_id`: `<parent>/backup_<id>_<timestamp>`.
    pub fn for_backup(parent: &Path, workload_id: &str, timestamp: &str) -> Self {
        Self::new(parent.join(format!("backup_{workload_id}_{timestamp}")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn image_archive(&self) -> PathBuf {
        self.root.join(IMAGE_ARCHIVE)
    }

    pub fn config_document(&self) -> PathBuf {
        self.root.join(CONFIG_DOCUMENT)
    }

    pub fn volumes_dir(&self) -> PathBuf {
        self.root.join(VOLUMES_DIR)
    }

    pub fn volume_archive(&self, volume: &str) -> PathBuf {
        self.volumes_dir().join(VolumeSnapshot::archive_name(volume))
    }

    /// Creates the snapshot directory and its volumes sub-directory.
    /// An existing snapshot directory is never reused.
    pub fn create(&self) -> Result<()> {
        if let Some(parent) = self.root.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir(&self.root).map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => BoxkeepError::NameCollision(format!(
                "snapshot directory {} already exists",
                self.root.display()
            )),
            _ => BoxkeepError::Io(e),
        })?;
        fs::create_dir(self.volumes_dir())?;
        Ok(())
    }

    /// Checks that the directory holds the files every snapshot must have.
    pub fn validate(&self) -> Result<()> {
        if !self.root.is_dir() {
            return Err(BoxkeepError::NotFound(format!(
                "snapshot directory {}",
                self.root.display()
            )));
        }
        for required in [self.image_archive(), self.config_document()] {
            if !required.is_file() {
                return Err(BoxkeepError::NotFound(required.display().to_string()));
            }
        }
        Ok(())
    }

    /// Volume archives in the snapshot, sorted by volume name.
    /// A snapshot without a volumes directory has no volumes.
    pub fn volume_snapshots(&self) -> Result<Vec<VolumeSnapshot>> {
        let dir = self.volumes_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut snapshots = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(name) = file_name
                .to_str()
                .and_then(|n| n.strip_suffix(ARCHIVE_SUFFIX))
                .filter(|n| !n.is_empty())
            else {
                continue;
            };
            snapshots.push(VolumeSnapshot {
                name: name.to_string(),
                archive_path: entry.path(),
            });
        }
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(snapshots)
    }
}
