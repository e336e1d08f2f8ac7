use std::path::{Path, PathBuf};

/// Mount point of the volume being archived or restored inside a helper workload.
pub const HELPER_VOLUME_MOUNT: &str = "/volume";
/// Mount point of the snapshot's volumes directory inside a helper workload.
pub const HELPER_ARCHIVE_MOUNT: &str = "/backup";

/// Work carried out by an ephemeral helper workload.
///
/// Both tasks mount one named volume and one host directory; the side that is
/// only read from is mounted read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelperTask {
    /// Stream the full contents of `volume` into `<archive_dir>/<archive_name>`.
    ArchiveVolume {
        volume: String,
        archive_dir: PathBuf,
        archive_name: String,
    },
    /// Unpack `<archive_dir>/<archive_name>` on top of whatever `volume` holds.
    ExtractVolume {
        volume: String,
        archive_dir: PathBuf,
        archive_name: String,
    },
}

impl HelperTask {
    pub fn volume(&self) -> &str {
        match self {
            HelperTask::ArchiveVolume { volume, .. } | HelperTask::ExtractVolume { volume, .. } => {
                volume
            }
        }
    }

    pub fn archive_dir(&self) -> &Path {
        match self {
            HelperTask::ArchiveVolume { archive_dir, .. }
            | HelperTask::ExtractVolume { archive_dir, .. } => archive_dir,
        }
    }

    pub fn archive_name(&self) -> &str {
        match self {
            HelperTask::ArchiveVolume { archive_name, .. }
            | HelperTask::ExtractVolume { archive_name, .. } => archive_name,
        }
    }

    /// Engine bind specifications, `source:destination[:ro]`.
    pub fn binds(&self) -> Vec<String> {
        let dir = self.archive_dir().display();
        match self {
            HelperTask::ArchiveVolume { volume, .. } => vec![
                format!("{volume}:{HELPER_VOLUME_MOUNT}:ro"),
                format!("{dir}:{HELPER_ARCHIVE_MOUNT}"),
            ],
            HelperTask::ExtractVolume { volume, .. } => vec![
                format!("{volume}:{HELPER_VOLUME_MOUNT}"),
                format!("{dir}:{HELPER_ARCHIVE_MOUNT}:ro"),
            ],
        }
    }

    pub fn command(&self) -> Vec<String> {
        let archive = format!("{HELPER_ARCHIVE_MOUNT}/{}", self.archive_name());
        let flags = match self {
            HelperTask::ArchiveVolume { .. } => "czf",
            HelperTask::ExtractVolume { .. } => "xzf",
        };
        let mut command = vec!["tar".to_string(), flags.to_string(), archive];
        command.extend(["-C".to_string(), HELPER_VOLUME_MOUNT.to_string()]);
        if matches!(self, HelperTask::ArchiveVolume { .. }) {
            command.push(".".to_string());
        }
        command
    }
}

impl std::fmt::Display for HelperTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HelperTask::ArchiveVolume { volume, .. } => write!(f, "archive volume {volume}"),
            HelperTask::ExtractVolume { volume, .. } => write!(f, "extract into volume {volume}"),
        }
    }
}
