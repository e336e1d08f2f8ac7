//! Named-volume archiving and replay through helper workloads.
//!
//! Volumes are handled one at a time. Each one gets its own short-lived helper
//! workload that mounts the volume and the snapshot's volumes directory.

use crate::preflight::{VolumeAction, VolumePlan};
use crate::restore::{JournalEntry, RestoreJournal};
use boxkeep_common::{
    BoxkeepError, ContainerEngine, HelperTask, Result, SnapshotLayout, VolumeSnapshot,
};
use std::sync::Arc;
use tracing::{info, warn};

pub struct VolumeArchiver {
    engine: Arc<dyn ContainerEngine>,
    helper_image: String,
}

impl VolumeArchiver {
    pub fn new(engine: Arc<dyn ContainerEngine>, helper_image: impl Into<String>) -> Self {
        Self {
            engine,
            helper_image: helper_image.into(),
        }
    }

    /// Writes one `<volume>.tar.gz` per named volume into the snapshot.
    pub async fn archive_all(
        &self,
        volumes: &[&str],
        layout: &SnapshotLayout,
    ) -> Result<Vec<VolumeSnapshot>> {
        let mut unique: Vec<&str> = Vec::with_capacity(volumes.len());
        for volume in volumes {
            if !unique.contains(volume) {
                unique.push(*volume);
            }
        }
        if unique.is_empty() {
            warn!("Workload has no named volumes; nothing to archive");
            return Ok(Vec::new());
        }

        self.engine.ensure_image(&self.helper_image).await?;
        // bind sources handed to the engine must be absolute
        let archive_dir = layout.volumes_dir().canonicalize()?;

        let mut snapshots = Vec::with_capacity(unique.len());
        for volume in unique {
            let task = HelperTask::ArchiveVolume {
                volume: volume.to_string(),
                archive_dir: archive_dir.clone(),
                archive_name: VolumeSnapshot::archive_name(volume),
            };
            info!(%volume, "Archiving volume");
            self.engine.run_helper(&self.helper_image, &task).await?;

            let archive_path = layout.volume_archive(volume);
            if !archive_path.is_file() {
                return Err(BoxkeepError::ArchiveFailure(format!(
                    "helper produced no archive at {}",
                    archive_path.display()
                )));
            }
            snapshots.push(VolumeSnapshot {
                name: volume.to_string(),
                archive_path,
            });
        }
        Ok(snapshots)
    }
}

pub struct VolumeRestorer {
    engine: Arc<dyn ContainerEngine>,
    helper_image: String,
}

impl VolumeRestorer {
    pub fn new(engine: Arc<dyn ContainerEngine>, helper_image: impl Into<String>) -> Self {
        Self {
            engine,
            helper_image: helper_image.into(),
        }
    }

    /// Creates each planned volume that does not exist yet and extracts its
    /// archive into it. Extraction adds to existing content; nothing is wiped.
    pub async fn restore_all(
        &self,
        plans: &[VolumePlan],
        layout: &SnapshotLayout,
        journal: &mut RestoreJournal,
    ) -> Result<()> {
        if plans.is_empty() {
            info!("Snapshot has no volume archives");
            return Ok(());
        }

        self.engine.ensure_image(&self.helper_image).await?;
        let archive_dir = layout.volumes_dir().canonicalize()?;

        for plan in plans {
            let volume = &plan.snapshot.name;
            match plan.action {
                VolumeAction::Create => {
                    self.engine.create_volume(volume).await?;
                    journal.record(JournalEntry::VolumeCreated(volume.clone()));
                }
                VolumeAction::Reuse => {
                    journal.record(JournalEntry::VolumeReused(volume.clone()));
                }
            }

            let task = HelperTask::ExtractVolume {
                volume: volume.clone(),
                archive_dir: archive_dir.clone(),
                archive_name: VolumeSnapshot::archive_name(volume),
            };
            info!(%volume, "Replaying volume archive");
            self.engine.run_helper(&self.helper_image, &task).await?;
            journal.record(JournalEntry::VolumeReplayed(volume.clone()));
        }
        Ok(())
    }
}
