use crate::image::{snapshot_image_ref, ImageArchiver};
use crate::inspector::Inspector;
use crate::settings::Settings;
use crate::timestamp;
use crate::volumes::VolumeArchiver;
use boxkeep_common::{BoxkeepError, ContainerEngine, Result, SnapshotLayout};
use chrono::{DateTime, Local};
use std::sync::Arc;
use tracing::{info, instrument};

/// Produces a snapshot directory for one workload.
///
/// The directory holds the committed image archive, the raw configuration
/// document and one archive per named volume. The workload itself is only
/// paused while its image is committed; it is never stopped or modified.
pub struct SnapshotWriter {
    engine: Arc<dyn ContainerEngine>,
    settings: Settings,
}

impl SnapshotWriter {
    pub fn new(engine: Arc<dyn ContainerEngine>, settings: Settings) -> Self {
        Self { engine, settings }
    }

    pub async fn write(&self, workload_id: &str) -> Result<SnapshotLayout> {
        self.write_at(workload_id, Local::now()).await
    }

    /// Same as [`write`](Self::write) with an explicit snapshot time, which
    /// names both the directory and the temporary image tag.
    #[instrument(skip(self, at))]
    pub async fn write_at(&self, workload_id: &str, at: DateTime<Local>) -> Result<SnapshotLayout> {
        validate_workload_id(workload_id)?;
        self.engine.ping().await?;

        let inspection = Inspector::new(self.engine.clone()).inspect(workload_id).await?;

        let ts = timestamp(&at);
        let layout = SnapshotLayout::for_backup(&self.settings.output_dir, workload_id, &ts);
        layout.create()?;
        info!(snapshot = %layout.root().display(), "Created snapshot directory");

        VolumeArchiver::new(self.engine.clone(), self.settings.helper_image.as_str())
            .archive_all(&inspection.model.named_volumes(), &layout)
            .await?;

        let image_ref = snapshot_image_ref(workload_id, &ts);
        ImageArchiver::new(self.engine.clone())
            .archive(workload_id, &image_ref, &layout.image_archive())
            .await?;

        let document = serde_json::to_vec_pretty(&inspection.document)?;
        tokio::fs::write(layout.config_document(), document).await?;

        info!(snapshot = %layout.root().display(), "Backup complete");
        Ok(layout)
    }
}

fn validate_workload_id(workload_id: &str) -> Result<()> {
    if workload_id.trim().is_empty() {
        return Err(BoxkeepError::InvalidInput(
            "workload identifier must not be empty".to_string(),
        ));
    }
    if workload_id.contains(['/', '\\']) {
        return Err(BoxkeepError::InvalidInput(format!(
            "workload identifier {workload_id:?} contains a path separator"
        )));
    }
    Ok(())
}
