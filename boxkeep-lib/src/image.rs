use boxkeep_common::{ContainerEngine, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Tag for the temporary image a snapshot freezes `workload_id` into.
///
/// Image repositories must be lower-case and only allow `[a-z0-9_.-]`, so the
/// workload id is lower-cased and anything else becomes `_`.
pub fn snapshot_image_ref(workload_id: &str, timestamp: &str) -> String {
    let repo: String = workload_id
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{repo}_backup:{timestamp}")
}

/// Freezes a workload into a portable, compressed image archive.
pub struct ImageArchiver {
    engine: Arc<dyn ContainerEngine>,
}

impl ImageArchiver {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    /// Commit `workload_id` as `image_ref` (paused meanwhile), save it to
    /// `dest`, then drop the temporary image reference. The reference is
    /// dropped even when saving fails.
    #[instrument(skip(self, dest), fields(dest = %dest.display()))]
    pub async fn archive(&self, workload_id: &str, image_ref: &str, dest: &Path) -> Result<()> {
        self.engine.commit_container(workload_id, image_ref).await?;
        let saved = self.engine.save_image(image_ref, dest).await;

        if let Err(e) = self.engine.remove_image(image_ref).await {
            warn!(%image_ref, error = %e, "Failed to remove temporary snapshot image");
        }

        saved?;
        info!(%image_ref, "Image archive written");
        Ok(())
    }
}
