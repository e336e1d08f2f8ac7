use boxkeep_common::{BoxkeepError, ContainerEngine, Result, VolumeSnapshot};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageAction {
    /// The tag is already present locally; use it unchanged.
    Reuse,
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeAction {
    Create,
    /// A volume of that name exists; replay the archive into it.
    Reuse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumePlan {
    pub snapshot: VolumeSnapshot,
    pub action: VolumeAction,
}

/// Collision and reuse checks against the engine's object namespace.
/// Nothing here mutates engine state.
pub struct PreflightValidator {
    engine: Arc<dyn ContainerEngine>,
}

impl PreflightValidator {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    pub async fn check_name(&self, name: &str) -> Result<()> {
        if self.engine.container_exists(name).await? {
            return Err(BoxkeepError::NameCollision(format!(
                "a workload named {name} already exists"
            )));
        }
        Ok(())
    }

    pub async fn plan_image(&self, image_ref: &str) -> Result<ImageAction> {
        if self.engine.image_exists(image_ref).await? {
            info!(%image_ref, "Image already present; skipping load");
            Ok(ImageAction::Reuse)
        } else {
            Ok(ImageAction::Load)
        }
    }

    pub async fn plan_volumes(&self, snapshots: Vec<VolumeSnapshot>) -> Result<Vec<VolumePlan>> {
        let mut plans = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            let action = if self.engine.volume_exists(&snapshot.name).await? {
                warn!(volume = %snapshot.name, "Volume already exists; reusing it and merging archive contents");
                VolumeAction::Reuse
            } else {
                VolumeAction::Create
            };
            plans.push(VolumePlan { snapshot, action });
        }
        Ok(plans)
    }
}
