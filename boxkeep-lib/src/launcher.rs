use boxkeep_common::{ContainerEngine, LaunchSpec, Result};
use std::sync::Arc;
use tracing::info;

pub struct ContainerLauncher {
    engine: Arc<dyn ContainerEngine>,
}

impl ContainerLauncher {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    /// Single detached launch; an engine rejection is a `LaunchFailure`, never retried.
    pub async fn launch(&self, spec: &LaunchSpec) -> Result<String> {
        info!(command = %spec, "Launching workload");
        let container_id = self.engine.launch(spec).await?;
        info!(%container_id, name = %spec.name, "Workload running");
        Ok(container_id)
    }
}
