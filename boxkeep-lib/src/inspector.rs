use boxkeep_common::{ConfigModel, ContainerEngine, Result};
use std::sync::Arc;
use tracing::{info, instrument};

/// A workload's inspection document together with its typed view.
#[derive(Debug, Clone)]
pub struct Inspection {
    /// Persisted verbatim as the snapshot's configuration document.
    pub document: serde_json::Value,
    pub model: ConfigModel,
}

pub struct Inspector {
    engine: Arc<dyn ContainerEngine>,
}

impl Inspector {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    /// Read-only query; fails with `NotFound` for an unknown workload.
    #[instrument(skip(self))]
    pub async fn inspect(&self, workload_id: &str) -> Result<Inspection> {
        let document = self.engine.inspect_container(workload_id).await?;
        let model = ConfigModel::from_document(document.clone())?;
        info!(
            name = %model.name,
            env = model.env.len(),
            ports = model.port_bindings.len(),
            mounts = model.mounts.len(),
            "Inspected workload"
        );
        Ok(Inspection { document, model })
    }
}
