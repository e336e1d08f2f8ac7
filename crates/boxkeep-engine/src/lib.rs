use async_trait::async_trait;
use bollard::errors::Error as BollardError; // Alias bollard error
use bollard::Docker;
use boxkeep_common::{BoxkeepError, ContainerEngine, HelperTask, LaunchSpec, Result as CommonResult};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

// Re-export dependencies potentially needed by consumers
pub use bollard;
pub use boxkeep_common as common;

pub mod archive;
mod container;
mod image;
pub mod test_utils;

// --- Custom Error Type ---
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Container engine unreachable: {0}")]
    Unreachable(#[source] BollardError),
    #[error("{0} does not exist")]
    NotFound(String),
    #[error("Container commit failed: {0}")]
    CommitFailed(#[source] BollardError),
    #[error("Image export failed: {0}")]
    ExportFailed(#[source] BollardError),
    #[error("Image import failed: {0}")]
    ImportFailed(String),
    #[error("Image pull failed: {0}")]
    PullFailed(#[source] BollardError),
    #[error("Volume operation failed: {0}")]
    VolumeFailed(#[source] BollardError),
    #[error("Helper workload failed: {0}")]
    HelperFailed(String),
    #[error("Container launch failed: {0}")]
    LaunchFailed(String),
    #[error("Archive I/O error: {0}")]
    ArchiveIo(#[from] std::io::Error),
    #[error("Inspection document encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Docker API error: {0}")]
    DockerApi(#[from] BollardError), // Catch-all for other bollard errors
}

// Keep the boxkeep error taxonomy intact across the engine boundary
impl From<EngineError> for BoxkeepError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Unreachable(e) => {
                BoxkeepError::MissingDependency(format!("container engine is unreachable: {e}"))
            }
            EngineError::NotFound(what) => BoxkeepError::NotFound(what),
            EngineError::ExportFailed(_)
            | EngineError::ImportFailed(_)
            | EngineError::HelperFailed(_)
            | EngineError::ArchiveIo(_) => BoxkeepError::ArchiveFailure(err.to_string()),
            EngineError::LaunchFailed(_) => BoxkeepError::LaunchFailure(err.to_string()),
            EngineError::Encode(e) => BoxkeepError::Document(e.to_string()),
            other => BoxkeepError::Engine(other.to_string()),
        }
    }
}

// Define local Result using the crate's Error type
pub type Result<T> = std::result::Result<T, EngineError>;

pub(crate) fn is_not_found(err: &BollardError) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

// --- DockerEngine Implementation ---

#[derive(Clone)]
pub struct DockerEngine {
    docker: Arc<Docker>,
}

impl DockerEngine {
    pub fn new(docker: Arc<Docker>) -> Self {
        Self { docker }
    }

    /// Connects using the local defaults (`DOCKER_HOST` or the platform socket).
    /// The connection is lazy; reachability is checked by `ping`.
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(EngineError::Unreachable)?;
        Ok(Self::new(Arc::new(docker)))
    }

    pub fn docker(&self) -> &Docker {
        &self.docker
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn ping(&self) -> CommonResult<()> {
        self.docker
            .ping()
            .await
            .map_err(EngineError::Unreachable)?;
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> CommonResult<serde_json::Value> {
        Ok(self.inspect(id).await?)
    }

    async fn container_exists(&self, name: &str) -> CommonResult<bool> {
        Ok(self.exists(name).await?)
    }

    async fn commit_container(&self, id: &str, image_ref: &str) -> CommonResult<()> {
        Ok(self.commit(id, image_ref).await?)
    }

    async fn save_image(&self, image_ref: &str, dest: &Path) -> CommonResult<()> {
        self.save(image_ref, dest).await?;
        Ok(())
    }

    async fn remove_image(&self, image_ref: &str) -> CommonResult<()> {
        Ok(self.remove(image_ref).await?)
    }

    async fn image_exists(&self, image_ref: &str) -> CommonResult<bool> {
        Ok(self.has_image(image_ref).await?)
    }

    async fn load_image(&self, archive: &Path) -> CommonResult<()> {
        Ok(self.load(archive).await?)
    }

    async fn volume_exists(&self, name: &str) -> CommonResult<bool> {
        Ok(self.has_volume(name).await?)
    }

    async fn create_volume(&self, name: &str) -> CommonResult<()> {
        Ok(self.new_volume(name).await?)
    }

    async fn ensure_image(&self, image_ref: &str) -> CommonResult<()> {
        Ok(self.pull_if_missing(image_ref).await?)
    }

    async fn run_helper(&self, image: &str, task: &HelperTask) -> CommonResult<()> {
        Ok(self.helper(image, task).await?)
    }

    async fn launch(&self, spec: &LaunchSpec) -> CommonResult<String> {
        Ok(self.run_detached(spec).await?)
    }
}
