// Re-export dependencies used in public interfaces of common types

use std::path::{Path, PathBuf};

use async_trait::async_trait;
pub use serde::{Deserialize, Serialize};
pub use serde_json;
use thiserror::Error;

pub mod config;
pub mod helper;
pub mod launch;
pub mod layout;

pub use config::{ConfigModel, MountEntry, MountKind, PortBinding};
pub use helper::HelperTask;
pub use launch::{BindMount, LaunchSpec, LaunchSpecBuilder, PortMapping, VolumeMount};
pub use layout::{SnapshotLayout, VolumeSnapshot};

#[derive(Error, Debug)]
pub enum BoxkeepError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Name collision: {0}")]
    NameCollision(String),

    #[error("Bind mount source does not exist on this host: {}", .0.display())]
    MissingBindSource(PathBuf),

    #[error("Archive failure: {0}")]
    ArchiveFailure(String),

    #[error("Launch failure: {0}")]
    LaunchFailure(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Malformed configuration document: {0}")]
    Document(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for BoxkeepError {
    fn from(err: serde_json::Error) -> Self {
        BoxkeepError::Document(err.to_string())
    }
}

// Define the primary Result type for boxkeep operations
pub type Result<T> = std::result::Result<T, BoxkeepError>;

/// Everything boxkeep needs from a container engine.
///
/// The backup and restore pipelines only ever talk to the engine through this
/// trait, so they can be driven by an in-memory engine in tests.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Fails with `MissingDependency` when the engine cannot be reached.
    async fn ping(&self) -> Result<()>;

    /// Raw inspection document for a workload: a one-element JSON array.
    /// Fails with `NotFound` when the identifier does not resolve.
    async fn inspect_container(&self, id: &str) -> Result<serde_json::Value>;

    /// Exact-name lookup among all workloads, running or stopped.
    async fn container_exists(&self, name: &str) -> Result<bool>;

    /// Freezes the workload's filesystem into `image_ref`, pausing it meanwhile.
    async fn commit_container(&self, id: &str, image_ref: &str) -> Result<()>;

    /// Serializes `image_ref` into a gzip-compressed image archive at `dest`.
    async fn save_image(&self, image_ref: &str, dest: &Path) -> Result<()>;

    async fn remove_image(&self, image_ref: &str) -> Result<()>;

    async fn image_exists(&self, image_ref: &str) -> Result<bool>;

    /// Loads a gzip-compressed image archive produced by `save_image`.
    async fn load_image(&self, archive: &Path) -> Result<()>;

    async fn volume_exists(&self, name: &str) -> Result<bool>;

    async fn create_volume(&self, name: &str) -> Result<()>;

    /// Pulls `image_ref` if it is not present locally.
    async fn ensure_image(&self, image_ref: &str) -> Result<()>;

    /// Runs an ephemeral helper workload to completion and removes it.
    /// A non-zero exit is reported as `ArchiveFailure`.
    async fn run_helper(&self, image: &str, task: &HelperTask) -> Result<()>;

    /// Creates and starts a detached workload, returning its id.
    /// Engine rejections are reported as `LaunchFailure`.
    async fn launch(&self, spec: &LaunchSpec) -> Result<String>;
}
