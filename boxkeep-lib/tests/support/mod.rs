//! In-memory container engine for driving backup and restore without Docker.
//!
//! Every trait call is recorded, so tests can assert exactly which engine
//! operations a pipeline issued and in what order. Image and volume archives
//! are real gzip tarballs on disk.
#![allow(dead_code)]

use async_trait::async_trait;
use boxkeep_common::{
    BoxkeepError, ContainerEngine, HelperTask, LaunchSpec, Result, SnapshotLayout,
};
use boxkeep_engine::archive::image_repo_tag;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

pub type Files = BTreeMap<String, Vec<u8>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineCall {
    Ping,
    Inspect(String),
    ContainerExists(String),
    Commit { id: String, image: String },
    Save(String),
    RemoveImage(String),
    ImageExists(String),
    LoadImage(PathBuf),
    VolumeExists(String),
    CreateVolume(String),
    EnsureImage(String),
    Helper(HelperTask),
    Launch(LaunchSpec),
}

impl EngineCall {
    /// Calls that change engine state.
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            EngineCall::Ping
                | EngineCall::Inspect(_)
                | EngineCall::ContainerExists(_)
                | EngineCall::ImageExists(_)
                | EngineCall::VolumeExists(_)
        )
    }
}

#[derive(Default)]
struct FakeState {
    unreachable: bool,
    fail_save: bool,
    fail_launch: bool,
    /// Workload name -> inspection object (not wrapped in the array).
    containers: BTreeMap<String, Value>,
    images: BTreeSet<String>,
    volumes: BTreeMap<String, Files>,
    launched: Vec<LaunchSpec>,
}

#[derive(Clone, Default)]
pub struct FakeEngine {
    calls: Arc<Mutex<Vec<EngineCall>>>,
    state: Arc<Mutex<FakeState>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_workload(&self, document: Value) {
        let name = document["Name"]
            .as_str()
            .unwrap_or_default()
            .trim_start_matches('/')
            .to_string();
        self.state.lock().await.containers.insert(name, document);
    }

    pub async fn add_volume(&self, name: &str, files: Files) {
        self.state
            .lock()
            .await
            .volumes
            .insert(name.to_string(), files);
    }

    pub async fn add_image(&self, image_ref: &str) {
        self.state.lock().await.images.insert(image_ref.to_string());
    }

    pub async fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().await.unreachable = unreachable;
    }

    pub async fn set_fail_save(&self, fail: bool) {
        self.state.lock().await.fail_save = fail;
    }

    pub async fn set_fail_launch(&self, fail: bool) {
        self.state.lock().await.fail_launch = fail;
    }

    pub async fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().await.clone()
    }

    pub async fn mutations(&self) -> Vec<EngineCall> {
        self.calls()
            .await
            .into_iter()
            .filter(EngineCall::is_mutation)
            .collect()
    }

    pub async fn clear_calls(&self) {
        self.calls.lock().await.clear();
    }

    pub async fn volume_files(&self, name: &str) -> Option<Files> {
        self.state.lock().await.volumes.get(name).cloned()
    }

    pub async fn volume_names(&self) -> Vec<String> {
        self.state.lock().await.volumes.keys().cloned().collect()
    }

    pub async fn has_image(&self, image_ref: &str) -> bool {
        self.state.lock().await.images.contains(image_ref)
    }

    pub async fn has_container(&self, name: &str) -> bool {
        self.state.lock().await.containers.contains_key(name)
    }

    pub async fn launched(&self) -> Vec<LaunchSpec> {
        self.state.lock().await.launched.clone()
    }

    async fn record(&self, call: EngineCall) {
        self.calls.lock().await.push(call);
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn ping(&self) -> Result<()> {
        self.record(EngineCall::Ping).await;
        if self.state.lock().await.unreachable {
            return Err(BoxkeepError::MissingDependency(
                "container engine is not reachable".to_string(),
            ));
        }
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<Value> {
        self.record(EngineCall::Inspect(id.to_string())).await;
        let state = self.state.lock().await;
        state
            .containers
            .get(id.trim_start_matches('/'))
            .map(|doc| json!([doc]))
            .ok_or_else(|| BoxkeepError::NotFound(format!("workload {id}")))
    }

    async fn container_exists(&self, name: &str) -> Result<bool> {
        self.record(EngineCall::ContainerExists(name.to_string())).await;
        Ok(self.state.lock().await.containers.contains_key(name))
    }

    async fn commit_container(&self, id: &str, image_ref: &str) -> Result<()> {
        self.record(EngineCall::Commit {
            id: id.to_string(),
            image: image_ref.to_string(),
        })
        .await;
        let mut state = self.state.lock().await;
        if !state.containers.contains_key(id) {
            return Err(BoxkeepError::NotFound(format!("workload {id}")));
        }
        state.images.insert(image_ref.to_string());
        Ok(())
    }

    async fn save_image(&self, image_ref: &str, dest: &Path) -> Result<()> {
        self.record(EngineCall::Save(image_ref.to_string())).await;
        let state = self.state.lock().await;
        if state.fail_save {
            return Err(BoxkeepError::ArchiveFailure(
                "image export stream closed early".to_string(),
            ));
        }
        if !state.images.contains(image_ref) {
            return Err(BoxkeepError::NotFound(format!("image {image_ref}")));
        }
        write_image_archive(dest, image_ref)?;
        Ok(())
    }

    async fn remove_image(&self, image_ref: &str) -> Result<()> {
        self.record(EngineCall::RemoveImage(image_ref.to_string()))
            .await;
        self.state.lock().await.images.remove(image_ref);
        Ok(())
    }

    async fn image_exists(&self, image_ref: &str) -> Result<bool> {
        self.record(EngineCall::ImageExists(image_ref.to_string()))
            .await;
        Ok(self.state.lock().await.images.contains(image_ref))
    }

    async fn load_image(&self, archive: &Path) -> Result<()> {
        self.record(EngineCall::LoadImage(archive.to_path_buf())).await;
        let tag = image_repo_tag(archive)?;
        self.state.lock().await.images.insert(tag);
        Ok(())
    }

    async fn volume_exists(&self, name: &str) -> Result<bool> {
        self.record(EngineCall::VolumeExists(name.to_string())).await;
        Ok(self.state.lock().await.volumes.contains_key(name))
    }

    async fn create_volume(&self, name: &str) -> Result<()> {
        self.record(EngineCall::CreateVolume(name.to_string())).await;
        self.state
            .lock()
            .await
            .volumes
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn ensure_image(&self, image_ref: &str) -> Result<()> {
        self.record(EngineCall::EnsureImage(image_ref.to_string()))
            .await;
        self.state.lock().await.images.insert(image_ref.to_string());
        Ok(())
    }

    async fn run_helper(&self, image: &str, task: &HelperTask) -> Result<()> {
        self.record(EngineCall::Helper(task.clone())).await;
        let mut state = self.state.lock().await;
        if !state.images.contains(image) {
            return Err(BoxkeepError::ArchiveFailure(format!(
                "helper image {image} is not present"
            )));
        }
        let archive = task.archive_dir().join(task.archive_name());
        match task {
            HelperTask::ArchiveVolume { volume, .. } => {
                let files = state.volumes.get(volume).ok_or_else(|| {
                    BoxkeepError::ArchiveFailure(format!(
                        "helper for volume {volume} exited with status 1"
                    ))
                })?;
                write_tar_gz(&archive, files)?;
            }
            HelperTask::ExtractVolume { volume, .. } => {
                let extracted = read_tar_gz(&archive).map_err(|e| {
                    BoxkeepError::ArchiveFailure(format!(
                        "helper for volume {volume} exited with status 2: {e}"
                    ))
                })?;
                let files = state.volumes.get_mut(volume).ok_or_else(|| {
                    BoxkeepError::ArchiveFailure(format!("no such volume {volume}"))
                })?;
                files.extend(extracted);
            }
        }
        Ok(())
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<String> {
        self.record(EngineCall::Launch(spec.clone())).await;
        let mut state = self.state.lock().await;
        if state.fail_launch {
            return Err(BoxkeepError::LaunchFailure(
                "engine rejected the launch".to_string(),
            ));
        }
        if state.containers.contains_key(&spec.name) {
            return Err(BoxkeepError::LaunchFailure(format!(
                "Conflict. The container name \"/{}\" is already in use",
                spec.name
            )));
        }
        if !state.images.contains(&spec.image) {
            return Err(BoxkeepError::LaunchFailure(format!(
                "No such image: {}",
                spec.image
            )));
        }
        for mount in &spec.volumes {
            state.volumes.entry(mount.volume.clone()).or_default();
        }

        let id = format!("fake{:04}", state.launched.len() + 1);
        state
            .containers
            .insert(spec.name.clone(), document_for_spec(&id, spec));
        state.launched.push(spec.clone());
        Ok(id)
    }
}

/// Inspection object the engine would report for a workload launched from `spec`.
fn document_for_spec(id: &str, spec: &LaunchSpec) -> Value {
    let mut port_bindings = Map::new();
    for port in &spec.ports {
        port_bindings.insert(
            format!("{}/tcp", port.container_port),
            json!([{ "HostIp": "", "HostPort": port.host_port }]),
        );
    }
    let mut mounts = Vec::new();
    for volume in &spec.volumes {
        mounts.push(json!({
            "Type": "volume",
            "Name": volume.volume,
            "Source": format!("/var/lib/docker/volumes/{}/_data", volume.volume),
            "Destination": volume.destination,
            "RW": true,
        }));
    }
    for bind in &spec.binds {
        mounts.push(json!({
            "Type": "bind",
            "Source": bind.source.display().to_string(),
            "Destination": bind.destination,
            "RW": true,
        }));
    }
    json!({
        "Id": id,
        "Name": format!("/{}", spec.name),
        "Config": { "Image": spec.image, "Env": spec.env },
        "HostConfig": {
            "RestartPolicy": { "Name": spec.restart_policy.as_deref().unwrap_or("no") },
            "PortBindings": port_bindings,
        },
        "Mounts": mounts,
    })
}

/// Inspection object for the `web` workload: one named volume `web_data` at
/// `/data`, `bind_source` bound at `/config`, host port 8080 -> 80/tcp.
pub fn web_document(bind_source: &Path) -> Value {
    json!({
        "Id": "3f2a9c1d7e5b",
        "Name": "/web",
        "Config": {
            "Image": "nginx:1.25",
            "Env": ["APP_MODE=production", "PATH=/usr/local/sbin:/usr/local/bin:/usr/bin"],
        },
        "HostConfig": {
            "RestartPolicy": { "Name": "unless-stopped", "MaximumRetryCount": 0 },
            "PortBindings": { "80/tcp": [{ "HostIp": "", "HostPort": "8080" }] },
        },
        "Mounts": [
            {
                "Type": "volume",
                "Name": "web_data",
                "Source": "/var/lib/docker/volumes/web_data/_data",
                "Destination": "/data",
                "Driver": "local",
                "RW": true,
            },
            {
                "Type": "bind",
                "Source": bind_source.display().to_string(),
                "Destination": "/config",
                "RW": true,
            },
        ],
    })
}

/// Writes a complete snapshot directory at `root` without going through backup.
pub fn write_snapshot(
    root: &Path,
    image_ref: &str,
    document: &Value,
    volumes: &[(&str, Files)],
) -> io::Result<SnapshotLayout> {
    let layout = SnapshotLayout::new(root);
    std::fs::create_dir_all(layout.volumes_dir())?;
    write_image_archive(&layout.image_archive(), image_ref)?;
    std::fs::write(
        layout.config_document(),
        serde_json::to_vec_pretty(&json!([document]))?,
    )?;
    for (name, files) in volumes {
        write_tar_gz(&layout.volume_archive(name), files)?;
    }
    Ok(layout)
}

pub fn files(entries: &[(&str, &str)]) -> Files {
    entries
        .iter()
        .map(|(name, data)| (name.to_string(), data.as_bytes().to_vec()))
        .collect()
}

pub fn write_image_archive(path: &Path, image_ref: &str) -> io::Result<()> {
    let manifest = json!([{
        "Config": "config.json",
        "RepoTags": [image_ref],
        "Layers": ["layer.tar"],
    }]);
    write_tar_gz(
        path,
        &BTreeMap::from([
            ("config.json".to_string(), b"{}".to_vec()),
            ("layer.tar".to_string(), Vec::new()),
            ("manifest.json".to_string(), serde_json::to_vec(&manifest)?),
        ]),
    )
}

pub fn write_tar_gz(path: &Path, files: &Files) -> io::Result<()> {
    let mut builder = tar::Builder::new(GzEncoder::new(File::create(path)?, Compression::default()));
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        builder.append_data(&mut header, name, data.as_slice())?;
    }
    builder.into_inner()?.finish()?;
    Ok(())
}

pub fn read_tar_gz(path: &Path) -> io::Result<Files> {
    let mut archive = tar::Archive::new(GzDecoder::new(File::open(path)?));
    let mut files = Files::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry
            .path()?
            .to_string_lossy()
            .trim_start_matches("./")
            .to_string();
        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        files.insert(name, data);
    }
    Ok(files)
}
