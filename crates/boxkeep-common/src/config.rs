//! Typed view of a workload's launch configuration.
//!
//! The persisted configuration document is the engine's own inspection output:
//! a one-element JSON array. Only the fields needed to relaunch the workload are
//! read, but those are read strictly. A document whose shape does not match is
//! rejected instead of being read as empty values.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{BoxkeepError, Result};

/// Restart policy value the engine uses for "never restart".
pub const NO_RESTART: &str = "no";

const ON_FAILURE: &str = "on-failure";
const PROTOCOLS: [&str; 3] = ["tcp", "udp", "sctp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    Bind,
    Volume,
    Tmpfs,
    Npipe,
    Cluster,
    Image,
}

impl std::fmt::Display for MountKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            MountKind::Bind => "bind",
            MountKind::Volume => "volume",
            MountKind::Tmpfs => "tmpfs",
            MountKind::Npipe => "npipe",
            MountKind::Cluster => "cluster",
            MountKind::Image => "image",
        };
        f.write_str(kind)
    }
}

/// One entry of the workload's mount list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub kind: MountKind,
    /// Volume name for `volume` mounts, host path for `bind` mounts.
    pub name_or_source: String,
    pub destination: String,
}

/// A published container port and the first host port bound to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    /// `<port>/<proto>`, e.g. `80/tcp`.
    pub container_port: String,
    /// `None` when the engine lists no host binding for the port,
    /// `Some("")` when the host port was left to the engine.
    pub host_port: Option<String>,
}

impl PortBinding {
    /// Container port with the protocol suffix removed.
    pub fn port(&self) -> &str {
        self.container_port
            .split_once('/')
            .map(|(port, _)| port)
            .unwrap_or(&self.container_port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigModel {
    pub name: String,
    pub env: Vec<String>,
    /// Sorted by container-port key, so the same document always yields
    /// the same order.
    pub port_bindings: Vec<PortBinding>,
    pub mounts: Vec<MountEntry>,
    pub restart_policy: String,
}

impl ConfigModel {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let document: serde_json::Value = serde_json::from_slice(bytes)?;
        Self::from_document(document)
    }

    pub fn from_document(document: serde_json::Value) -> Result<Self> {
        let mut entries: Vec<InspectDocument> = serde_json::from_value(document)?;
        if entries.len() != 1 {
            return Err(BoxkeepError::Document(format!(
                "expected exactly one inspection entry, found {}",
                entries.len()
            )));
        }
        ConfigModel::try_from(entries.remove(0))
    }

    /// The restart policy, or `None` when it is the "never restart" sentinel.
    pub fn restart_policy(&self) -> Option<&str> {
        match self.restart_policy.as_str() {
            "" | NO_RESTART => None,
            policy => Some(policy),
        }
    }

    /// Names of the engine-managed volumes mounted into the workload.
    pub fn named_volumes(&self) -> Vec<&str> {
        self.mounts
            .iter()
            .filter(|m| m.kind == MountKind::Volume)
            .map(|m| m.name_or_source.as_str())
            .collect()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectDocument {
    name: String,
    config: ContainerSection,
    host_config: HostSection,
    mounts: Option<Vec<MountDocument>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerSection {
    env: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HostSection {
    restart_policy: Option<RestartPolicyDocument>,
    port_bindings: Option<BTreeMap<String, Option<Vec<HostBindingDocument>>>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RestartPolicyDocument {
    name: Option<String>,
    maximum_retry_count: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HostBindingDocument {
    host_port: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MountDocument {
    #[serde(rename = "Type")]
    kind: MountKind,
    name: Option<String>,
    source: Option<String>,
    destination: String,
}

impl TryFrom<InspectDocument> for ConfigModel {
    type Error = BoxkeepError;

    fn try_from(doc: InspectDocument) -> Result<Self> {
        let name = doc.name.strip_prefix('/').unwrap_or(&doc.name).to_string();
        if name.is_empty() {
            return Err(BoxkeepError::Document("workload name is empty".to_string()));
        }

        let restart_policy = match doc.host_config.restart_policy {
            Some(RestartPolicyDocument {
                name: Some(policy),
                maximum_retry_count,
            }) => match maximum_retry_count {
                Some(count) if policy == ON_FAILURE && count > 0 => format!("{policy}:{count}"),
                _ => policy,
            },
            _ => String::new(),
        };

        let mut port_bindings = Vec::new();
        for (container_port, bindings) in doc.host_config.port_bindings.unwrap_or_default() {
            validate_port_key(&container_port)?;
            let host_port = bindings
                .and_then(|b| b.into_iter().next())
                .map(|b| b.host_port.unwrap_or_default());
            port_bindings.push(PortBinding {
                container_port,
                host_port,
            });
        }

        let mut mounts = Vec::new();
        let mut destinations = HashSet::new();
        for mount in doc.mounts.unwrap_or_default() {
            let name_or_source = match mount.kind {
                MountKind::Volume => mount.name.filter(|n| !n.is_empty()).ok_or_else(|| {
                    BoxkeepError::Document(format!(
                        "volume mount at {} has no volume name",
                        mount.destination
                    ))
                })?,
                MountKind::Bind => mount.source.filter(|s| !s.is_empty()).ok_or_else(|| {
                    BoxkeepError::Document(format!(
                        "bind mount at {} has no source path",
                        mount.destination
                    ))
                })?,
                _ => mount.name.or(mount.source).unwrap_or_default(),
            };
            if !destinations.insert(mount.destination.clone()) {
                return Err(BoxkeepError::Document(format!(
                    "mount destination {} is used more than once",
                    mount.destination
                )));
            }
            mounts.push(MountEntry {
                kind: mount.kind,
                name_or_source,
                destination: mount.destination,
            });
        }

        Ok(ConfigModel {
            name,
            env: doc.config.env.unwrap_or_default(),
            port_bindings,
            mounts,
            restart_policy,
        })
    }
}

fn validate_port_key(key: &str) -> Result<()> {
    let valid = match key.split_once('/') {
        Some((port, proto)) => {
            !port.is_empty()
                && port.chars().all(|c| c.is_ascii_digit())
                && PROTOCOLS.contains(&proto)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(BoxkeepError::Document(format!(
            "port binding key {key:?} is not of the form <port>/<proto>"
        )))
    }
}
