//! Persisted configuration -> LaunchSpec.
//!
//! Translation is deterministic: the same document and host always yield the
//! same spec. Environment and mounts keep document order; ports come out
//! ordered by their container-port key.
//! Bind-mount sources are checked against the current host while translating,
//! and the first missing one aborts the whole translation.

use boxkeep_common::{BoxkeepError, ConfigModel, LaunchSpec, MountKind, Result};
use std::path::Path;
use tracing::warn;

pub fn translate(model: &ConfigModel, image_ref: &str) -> Result<LaunchSpec> {
    let mut builder = LaunchSpec::builder(model.name.as_str());

    if let Some(policy) = model.restart_policy() {
        builder = builder.restart_policy(policy);
    }

    for entry in &model.env {
        builder = builder.env(entry.as_str());
    }

    // Only the first host binding of each container port is carried over
    for binding in &model.port_bindings {
        match &binding.host_port {
            Some(host_port) => builder = builder.port(host_port.as_str(), binding.port()),
            None => warn!(
                container_port = %binding.container_port,
                "Port has no host binding; not publishing it"
            ),
        }
    }

    for mount in &model.mounts {
        match mount.kind {
            MountKind::Volume => {
                builder = builder.volume(mount.name_or_source.as_str(), mount.destination.as_str());
            }
            MountKind::Bind => {
                let source = Path::new(&mount.name_or_source);
                if !source.exists() {
                    return Err(BoxkeepError::MissingBindSource(source.to_path_buf()));
                }
                builder = builder.bind(source, mount.destination.as_str());
            }
            other => warn!(
                kind = %other,
                destination = %mount.destination,
                "Mount kind is not restored"
            ),
        }
    }

    Ok(builder.build(image_ref))
}
