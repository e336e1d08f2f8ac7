use crate::{is_not_found, DockerEngine, EngineError, Result};
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions, LogOutput,
    LogsOptions, RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::models::{
    ContainerInspectResponse, HostConfig, PortBinding, RestartPolicy, RestartPolicyNameEnum,
};
use bollard::volume::CreateVolumeOptions;
use boxkeep_common::{HelperTask, LaunchSpec};
use futures::StreamExt;
use std::collections::HashMap;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Label put on helper workloads so stray ones can be found by hand.
pub const HELPER_LABEL: &str = "io.boxkeep.helper";

const HELPER_LOG_TAIL: &str = "20";

impl DockerEngine {
    #[instrument(skip(self))]
    pub(crate) async fn inspect(&self, id: &str) -> Result<serde_json::Value> {
        let details = match self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
        {
            Ok(details) => details,
            Err(e) if is_not_found(&e) => {
                return Err(EngineError::NotFound(format!("workload {id}")))
            }
            Err(e) => return Err(e.into()),
        };
        inspection_document(details)
    }

    /// Exact name match against all containers, running or not
    pub(crate) async fn exists(&self, name: &str) -> Result<bool> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![format!("^/{name}$")]);
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await?;

        let wanted = format!("/{name}");
        Ok(containers.iter().any(|c| {
            c.names
                .as_ref()
                .is_some_and(|names| names.iter().any(|n| *n == wanted))
        }))
    }

    pub(crate) async fn has_volume(&self, name: &str) -> Result<bool> {
        match self.docker.inspect_volume(name).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(EngineError::VolumeFailed(e)),
        }
    }

    pub(crate) async fn new_volume(&self, name: &str) -> Result<()> {
        self.docker
            .create_volume(CreateVolumeOptions {
                name: name.to_string(),
                ..Default::default()
            })
            .await
            .map_err(EngineError::VolumeFailed)?;
        info!("Created volume {}", name);
        Ok(())
    }

    /// Run a helper task to completion. The helper container is removed
    /// whether or not the task succeeded.
    #[instrument(skip(self, task), fields(volume = %task.volume()))]
    pub(crate) async fn helper(&self, image: &str, task: &HelperTask) -> Result<()> {
        let name = format!("boxkeep-helper-{}", Uuid::new_v4());
        let config = Config {
            image: Some(image.to_string()),
            cmd: Some(task.command()),
            labels: Some(HashMap::from([(
                HELPER_LABEL.to_string(),
                task.volume().to_string(),
            )])),
            host_config: Some(HostConfig {
                binds: Some(task.binds()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|e| EngineError::HelperFailed(format!("{task}: {e}")))?;
        info!(container_id = %created.id, %name, "Helper created: {}", task);

        let outcome = self.wait_for_helper(&created.id, task).await;

        let remove_opts = Some(RemoveContainerOptions {
            force: true,
            ..Default::default()
        });
        if let Err(e) = self.docker.remove_container(&created.id, remove_opts).await {
            warn!(container_id = %created.id, error = %e, "Failed to remove helper container");
        }

        outcome
    }

    async fn wait_for_helper(&self, container_id: &str, task: &HelperTask) -> Result<()> {
        self.docker
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| EngineError::HelperFailed(format!("{task}: {e}")))?;

        let wait_options = WaitContainerOptions {
            condition: "not-running",
        };
        let mut wait_stream = Box::pin(
            self.docker
                .wait_container(container_id, Some(wait_options)),
        );
        let exit_code = match wait_stream.next().await {
            Some(Ok(body)) => body.status_code,
            // bollard reports non-zero exits as an error carrying the code
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => code,
            Some(Err(e)) => return Err(EngineError::HelperFailed(format!("{task}: {e}"))),
            None => {
                return Err(EngineError::HelperFailed(format!(
                    "{task}: wait stream ended unexpectedly"
                )))
            }
        };

        if exit_code != 0 {
            let logs = self.tail_logs(container_id).await;
            error!(%container_id, %exit_code, "Helper exited with non-zero status");
            return Err(EngineError::HelperFailed(format!(
                "{task} exited with status {exit_code}: {}",
                logs.trim()
            )));
        }
        Ok(())
    }

    async fn tail_logs(&self, container_id: &str) -> String {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: HELPER_LOG_TAIL.to_string(),
            ..Default::default()
        };
        let mut stream = Box::pin(self.docker.logs(container_id, Some(options)));
        let mut output = Vec::new();
        while let Some(entry) = stream.next().await {
            match entry {
                Ok(LogOutput::StdOut { message }) | Ok(LogOutput::StdErr { message }) => {
                    output.extend_from_slice(&message);
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
        String::from_utf8_lossy(&output).to_string()
    }

    /// Create and start the relaunched workload, detached
    #[instrument(skip(self, spec), fields(name = %spec.name, image = %spec.image))]
    pub(crate) async fn run_detached(&self, spec: &LaunchSpec) -> Result<String> {
        let config = launch_config(spec)?;
        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|e| EngineError::LaunchFailed(format!("{}: {e}", spec.name)))?;

        if let Err(e) = self
            .docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
        {
            // Leave no half-launched container behind so the name stays free for a retry
            let remove_opts = Some(RemoveContainerOptions {
                force: true,
                ..Default::default()
            });
            if let Err(remove_err) = self.docker.remove_container(&created.id, remove_opts).await {
                warn!(container_id = %created.id, error = %remove_err, "Failed to remove unstarted container");
            }
            return Err(EngineError::LaunchFailed(format!("{}: {e}", spec.name)));
        }

        info!(container_id = %created.id, "Container started");
        Ok(created.id)
    }
}

/// Wraps bollard's inspect model in the engine's own output shape, a
/// one-element array. Fields bollard does not model are not carried.
fn inspection_document(details: ContainerInspectResponse) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(vec![details])?)
}

fn parse_restart_policy(policy: &str) -> Result<RestartPolicy> {
    let (name, retries) = match policy.split_once(':') {
        Some((name, count)) => {
            let count = count.parse::<i64>().map_err(|_| {
                EngineError::LaunchFailed(format!("invalid restart retry count in {policy:?}"))
            })?;
            (name, Some(count))
        }
        None => (policy, None),
    };
    let name = match name {
        "always" => RestartPolicyNameEnum::ALWAYS,
        "unless-stopped" => RestartPolicyNameEnum::UNLESS_STOPPED,
        "on-failure" => RestartPolicyNameEnum::ON_FAILURE,
        "no" | "" => RestartPolicyNameEnum::NO,
        other => {
            return Err(EngineError::LaunchFailed(format!(
                "unknown restart policy {other:?}"
            )))
        }
    };
    Ok(RestartPolicy {
        name: Some(name),
        maximum_retry_count: retries,
    })
}

/// Map a LaunchSpec onto the engine's create-container body
fn launch_config(spec: &LaunchSpec) -> Result<Config<String>> {
    let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
    let mut bindings: HashMap<String, Vec<PortBinding>> = HashMap::new();
    for port in &spec.ports {
        // the protocol was dropped during translation, so the engine default applies
        let key = format!("{}/tcp", port.container_port);
        exposed_ports.insert(key.clone(), HashMap::new());
        bindings.entry(key).or_default().push(PortBinding {
            host_ip: None,
            host_port: (!port.host_port.is_empty()).then(|| port.host_port.clone()),
        });
    }
    let port_bindings = bindings
        .into_iter()
        .map(|(key, list)| (key, Some(list)))
        .collect::<HashMap<_, _>>();

    let restart_policy = spec
        .restart_policy
        .as_deref()
        .map(parse_restart_policy)
        .transpose()?;

    let mounts = spec.mount_specs();
    Ok(Config {
        image: Some(spec.image.clone()),
        env: (!spec.env.is_empty()).then(|| spec.env.clone()),
        exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
        host_config: Some(HostConfig {
            binds: (!mounts.is_empty()).then_some(mounts),
            port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
            restart_policy,
            ..Default::default()
        }),
        ..Default::default()
    })
}
