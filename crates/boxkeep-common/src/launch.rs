use std::path::PathBuf;

/// Host port `host_port` forwarded to `container_port` (protocol already stripped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    /// Empty when the engine should pick the host port.
    pub host_port: String,
    pub container_port: String,
}

impl PortMapping {
    pub fn render(&self) -> String {
        if self.host_port.is_empty() {
            self.container_port.clone()
        } else {
            format!("{}:{}", self.host_port, self.container_port)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub volume: String,
    pub destination: String,
}

impl VolumeMount {
    pub fn render(&self) -> String {
        format!("{}:{}", self.volume, self.destination)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub source: PathBuf,
    pub destination: String,
}

impl BindMount {
    pub fn render(&self) -> String {
        format!("{}:{}", self.source.display(), self.destination)
    }
}

/// Fully resolved parameters for relaunching a workload.
///
/// Built once per restore by [`LaunchSpecBuilder`] and handed to the engine as
/// a whole. Field order matches the order the parameters are rendered in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub name: String,
    pub restart_policy: Option<String>,
    pub env: Vec<String>,
    pub ports: Vec<PortMapping>,
    pub volumes: Vec<VolumeMount>,
    pub binds: Vec<BindMount>,
    pub image: String,
}

impl LaunchSpec {
    pub fn builder(name: impl Into<String>) -> LaunchSpecBuilder {
        LaunchSpecBuilder::new(name)
    }

    /// Mount specifications in launch order: named volumes first, then binds.
    pub fn mount_specs(&self) -> Vec<String> {
        self.volumes
            .iter()
            .map(VolumeMount::render)
            .chain(self.binds.iter().map(BindMount::render))
            .collect()
    }

    /// Renders the spec as an engine `run` argument vector:
    /// name, restart policy, environment, ports, volume mounts, bind mounts, image.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            self.name.clone(),
        ];
        if let Some(policy) = &self.restart_policy {
            args.push("--restart".to_string());
            args.push(policy.clone());
        }
        for entry in &self.env {
            args.push("-e".to_string());
            args.push(entry.clone());
        }
        for port in &self.ports {
            args.push("-p".to_string());
            args.push(port.render());
        }
        for mount in self.mount_specs() {
            args.push("-v".to_string());
            args.push(mount);
        }
        args.push(self.image.clone());
        args
    }
}

impl std::fmt::Display for LaunchSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_args().join(" "))
    }
}

#[derive(Debug, Clone, Default)]
pub struct LaunchSpecBuilder {
    name: String,
    restart_policy: Option<String>,
    env: Vec<String>,
    ports: Vec<PortMapping>,
    volumes: Vec<VolumeMount>,
    binds: Vec<BindMount>,
}

impl LaunchSpecBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn restart_policy(mut self, policy: impl Into<String>) -> Self {
        self.restart_policy = Some(policy.into());
        self
    }

    pub fn env(mut self, entry: impl Into<String>) -> Self {
        self.env.push(entry.into());
        self
    }

    pub fn port(mut self, host_port: impl Into<String>, container_port: impl Into<String>) -> Self {
        self.ports.push(PortMapping {
            host_port: host_port.into(),
            container_port: container_port.into(),
        });
        self
    }

    pub fn volume(mut self, volume: impl Into<String>, destination: impl Into<String>) -> Self {
        self.volumes.push(VolumeMount {
            volume: volume.into(),
            destination: destination.into(),
        });
        self
    }

    pub fn bind(mut self, source: impl Into<PathBuf>, destination: impl Into<String>) -> Self {
        self.binds.push(BindMount {
            source: source.into(),
            destination: destination.into(),
        });
        self
    }

    pub fn build(self, image: impl Into<String>) -> LaunchSpec {
        LaunchSpec {
            name: self.name,
            restart_policy: self.restart_policy,
            env: self.env,
            ports: self.ports,
            volumes: self.volumes,
            binds: self.binds,
            image: image.into(),
        }
    }
}
