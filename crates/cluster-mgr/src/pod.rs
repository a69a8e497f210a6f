//! Pod identity, creation parameters and runtime snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::providers::traits::PodError;

/// Default number of GPUs attached to a pod.
const DEFAULT_GPU_COUNT: u32 = 1;

/// Default persistent volume size in GB.
const DEFAULT_VOLUME_GB: u32 = 40;

/// Default container disk size in GB.
const DEFAULT_CONTAINER_DISK_GB: u32 = 200;

/// Default exposed ports (Jupyter).
const DEFAULT_PORTS: &str = "8888/http";

/// Default mount path for the persistent volume.
const DEFAULT_VOLUME_MOUNT_PATH: &str = "/workspace";

/// Provider-assigned pod identifier.
///
/// Stable for the pod's whole lifetime and never reused by the provider.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PodHandle(String);

impl PodHandle {
    /// Wrap a provider identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PodHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PodHandle {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PodHandle {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Where the provider may place the pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloudType {
    /// Secure or community cloud, whichever has capacity.
    All,
    /// Secure cloud (tier 3/4 data centers) only.
    Secure,
    /// Community cloud only.
    Community,
}

impl std::fmt::Display for CloudType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "ALL"),
            Self::Secure => write!(f, "SECURE"),
            Self::Community => write!(f, "COMMUNITY"),
        }
    }
}

/// Deployment mode for a new pod.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Deployment {
    /// Not preemptible by the provider.
    OnDemand,
    /// Interruptible; the provider may reclaim it at any time.
    Spot {
        /// Bid per GPU in USD/hr. The provider's current spot price is used when `None`.
        bid_per_gpu: Option<f64>,
    },
}

impl Deployment {
    /// Whether this is an on-demand deployment.
    #[must_use]
    pub fn is_on_demand(&self) -> bool {
        matches!(self, Self::OnDemand)
    }
}

/// Environment variable passed into the pod's container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
}

/// Immutable parameters for one pod creation request.
///
/// Built with [`PodSpec::builder`]; there are no setters.
#[derive(Debug, Clone, PartialEq)]
pub struct PodSpec {
    template_id: String,
    gpu_type_id: String,
    deployment: Deployment,
    cloud_type: CloudType,
    gpu_count: u32,
    volume_gb: u32,
    container_disk_gb: u32,
    ports: String,
    volume_mount_path: String,
    name: String,
    docker_args: String,
    env: Vec<EnvVar>,
}

impl PodSpec {
    /// Start building a spec for `template_id` on `gpu_type_id`.
    pub fn builder(
        template_id: impl Into<String>,
        gpu_type_id: impl Into<String>,
    ) -> PodSpecBuilder {
        PodSpecBuilder {
            template_id: template_id.into(),
            gpu_type_id: gpu_type_id.into(),
            deployment: Deployment::OnDemand,
            cloud_type: None,
            gpu_count: DEFAULT_GPU_COUNT,
            volume_gb: DEFAULT_VOLUME_GB,
            container_disk_gb: DEFAULT_CONTAINER_DISK_GB,
            ports: DEFAULT_PORTS.to_string(),
            volume_mount_path: DEFAULT_VOLUME_MOUNT_PATH.to_string(),
            name: None,
            docker_args: String::new(),
            env: Vec::new(),
        }
    }

    #[must_use]
    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    #[must_use]
    pub fn gpu_type_id(&self) -> &str {
        &self.gpu_type_id
    }

    #[must_use]
    pub fn deployment(&self) -> Deployment {
        self.deployment
    }

    #[must_use]
    pub fn cloud_type(&self) -> CloudType {
        self.cloud_type
    }

    #[must_use]
    pub fn gpu_count(&self) -> u32 {
        self.gpu_count
    }

    #[must_use]
    pub fn volume_gb(&self) -> u32 {
        self.volume_gb
    }

    #[must_use]
    pub fn container_disk_gb(&self) -> u32 {
        self.container_disk_gb
    }

    #[must_use]
    pub fn ports(&self) -> &str {
        &self.ports
    }

    #[must_use]
    pub fn volume_mount_path(&self) -> &str {
        &self.volume_mount_path
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn docker_args(&self) -> &str {
        &self.docker_args
    }

    #[must_use]
    pub fn env(&self) -> &[EnvVar] {
        &self.env
    }
}

/// Builder for [`PodSpec`].
#[derive(Debug, Clone)]
pub struct PodSpecBuilder {
    template_id: String,
    gpu_type_id: String,
    deployment: Deployment,
    cloud_type: Option<CloudType>,
    gpu_count: u32,
    volume_gb: u32,
    container_disk_gb: u32,
    ports: String,
    volume_mount_path: String,
    name: Option<String>,
    docker_args: String,
    env: Vec<EnvVar>,
}

impl PodSpecBuilder {
    /// Deploy as an interruptible spot pod.
    #[must_use]
    pub fn spot(mut self, bid_per_gpu: Option<f64>) -> Self {
        self.deployment = Deployment::Spot { bid_per_gpu };
        self
    }

    /// Deploy as an on-demand pod (the default).
    #[must_use]
    pub fn on_demand(mut self) -> Self {
        self.deployment = Deployment::OnDemand;
        self
    }

    /// Override the cloud type. Defaults to `ALL` on demand and `SECURE` for spot.
    #[must_use]
    pub fn cloud_type(mut self, cloud_type: CloudType) -> Self {
        self.cloud_type = Some(cloud_type);
        self
    }

    #[must_use]
    pub fn gpu_count(mut self, count: u32) -> Self {
        self.gpu_count = count;
        self
    }

    #[must_use]
    pub fn volume_gb(mut self, gb: u32) -> Self {
        self.volume_gb = gb;
        self
    }

    #[must_use]
    pub fn container_disk_gb(mut self, gb: u32) -> Self {
        self.container_disk_gb = gb;
        self
    }

    #[must_use]
    pub fn ports(mut self, ports: impl Into<String>) -> Self {
        self.ports = ports.into();
        self
    }

    #[must_use]
    pub fn volume_mount_path(mut self, path: impl Into<String>) -> Self {
        self.volume_mount_path = path.into();
        self
    }

    /// Pod name. Defaults to the template id.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn docker_args(mut self, args: impl Into<String>) -> Self {
        self.docker_args = args.into();
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push(EnvVar {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Validate and freeze the spec.
    ///
    /// # Errors
    /// Returns [`PodError::Config`] if an identifier is blank, the GPU count
    /// is zero, or a spot bid is not a positive number.
    pub fn build(self) -> Result<PodSpec, PodError> {
        if self.template_id.trim().is_empty() {
            return Err(PodError::Config("template id must not be empty".to_string()));
        }
        if self.gpu_type_id.trim().is_empty() {
            return Err(PodError::Config("GPU type id must not be empty".to_string()));
        }
        if self.gpu_count == 0 {
            return Err(PodError::Config("GPU count must be at least 1".to_string()));
        }
        if let Deployment::Spot {
            bid_per_gpu: Some(bid),
        } = self.deployment
        {
            if !(bid.is_finite() && bid > 0.0) {
                return Err(PodError::Config(format!(
                    "spot bid per GPU must be positive, got {bid}"
                )));
            }
        }

        let cloud_type = self.cloud_type.unwrap_or(match self.deployment {
            Deployment::OnDemand => CloudType::All,
            Deployment::Spot { .. } => CloudType::Secure,
        });
        let name = self.name.unwrap_or_else(|| self.template_id.clone());

        Ok(PodSpec {
            template_id: self.template_id,
            gpu_type_id: self.gpu_type_id,
            deployment: self.deployment,
            cloud_type,
            gpu_count: self.gpu_count,
            volume_gb: self.volume_gb,
            container_disk_gb: self.container_disk_gb,
            ports: self.ports,
            volume_mount_path: self.volume_mount_path,
            name,
            docker_args: self.docker_args,
            env: self.env,
        })
    }
}

/// Status the provider intends the pod to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DesiredStatus {
    Created,
    Running,
    Restarting,
    Exited,
    Paused,
    Dead,
    Terminated,
    /// Unknown status.
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for DesiredStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Restarting => write!(f, "restarting"),
            Self::Exited => write!(f, "exited"),
            Self::Paused => write!(f, "paused"),
            Self::Dead => write!(f, "dead"),
            Self::Terminated => write!(f, "terminated"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A port the pod exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortBinding {
    pub ip: Option<String>,
    pub is_ip_public: bool,
    pub private_port: Option<u16>,
    pub public_port: Option<u16>,
    /// `http` or `tcp`.
    pub protocol: Option<String>,
}

/// Utilisation of one GPU attached to the pod.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuUtilization {
    pub id: String,
    pub gpu_util_percent: Option<f64>,
    pub memory_util_percent: Option<f64>,
}

/// Container-level utilisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerUtilization {
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
}

/// Point-in-time read of a pod's reported runtime.
///
/// Snapshots are replaced wholesale on every poll; nothing merges two of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodSnapshot {
    pub handle: PodHandle,
    pub name: String,
    pub desired_status: Option<DesiredStatus>,
    /// Present only once the pod's runtime is up.
    pub uptime_secs: Option<u64>,
    pub ports: Vec<PortBinding>,
    pub gpus: Vec<GpuUtilization>,
    pub container: Option<ContainerUtilization>,
    pub observed_at: DateTime<Utc>,
}

impl PodSnapshot {
    /// A defined uptime is the only evidence that a pod is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.uptime_secs.is_some()
    }

    /// Public `ip:port` endpoints, formatted for display.
    #[must_use]
    pub fn public_endpoints(&self) -> Vec<String> {
        self.ports
            .iter()
            .filter(|p| p.is_ip_public)
            .filter_map(|p| match (&p.ip, p.public_port) {
                (Some(ip), Some(port)) => Some(format!("{ip}:{port}")),
                _ => None,
            })
            .collect()
    }
}
