//! RunPod GraphQL wire models.
//!
//! One data struct per operation. Required fields are plain types, fields the
//! provider may omit or null are `Option`. A root field that may be `null`
//! but must be present is deserialized with `required_nullable`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::catalog::{GpuType, Template};
use crate::pod::{
    CloudType, ContainerUtilization, Deployment, DesiredStatus, EnvVar, GpuUtilization,
    PodHandle, PodSnapshot, PodSpec, PortBinding,
};

// ============================================================================
// Envelope
// ============================================================================

/// GraphQL response envelope, before the operation's data is typed.
#[derive(Debug, Deserialize)]
pub struct GraphQlEnvelope {
    /// Operation data.
    pub data: Option<serde_json::Value>,
    /// Errors reported alongside (or instead of) data.
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

/// One entry of the GraphQL `errors` array.
#[derive(Debug, Deserialize)]
pub struct GraphQlError {
    /// Human-readable message.
    pub message: String,
}

/// Deserialize an `Option` that must be present as a key but may be `null`.
///
/// Without `#[serde(default)]` a missing key is a decode error.
fn required_nullable<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer)
}

/// Variables wrapper used by every mutation and the pod-detail query.
#[derive(Debug, Serialize)]
pub struct InputVariables<T> {
    pub input: T,
}

/// `{ podId }` input shared by pod detail, stop and terminate.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodIdInput {
    pub pod_id: String,
}

// ============================================================================
// Catalog
// ============================================================================

/// `gpuTypes` query data.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuTypesData {
    pub gpu_types: Vec<GpuTypeRecord>,
}

/// GPU type as listed by the provider.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuTypeRecord {
    pub id: String,
    pub display_name: String,
    pub memory_in_gb: u32,
    pub secure_price: Option<f64>,
    pub community_price: Option<f64>,
    pub secure_spot_price: Option<f64>,
    pub community_spot_price: Option<f64>,
}

impl From<GpuTypeRecord> for GpuType {
    fn from(record: GpuTypeRecord) -> Self {
        Self {
            id: record.id,
            display_name: record.display_name,
            memory_gb: record.memory_in_gb,
            secure_price_per_hr: record.secure_price,
            community_price_per_hr: record.community_price,
            secure_spot_price_per_hr: record.secure_spot_price,
            community_spot_price_per_hr: record.community_spot_price,
        }
    }
}

/// `myself { ... }` wrapper.
#[derive(Debug, Deserialize)]
pub struct MyselfData<T> {
    pub myself: T,
}

/// `myself.podTemplates`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodTemplatesField {
    pub pod_templates: Vec<TemplateRecord>,
}

/// Pod template record.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRecord {
    pub id: String,
    pub name: String,
    pub image_name: String,
    pub is_public: bool,
}

impl From<TemplateRecord> for Template {
    fn from(record: TemplateRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            image_name: record.image_name,
            is_public: record.is_public,
        }
    }
}

// ============================================================================
// Pods
// ============================================================================

/// `myself.pods`.
#[derive(Debug, Deserialize)]
pub struct PodsField {
    pub pods: Vec<PodRecord>,
}

/// `pod(input:)` query data. A present `null` means the pod does not exist.
#[derive(Debug, Deserialize)]
pub struct PodData {
    #[serde(deserialize_with = "required_nullable")]
    pub pod: Option<PodRecord>,
}

/// Pod with its nested runtime.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub desired_status: Option<DesiredStatus>,
    pub runtime: Option<RuntimeRecord>,
}

/// Pod runtime; `null` until the container is up.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeRecord {
    pub uptime_in_seconds: Option<u64>,
    pub ports: Option<Vec<PortRecord>>,
    pub gpus: Option<Vec<GpuUtilRecord>>,
    pub container: Option<ContainerRecord>,
}

/// Port binding record.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortRecord {
    pub ip: Option<String>,
    pub is_ip_public: Option<bool>,
    pub private_port: Option<u16>,
    pub public_port: Option<u16>,
    #[serde(rename = "type")]
    pub port_type: Option<String>,
}

/// Per-GPU utilisation record.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuUtilRecord {
    pub id: String,
    pub gpu_util_percent: Option<f64>,
    pub memory_util_percent: Option<f64>,
}

/// Container utilisation record.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRecord {
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
}

impl PodRecord {
    /// Convert to a snapshot stamped with `observed_at`.
    pub fn into_snapshot(self, observed_at: DateTime<Utc>) -> PodSnapshot {
        let name = self.name.unwrap_or_default();
        let (uptime_secs, ports, gpus, container) = match self.runtime {
            Some(runtime) => (
                runtime.uptime_in_seconds,
                runtime
                    .ports
                    .unwrap_or_default()
                    .into_iter()
                    .map(|p| PortBinding {
                        ip: p.ip,
                        is_ip_public: p.is_ip_public.unwrap_or(false),
                        private_port: p.private_port,
                        public_port: p.public_port,
                        protocol: p.port_type,
                    })
                    .collect(),
                runtime
                    .gpus
                    .unwrap_or_default()
                    .into_iter()
                    .map(|g| GpuUtilization {
                        id: g.id,
                        gpu_util_percent: g.gpu_util_percent,
                        memory_util_percent: g.memory_util_percent,
                    })
                    .collect(),
                runtime.container.map(|c| ContainerUtilization {
                    cpu_percent: c.cpu_percent,
                    memory_percent: c.memory_percent,
                }),
            ),
            None => (None, Vec::new(), Vec::new(), None),
        };

        PodSnapshot {
            handle: PodHandle::new(self.id),
            name,
            desired_status: self.desired_status,
            uptime_secs,
            ports,
            gpus,
            container,
            observed_at,
        }
    }
}

// ============================================================================
// Mutations
// ============================================================================

/// `podFindAndDeployOnDemand` mutation data.
#[derive(Debug, Deserialize)]
pub struct DeployOnDemandData {
    #[serde(rename = "podFindAndDeployOnDemand")]
    pub pod: DeployedPod,
}

/// `podRentInterruptable` mutation data.
#[derive(Debug, Deserialize)]
pub struct RentInterruptableData {
    #[serde(rename = "podRentInterruptable")]
    pub pod: DeployedPod,
}

/// Shape shared by both deploy mutations.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedPod {
    pub id: String,
    pub image_name: Option<String>,
    pub env: Option<Vec<String>>,
    pub machine_id: Option<String>,
    pub machine: Option<DeployedMachine>,
}

/// Host machine of a freshly deployed pod.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedMachine {
    pub pod_host_id: Option<String>,
}

/// `podStop` mutation data.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodStopData {
    pub pod_stop: StoppedPod,
}

/// Pod returned by `podStop`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedPod {
    pub id: String,
    pub desired_status: Option<DesiredStatus>,
}

/// `podTerminate` mutation data; `null` under a present key is success.
#[derive(Debug, Deserialize)]
pub struct PodTerminateData {
    #[serde(rename = "podTerminate", deserialize_with = "required_nullable")]
    pub pod_terminate: Option<serde_json::Value>,
}

/// `PodFindAndDeployOnDemandInput`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnDemandInput {
    pub cloud_type: CloudType,
    pub gpu_count: u32,
    pub volume_in_gb: u32,
    pub container_disk_in_gb: u32,
    pub gpu_type_id: String,
    pub name: String,
    pub template_id: String,
    pub docker_args: String,
    pub ports: String,
    pub volume_mount_path: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
}

/// `PodRentInterruptableInput`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterruptableInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bid_per_gpu: Option<f64>,
    pub cloud_type: CloudType,
    pub gpu_count: u32,
    pub volume_in_gb: u32,
    pub container_disk_in_gb: u32,
    pub gpu_type_id: String,
    pub name: String,
    pub template_id: String,
    pub docker_args: String,
    pub ports: String,
    pub volume_mount_path: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
}

impl From<&PodSpec> for OnDemandInput {
    fn from(spec: &PodSpec) -> Self {
        Self {
            cloud_type: spec.cloud_type(),
            gpu_count: spec.gpu_count(),
            volume_in_gb: spec.volume_gb(),
            container_disk_in_gb: spec.container_disk_gb(),
            gpu_type_id: spec.gpu_type_id().to_string(),
            name: spec.name().to_string(),
            template_id: spec.template_id().to_string(),
            docker_args: spec.docker_args().to_string(),
            ports: spec.ports().to_string(),
            volume_mount_path: spec.volume_mount_path().to_string(),
            env: spec.env().to_vec(),
        }
    }
}

impl From<&PodSpec> for InterruptableInput {
    fn from(spec: &PodSpec) -> Self {
        let bid_per_gpu = match spec.deployment() {
            Deployment::Spot { bid_per_gpu } => bid_per_gpu,
            Deployment::OnDemand => None,
        };
        Self {
            bid_per_gpu,
            cloud_type: spec.cloud_type(),
            gpu_count: spec.gpu_count(),
            volume_in_gb: spec.volume_gb(),
            container_disk_in_gb: spec.container_disk_gb(),
            gpu_type_id: spec.gpu_type_id().to_string(),
            name: spec.name().to_string(),
            template_id: spec.template_id().to_string(),
            docker_args: spec.docker_args().to_string(),
            ports: spec.ports().to_string(),
            volume_mount_path: spec.volume_mount_path().to_string(),
            env: spec.env().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_terminate_null_is_present() {
        let data: PodTerminateData =
            serde_json::from_value(json!({ "podTerminate": null })).unwrap();
        assert!(data.pod_terminate.is_none());

        assert!(serde_json::from_value::<PodTerminateData>(json!({})).is_err());
    }

    #[test]
    fn test_pod_detail_requires_pod_key() {
        let data: PodData = serde_json::from_value(json!({ "pod": null })).unwrap();
        assert!(data.pod.is_none());
        assert!(serde_json::from_value::<PodData>(json!({})).is_err());
    }

    #[test]
    fn test_null_runtime_maps_to_empty_snapshot() {
        let record: PodRecord = serde_json::from_value(json!({
            "id": "pod-1",
            "name": "reasoner",
            "runtime": null
        }))
        .unwrap();
        let snapshot = record.into_snapshot(Utc::now());
        assert_eq!(snapshot.handle.as_str(), "pod-1");
        assert!(snapshot.uptime_secs.is_none());
        assert!(snapshot.ports.is_empty());
        assert!(snapshot.container.is_none());
    }

    #[test]
    fn test_spot_input_carries_bid_and_cloud_type() {
        let spec = PodSpec::builder("tpl", "NVIDIA A40")
            .spot(Some(0.25))
            .build()
            .unwrap();
        let value = serde_json::to_value(InterruptableInput::from(&spec)).unwrap();
        assert_eq!(value["bidPerGpu"], json!(0.25));
        assert_eq!(value["cloudType"], json!("SECURE"));
        assert_eq!(value["volumeMountPath"], json!("/workspace"));
        assert!(value.get("env").is_none());

        let on_demand = PodSpec::builder("tpl", "NVIDIA A40").build().unwrap();
        let value = serde_json::to_value(OnDemandInput::from(&on_demand)).unwrap();
        assert_eq!(value["cloudType"], json!("ALL"));
        assert_eq!(value["containerDiskInGb"], json!(200));
        assert!(value.get("bidPerGpu").is_none());
    }
}
