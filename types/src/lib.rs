use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

fn default_idle_seconds_threshold() -> u64 {
    0
}

fn default_resource_usage_check_enabled() -> bool {
    true
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct JupyterServerSpec {
    #[serde(default)]
    pub hibernated: Option<bool>,
    #[serde(default)]
    pub resources: JupyterServerResources,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct JupyterServerResources {
    pub requests: Option<ResourceShape>,
    pub limits: Option<ResourceShape>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ResourceShape {
    pub cpu: Option<String>,
    pub memory: Option<String>,
    #[serde(rename = "ephemeral-storage")]
    pub ephemeral_storage: Option<String>,
    #[serde(rename = "nvidia.com/gpu")]
    pub nvidia_gpu: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct StorageSpec {
    pub size: Option<String>,
    #[serde(default)]
    pub pvc: PvcSpec,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct PvcSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(rename = "storageClassName")]
    pub storage_class_name: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct AuthSpec {
    pub token: Option<String>,
    #[serde(default)]
    pub oidc: OidcSpec,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct OidcSpec {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct RoutingSpec {
    pub host: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub tls: TlsSpec,
    #[serde(rename = "ingressAnnotations", default)]
    pub ingress_annotations: BTreeMap<String, String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct TlsSpec {
    #[serde(default)]
    pub enabled: bool,
}

/// Culling thresholds, in seconds. A value of `0` disables that rule.
/// `idleSecondsThreshold` of `0` is also the sentinel
/// `default_idle_seconds_threshold` falls back to when the field is absent.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct CullingSpec {
    #[serde(rename = "idleSecondsThreshold", default = "default_idle_seconds_threshold")]
    pub idle_seconds_threshold: u64,
    #[serde(rename = "maxAgeSecondsThreshold", default)]
    pub max_age_seconds_threshold: u64,
    #[serde(rename = "startingSecondsThreshold", default)]
    pub starting_seconds_threshold: u64,
    #[serde(rename = "failedSecondsThreshold", default)]
    pub failed_seconds_threshold: u64,
    #[serde(rename = "hibernatedSecondsThreshold", default)]
    pub hibernated_seconds_threshold: u64,
}

impl Default for CullingSpec {
    fn default() -> Self {
        Self {
            idle_seconds_threshold: default_idle_seconds_threshold(),
            max_age_seconds_threshold: 0,
            starting_seconds_threshold: 0,
            failed_seconds_threshold: 0,
            hibernated_seconds_threshold: 0,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum PatchType {
    JsonPatch,
    MergePatch,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct PatchSpec {
    #[serde(rename = "type")]
    pub patch_type: PatchType,
    pub patch: serde_json::Value,
}

#[derive(
    CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema,
)]
#[kube(
    group = "amalthea.dev",
    version = "v1alpha1",
    kind = "JupyterServer",
    plural = "jupyterservers",
    derive = "PartialEq",
    status = "SessionServerStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.state\", \"name\": \"STATE\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".metadata.creationTimestamp\", \"name\": \"AGE\", \"type\": \"date\" }"
)]
pub struct SessionServerSpec {
    #[serde(rename = "jupyterServer", default)]
    pub jupyter_server: JupyterServerSpec,
    #[serde(default)]
    pub storage: StorageSpec,
    #[serde(default)]
    pub auth: AuthSpec,
    #[serde(default)]
    pub routing: RoutingSpec,
    #[serde(default)]
    pub culling: CullingSpec,
    #[serde(default)]
    pub patches: Vec<PatchSpec>,
    #[serde(rename = "resourceUsageCheckEnabled", default = "default_resource_usage_check_enabled")]
    pub resource_usage_check_enabled: bool,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum SessionState {
    #[default]
    Starting,
    Running,
    Stopping,
    Failed,
    Hibernated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Starting => "Starting",
            SessionState::Running => "Running",
            SessionState::Stopping => "Stopping",
            SessionState::Failed => "Failed",
            SessionState::Hibernated => "Hibernated",
        };
        write!(f, "{s}")
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContainerPhase {
    Ready,
    Failed,
    Executing,
    Waiting,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct ContainerStates {
    #[serde(default)]
    pub init: BTreeMap<String, ContainerPhase>,
    #[serde(default)]
    pub regular: BTreeMap<String, ContainerPhase>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Ord, PartialOrd, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChildKey {
    Service,
    Ingress,
    Statefulset,
    Configmap,
    Secret,
    Pvc,
}

impl fmt::Display for ChildKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChildKey::Service => "service",
            ChildKey::Ingress => "ingress",
            ChildKey::Statefulset => "statefulset",
            ChildKey::Configmap => "configmap",
            ChildKey::Secret => "secret",
            ChildKey::Pvc => "pvc",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ChildKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "service" => Ok(ChildKey::Service),
            "ingress" => Ok(ChildKey::Ingress),
            "statefulset" => Ok(ChildKey::Statefulset),
            "configmap" => Ok(ChildKey::Configmap),
            "secret" => Ok(ChildKey::Secret),
            "pvc" => Ok(ChildKey::Pvc),
            other => Err(format!("unknown child key: {other}")),
        }
    }
}

impl ChildKey {
    pub const ALL: [ChildKey; 6] = [
        ChildKey::Service,
        ChildKey::Ingress,
        ChildKey::Statefulset,
        ChildKey::Configmap,
        ChildKey::Secret,
        ChildKey::Pvc,
    ];
}

impl From<ChildKey> for String {
    fn from(value: ChildKey) -> Self {
        value.to_string()
    }
}

/// Snapshot of a single child (or the main pod) recorded on the parent's
/// status. `status` is left as an opaque JSON value because it carries
/// whatever the child kind natively reports.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ChildSnapshot {
    pub uid: String,
    pub name: String,
    pub kind: String,
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    #[serde(default)]
    pub status: Option<serde_json::Value>,
    #[serde(rename = "resourceUsage", default, skip_serializing_if = "Option::is_none")]
    pub resource_usage: Option<ResourceUsage>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ResourceUsage {
    #[serde(rename = "usedBytes")]
    pub used_bytes: Option<i64>,
    #[serde(rename = "availableBytes")]
    pub available_bytes: Option<i64>,
    #[serde(rename = "totalBytes")]
    pub total_bytes: Option<i64>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct StatefulSetEvent {
    pub message: String,
    pub timestamp: Time,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct SessionServerEvents {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statefulset: Option<StatefulSetEvent>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct SessionServerStatus {
    #[serde(default)]
    pub state: SessionState,
    #[serde(rename = "startingSince", default, skip_serializing_if = "Option::is_none")]
    pub starting_since: Option<Time>,
    #[serde(rename = "failedSince", default, skip_serializing_if = "Option::is_none")]
    pub failed_since: Option<Time>,
    #[serde(rename = "hibernatedSince", default, skip_serializing_if = "Option::is_none")]
    pub hibernated_since: Option<Time>,
    #[serde(rename = "containerStates", default)]
    pub container_states: ContainerStates,
    #[serde(rename = "mainPod", default, skip_serializing_if = "Option::is_none")]
    pub main_pod: Option<ChildSnapshot>,
    #[serde(default)]
    pub children: BTreeMap<ChildKey, ChildSnapshot>,
    #[serde(default)]
    pub events: SessionServerEvents,
    #[serde(rename = "createdResources", default)]
    pub created_resources: BTreeMap<ChildKey, String>,
}
