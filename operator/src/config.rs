use std::time::Duration;

use clap::Parser;

/// Process configuration, parsed from environment variables via env-backed
/// `clap` args rather than a bespoke manual-`std::env::var` scheme.
#[derive(Parser, Clone, Debug)]
#[command(name = "session-operator", about = "SessionServer lifecycle operator")]
pub struct OperatorConfig {
    #[arg(long, env = "CRD_API_GROUP", default_value = "amalthea.dev")]
    pub api_group: String,

    #[arg(long, env = "CRD_API_VERSION", default_value = "v1alpha1")]
    pub api_version: String,

    #[arg(long, env = "CRD_NAME", default_value = "JupyterServer")]
    pub crd_name: String,

    /// Comma-separated namespaces to watch. Empty + `cluster_wide=false`
    /// means "the operator's own namespace" (kube-rs default resolution).
    #[arg(long, env = "NAMESPACES", value_delimiter = ',')]
    pub namespaces: Vec<String>,

    #[arg(long, env = "CLUSTER_WIDE", default_value_t = false)]
    pub cluster_wide: bool,

    #[arg(
        long,
        env = "JUPYTER_SERVER_IDLE_CHECK_INTERVAL_SECONDS",
        default_value_t = 300
    )]
    pub idle_check_interval_seconds: u64,

    #[arg(
        long,
        env = "JUPYTER_SERVER_PENDING_CHECK_INTERVAL_SECONDS",
        default_value_t = 300
    )]
    pub pending_check_interval_seconds: u64,

    #[arg(
        long,
        env = "JUPYTER_SERVER_RESOURCE_CHECK_INTERVAL_SECONDS",
        default_value_t = 30
    )]
    pub resource_check_interval_seconds: u64,

    #[arg(long, env = "JUPYTER_SERVER_RESOURCE_CHECK_ENABLED", default_value_t = true)]
    pub resource_check_enabled: bool,

    #[arg(long, env = "CPU_USAGE_MILLICORES_IDLE_THRESHOLD", default_value_t = 200)]
    pub cpu_usage_millicores_idle_threshold: u64,

    #[arg(long, env = "UNSCHEDULABLE_FAILURE_THRESHOLD_SECONDS", default_value_t = 60)]
    pub unschedulable_failure_threshold_seconds: u64,

    #[arg(long, env = "JUPYTER_SERVER_INIT_CONTAINER_RESTART_LIMIT", default_value_t = 1)]
    pub init_container_restart_limit: u32,

    #[arg(long, env = "JUPYTER_SERVER_CONTAINER_RESTART_LIMIT", default_value_t = 3)]
    pub container_restart_limit: u32,

    /// YAML map of extra labels injected onto every child resource and the
    /// main pod, in addition to the canonical labels.
    #[arg(long, env = "AMALTHEA_SELECTOR_LABELS", default_value = "{}")]
    pub selector_labels_yaml: String,

    /// JSON array of `{name, group}` extra child kinds to watch.
    #[arg(long, env = "EXTRA_CHILD_RESOURCES", default_value = "[]")]
    pub extra_child_resources_json: String,

    #[arg(long, env = "METRICS_ENABLED", default_value_t = true)]
    pub metrics_enabled: bool,

    #[arg(long, env = "METRICS_PORT", default_value_t = 8765)]
    pub metrics_port: u16,
}

impl OperatorConfig {
    pub fn from_env() -> Result<Self, crate::Error> {
        Ok(Self::parse())
    }

    pub fn selector_labels(&self) -> Result<std::collections::BTreeMap<String, String>, crate::Error> {
        serde_yaml::from_str(&self.selector_labels_yaml)
            .map_err(|e| crate::Error::Config(format!("AMALTHEA_SELECTOR_LABELS: {e}")))
    }

    pub fn extra_child_resources(&self) -> Result<Vec<ChildResourceKind>, crate::Error> {
        serde_json::from_str(&self.extra_child_resources_json)
            .map_err(|e| crate::Error::Config(format!("EXTRA_CHILD_RESOURCES: {e}")))
    }

    pub fn idle_check_interval(&self) -> Duration {
        Duration::from_secs(self.idle_check_interval_seconds)
    }

    pub fn pending_check_interval(&self) -> Duration {
        Duration::from_secs(self.pending_check_interval_seconds)
    }

    pub fn resource_check_interval(&self) -> Duration {
        Duration::from_secs(self.resource_check_interval_seconds)
    }
}

#[derive(serde::Deserialize, Clone, Debug, PartialEq)]
pub struct ChildResourceKind {
    pub name: String,
    pub group: String,
}

/// Default child resource kinds watched for the `<group>/parent-name`
/// fan-in, before `extra_child_resources` are appended.
pub fn default_child_resources() -> Vec<ChildResourceKind> {
    vec![
        ChildResourceKind { name: "statefulsets".into(), group: "apps".into() },
        ChildResourceKind { name: "pods".into(), group: "".into() },
        ChildResourceKind { name: "ingresses".into(), group: "networking.k8s.io".into() },
        ChildResourceKind { name: "secrets".into(), group: "".into() },
        ChildResourceKind { name: "configmaps".into(), group: "".into() },
        ChildResourceKind { name: "services".into(), group: "".into() },
        ChildResourceKind { name: "persistentvolumeclaims".into(), group: "".into() },
    ]
}

pub const API_TIMEOUT: Duration = Duration::from_secs(30);
pub const URL_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const URL_PROBE_STEP: Duration = Duration::from_secs(1);
pub const EXEC_TIMEOUT: Duration = Duration::from_secs(2);
pub const DISCOVERY_CACHE_TTL: Duration = Duration::from_secs(60);
pub const UNSCHEDULABLE_FAILURE_THRESHOLD_SECONDS_DEFAULT: u64 = 60;
