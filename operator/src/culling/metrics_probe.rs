use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Api, Client};
use serde::Deserialize;

/// `metrics.k8s.io/v1beta1` isn't in `k8s-openapi`'s bundled type set, so
/// this mirrors the pattern the cluster-metrics consumer in the pack uses:
/// a hand-rolled `k8s_openapi::Resource`/`Metadata` impl lets `kube::Api`
/// talk to it like any other typed resource instead of a raw HTTP call.
#[derive(Debug, Clone, Deserialize)]
pub struct PodMetrics {
    pub metadata: ObjectMeta,
    pub containers: Vec<ContainerMetrics>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerMetrics {
    #[allow(dead_code)]
    pub name: String,
    pub usage: Usage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub cpu: String,
    #[allow(dead_code)]
    pub memory: String,
}

impl k8s_openapi::Resource for PodMetrics {
    const GROUP: &'static str = "metrics.k8s.io";
    const KIND: &'static str = "PodMetrics";
    const VERSION: &'static str = "v1beta1";
    const API_VERSION: &'static str = "metrics.k8s.io/v1beta1";
    const URL_PATH_SEGMENT: &'static str = "pods";

    type Scope = k8s_openapi::NamespaceResourceScope;
}

impl k8s_openapi::Metadata for PodMetrics {
    type Ty = ObjectMeta;

    fn metadata(&self) -> &Self::Ty {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Self::Ty {
        &mut self.metadata
    }
}

/// Sums per-container CPU usage from the cluster metrics API, in
/// millicores. Any failure (endpoint unavailable, malformed body) reports
/// `0` rather than an error — the idle culler must never let a missing
/// metrics-server block culling.
pub async fn pod_cpu_millicores(client: &Client, namespace: &str, pod_name: &str) -> u64 {
    let api: Api<PodMetrics> = Api::namespaced(client.clone(), namespace);
    match api.get(pod_name).await {
        Ok(metrics) => metrics
            .containers
            .iter()
            .map(|c| parse_cpu_millicores(&c.usage.cpu))
            .sum(),
        Err(_) => 0,
    }
}

/// Converts a Kubernetes CPU quantity string to millicores:
/// `n` suffix = nanocores (1e-6 millicores), `m` suffix = millicores
/// already, no suffix = whole cores (x1000).
fn parse_cpu_millicores(raw: &str) -> u64 {
    if let Some(n) = raw.strip_suffix('n') {
        n.parse::<f64>().map(|v| (v / 1_000_000.0).max(0.0) as u64).unwrap_or(0)
    } else if let Some(m) = raw.strip_suffix('m') {
        m.parse::<f64>().map(|v| v.max(0.0) as u64).unwrap_or(0)
    } else {
        raw.parse::<f64>().map(|v| (v * 1000.0).max(0.0) as u64).unwrap_or(0)
    }
}

/// Converts a Kubernetes memory quantity string (decimal K/M/G/T/P/E or
/// binary Ki/Mi/Gi/Ti/Pi/Ei suffixes, or a bare byte count) to bytes.
pub fn parse_memory_bytes(raw: &str) -> u64 {
    const DECIMAL: [(&str, f64); 6] = [
        ("E", 1e18), ("P", 1e15), ("T", 1e12), ("G", 1e9), ("M", 1e6), ("K", 1e3),
    ];
    const BINARY: [(&str, f64); 6] = [
        ("Ei", 1152921504606846976.0),
        ("Pi", 1125899906842624.0),
        ("Ti", 1099511627776.0),
        ("Gi", 1073741824.0),
        ("Mi", 1048576.0),
        ("Ki", 1024.0),
    ];
    for (suffix, factor) in BINARY {
        if let Some(n) = raw.strip_suffix(suffix) {
            return n.parse::<f64>().map(|v| (v * factor).max(0.0) as u64).unwrap_or(0);
        }
    }
    for (suffix, factor) in DECIMAL {
        if let Some(n) = raw.strip_suffix(suffix) {
            return n.parse::<f64>().map(|v| (v * factor).max(0.0) as u64).unwrap_or(0);
        }
    }
    raw.parse::<f64>().map(|v| v.max(0.0) as u64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nanocores_convert_to_millicores() {
        assert_eq!(parse_cpu_millicores("150000000n"), 150);
    }

    #[test]
    fn millicores_pass_through() {
        assert_eq!(parse_cpu_millicores("250m"), 250);
    }

    #[test]
    fn bare_cores_scale_by_1000() {
        assert_eq!(parse_cpu_millicores("2"), 2000);
    }

    #[test]
    fn binary_memory_suffix() {
        assert_eq!(parse_memory_bytes("128Mi"), 128 * 1024 * 1024);
    }

    #[test]
    fn decimal_memory_suffix() {
        assert_eq!(parse_memory_bytes("1G"), 1_000_000_000);
    }

    #[test]
    fn bare_byte_count() {
        assert_eq!(parse_memory_bytes("4096"), 4096);
    }
}
