use k8s_openapi::jiff::Timestamp;
use reqwest::Client;
use serde::Deserialize;

/// Body returned by a session's `/api/status` endpoint. Timestamps are
/// RFC 3339 (Z-suffix permitted, hence `String` rather than a stricter
/// type — parsing happens at the point of use so a malformed value can be
/// treated as `Unknown` rather than failing the whole probe).
#[derive(Debug, Deserialize)]
struct ActivityStatusBody {
    connections: i64,
    #[allow(dead_code)]
    kernels: i64,
    last_activity: String,
    started: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivitySnapshot {
    pub connections: i64,
    pub last_activity: Timestamp,
    pub started: Timestamp,
}

/// Result of probing a session's activity endpoint. Any transport error,
/// non-2xx response, or malformed body collapses to `Unknown` — the
/// culler must never treat a probe failure as evidence of idleness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityProbeResult {
    Known(ActivitySnapshot),
    Unknown,
}

pub async fn probe(client: &Client, full_url: &str, token: Option<&str>) -> ActivityProbeResult {
    let mut request = client.get(format!("{full_url}/api/status"));
    if let Some(token) = token {
        request = request.query(&[("token", token)]);
    }
    let response = match request.send().await {
        Ok(r) => r,
        Err(_) => return ActivityProbeResult::Unknown,
    };
    if !response.status().is_success() {
        return ActivityProbeResult::Unknown;
    }
    let body: ActivityStatusBody = match response.json().await {
        Ok(b) => b,
        Err(_) => return ActivityProbeResult::Unknown,
    };
    let last_activity = match body.last_activity.parse::<Timestamp>() {
        Ok(t) => t,
        Err(_) => return ActivityProbeResult::Unknown,
    };
    let started = match body.started.parse::<Timestamp>() {
        Ok(t) => t,
        Err(_) => return ActivityProbeResult::Unknown,
    };
    ActivityProbeResult::Known(ActivitySnapshot { connections: body.connections, last_activity, started })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn z_suffixed_timestamp_parses() {
        let parsed: Timestamp = "2024-01-01T00:00:00Z".parse().unwrap();
        assert_eq!(parsed.to_string(), "2024-01-01T00:00:00Z");
    }
}
