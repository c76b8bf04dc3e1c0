use std::time::Duration;

use reqwest::Client;

use crate::config::{URL_PROBE_STEP, URL_PROBE_TIMEOUT};

/// Probes a session's URL for reachability: a GET with a 1-second timeout,
/// retried once per second until `URL_PROBE_TIMEOUT` total elapses.
/// Responsive iff any attempt returns a status in [200, 400). A probe
/// failure (timeout, connection refused, DNS) never counts as a negative
/// signal on its own — it just keeps the session out of `Running` for
/// another reconcile.
pub async fn is_responsive(client: &Client, url: &str) -> bool {
    let deadline = tokio::time::Instant::now() + URL_PROBE_TIMEOUT;
    loop {
        if probe_once(client, url).await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(URL_PROBE_STEP).await;
    }
}

async fn probe_once(client: &Client, url: &str) -> bool {
    let request = client.get(url).timeout(Duration::from_secs(1));
    match request.send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            (200..400).contains(&status)
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_matches_configured_probe_timeout() {
        assert_eq!(URL_PROBE_TIMEOUT, Duration::from_secs(5));
        assert_eq!(URL_PROBE_STEP, Duration::from_secs(1));
    }
}
