use std::collections::HashMap;
use std::time::Instant;

use kube::{discovery::ApiResource, Client};
use tokio::sync::RwLock;

use crate::config::DISCOVERY_CACHE_TTL;
use crate::Error;

/// Process-wide (group, version, kind) -> API resource cache with a 60s
/// TTL, shared by every reconcile worker. Grounded on the `ExpiringDict`-
/// backed `api_cache` the original controller keeps to avoid a discovery
/// round-trip per event, expressed here as a `tokio::sync::RwLock` map
/// rather than a custom expiring-dict type, since reads vastly outnumber
/// writes and a fine-grained per-key lock isn't warranted at this scale.
#[derive(Default)]
pub struct DiscoveryCache {
    entries: RwLock<HashMap<(String, String, String), (Instant, ApiResource)>>,
}

impl DiscoveryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn resolve(
        &self,
        client: &Client,
        group: &str,
        version: &str,
        kind: &str,
    ) -> Result<ApiResource, Error> {
        let key = (group.to_string(), version.to_string(), kind.to_string());
        if let Some((fetched_at, resource)) = self.entries.read().await.get(&key) {
            if fetched_at.elapsed() < DISCOVERY_CACHE_TTL {
                return Ok(resource.clone());
            }
        }
        let (resource, _caps) = kube::discovery::pinned_kind(
            client,
            &kube::discovery::GroupVersionKind::gvk(group, version, kind),
        )
        .await?;
        self.entries.write().await.insert(key, (Instant::now(), resource.clone()));
        Ok(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_cache_has_no_entries() {
        let cache = DiscoveryCache::new();
        assert!(cache.entries.read().await.is_empty());
    }
}
