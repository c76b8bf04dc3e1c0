//! Values created once at bootstrap and shared by every reconcile worker
//! and culling task, replacing the process-wide mutable globals (the
//! resource-discovery cache, the metric-event queue) the original
//! controller kept at module scope (§9 re-architecture note).

use std::sync::Arc;

use kube::Client;
use reqwest::Client as HttpClient;

use crate::config::OperatorConfig;
use crate::labels::LabelPolicy;
use crate::metrics_sink::MetricEventProducer;
use crate::reconcile::discovery::DiscoveryCache;

/// Shared, `Clone`-cheap context injected into every reconcile and culling
/// invocation. Mirrors the teacher's `ContextData` struct (one `Client`, a
/// process-wide cache, a metrics handle), generalized with the discovery
/// cache and metric producer this domain also needs.
#[derive(Clone)]
pub struct Context {
    pub client: Client,
    pub http: HttpClient,
    pub config: Arc<OperatorConfig>,
    pub label_policy: Arc<LabelPolicy>,
    pub discovery: Arc<DiscoveryCache>,
    pub metrics: MetricEventProducer,
}

impl Context {
    pub fn new(
        client: Client,
        config: OperatorConfig,
        label_policy: LabelPolicy,
        metrics: MetricEventProducer,
    ) -> Self {
        let http = HttpClient::builder()
            .timeout(crate::config::API_TIMEOUT)
            .build()
            .expect("build reqwest client");
        Self {
            client,
            http,
            config: Arc::new(config),
            label_policy: Arc::new(label_policy),
            discovery: Arc::new(DiscoveryCache::new()),
            metrics,
        }
    }
}
