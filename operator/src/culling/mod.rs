pub mod activity_probe;
pub mod hibernated_culler;
pub mod idle_culler;
pub mod metrics_probe;
pub mod pending_culler;
pub mod resource_usage;

use std::time::Duration;

use futures::stream::StreamExt;
use kube::{Api, ResourceExt};
use session_operator_types::JupyterServer;
use tokio_util::sync::CancellationToken;

use crate::context::Context;

/// Runs one of the three independent periodic cullers (§4.4) plus the
/// optional resource-usage reporter. Each is its own `tokio::time::interval`
/// loop over the current list of parents, grounded on the teacher's
/// `tokio::time::interval` + per-object loop idiom in
/// `shards::reconcile::run`'s leader/renew loop, generalized here to one
/// tick per active session per task rather than one leader-election loop.
pub async fn run_all(ctx: Context, shutdown: CancellationToken) {
    let idle = run_periodic(ctx.clone(), ctx.config.idle_check_interval(), shutdown.clone(), |ctx, parent| {
        Box::pin(async move {
            if let Err(err) = idle_culler::run_once(&ctx, &parent).await {
                tracing::warn!(error = %err, session = %parent.name_any(), "idle culler tick failed");
            }
            if let Err(err) = hibernated_culler::run_once(&ctx, &parent).await {
                tracing::warn!(error = %err, session = %parent.name_any(), "hibernated-age culler tick failed");
            }
        })
    });

    let pending = run_periodic(ctx.clone(), ctx.config.pending_check_interval(), shutdown.clone(), |ctx, parent| {
        Box::pin(async move {
            if let Err(err) = pending_culler::run_once(&ctx, &parent).await {
                tracing::warn!(error = %err, session = %parent.name_any(), "pending/failed culler tick failed");
            }
        })
    });

    let resources = run_periodic(ctx.clone(), ctx.config.resource_check_interval(), shutdown.clone(), |ctx, parent| {
        Box::pin(async move {
            if !ctx.config.resource_check_enabled || !parent.spec.resource_usage_check_enabled {
                return;
            }
            if let Err(err) = resource_usage::run_once(&ctx, &parent).await {
                tracing::debug!(error = %err, session = %parent.name_any(), "resource usage tick failed");
            }
        })
    });

    futures::future::join3(idle, pending, resources).await;
}

type TickFuture = std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>;

async fn run_periodic(
    ctx: Context,
    interval: Duration,
    shutdown: CancellationToken,
    handler: impl Fn(Context, JupyterServer) -> TickFuture + Send + Sync + 'static,
) {
    let api: Api<JupyterServer> = if ctx.config.cluster_wide {
        Api::all(ctx.client.clone())
    } else if let Some(namespace) = ctx.config.namespaces.first() {
        Api::namespaced(ctx.client.clone(), namespace)
    } else {
        Api::default_namespaced(ctx.client.clone())
    };

    let mut tick = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tick.tick() => {}
        }
        let parents = match api.list(&Default::default()).await {
            Ok(list) => list.items,
            Err(err) => {
                tracing::warn!(error = %err, "culler failed to list parents; skipping this tick");
                continue;
            }
        };
        let mut tasks = futures::stream::FuturesUnordered::new();
        for parent in parents {
            tasks.push(handler(ctx.clone(), parent));
        }
        while tasks.next().await.is_some() {}
    }
}

/// Used by tests and by `pending_culler`/`hibernated_culler` to compute
/// elapsed seconds from an optional RFC 3339 timestamp, treating an absent
/// timestamp as zero elapsed rather than an error (the field is cleared
/// on state exit, so its absence is the expected steady state).
pub(crate) fn elapsed_seconds_since(
    since: Option<&k8s_openapi::apimachinery::pkg::apis::meta::v1::Time>,
    now: k8s_openapi::jiff::Timestamp,
) -> i64 {
    match since {
        Some(t) => now.duration_since(t.0).as_secs(),
        None => 0,
    }
}
