use std::time::Duration;

use kube::api::ListParams;
use kube::{Api, Client};
use owo_colors::OwoColorize;
use session_operator::config::OperatorConfig;
use session_operator::context::Context;
use session_operator::labels::LabelPolicy;
use session_operator::metrics_sink::MetricEventProducer;
use session_operator::reconcile;
use session_operator_types::JupyterServer;
use tokio_util::sync::CancellationToken;

const CRD_READY_RETRIES: u32 = 10;
const CRD_READY_BACKOFF: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    session_operator_common::init();
    tracing_subscriber::fmt::init();

    let config = OperatorConfig::from_env()?;
    let client = Client::try_default().await.map_err(|err| {
        tracing::error!(error = %err, "failed to build Kubernetes client from ambient config");
        err
    })?;

    wait_for_crd(&client).await?;

    let label_policy = LabelPolicy::new(config.api_group.clone(), config.selector_labels()?, &config.crd_name);
    let (metrics_producer, metrics_receiver) = MetricEventProducer::channel();
    let ctx = Context::new(client.clone(), config, label_policy, metrics_producer);

    let shutdown = CancellationToken::new();
    let shutdown_for_signal = shutdown.clone();
    tokio::spawn(async move {
        session_operator_common::shutdown::shutdown_signal().await;
        shutdown_for_signal.cancel();
    });

    #[cfg(feature = "metrics")]
    let registry = prometheus::Registry::new();
    #[cfg(feature = "metrics")]
    let metrics_sink_task = {
        let sink = session_operator::metrics_sink::PrometheusMetricSink::new(&registry)
            .expect("register prometheus metrics");
        tokio::spawn(session_operator::metrics_sink::run_consumer(metrics_receiver, sink))
    };
    #[cfg(not(feature = "metrics"))]
    drop(metrics_receiver);

    #[cfg(feature = "metrics")]
    let metrics_server_task = if ctx.config.metrics_enabled {
        let registry = registry.clone();
        let shutdown = shutdown.clone();
        let port = ctx.config.metrics_port;
        Some(tokio::spawn(session_operator::metrics_server::run(registry, port, shutdown)))
    } else {
        None
    };

    session_operator_common::signal_ready();
    tracing::info!("{}", "session-operator starting".color(session_operator_common::colors::FG2));

    // Cullers are spawned by `reconcile::controller::run` itself, gated
    // behind the same `LeaseLock` as the reconciler: only the elected
    // leader runs either, so a multi-replica rollout never issues
    // duplicate hibernate/delete calls against the same parent.
    reconcile::controller::run(client, ctx, shutdown.clone()).await;

    #[cfg(feature = "metrics")]
    {
        if let Some(task) = metrics_server_task {
            task.abort();
        }
        metrics_sink_task.await.ok();
    }

    tracing::warn!("{}", "session-operator shut down gracefully".color(session_operator_common::colors::FG1));
    Ok(())
}

/// Startup probe for the CRD (§6 exit codes: non-zero only for
/// unrecoverable startup errors, one of which is a missing CRD after
/// retries). A handful of retries tolerate the CRD being applied
/// concurrently with the operator's own rollout.
async fn wait_for_crd(client: &Client) -> anyhow::Result<()> {
    let parents: Api<JupyterServer> = Api::all(client.clone());
    for attempt in 1..=CRD_READY_RETRIES {
        match parents.list(&ListParams::default().limit(1)).await {
            Ok(_) => return Ok(()),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    attempt,
                    "JupyterServer CRD not queryable yet; is the CRD installed?"
                );
                tokio::time::sleep(CRD_READY_BACKOFF).await;
            }
        }
    }
    anyhow::bail!("JupyterServer CRD still not queryable after {CRD_READY_RETRIES} retries; exiting")
}
