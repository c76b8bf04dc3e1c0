//! Entrypoint wiring for the `JupyterServer` controller: leader-election
//! gated exactly like the teacher's `shards::reconcile::run`, generalized
//! from its single `Cluster`/`Pod` pair to this parent's six child kinds
//! plus the main pod and StatefulSet quota events.
//!
//! Where the teacher's `determine_action`/`ClusterAction` pulls current
//! live state on every tick rather than trusting the triggering watch
//! event, this reconciler does the same: every fan-in handler
//! (`child_event`, `parent_event`, `statefulset_event`) re-reads its slice
//! of cluster state from the API on each pass, so a missed or out-of-order
//! watch delivery self-heals on the next reconcile.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Event, Pod};
use kube::api::{ListParams, ObjectMeta};
use kube::core::DynamicObject;
use kube::runtime::{controller::Action, watcher, Controller};
use kube::{Api, Client, ResourceExt};
use kube_leader_election::{LeaseLock, LeaseLockParams, LeaseLockResult};
use owo_colors::OwoColorize;
use session_operator_common::colors::{FG1, FG2};
use session_operator_types::{ChildKey, JupyterServer, SessionState};
use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::culling;
use crate::metrics_sink::{MetricEvent, SessionSnapshot};
use crate::reconcile::child_event::{self, ChildEvent, EventKind};
use crate::reconcile::create_delete;
use crate::reconcile::field_handlers;
use crate::reconcile::parent_event;
use crate::reconcile::statefulset_event::{self, StatefulSetEvent};
use crate::status::{self, ContainerKind, ContainerStatus, PodCondition, PodSnapshot};
use crate::Error;

const RECONCILE_RENEW_INTERVAL: Duration = Duration::from_secs(5);
const LEASE_TTL: Duration = Duration::from_secs(15);
const ERROR_REQUEUE: Duration = Duration::from_secs(5);
const STEADY_STATE_REQUEUE: Duration = Duration::from_secs(30);

/// Entrypoint, mirroring the teacher's leader/standby loop: only the lease
/// holder runs the `kube::runtime::Controller` *and* the culling tasks
/// (§4.4 assumes a single writer per parent, same as the reconciler);
/// losing leadership aborts both, regaining it restarts fresh copies of
/// both.
pub async fn run(client: Client, ctx: Context, shutdown: CancellationToken) {
    let lease_namespace = ctx.config.namespaces.first().cloned().unwrap_or_else(|| "default".to_string());
    let holder_id = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("session-operator-{}", uuid::Uuid::new_v4()));
    let leadership = LeaseLock::new(
        client.clone(),
        &lease_namespace,
        LeaseLockParams {
            holder_id,
            lease_name: "session-operator-lock".to_string(),
            lease_ttl: LEASE_TTL,
        },
    );

    let ctx = Arc::new(ctx);
    let mut controller_task: Option<tokio::task::JoinHandle<()>> = None;
    let mut culling_task: Option<tokio::task::JoinHandle<()>> = None;
    let mut tick = tokio::time::interval(RECONCILE_RENEW_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                if let Some(task) = controller_task.take() {
                    task.abort();
                    task.await.ok();
                }
                if let Some(task) = culling_task.take() {
                    task.abort();
                    task.await.ok();
                }
                return;
            }
            _ = tick.tick() => {}
        }

        let lease = match leadership.try_acquire_or_renew().await {
            Ok(l) => l,
            Err(err) => {
                tracing::warn!(error = %err, "leader election renew/acquire failed");
                if let Some(task) = controller_task.take() {
                    task.abort();
                }
                if let Some(task) = culling_task.take() {
                    task.abort();
                }
                continue;
            }
        };

        if matches!(lease, LeaseLockResult::Acquired(_)) {
            if controller_task.is_none() {
                tracing::info!("{}", "acquired leadership; starting reconciler".color(FG2));
                let ctx_for_controller = ctx.clone();
                let client_for_controller = client.clone();
                let cluster_wide = ctx.config.cluster_wide;
                let namespace = lease_namespace.clone();
                controller_task = Some(tokio::spawn(async move {
                    let parents: Api<JupyterServer> = if cluster_wide {
                        Api::all(client_for_controller.clone())
                    } else {
                        Api::namespaced(client_for_controller.clone(), &namespace)
                    };
                    let pods: Api<Pod> = if cluster_wide {
                        Api::all(client_for_controller.clone())
                    } else {
                        Api::namespaced(client_for_controller.clone(), &namespace)
                    };
                    let statefulsets: Api<StatefulSet> = if cluster_wide {
                        Api::all(client_for_controller.clone())
                    } else {
                        Api::namespaced(client_for_controller.clone(), &namespace)
                    };
                    Controller::new(parents, watcher::Config::default())
                        .owns(pods, watcher::Config::default())
                        .owns(statefulsets, watcher::Config::default())
                        .run(reconcile, on_error, ctx_for_controller)
                        .for_each(|_result| async move {})
                        .await;
                }));
            }
            if culling_task.is_none() {
                let ctx_for_culling = (*ctx).clone();
                let shutdown_for_culling = shutdown.clone();
                culling_task = Some(tokio::spawn(culling::run_all(ctx_for_culling, shutdown_for_culling)));
            }
        } else {
            if let Some(task) = controller_task.take() {
                tracing::warn!("lost leadership; stopping reconciler");
                task.abort();
            }
            if let Some(task) = culling_task.take() {
                tracing::warn!("lost leadership; stopping cullers");
                task.abort();
            }
        }
    }
}

async fn reconcile(parent: Arc<JupyterServer>, ctx: Arc<Context>) -> Result<Action, Error> {
    let namespace = parent
        .namespace()
        .ok_or_else(|| Error::UserInput("JupyterServer is missing metadata.namespace".into()))?;
    let name = parent.name_any();
    let keys = session_operator_common::annotations::Keys::new(ctx.config.api_group.clone());

    if parent.metadata.deletion_timestamp.is_some() {
        let old_state = parent.status.as_ref().map(|s| s.state);
        create_delete::delete(&ctx.client, &parent).await?;
        enqueue_transition(&ctx, &parent, old_state, SessionState::Stopping);
        return Ok(Action::await_change());
    }

    let already_created = parent
        .status
        .as_ref()
        .is_some_and(|s| !s.created_resources.is_empty());
    if !already_created {
        create_delete::create(&ctx.client, &parent, &ctx.label_policy, &keys).await?;
        enqueue_transition(&ctx, &parent, None, SessionState::Starting);
        return Ok(Action::requeue(Duration::from_secs(2)));
    }

    field_handlers::on_hibernated_changed(
        &ctx.client,
        &namespace,
        &name,
        parent.spec.jupyter_server.hibernated,
    )
    .await?;
    field_handlers::on_resources_changed(
        &ctx.client,
        &namespace,
        &name,
        "session",
        &parent.spec.jupyter_server.resources,
    )
    .await?;

    resync_main_pod(&ctx, &parent, &namespace, &name).await?;
    for key in ChildKey::ALL {
        if key == ChildKey::Pvc && !parent.spec.storage.pvc.enabled {
            continue;
        }
        resync_child(&ctx, &parent, &namespace, &name, key).await?;
    }
    resync_statefulset_events(&ctx, &parent, &namespace, &name).await?;

    // The resync calls above patched the live status via `child_event`/
    // `statefulset_event`; re-read it so state derivation sees the pod and
    // child snapshots just written rather than the stale copy the watch
    // event handed to this reconcile pass.
    let parents: Api<JupyterServer> = Api::namespaced(ctx.client.clone(), &namespace);
    let parent = Arc::new(parents.get(&name).await.map_err(Error::from)?);

    let old_state = parent.status.as_ref().map(|s| s.state).unwrap_or_default();
    let (new_state, new_summary) = derive_new_state(&ctx, &parent, &namespace, &name).await?;
    parent_event::apply(&ctx.client, &parent, new_state, new_summary).await?;
    if new_state != old_state {
        enqueue_transition(&ctx, &parent, Some(old_state), new_state);
    }

    Ok(Action::requeue(STEADY_STATE_REQUEUE))
}

fn on_error(parent: Arc<JupyterServer>, error: &Error, _ctx: Arc<Context>) -> Action {
    tracing::error!(
        error = %error,
        session = %parent.name_any(),
        "{}",
        "reconciliation error".color(FG1)
    );
    Action::requeue(ERROR_REQUEUE)
}

fn enqueue_transition(ctx: &Context, parent: &JupyterServer, old_state: Option<SessionState>, new_state: SessionState) {
    ctx.metrics.enqueue(MetricEvent {
        timestamp: k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(k8s_openapi::jiff::Timestamp::now()),
        session: SessionSnapshot {
            namespace: parent.namespace().unwrap_or_default(),
            name: parent.name_any(),
            uid: parent.uid().unwrap_or_default(),
        },
        old_status: old_state,
        new_status: new_state,
    });
}

/// Derives the overall session state per §4.2, given the parent's own
/// `metadata.deletionTimestamp` and `spec.jupyterServer.hibernated` have
/// already been ruled out by the caller (deletion is handled before this
/// point; hibernation is owned by the cullers/field handler and simply
/// reflected through `status.mainPod`'s absence once the StatefulSet scales
/// to zero).
async fn derive_new_state(
    ctx: &Context,
    parent: &JupyterServer,
    namespace: &str,
    name: &str,
) -> Result<(SessionState, crate::status::ContainerSummary), Error> {
    let empty_summary = || crate::status::ContainerSummary { init: Default::default(), regular: Default::default() };

    if parent.spec.jupyter_server.hibernated.unwrap_or(false) {
        return Ok((SessionState::Hibernated, empty_summary()));
    }

    // Pod age feeds the unschedulable-failure threshold, so this reads the
    // live Pod rather than the `status.mainPod` snapshot (which carries only
    // `PodStatus`, not `metadata.creationTimestamp`).
    let pods: Api<Pod> = Api::namespaced(ctx.client.clone(), namespace);
    let pod_name = format!("{name}-0");
    let Some(pod) = pods.get_opt(&pod_name).await.map_err(Error::from)? else {
        return Ok((status::overall_status_no_pod(), empty_summary()));
    };
    let Some(pod_status) = pod.status.clone() else {
        return Ok((status::overall_status_no_pod(), empty_summary()));
    };

    let elapsed = crate::culling::elapsed_seconds_since(
        pod.metadata.creation_timestamp.as_ref(),
        k8s_openapi::jiff::Timestamp::now(),
    );
    let age = std::time::Duration::from_secs(elapsed.max(0) as u64);

    let conditions: Vec<PodCondition> = pod_status
        .conditions
        .as_ref()
        .map(|cs| cs.iter().map(PodCondition::from).collect())
        .unwrap_or_default();
    let init_containers = container_statuses(pod_status.init_container_statuses.as_deref(), ContainerKind::Init, ctx.config.init_container_restart_limit)?;
    let containers = container_statuses(pod_status.container_statuses.as_deref(), ContainerKind::Regular, ctx.config.container_restart_limit)?;

    let pod = PodSnapshot { phase: pod_status.phase.clone().unwrap_or_default(), conditions, init_containers, containers, age };
    let summary = pod.container_summary();

    let url_responsive = async {
        let Some(host) = parent.spec.routing.host.as_deref() else { return false };
        let scheme = if parent.spec.routing.tls.enabled { "https" } else { "http" };
        let path = parent.spec.routing.path.as_deref().unwrap_or_default();
        let url = format!("{scheme}://{host}{path}");
        crate::status::probe::is_responsive(&ctx.http, &url).await
    };

    let state = status::overall_status(&pod, url_responsive, ctx.config.unschedulable_failure_threshold()).await;
    Ok((state, summary))
}

/// Routes every live container status through `ContainerStatus::from_k8s`,
/// which enforces the "multiple state keys -> fail the derivation" rule
/// (§4.2/§7); a malformed shape here propagates as an `Err` and aborts the
/// whole reconcile without mutating status, per §7's "fails loud".
fn container_statuses(
    statuses: Option<&[k8s_openapi::api::core::v1::ContainerStatus]>,
    kind: ContainerKind,
    restart_limit: u32,
) -> Result<Vec<ContainerStatus>, Error> {
    statuses
        .unwrap_or_default()
        .iter()
        .map(|c| ContainerStatus::from_k8s(c, kind, restart_limit))
        .collect()
}

async fn resync_main_pod(ctx: &Context, parent: &JupyterServer, namespace: &str, name: &str) -> Result<(), Error> {
    let pods: Api<Pod> = Api::namespaced(ctx.client.clone(), namespace);
    let pod_name = format!("{name}-0");
    let found = pods.get_opt(&pod_name).await.map_err(Error::from)?;
    let previously_present = parent.status.as_ref().and_then(|s| s.main_pod.as_ref()).is_some();

    match found {
        Some(pod) => {
            let event = ChildEvent {
                kind: EventKind::Other,
                owner_uids: vec![],
                is_main_pod: true,
                child_key: None,
                uid: pod.uid().unwrap_or_default(),
                name: pod.name_any(),
                object_kind: "Pod".to_string(),
                api_version: "v1".to_string(),
                status: pod.status.as_ref().and_then(|s| serde_json::to_value(s).ok()),
            };
            child_event::handle(&ctx.client, parent, event).await
        }
        None if previously_present => {
            let event = ChildEvent {
                kind: EventKind::Deleted,
                owner_uids: vec![],
                is_main_pod: true,
                child_key: None,
                uid: String::new(),
                name: pod_name,
                object_kind: "Pod".to_string(),
                api_version: "v1".to_string(),
                status: None,
            };
            child_event::handle(&ctx.client, parent, event).await
        }
        None => Ok(()),
    }
}

fn gvk_for(key: ChildKey) -> (&'static str, &'static str, &'static str) {
    match key {
        ChildKey::Service => ("", "v1", "Service"),
        ChildKey::Ingress => ("networking.k8s.io", "v1", "Ingress"),
        ChildKey::Statefulset => ("apps", "v1", "StatefulSet"),
        ChildKey::Configmap => ("", "v1", "ConfigMap"),
        ChildKey::Secret => ("", "v1", "Secret"),
        ChildKey::Pvc => ("", "v1", "PersistentVolumeClaim"),
    }
}

async fn resync_child(
    ctx: &Context,
    parent: &JupyterServer,
    namespace: &str,
    name: &str,
    key: ChildKey,
) -> Result<(), Error> {
    let (group, version, kind) = gvk_for(key);
    let ar = ctx.discovery.resolve(&ctx.client, group, version, kind).await?;
    let api: Api<DynamicObject> = Api::namespaced_with(ctx.client.clone(), namespace, &ar);
    let found = api.get_opt(name).await.map_err(Error::from)?;
    let previously_present = parent.status.as_ref().is_some_and(|s| s.children.contains_key(&key));

    match found {
        Some(object) => {
            let owner_uids = object
                .metadata
                .owner_references
                .as_ref()
                .map(|refs| refs.iter().map(|r| r.uid.clone()).collect())
                .unwrap_or_default();
            let event = ChildEvent {
                kind: EventKind::Other,
                owner_uids,
                is_main_pod: false,
                child_key: Some(key),
                uid: object.metadata.uid.clone().unwrap_or_default(),
                name: object.metadata.name.clone().unwrap_or_default(),
                object_kind: kind.to_string(),
                api_version: api_version_string(group, version),
                status: object.data.get("status").cloned(),
            };
            child_event::handle(&ctx.client, parent, event).await
        }
        None if previously_present => {
            let event = ChildEvent {
                kind: EventKind::Deleted,
                owner_uids: vec![],
                is_main_pod: false,
                child_key: Some(key),
                uid: String::new(),
                name: name.to_string(),
                object_kind: kind.to_string(),
                api_version: api_version_string(group, version),
                status: None,
            };
            child_event::handle(&ctx.client, parent, event).await
        }
        None => Ok(()),
    }
}

fn api_version_string(group: &str, version: &str) -> String {
    if group.is_empty() {
        version.to_string()
    } else {
        format!("{group}/{version}")
    }
}

async fn resync_statefulset_events(ctx: &Context, parent: &JupyterServer, namespace: &str, name: &str) -> Result<(), Error> {
    let events: Api<Event> = Api::namespaced(ctx.client.clone(), namespace);
    let params = ListParams::default().fields(&format!("involvedObject.kind=StatefulSet,involvedObject.name={name}"));
    let list = events.list(&params).await.map_err(Error::from)?;
    let Some(latest) = list
        .items
        .into_iter()
        .filter(|e| e.last_timestamp.is_some())
        .max_by_key(|e| e.last_timestamp.as_ref().map(|t| t.0))
    else {
        return Ok(());
    };
    let ObjectMeta { .. } = ObjectMeta::default();
    let event = StatefulSetEvent {
        reason: latest.reason.clone().unwrap_or_default(),
        message: latest.message.clone().unwrap_or_default(),
        last_timestamp: latest.last_timestamp.clone().unwrap_or(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(k8s_openapi::jiff::Timestamp::now())),
    };
    statefulset_event::handle(&ctx.client, parent, event).await
}
