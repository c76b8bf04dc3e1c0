//! §4.4.1 idle culler: combines an activity probe and a CPU-usage probe
//! into an idle/not-idle verdict, then hibernates, advances, or clears the
//! `last-activity-date` annotation accordingly.

use k8s_openapi::jiff::Timestamp;
use kube::{Client, ResourceExt};
use serde_json::json;
use session_operator_types::JupyterServer;

use crate::context::Context;
use crate::culling::activity_probe::{self, ActivityProbeResult};
use crate::culling::metrics_probe;
use crate::reconcile::patch::{merge_patch_spec, merge_patch_status};
use crate::Error;

/// Outcome of one idle-culler tick, kept separate from its side effects so
/// the decision logic (this enum + `decide`) can be unit tested without a
/// cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleVerdict {
    /// The activity or CPU probe failed; no action is taken this tick (P5).
    Unknown,
    /// Session is hibernated already; nothing to decide.
    AlreadyHibernated,
    /// Idle long enough, or old enough, to hibernate.
    Hibernate { reason: HibernateReason },
    /// Idle right now, but not past the threshold yet: advance the
    /// recorded activity annotation to the probe's `last_activity`.
    AdvanceActivity(Timestamp),
    /// Not idle, and an activity annotation is currently set: clear it.
    ClearActivity,
    /// Not idle, and nothing to clear.
    NoOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HibernateReason {
    Idle,
    Age,
}

/// Pure decision function. `now - last_activity > idle_check_interval` is
/// spec.md's own "idle right now" predicate (strict `>`); crossing the
/// configured threshold uses `>=` ("idle for at least N seconds"). Both
/// comparisons are taken literally from spec.md's text rather than
/// unified, per the open question in spec.md §9 — this distinction is
/// exercised directly in the tests below.
#[allow(clippy::too_many_arguments)]
pub fn decide(
    now: Timestamp,
    hibernated: bool,
    probe: &ActivityProbeResult,
    cpu_millicores: u64,
    cpu_threshold_millicores: u64,
    idle_check_interval: std::time::Duration,
    idle_seconds_threshold: u64,
    max_age_seconds_threshold: u64,
    started: Timestamp,
    activity_annotation_set: bool,
) -> IdleVerdict {
    if hibernated {
        return IdleVerdict::AlreadyHibernated;
    }

    let snapshot = match probe {
        ActivityProbeResult::Unknown => return IdleVerdict::Unknown,
        ActivityProbeResult::Known(s) => s,
    };

    let last_activity_age = now.duration_since(snapshot.last_activity).as_secs().max(0) as u64;
    let idle_right_now = cpu_millicores <= cpu_threshold_millicores
        && snapshot.connections <= 0
        && last_activity_age > idle_check_interval.as_secs();

    if idle_right_now && idle_seconds_threshold > 0 && last_activity_age >= idle_seconds_threshold {
        return IdleVerdict::Hibernate { reason: HibernateReason::Idle };
    }

    let server_age = now.duration_since(started).as_secs().max(0) as u64;
    if max_age_seconds_threshold > 0 && server_age >= max_age_seconds_threshold {
        return IdleVerdict::Hibernate { reason: HibernateReason::Age };
    }

    if idle_right_now {
        IdleVerdict::AdvanceActivity(snapshot.last_activity)
    } else if activity_annotation_set {
        IdleVerdict::ClearActivity
    } else {
        IdleVerdict::NoOp
    }
}

/// Runs one tick against a live parent: probes activity and CPU usage,
/// decides, and applies the resulting patch.
pub async fn run_once(ctx: &Context, parent: &JupyterServer) -> Result<(), Error> {
    let namespace = parent
        .namespace()
        .ok_or_else(|| Error::UserInput("JupyterServer is missing metadata.namespace".into()))?;
    let name = parent.name_any();
    let keys = session_operator_common::annotations::Keys::new(ctx.config.api_group.clone());

    let Some(main_pod) = parent.status.as_ref().and_then(|s| s.main_pod.as_ref()) else {
        return Ok(());
    };
    let hibernated = parent.spec.jupyter_server.hibernated.unwrap_or(false);

    if hibernated {
        return clear_activity_annotation(&ctx.client, &namespace, &name, &keys).await;
    }

    let Some(host) = parent.spec.routing.host.clone() else { return Ok(()) };
    let scheme = if parent.spec.routing.tls.enabled { "https" } else { "http" };
    let path = parent.spec.routing.path.clone().unwrap_or_default();
    let full_url = format!("{scheme}://{host}{path}");
    let token = parent.spec.auth.token.as_deref();

    let probe = activity_probe::probe(&ctx.http, &full_url, token).await;
    let cpu_millicores = metrics_probe::pod_cpu_millicores(&ctx.client, &namespace, &main_pod.name).await;

    let now = Timestamp::now();
    let started = match &probe {
        ActivityProbeResult::Known(snapshot) => snapshot.started,
        ActivityProbeResult::Unknown => now,
    };

    let activity_annotation_set = parent
        .annotations()
        .get(&keys.last_activity_date())
        .is_some_and(|v| !v.is_empty());

    let verdict = decide(
        now,
        hibernated,
        &probe,
        cpu_millicores,
        ctx.config.cpu_usage_millicores_idle_threshold,
        ctx.config.idle_check_interval(),
        parent.spec.culling.idle_seconds_threshold,
        parent.spec.culling.max_age_seconds_threshold,
        started,
        activity_annotation_set,
    );

    apply(ctx, &namespace, &name, &keys, verdict).await
}

async fn apply(
    ctx: &Context,
    namespace: &str,
    name: &str,
    keys: &session_operator_common::annotations::Keys,
    verdict: IdleVerdict,
) -> Result<(), Error> {
    match verdict {
        IdleVerdict::Unknown | IdleVerdict::AlreadyHibernated | IdleVerdict::NoOp => Ok(()),
        IdleVerdict::Hibernate { reason } => hibernate(ctx, namespace, name, keys, reason).await,
        IdleVerdict::AdvanceActivity(last_activity) => {
            let mut annotations = std::collections::BTreeMap::new();
            annotations.insert(keys.last_activity_date(), last_activity.to_string());
            let patch = json!({"metadata": {"annotations": annotations}});
            merge_patch_spec::<JupyterServer>(&ctx.client, namespace, name, patch).await
        }
        IdleVerdict::ClearActivity => clear_activity_annotation(&ctx.client, namespace, name, keys).await,
    }
}

async fn hibernate(
    ctx: &Context,
    namespace: &str,
    name: &str,
    keys: &session_operator_common::annotations::Keys,
    reason: HibernateReason,
) -> Result<(), Error> {
    let reason_str = match reason {
        HibernateReason::Idle => "idle",
        HibernateReason::Age => "age",
    };
    let now_str = Timestamp::now().to_string();
    let mut annotations = std::collections::BTreeMap::new();
    annotations.insert(keys.last_activity_date(), serde_json::Value::Null);
    annotations.insert(keys.hibernation(), serde_json::Value::String(reason_str.to_string()));
    annotations.insert(keys.hibernation_date(), serde_json::Value::String(now_str));
    let spec_patch = json!({
        "spec": {"jupyterServer": {"hibernated": true}},
        "metadata": {"annotations": annotations},
    });
    merge_patch_spec::<JupyterServer>(&ctx.client, namespace, name, spec_patch).await?;

    let now = k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(Timestamp::now());
    let status_patch = json!({"state": "Hibernated", "hibernatedSince": now});
    merge_patch_status::<JupyterServer>(&ctx.client, namespace, name, status_patch).await
}

async fn clear_activity_annotation(
    client: &Client,
    namespace: &str,
    name: &str,
    keys: &session_operator_common::annotations::Keys,
) -> Result<(), Error> {
    let mut annotations = std::collections::BTreeMap::new();
    annotations.insert(keys.last_activity_date(), serde_json::Value::Null);
    let patch = json!({"metadata": {"annotations": annotations}});
    merge_patch_spec::<JupyterServer>(client, namespace, name, patch).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::culling::activity_probe::ActivitySnapshot;
    use std::time::Duration;

    fn ts(seconds: i64) -> Timestamp {
        Timestamp::from_second(seconds).unwrap()
    }

    fn known(connections: i64, last_activity: Timestamp) -> ActivityProbeResult {
        ActivityProbeResult::Known(ActivitySnapshot { connections, last_activity, started: ts(0) })
    }

    #[test]
    fn unknown_probe_never_hibernates_or_acts() {
        let verdict = decide(
            ts(1000),
            false,
            &ActivityProbeResult::Unknown,
            0,
            200,
            Duration::from_secs(60),
            60,
            0,
            ts(0),
            true,
        );
        assert_eq!(verdict, IdleVerdict::Unknown);
    }

    #[test]
    fn unknown_cpu_probe_defaulting_to_zero_does_not_block_culling() {
        // cpu_millicores=0 (metrics-server unavailable) must not prevent
        // hibernation when activity genuinely indicates idleness.
        let verdict = decide(
            ts(1000),
            false,
            &known(0, ts(0)),
            0,
            200,
            Duration::from_secs(60),
            60,
            0,
            ts(500),
            false,
        );
        assert_eq!(verdict, IdleVerdict::Hibernate { reason: HibernateReason::Idle });
    }

    #[test]
    fn idle_threshold_zero_never_hibernates_for_idleness() {
        let verdict = decide(
            ts(100_000),
            false,
            &known(0, ts(0)),
            0,
            200,
            Duration::from_secs(60),
            0,
            0,
            ts(0),
            false,
        );
        assert_eq!(verdict, IdleVerdict::AdvanceActivity(ts(0)));
    }

    #[test]
    fn max_age_zero_never_hibernates_for_age() {
        let verdict = decide(
            ts(100_000),
            false,
            &known(5, ts(99_999)),
            0,
            200,
            Duration::from_secs(60),
            0,
            0,
            ts(0),
            false,
        );
        assert_eq!(verdict, IdleVerdict::NoOp);
    }

    #[test]
    fn active_connections_prevent_idle_even_with_low_cpu() {
        let verdict = decide(
            ts(1000),
            false,
            &known(3, ts(0)),
            0,
            200,
            Duration::from_secs(60),
            60,
            0,
            ts(0),
            false,
        );
        assert_eq!(verdict, IdleVerdict::NoOp);
    }

    #[test]
    fn high_cpu_prevents_idle() {
        let verdict = decide(
            ts(1000),
            false,
            &known(0, ts(0)),
            500,
            200,
            Duration::from_secs(60),
            60,
            0,
            ts(0),
            false,
        );
        assert_eq!(verdict, IdleVerdict::NoOp);
    }

    #[test]
    fn already_hibernated_short_circuits() {
        let verdict = decide(
            ts(1000),
            true,
            &ActivityProbeResult::Unknown,
            0,
            200,
            Duration::from_secs(60),
            60,
            0,
            ts(0),
            true,
        );
        assert_eq!(verdict, IdleVerdict::AlreadyHibernated);
    }

    #[test]
    fn idle_below_threshold_advances_annotation_instead_of_hibernating() {
        let verdict = decide(
            ts(1000),
            false,
            &known(0, ts(900)),
            0,
            200,
            Duration::from_secs(60),
            600,
            0,
            ts(0),
            false,
        );
        assert_eq!(verdict, IdleVerdict::AdvanceActivity(ts(900)));
    }

    #[test]
    fn not_idle_with_annotation_set_clears_it() {
        let verdict = decide(
            ts(1000),
            false,
            &known(2, ts(990)),
            0,
            200,
            Duration::from_secs(60),
            600,
            0,
            ts(0),
            true,
        );
        assert_eq!(verdict, IdleVerdict::ClearActivity);
    }

    #[test]
    fn max_age_past_threshold_hibernates_for_age_even_if_active() {
        let verdict = decide(
            ts(10_000),
            false,
            &known(5, ts(9_999)),
            0,
            200,
            Duration::from_secs(60),
            0,
            5000,
            ts(0),
            false,
        );
        assert_eq!(verdict, IdleVerdict::Hibernate { reason: HibernateReason::Age });
    }
}
