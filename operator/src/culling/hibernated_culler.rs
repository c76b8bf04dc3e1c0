//! §4.4.2 hibernated-age culler: deletes a parent that has stayed
//! hibernated past `hibernatedSecondsThreshold`, and backfills the
//! `hibernation-date` annotation the first tick it observes a hibernated
//! parent missing one (e.g. after an operator upgrade from a version that
//! did not record it).

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::jiff::Timestamp;
use kube::api::{Api, DeleteParams, Preconditions, PropagationPolicy};
use kube::ResourceExt;
use serde_json::json;
use session_operator_types::JupyterServer;

use crate::context::Context;
use crate::reconcile::patch::merge_patch_spec;
use crate::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HibernatedVerdict {
    /// Not hibernated, or the rule is disabled: nothing to do.
    NoOp,
    /// Hibernated past the threshold: delete the parent.
    Delete,
    /// Hibernated, under threshold, but missing its annotation: backfill it.
    RecordHibernationDate,
}

/// Pure decision function. `hibernation_date` is `None` when the
/// `hibernation-date` annotation is absent.
pub fn decide(
    now: Timestamp,
    hibernated: bool,
    hibernated_seconds_threshold: u64,
    hibernation_date: Option<Timestamp>,
) -> HibernatedVerdict {
    if !hibernated || hibernated_seconds_threshold == 0 {
        return HibernatedVerdict::NoOp;
    }
    let Some(since) = hibernation_date else {
        return HibernatedVerdict::RecordHibernationDate;
    };
    let hibernated_seconds = now.duration_since(since).as_secs().max(0) as u64;
    if hibernated_seconds >= hibernated_seconds_threshold {
        HibernatedVerdict::Delete
    } else {
        HibernatedVerdict::NoOp
    }
}

pub async fn run_once(ctx: &Context, parent: &JupyterServer) -> Result<(), Error> {
    let namespace = parent
        .namespace()
        .ok_or_else(|| Error::UserInput("JupyterServer is missing metadata.namespace".into()))?;
    let name = parent.name_any();
    let hibernated = parent.spec.jupyter_server.hibernated.unwrap_or(false);
    let keys = session_operator_common::annotations::Keys::new(ctx.config.api_group.clone());

    let hibernation_date = parent
        .annotations()
        .get(&keys.hibernation_date())
        .and_then(|v| v.parse::<Timestamp>().ok());

    let verdict = decide(
        Timestamp::now(),
        hibernated,
        parent.spec.culling.hibernated_seconds_threshold,
        hibernation_date,
    );

    match verdict {
        HibernatedVerdict::NoOp => Ok(()),
        HibernatedVerdict::Delete => {
            let api: Api<JupyterServer> = Api::namespaced(ctx.client.clone(), &namespace);
            let params = DeleteParams {
                propagation_policy: Some(PropagationPolicy::Foreground),
                preconditions: Some(Preconditions { uid: parent.uid(), resource_version: None }),
                ..DeleteParams::default()
            };
            match api.delete(&name, &params).await {
                Ok(_) => Ok(()),
                Err(e) => {
                    let e = Error::from(e);
                    if e.is_not_found() { Ok(()) } else { Err(e) }
                }
            }
        }
        HibernatedVerdict::RecordHibernationDate => {
            let mut annotations = std::collections::BTreeMap::new();
            annotations.insert(keys.hibernation_date(), Time(Timestamp::now()).0.to_string());
            let patch = json!({"metadata": {"annotations": annotations}});
            merge_patch_spec::<JupyterServer>(&ctx.client, &namespace, &name, patch).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(seconds: i64) -> Timestamp {
        Timestamp::from_second(seconds).unwrap()
    }

    #[test]
    fn not_hibernated_is_noop() {
        assert_eq!(decide(ts(1000), false, 60, Some(ts(0))), HibernatedVerdict::NoOp);
    }

    #[test]
    fn threshold_zero_never_deletes() {
        assert_eq!(decide(ts(100_000), true, 0, Some(ts(0))), HibernatedVerdict::NoOp);
    }

    #[test]
    fn missing_annotation_backfills_rather_than_deletes() {
        assert_eq!(decide(ts(1000), true, 60, None), HibernatedVerdict::RecordHibernationDate);
    }

    #[test]
    fn under_threshold_is_noop() {
        assert_eq!(decide(ts(1000), true, 600, Some(ts(900))), HibernatedVerdict::NoOp);
    }

    #[test]
    fn at_or_past_threshold_deletes() {
        assert_eq!(decide(ts(1600), true, 600, Some(ts(1000))), HibernatedVerdict::Delete);
    }
}
