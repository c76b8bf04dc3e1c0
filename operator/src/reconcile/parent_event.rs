use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::jiff::Timestamp;
use kube::{Client, ResourceExt};
use serde_json::json;
use session_operator_types::{ContainerStates, JupyterServer, SessionState};

use crate::reconcile::patch::merge_patch_status;
use crate::status::ContainerSummary;
use crate::Error;

/// Applies the read phase of §4.2's derivation to the write discipline of
/// §4.3.3: write only if the new state isn't `Stopping` (the delete
/// handler owns that transition exclusively) and either the state or the
/// container summary actually changed. Sets/clears `startingSince` and
/// `failedSince` on entry/exit; `hibernatedSince` is set by the culler on
/// entry to `Hibernated`, but cleared here on exit (e.g. resume) so that
/// leaving any state always clears its own timestamp, per invariant I3.
pub async fn apply(
    client: &Client,
    parent: &JupyterServer,
    new_state: SessionState,
    new_summary: ContainerSummary,
) -> Result<(), Error> {
    if new_state == SessionState::Stopping {
        return Ok(());
    }

    let old_status = parent.status.clone().unwrap_or_default();
    let old_summary_changed = summary_differs(&old_status.container_states, &new_summary);

    if old_status.state == new_state && !old_summary_changed {
        return Ok(());
    }

    let namespace = parent
        .namespace()
        .ok_or_else(|| Error::UserInput("JupyterServer is missing metadata.namespace".into()))?;
    let name = parent.name_any();

    let status = transition_patch(old_status.state, new_state, &new_summary, Time(Timestamp::now()))?;
    merge_patch_status::<JupyterServer>(client, &namespace, &name, status).await
}

fn summary_differs(old: &ContainerStates, new: &ContainerSummary) -> bool {
    old.init != new.init || old.regular != new.regular
}

/// Builds the merge-patch body for a state transition: the new state and
/// container summary always, plus the `*Since` timestamp sets/clears per
/// invariant I3 — entering a state stamps its own timestamp, leaving any
/// state (Starting, Failed, or Hibernated) clears that state's timestamp.
fn transition_patch(
    old_state: SessionState,
    new_state: SessionState,
    new_summary: &ContainerSummary,
    now: Time,
) -> Result<serde_json::Value, Error> {
    let mut status = json!({
        "state": new_state,
        "containerStates": {
            "init": new_summary.init,
            "regular": new_summary.regular,
        },
    });

    if new_state != old_state {
        match new_state {
            SessionState::Starting => {
                status["startingSince"] = serde_json::to_value(&now)?;
            }
            SessionState::Failed => {
                status["failedSince"] = serde_json::to_value(&now)?;
            }
            _ => {}
        }
        if old_state == SessionState::Starting && new_state != SessionState::Starting {
            status["startingSince"] = serde_json::Value::Null;
        }
        if old_state == SessionState::Failed && new_state != SessionState::Failed {
            status["failedSince"] = serde_json::Value::Null;
        }
        if old_state == SessionState::Hibernated && new_state != SessionState::Hibernated {
            status["hibernatedSince"] = serde_json::Value::Null;
        }
    }

    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn identical_summaries_do_not_differ() {
        let old = ContainerStates::default();
        let new = ContainerSummary { init: BTreeMap::new(), regular: BTreeMap::new() };
        assert!(!summary_differs(&old, &new));
    }

    fn empty_summary() -> ContainerSummary {
        ContainerSummary { init: BTreeMap::new(), regular: BTreeMap::new() }
    }

    fn now() -> Time {
        Time(Timestamp::from_second(0).unwrap())
    }

    #[test]
    fn resume_from_hibernated_clears_hibernated_since() {
        let patch = transition_patch(SessionState::Hibernated, SessionState::Starting, &empty_summary(), now()).unwrap();
        assert_eq!(patch["hibernatedSince"], serde_json::Value::Null);
        assert_ne!(patch["startingSince"], serde_json::Value::Null);
    }

    #[test]
    fn staying_hibernated_does_not_touch_hibernated_since() {
        let patch = transition_patch(SessionState::Hibernated, SessionState::Hibernated, &empty_summary(), now()).unwrap();
        assert!(patch.get("hibernatedSince").is_none());
    }

    #[test]
    fn entering_failed_from_starting_clears_starting_since_and_sets_failed_since() {
        let patch = transition_patch(SessionState::Starting, SessionState::Failed, &empty_summary(), now()).unwrap();
        assert_eq!(patch["startingSince"], serde_json::Value::Null);
        assert_ne!(patch["failedSince"], serde_json::Value::Null);
    }
}
