//! §4.4.3 pending/failed culler: deletes a parent that has stayed in
//! `Starting` or `Failed` past its configured threshold. Both states carry
//! their own `*Since` timestamp written by the status deriver
//! ([`crate::status`]), so no extra annotation bookkeeping is needed here.

use k8s_openapi::jiff::Timestamp;
use kube::api::{Api, DeleteParams, Preconditions, PropagationPolicy};
use kube::ResourceExt;
use session_operator_types::{JupyterServer, SessionState};

use crate::context::Context;
use crate::culling::elapsed_seconds_since;
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingVerdict {
    NoOp,
    Delete,
}

/// Pure decision function. `since` is the relevant `*Since` timestamp for
/// the state the parent is currently in (`startingSince` for `Starting`,
/// `failedSince` for `Failed`); `threshold` is the matching culling
/// threshold. A threshold of `0` disables the rule, mirroring the other
/// cullers' "zero means never" convention.
pub fn decide(elapsed_seconds: i64, threshold: u64) -> PendingVerdict {
    if threshold == 0 {
        return PendingVerdict::NoOp;
    }
    if elapsed_seconds >= 0 && elapsed_seconds as u64 > threshold {
        PendingVerdict::Delete
    } else {
        PendingVerdict::NoOp
    }
}

pub async fn run_once(ctx: &Context, parent: &JupyterServer) -> Result<(), Error> {
    let Some(status) = parent.status.as_ref() else { return Ok(()) };

    let (since, threshold) = match status.state {
        SessionState::Starting => (status.starting_since.as_ref(), parent.spec.culling.starting_seconds_threshold),
        SessionState::Failed => (status.failed_since.as_ref(), parent.spec.culling.failed_seconds_threshold),
        _ => return Ok(()),
    };

    let elapsed = elapsed_seconds_since(since, Timestamp::now());
    if decide(elapsed, threshold) != PendingVerdict::Delete {
        return Ok(());
    }

    let namespace = parent
        .namespace()
        .ok_or_else(|| Error::UserInput("JupyterServer is missing metadata.namespace".into()))?;
    let name = parent.name_any();
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_zero_never_deletes() {
        assert_eq!(decide(100_000, 0), PendingVerdict::NoOp);
    }

    #[test]
    fn at_or_under_threshold_is_noop() {
        assert_eq!(decide(59, 60), PendingVerdict::NoOp);
        assert_eq!(decide(60, 60), PendingVerdict::NoOp);
    }

    #[test]
    fn past_threshold_deletes() {
        assert_eq!(decide(61, 60), PendingVerdict::Delete);
    }
}
