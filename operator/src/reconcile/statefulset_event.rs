use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{Client, ResourceExt};
use serde_json::json;
use session_operator_types::JupyterServer;

use crate::reconcile::patch::merge_patch_status;
use crate::Error;

pub const QUOTA_EXCEEDED_MESSAGE: &str = "StatefulSet creation failed: quota exceeded";

/// A core `Event` whose `involvedObject.kind = StatefulSet`, carrying just
/// the fields the quota-surfacing handler inspects.
pub struct StatefulSetEvent {
    pub reason: String,
    pub message: String,
    pub last_timestamp: Time,
}

/// Surfaces `FailedCreate`/quota-exceeded StatefulSet events onto the
/// parent's `status.events.statefulset`, and clears the slot once a
/// `SuccessfulCreate` follows. Guards on `lastTimestamp` so redelivering
/// the same event is a no-op (P4).
pub async fn handle(
    client: &Client,
    parent: &JupyterServer,
    event: StatefulSetEvent,
) -> Result<(), Error> {
    let namespace = parent
        .namespace()
        .ok_or_else(|| Error::UserInput("JupyterServer is missing metadata.namespace".into()))?;
    let name = parent.name_any();

    let stored = parent.status.as_ref().and_then(|s| s.events.statefulset.as_ref());
    let stored_timestamp = stored.map(|e| e.timestamp.0.to_string());
    let incoming_timestamp = event.last_timestamp.0.to_string();
    if stored_timestamp.as_deref() == Some(incoming_timestamp.as_str()) {
        return Ok(());
    }

    if event.reason == "FailedCreate" && event.message.contains("exceeded quota") {
        let status = json!({
            "events": {
                "statefulset": {
                    "message": QUOTA_EXCEEDED_MESSAGE,
                    "timestamp": event.last_timestamp,
                }
            }
        });
        return merge_patch_status::<JupyterServer>(client, &namespace, &name, status).await;
    }

    if event.reason == "SuccessfulCreate" && stored.map(|e| e.message.as_str()) == Some(QUOTA_EXCEEDED_MESSAGE) {
        let status = json!({"events": {"statefulset": null}});
        return merge_patch_status::<JupyterServer>(client, &namespace, &name, status).await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_message_is_stable() {
        assert_eq!(QUOTA_EXCEEDED_MESSAGE, "StatefulSet creation failed: quota exceeded");
    }
}
