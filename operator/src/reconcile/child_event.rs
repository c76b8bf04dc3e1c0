use std::str::FromStr;

use kube::{Client, ResourceExt};
use serde_json::json;
use session_operator_types::{ChildKey, JupyterServer};

use crate::labels::{is_owned_by_parent, LabelPolicy};
use crate::reconcile::patch::patch_status_json;
use crate::Error;

/// The three event kinds a watch stream delivers. `Other` covers the
/// defensive default a missing/unknown event type maps to (treated as a
/// replace, since the object clearly exists).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Added,
    Modified,
    Deleted,
    Other,
}

fn patch_op(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Added => "add",
        EventKind::Modified => "replace",
        EventKind::Deleted => "remove",
        EventKind::Other => "replace",
    }
}

/// Metadata about a child (or main-pod) object extracted from a watch
/// event, enough to locate its status slot and build the recorded snapshot.
pub struct ChildEvent {
    pub kind: EventKind,
    pub owner_uids: Vec<String>,
    pub is_main_pod: bool,
    pub child_key: Option<ChildKey>,
    pub uid: String,
    pub name: String,
    pub object_kind: String,
    pub api_version: String,
    pub status: Option<serde_json::Value>,
}

/// Applies one child-event to the parent's status. Resolves the target
/// slot (`/status/mainPod` for the main pod, `/status/children/<key>`
/// otherwise), drops events from resources that don't belong to this
/// parent, and maps the event type to a JSON-Patch op. A `NotFound` on a
/// `remove` patch is swallowed upstream by `patch_status_json`.
pub async fn handle(
    client: &Client,
    parent: &JupyterServer,
    event: ChildEvent,
) -> Result<(), Error> {
    let parent_uid = parent.uid().unwrap_or_default();
    let namespace = parent
        .namespace()
        .ok_or_else(|| Error::UserInput("JupyterServer is missing metadata.namespace".into()))?;
    let name = parent.name_any();

    if !is_owned_by_parent(&event.owner_uids, event.is_main_pod, &parent_uid) {
        return Ok(());
    }

    let path = if event.is_main_pod {
        "/status/mainPod".to_string()
    } else {
        let key = event
            .child_key
            .ok_or_else(|| Error::MalformedPayload("child event missing child-key label".into()))?;
        format!("/status/children/{key}")
    };

    let before = serde_json::to_value(&parent.status)?;
    let mut after = before.clone();

    let op = patch_op(event.kind);
    match op {
        "remove" => {
            remove_at_path(&mut after, &path);
        }
        _ => {
            let value = json!({
                "uid": event.uid,
                "name": event.name,
                "kind": event.object_kind,
                "apiVersion": event.api_version,
                "status": event.status,
            });
            set_at_path(&mut after, &path, value);
        }
    }

    let before = json!({"status": before});
    let after = json!({"status": after});
    patch_status_json::<JupyterServer>(client, &namespace, &name, &before, &after).await
}

fn set_at_path(status: &mut serde_json::Value, path: &str, value: serde_json::Value) {
    let segments: Vec<&str> = path.trim_start_matches("/status/").split('/').collect();
    set_recursive(status, &segments, value);
}

fn set_recursive(current: &mut serde_json::Value, segments: &[&str], value: serde_json::Value) {
    if !current.is_object() {
        *current = json!({});
    }
    let obj = current.as_object_mut().unwrap();
    match segments {
        [only] => {
            obj.insert((*only).to_string(), value);
        }
        [head, rest @ ..] => {
            let entry = obj.entry((*head).to_string()).or_insert_with(|| json!({}));
            set_recursive(entry, rest, value);
        }
        [] => {}
    }
}

fn remove_at_path(status: &mut serde_json::Value, path: &str) {
    let segments: Vec<&str> = path.trim_start_matches("/status/").split('/').collect();
    remove_recursive(status, &segments);
}

fn remove_recursive(current: &mut serde_json::Value, segments: &[&str]) {
    let Some(obj) = current.as_object_mut() else { return };
    match segments {
        [only] => {
            obj.remove(*only);
        }
        [head, rest @ ..] => {
            if let Some(child) = obj.get_mut(*head) {
                remove_recursive(child, rest);
            }
        }
        [] => {}
    }
}

pub fn parse_child_key(raw: &str) -> Option<ChildKey> {
    ChildKey::from_str(raw).ok()
}

pub fn resolve_labels_for_lookup(
    policy: &LabelPolicy,
) -> (String, String, String) {
    (policy.parent_name_key(), policy.main_pod_key(), policy.child_key_key())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_modified_map_to_add_and_replace() {
        assert_eq!(patch_op(EventKind::Added), "add");
        assert_eq!(patch_op(EventKind::Modified), "replace");
        assert_eq!(patch_op(EventKind::Deleted), "remove");
        assert_eq!(patch_op(EventKind::Other), "replace");
    }

    #[test]
    fn set_then_remove_round_trips_to_absent() {
        let mut status = json!({});
        set_at_path(&mut status, "/status/children/service", json!({"uid": "1"}));
        assert_eq!(status["children"]["service"]["uid"], "1");
        remove_at_path(&mut status, "/status/children/service");
        assert!(status["children"].get("service").is_none());
    }

    #[test]
    fn main_pod_path_sets_top_level_key() {
        let mut status = json!({});
        set_at_path(&mut status, "/status/mainPod", json!({"uid": "pod-1"}));
        assert_eq!(status["mainPod"]["uid"], "pod-1");
    }

    #[test]
    fn parses_known_child_key_strings() {
        assert_eq!(parse_child_key("statefulset"), Some(ChildKey::Statefulset));
        assert_eq!(parse_child_key("bogus"), None);
    }
}
