use std::collections::BTreeMap;

use session_operator_common::annotations::Keys;
use session_operator_types::ChildKey;

/// Computes the canonical label set stamped on every child resource and
/// decides whether a given resource belongs to a given parent.
pub struct LabelPolicy {
    keys: Keys,
    selector_labels: BTreeMap<String, String>,
    component: String,
}

impl LabelPolicy {
    pub fn new(
        api_group: impl Into<String>,
        selector_labels: BTreeMap<String, String>,
        parent_kind: &str,
    ) -> Self {
        Self {
            keys: Keys::new(api_group),
            selector_labels,
            component: parent_kind.to_lowercase(),
        }
    }

    /// Merges, lowest to highest precedence: parent labels, operator-
    /// configured selector labels, then the canonical set. `child_key` is
    /// set iff `Some`; `main-pod` is set iff `is_main_pod`.
    pub fn labels_for(
        &self,
        parent_labels: &BTreeMap<String, String>,
        parent_uid: &str,
        parent_name: &str,
        child_key: Option<ChildKey>,
        is_main_pod: bool,
    ) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.extend(parent_labels.clone());
        labels.extend(self.selector_labels.clone());
        labels.insert("app.kubernetes.io/component".to_string(), self.component.clone());
        labels.insert(self.keys.parent_uid(), parent_uid.to_string());
        labels.insert(self.keys.parent_name(), parent_name.to_string());
        if let Some(child_key) = child_key {
            labels.insert(self.keys.child_key(), child_key.to_string());
        }
        if is_main_pod {
            labels.insert(self.keys.main_pod(), "true".to_string());
        }
        labels
    }

    pub fn parent_name_key(&self) -> String {
        self.keys.parent_name()
    }

    pub fn main_pod_key(&self) -> String {
        self.keys.main_pod()
    }

    pub fn child_key_key(&self) -> String {
        self.keys.child_key()
    }
}

/// True when either the object's ownerReferences contain `parent_uid`, or
/// it is the main pod (a grandchild of the parent via the StatefulSet,
/// identified by the `main-pod=true` label rather than owner-reference
/// ancestry).
pub fn is_owned_by_parent(owner_uids: &[String], is_main_pod: bool, parent_uid: &str) -> bool {
    is_main_pod || owner_uids.iter().any(|uid| uid == parent_uid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> LabelPolicy {
        LabelPolicy::new("amalthea.dev", BTreeMap::new(), "JupyterServer")
    }

    #[test]
    fn child_gets_parent_uid_and_name_labels() {
        let labels = policy().labels_for(&BTreeMap::new(), "uid-1", "my-session", Some(ChildKey::Service), false);
        assert_eq!(labels.get("amalthea.dev/parent-uid"), Some(&"uid-1".to_string()));
        assert_eq!(labels.get("amalthea.dev/parent-name"), Some(&"my-session".to_string()));
        assert_eq!(labels.get("amalthea.dev/child-key"), Some(&"service".to_string()));
        assert!(!labels.contains_key("amalthea.dev/main-pod"));
    }

    #[test]
    fn main_pod_has_no_child_key_but_has_main_pod_label() {
        let labels = policy().labels_for(&BTreeMap::new(), "uid-1", "my-session", None, true);
        assert!(!labels.contains_key("amalthea.dev/child-key"));
        assert_eq!(labels.get("amalthea.dev/main-pod"), Some(&"true".to_string()));
    }

    #[test]
    fn selector_labels_override_parent_labels_but_not_canonical_set() {
        let mut selector = BTreeMap::new();
        selector.insert("team".to_string(), "data".to_string());
        selector.insert("amalthea.dev/parent-name".to_string(), "should-be-overridden".to_string());
        let p = LabelPolicy::new("amalthea.dev", selector, "JupyterServer");
        let mut parent_labels = BTreeMap::new();
        parent_labels.insert("team".to_string(), "ignored".to_string());
        let labels = p.labels_for(&parent_labels, "uid-1", "my-session", None, false);
        assert_eq!(labels.get("team"), Some(&"data".to_string()));
        assert_eq!(labels.get("amalthea.dev/parent-name"), Some(&"my-session".to_string()));
    }

    #[test]
    fn ownership_true_for_main_pod_even_without_owner_ref() {
        assert!(is_owned_by_parent(&[], true, "uid-1"));
    }

    #[test]
    fn ownership_true_when_owner_ref_matches() {
        assert!(is_owned_by_parent(&["uid-1".to_string()], false, "uid-1"));
    }

    #[test]
    fn ownership_false_for_unrelated_resource() {
        assert!(!is_owned_by_parent(&["uid-2".to_string()], false, "uid-1"));
    }
}
