use k8s_openapi::api::core::v1::PodCondition as K8sPodCondition;

/// A parsed pod condition. `last_transition_time` is kept as its wire string
/// (RFC 3339 UTC timestamps order lexicographically the same as
/// chronologically, so string comparison is sufficient for the descending
/// sort).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodCondition {
    pub r#type: String,
    pub status: String,
    pub reason: Option<String>,
    pub message: Option<String>,
    pub last_transition_time: Option<String>,
}

impl From<&K8sPodCondition> for PodCondition {
    fn from(c: &K8sPodCondition) -> Self {
        Self {
            r#type: c.type_.clone(),
            status: c.status.clone(),
            reason: c.reason.clone(),
            message: c.message.clone(),
            last_transition_time: c.last_transition_time.as_ref().map(|t| t.0.to_string()),
        }
    }
}

/// Sorts pod conditions by `lastTransitionTime` descending.
pub fn sorted_descending(mut conditions: Vec<PodCondition>) -> Vec<PodCondition> {
    conditions.sort_by(|a, b| b.last_transition_time.cmp(&a.last_transition_time));
    conditions
}

/// A pod is unschedulable iff phase=Pending AND the most-recent condition
/// has reason=Unschedulable AND its message does not mention
/// `persistentvolumeclaim` (the normal transient state while a PVC is being
/// provisioned).
pub fn is_unschedulable(phase: &str, conditions_desc: &[PodCondition]) -> bool {
    if phase != "Pending" {
        return false;
    }
    let Some(latest) = conditions_desc.first() else {
        return false;
    };
    if latest.reason.as_deref() != Some("Unschedulable") {
        return false;
    }
    match &latest.message {
        Some(m) => !m.to_lowercase().contains("persistentvolumeclaim"),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cond(reason: &str, message: Option<&str>, t: &str) -> PodCondition {
        PodCondition {
            r#type: "PodScheduled".into(),
            status: "False".into(),
            reason: Some(reason.into()),
            message: message.map(String::from),
            last_transition_time: Some(t.into()),
        }
    }

    #[test]
    fn unschedulable_when_pending_and_most_recent_condition_matches() {
        let conditions = sorted_descending(vec![
            cond("Unschedulable", Some("0/3 nodes available"), "2024-01-01T00:00:00Z"),
            cond("Unschedulable", Some("earlier"), "2023-12-31T00:00:00Z"),
        ]);
        assert!(is_unschedulable("Pending", &conditions));
    }

    #[test]
    fn not_failed_when_pvc_provisioning_mentioned() {
        let conditions = vec![cond(
            "Unschedulable",
            Some("pod has unbound immediate PersistentVolumeClaims"),
            "2024-01-01T00:00:00Z",
        )];
        assert!(!is_unschedulable("Pending", &conditions));
    }

    #[test]
    fn not_unschedulable_when_phase_is_running() {
        let conditions = vec![cond("Unschedulable", None, "2024-01-01T00:00:00Z")];
        assert!(!is_unschedulable("Running", &conditions));
    }

    #[test]
    fn sort_is_descending_by_transition_time() {
        let sorted = sorted_descending(vec![
            cond("A", None, "2024-01-01T00:00:00Z"),
            cond("B", None, "2024-06-01T00:00:00Z"),
        ]);
        assert_eq!(sorted[0].reason.as_deref(), Some("B"));
    }
}
