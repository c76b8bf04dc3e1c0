pub mod conditions;
pub mod container;
pub mod probe;

use std::collections::BTreeMap;

use session_operator_types::{ContainerPhase, SessionState};

pub use conditions::PodCondition;
pub use container::{ContainerKind, ContainerState, ContainerStatus};

/// Everything the deriver needs about the main pod to compute an overall
/// status. Deletion of the parent is decided by the caller before this
/// snapshot is even built; the delete handler is the exclusive writer of
/// `Stopping`, so this type has no way to represent it.
pub struct PodSnapshot {
    pub phase: String,
    pub conditions: Vec<PodCondition>,
    pub init_containers: Vec<ContainerStatus>,
    pub containers: Vec<ContainerStatus>,
    pub age: std::time::Duration,
}

/// Per-container phase summary keyed by container name, split into init and
/// regular groups, for `status.containerStates`.
pub struct ContainerSummary {
    pub init: BTreeMap<String, ContainerPhase>,
    pub regular: BTreeMap<String, ContainerPhase>,
}

impl PodSnapshot {
    pub fn container_summary(&self) -> ContainerSummary {
        ContainerSummary {
            init: self
                .init_containers
                .iter()
                .map(|c| (c.name.clone(), c.summary_phase()))
                .collect(),
            regular: self
                .containers
                .iter()
                .map(|c| (c.name.clone(), c.summary_phase()))
                .collect(),
        }
    }

    fn unschedulable(&self) -> bool {
        let sorted = conditions::sorted_descending(self.conditions.clone());
        conditions::is_unschedulable(&self.phase, &sorted)
    }

    fn conditions_all_true(&self) -> bool {
        !self.conditions.is_empty() && self.conditions.iter().all(|c| c.status == "True")
    }

    fn any_container_failed(&self) -> bool {
        self.init_containers.iter().any(|c| c.failed()) || self.containers.iter().any(|c| c.failed())
    }

    fn all_containers_ready(&self) -> bool {
        self.containers
            .iter()
            .all(|c| c.completed_successfully() || c.running_ready())
    }
}

/// Derives the overall session state from a pod snapshot, not accounting for
/// hibernation or deletion (those are decided by the caller, which owns
/// `spec.jupyterServer.hibernated` and `metadata.deletionTimestamp`
/// respectively and short-circuits before reaching here).
///
/// Precedence, given the pod exists and the parent isn't hibernated or being
/// deleted:
/// 1. unschedulable and older than `unschedulable_failure_threshold` -> Failed
/// 2. phase=Running, all containers ready, all conditions true, URL
///    responsive -> Running
/// 3. phase=Failed or any container failed -> Failed
/// 4. otherwise -> Starting
pub async fn overall_status(
    pod: &PodSnapshot,
    url_responsive: impl std::future::Future<Output = bool>,
    unschedulable_failure_threshold: std::time::Duration,
) -> SessionState {
    if pod.unschedulable() && pod.age > unschedulable_failure_threshold {
        return SessionState::Failed;
    }
    if pod.phase == "Running"
        && pod.all_containers_ready()
        && pod.conditions_all_true()
        && url_responsive.await
    {
        return SessionState::Running;
    }
    if pod.phase == "Failed" || pod.any_container_failed() {
        return SessionState::Failed;
    }
    SessionState::Starting
}

/// No pod exists yet (StatefulSet hasn't materialized one, or it was just
/// deleted for a hibernate/resume cycle) -> always Starting.
pub fn overall_status_no_pod() -> SessionState {
    SessionState::Starting
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn running_container(name: &str) -> ContainerStatus {
        ContainerStatus {
            name: name.into(),
            ready: true,
            state: ContainerState::Running { started_at: None },
            restarts: 0,
            restart_limit: 3,
            kind: ContainerKind::Regular,
        }
    }

    fn true_condition() -> PodCondition {
        PodCondition {
            r#type: "Ready".into(),
            status: "True".into(),
            reason: None,
            message: None,
            last_transition_time: Some("2024-01-01T00:00:00Z".into()),
        }
    }

    #[tokio::test]
    async fn running_requires_responsive_url() {
        let pod = PodSnapshot {
            phase: "Running".into(),
            conditions: vec![true_condition()],
            init_containers: vec![],
            containers: vec![running_container("main")],
            age: Duration::from_secs(120),
        };
        let state = overall_status(&pod, async { false }, Duration::from_secs(60)).await;
        assert_eq!(state, SessionState::Starting);

        let state = overall_status(&pod, async { true }, Duration::from_secs(60)).await;
        assert_eq!(state, SessionState::Running);
    }

    #[tokio::test]
    async fn unschedulable_past_threshold_is_failed() {
        let pod = PodSnapshot {
            phase: "Pending".into(),
            conditions: vec![PodCondition {
                r#type: "PodScheduled".into(),
                status: "False".into(),
                reason: Some("Unschedulable".into()),
                message: Some("0/3 nodes available".into()),
                last_transition_time: Some("2024-01-01T00:00:00Z".into()),
            }],
            init_containers: vec![],
            containers: vec![],
            age: Duration::from_secs(600),
        };
        let state = overall_status(&pod, async { false }, Duration::from_secs(60)).await;
        assert_eq!(state, SessionState::Failed);
    }

    #[tokio::test]
    async fn unschedulable_before_threshold_stays_starting() {
        let pod = PodSnapshot {
            phase: "Pending".into(),
            conditions: vec![PodCondition {
                r#type: "PodScheduled".into(),
                status: "False".into(),
                reason: Some("Unschedulable".into()),
                message: Some("0/3 nodes available".into()),
                last_transition_time: Some("2024-01-01T00:00:00Z".into()),
            }],
            init_containers: vec![],
            containers: vec![],
            age: Duration::from_secs(5),
        };
        let state = overall_status(&pod, async { false }, Duration::from_secs(60)).await;
        assert_eq!(state, SessionState::Starting);
    }

    #[tokio::test]
    async fn pvc_provisioning_message_does_not_become_failed() {
        let pod = PodSnapshot {
            phase: "Pending".into(),
            conditions: vec![PodCondition {
                r#type: "PodScheduled".into(),
                status: "False".into(),
                reason: Some("Unschedulable".into()),
                message: Some("pod has unbound immediate PersistentVolumeClaims".into()),
                last_transition_time: Some("2024-01-01T00:00:00Z".into()),
            }],
            init_containers: vec![],
            containers: vec![],
            age: Duration::from_secs(600),
        };
        let state = overall_status(&pod, async { false }, Duration::from_secs(60)).await;
        assert_eq!(state, SessionState::Starting);
    }

    #[tokio::test]
    async fn failed_container_yields_failed_even_when_running() {
        let pod = PodSnapshot {
            phase: "Running".into(),
            conditions: vec![true_condition()],
            init_containers: vec![],
            containers: vec![ContainerStatus {
                name: "main".into(),
                ready: false,
                state: ContainerState::Waiting { reason: Some("CrashLoopBackOff".into()), message: None },
                restarts: 10,
                restart_limit: 3,
                kind: ContainerKind::Regular,
            }],
            age: Duration::from_secs(600),
        };
        let state = overall_status(&pod, async { false }, Duration::from_secs(60)).await;
        assert_eq!(state, SessionState::Failed);
    }
}
