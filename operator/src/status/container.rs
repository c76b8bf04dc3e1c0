use k8s_openapi::api::core::v1::ContainerStatus as K8sContainerStatus;

use crate::Error;

/// Kubernetes models a container's state as a single-key object out of
/// {waiting, running, terminated}. Modeled here as a tagged union instead of
/// probing keys at each call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    Waiting { reason: Option<String>, message: Option<String> },
    Running { started_at: Option<String> },
    Terminated { exit_code: i32, reason: Option<String>, message: Option<String> },
}

impl ContainerState {
    /// Extracts the tagged state from a raw container status. Exactly one
    /// state key is expected; if absent, `waiting` is assumed; if more than
    /// one is present the shape is malformed and derivation fails loud
    /// rather than silently picking one.
    fn from_k8s(state: &k8s_openapi::api::core::v1::ContainerState) -> Result<Self, Error> {
        let present = [state.waiting.is_some(), state.running.is_some(), state.terminated.is_some()]
            .iter()
            .filter(|x| **x)
            .count();
        if present > 1 {
            return Err(Error::MalformedPayload(
                "container state has more than one of waiting/running/terminated set".into(),
            ));
        }
        if let Some(w) = &state.waiting {
            return Ok(ContainerState::Waiting {
                reason: w.reason.clone(),
                message: w.message.clone(),
            });
        }
        if let Some(r) = &state.running {
            return Ok(ContainerState::Running {
                started_at: r.started_at.as_ref().map(|t| t.0.to_string()),
            });
        }
        if let Some(t) = &state.terminated {
            return Ok(ContainerState::Terminated {
                exit_code: t.exit_code,
                reason: t.reason.clone(),
                message: t.message.clone(),
            });
        }
        Ok(ContainerState::Waiting { reason: None, message: None })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Init,
    Regular,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStatus {
    pub name: String,
    pub ready: bool,
    pub state: ContainerState,
    pub restarts: i32,
    pub restart_limit: u32,
    pub kind: ContainerKind,
}

impl ContainerStatus {
    pub fn from_k8s(
        status: &K8sContainerStatus,
        kind: ContainerKind,
        restart_limit: u32,
    ) -> Result<Self, Error> {
        let state = match &status.state {
            Some(s) => ContainerState::from_k8s(s)?,
            None => ContainerState::Waiting { reason: None, message: None },
        };
        Ok(Self {
            name: status.name.clone(),
            ready: status.ready,
            state,
            restarts: status.restart_count,
            restart_limit,
            kind,
        })
    }

    pub fn running(&self) -> bool {
        matches!(self.state, ContainerState::Running { .. })
    }

    pub fn running_ready(&self) -> bool {
        self.running() && self.ready
    }

    pub fn completed_successfully(&self) -> bool {
        matches!(&self.state, ContainerState::Terminated { exit_code, .. } if *exit_code == 0) && self.ready
    }

    /// Not completed-successfully AND restarts exceed the configured limit
    /// for this container's type (init vs regular).
    pub fn failed(&self) -> bool {
        if self.completed_successfully() {
            return false;
        }
        self.restarts > self.restart_limit as i32
    }

    pub fn summary_phase(&self) -> session_operator_types::ContainerPhase {
        use session_operator_types::ContainerPhase;
        if self.completed_successfully() || self.running_ready() {
            ContainerPhase::Ready
        } else if self.failed() {
            ContainerPhase::Failed
        } else if self.running() {
            ContainerPhase::Executing
        } else {
            ContainerPhase::Waiting
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ContainerStateTerminated, ContainerStateWaiting, ContainerState as K8sState};

    fn waiting_status(reason: &str, restarts: i32) -> K8sContainerStatus {
        K8sContainerStatus {
            name: "main".into(),
            ready: false,
            restart_count: restarts,
            state: Some(K8sState {
                waiting: Some(ContainerStateWaiting { reason: Some(reason.into()), ..Default::default() }),
                ..Default::default()
            }),
            image: "img".into(),
            image_id: "".into(),
            ..Default::default()
        }
    }

    #[test]
    fn rejects_multiple_states_set() {
        let mut status = waiting_status("ContainerCreating", 0);
        status.state.as_mut().unwrap().running =
            Some(k8s_openapi::api::core::v1::ContainerStateRunning { started_at: None });
        let err = ContainerStatus::from_k8s(&status, ContainerKind::Regular, 3).unwrap_err();
        assert!(matches!(err, Error::MalformedPayload(_)));
    }

    #[test]
    fn missing_state_defaults_to_waiting() {
        let mut status = waiting_status("x", 0);
        status.state = None;
        let cs = ContainerStatus::from_k8s(&status, ContainerKind::Regular, 3).unwrap();
        assert!(matches!(cs.state, ContainerState::Waiting { .. }));
    }

    #[test]
    fn failed_when_restarts_exceed_limit_and_not_completed() {
        let status = waiting_status("CrashLoopBackOff", 4);
        let cs = ContainerStatus::from_k8s(&status, ContainerKind::Regular, 3).unwrap();
        assert!(cs.failed());
    }

    #[test]
    fn not_failed_when_completed_successfully_even_with_restarts() {
        let status = K8sContainerStatus {
            name: "main".into(),
            ready: true,
            restart_count: 5,
            state: Some(K8sState {
                terminated: Some(ContainerStateTerminated { exit_code: 0, ..Default::default() }),
                ..Default::default()
            }),
            image: "img".into(),
            image_id: "".into(),
            ..Default::default()
        };
        let cs = ContainerStatus::from_k8s(&status, ContainerKind::Regular, 3).unwrap();
        assert!(cs.completed_successfully());
        assert!(!cs.failed());
    }

    #[test]
    fn running_ready_requires_both() {
        let status = K8sContainerStatus {
            name: "main".into(),
            ready: false,
            restart_count: 0,
            state: Some(K8sState {
                running: Some(k8s_openapi::api::core::v1::ContainerStateRunning { started_at: None }),
                ..Default::default()
            }),
            image: "img".into(),
            image_id: "".into(),
            ..Default::default()
        };
        let cs = ContainerStatus::from_k8s(&status, ContainerKind::Regular, 3).unwrap();
        assert!(cs.running());
        assert!(!cs.running_ready());
    }
}
