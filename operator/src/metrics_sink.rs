//! Bounded metric-event queue (§4.5). Every transition of `status.state`,
//! and parent deletion, is enqueued here. The queue has a single producer
//! per worker and is non-blocking: a full queue drops the event and logs a
//! warning rather than ever stalling the reconciler on I/O.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use serde::Serialize;
use session_operator_types::SessionState;
use tokio::sync::mpsc;

/// Capacity chosen generously relative to expected event rates; consumers
/// (Prometheus counter updates, audit logging) are expected to drain far
/// faster than the reconciler can produce events, so this is a safety net
/// against a wedged consumer rather than a throughput tuning knob.
pub const QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub namespace: String,
    pub name: String,
    pub uid: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricEvent {
    pub timestamp: Time,
    pub session: SessionSnapshot,
    pub old_status: Option<SessionState>,
    pub new_status: SessionState,
}

/// The producing half. Cloneable since every reconcile worker shares one
/// sender; `try_send` never blocks the caller.
#[derive(Clone)]
pub struct MetricEventProducer {
    sender: mpsc::Sender<MetricEvent>,
}

impl MetricEventProducer {
    /// Builds a bounded channel and returns both halves. The receiving
    /// half is handed to whichever `MetricSink` consumer the bootstrap
    /// wires up; further consumers (the object-store audit log) are out
    /// of scope per spec and are not constructed here.
    pub fn channel() -> (Self, mpsc::Receiver<MetricEvent>) {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        (Self { sender }, receiver)
    }

    /// Enqueues a state-transition event. Never awaits: on a full queue
    /// the event is dropped and a warning logged, per spec's "enqueue
    /// never blocks the reconciler" requirement.
    pub fn enqueue(&self, event: MetricEvent) {
        if let Err(err) = self.sender.try_send(event) {
            tracing::warn!(error = %err, "metric event queue full or closed; dropping event");
        }
    }
}

/// The external consumer boundary (§4.5). Only the producing side and this
/// trait's shape are in scope; further consumers beyond the one concrete
/// `PrometheusMetricSink` below are not implemented.
#[async_trait::async_trait]
pub trait MetricSink: Send + Sync {
    async fn observe(&self, event: &MetricEvent);
}

/// Consumes the metric-event queue and updates a Prometheus counter keyed
/// by `(old_status, new_status)`, proving the producer/consumer wiring
/// without building a full audit pipeline (out of scope per spec.md §1).
#[cfg(feature = "metrics")]
pub struct PrometheusMetricSink {
    transitions: prometheus::CounterVec,
}

#[cfg(feature = "metrics")]
impl PrometheusMetricSink {
    pub fn new(registry: &prometheus::Registry) -> Result<Self, prometheus::Error> {
        let transitions = prometheus::CounterVec::new(
            prometheus::Opts::new(
                "session_server_state_transitions_total",
                "Count of SessionServer status.state transitions observed by the operator",
            ),
            &["namespace", "from", "to"],
        )?;
        registry.register(Box::new(transitions.clone()))?;
        Ok(Self { transitions })
    }
}

#[cfg(feature = "metrics")]
#[async_trait::async_trait]
impl MetricSink for PrometheusMetricSink {
    async fn observe(&self, event: &MetricEvent) {
        let from = event
            .old_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "none".to_string());
        self.transitions
            .with_label_values(&[&event.session.namespace, &from, &event.new_status.to_string()])
            .inc();
    }
}

/// Drains the queue, handing every event to `sink`. Runs until the sender
/// half is dropped (bootstrap shutdown flushes remaining events before
/// this returns).
pub async fn run_consumer(mut receiver: mpsc::Receiver<MetricEvent>, sink: impl MetricSink) {
    while let Some(event) = receiver.recv().await {
        sink.observe(&event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueue_then_receive_round_trips() {
        let (producer, mut receiver) = MetricEventProducer::channel();
        producer.enqueue(MetricEvent {
            timestamp: Time(k8s_openapi::jiff::Timestamp::now()),
            session: SessionSnapshot { namespace: "ns".into(), name: "n".into(), uid: "u".into() },
            old_status: Some(SessionState::Starting),
            new_status: SessionState::Running,
        });
        let received = receiver.recv().await.unwrap();
        assert_eq!(received.new_status, SessionState::Running);
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let (sender, receiver) = mpsc::channel(1);
        let producer = MetricEventProducer { sender };
        let event = || MetricEvent {
            timestamp: Time(k8s_openapi::jiff::Timestamp::now()),
            session: SessionSnapshot { namespace: "ns".into(), name: "n".into(), uid: "u".into() },
            old_status: None,
            new_status: SessionState::Starting,
        };
        producer.enqueue(event());
        producer.enqueue(event());
        drop(receiver);
    }
}
