//! Continuation queue.
//!
//! A chain suspends between nodes: every hop (zero-delay or after a delay
//! node) goes back through the queue rather than recursing in-process, so a
//! chain survives worker restarts. Delivery is at-least-once; steps must
//! tolerate re-execution.

use crate::context::ExecutionContext;
use async_trait::async_trait;
use chatflow_core::{AccountId, ChainId, FlowId};
use chatflow_flow::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A pending invocation of the node executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Continuation {
    /// The chain this step belongs to (one chain per trigger match).
    pub chain_id: ChainId,
    /// The account that owns the flow.
    pub account_id: AccountId,
    /// The flow whose graph is being walked.
    pub flow_id: FlowId,
    /// The node to execute next.
    pub node_id: NodeId,
    /// Event snapshot captured at trigger time.
    pub context: ExecutionContext,
}

impl Continuation {
    #[must_use]
    pub fn new(
        chain_id: ChainId,
        account_id: AccountId,
        flow_id: FlowId,
        node_id: NodeId,
        context: ExecutionContext,
    ) -> Self {
        Self {
            chain_id,
            account_id,
            flow_id,
            node_id,
            context,
        }
    }

    /// Returns a copy of this continuation pointed at another node.
    #[must_use]
    pub fn advance_to(&self, node_id: NodeId) -> Self {
        Self {
            node_id,
            ..self.clone()
        }
    }
}

/// Envelope version for queued steps.
pub const SCHEDULED_STEP_VERSION: u32 = 1;

/// Wire envelope for a queued step.
///
/// JetStream has no native delayed delivery; the consumer NAKs the message
/// with the remaining delay until `not_before` has passed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledStep {
    pub version: u32,
    /// Earliest time the step may execute.
    pub not_before: DateTime<Utc>,
    pub continuation: Continuation,
}

impl ScheduledStep {
    #[must_use]
    pub fn new(not_before: DateTime<Utc>, continuation: Continuation) -> Self {
        Self {
            version: SCHEDULED_STEP_VERSION,
            not_before,
            continuation,
        }
    }

    /// Returns how long the step must still wait, or `None` if it is due.
    #[must_use]
    pub fn remaining_delay(&self, now: DateTime<Utc>) -> Option<Duration> {
        (self.not_before > now).then(|| {
            (self.not_before - now)
                .to_std()
                .unwrap_or(Duration::ZERO)
        })
    }
}

/// Errors from queueing a continuation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The step could not be published to the queue backend.
    PublishFailed { message: String },
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PublishFailed { message } => {
                write!(f, "failed to publish continuation: {message}")
            }
        }
    }
}

impl std::error::Error for QueueError {}

/// Durable scheduling of node-executor invocations.
#[async_trait]
pub trait ContinuationQueue: Send + Sync {
    /// Registers that the executor must run `continuation` no earlier than
    /// `delay` from now.
    async fn enqueue(&self, delay: Duration, continuation: Continuation) -> Result<(), QueueError>;
}

/// In-memory queue for tests.
///
/// Records enqueued steps; tests drain them to drive a chain to completion
/// synchronously.
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    steps: std::sync::Mutex<std::collections::VecDeque<(Duration, Continuation)>>,
}

impl InMemoryQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns the oldest queued step.
    pub fn pop(&self) -> Option<(Duration, Continuation)> {
        self.steps.lock().expect("queue lock").pop_front()
    }

    /// Number of steps currently queued.
    pub fn len(&self) -> usize {
        self.steps.lock().expect("queue lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ContinuationQueue for InMemoryQueue {
    async fn enqueue(&self, delay: Duration, continuation: Continuation) -> Result<(), QueueError> {
        self.steps
            .lock()
            .expect("queue lock")
            .push_back((delay, continuation));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_continuation() -> Continuation {
        Continuation::new(
            ChainId::new(),
            AccountId::new(),
            FlowId::new(),
            NodeId::new("greet"),
            ExecutionContext::new("user-1", "chan-1", "hello"),
        )
    }

    #[test]
    fn scheduled_step_due_when_not_before_passed() {
        let past = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        let step = ScheduledStep::new(past, sample_continuation());
        assert_eq!(step.remaining_delay(now), None);
    }

    #[test]
    fn scheduled_step_reports_remaining_delay() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let later = now + chrono::Duration::minutes(10);
        let step = ScheduledStep::new(later, sample_continuation());
        assert_eq!(step.remaining_delay(now), Some(Duration::from_secs(600)));
    }

    #[test]
    fn scheduled_step_serde_roundtrip() {
        let step = ScheduledStep::new(Utc::now(), sample_continuation());
        let json = serde_json::to_string(&step).expect("serialize");
        let parsed: ScheduledStep = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.version, SCHEDULED_STEP_VERSION);
        assert_eq!(parsed.continuation, step.continuation);
    }

    #[tokio::test]
    async fn in_memory_queue_preserves_order() {
        let queue = InMemoryQueue::new();
        let first = sample_continuation();
        let second = first.advance_to(NodeId::new("next"));

        queue.enqueue(Duration::ZERO, first.clone()).await.unwrap();
        queue
            .enqueue(Duration::from_secs(60), second.clone())
            .await
            .unwrap();

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some((Duration::ZERO, first)));
        assert_eq!(queue.pop(), Some((Duration::from_secs(60), second)));
        assert!(queue.is_empty());
    }
}
