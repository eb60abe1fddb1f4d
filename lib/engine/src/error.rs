//! Engine error type.

use crate::delivery::DeliveryError;
use crate::queue::QueueError;
use crate::stores::StoreError;
use chatflow_core::FlowId;
use chatflow_flow::TriggerType;
use std::fmt;

/// Errors from starting or stepping a chain.
///
/// An `EngineError` reaching `run_step` means the step failed: the flow's
/// `failed_executions` counter is incremented and the error is logged.
#[derive(Debug)]
pub enum EngineError {
    /// The flow's trigger node does not accept the event's trigger type.
    TriggerMismatch {
        flow_id: FlowId,
        event_type: TriggerType,
    },
    /// The flow has no trigger node at all.
    MissingTrigger { flow_id: FlowId },
    /// A non-transient delivery failure.
    Delivery(DeliveryError),
    /// A store operation failed.
    Store(StoreError),
    /// A continuation could not be queued.
    Queue(QueueError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TriggerMismatch {
                flow_id,
                event_type,
            } => {
                write!(
                    f,
                    "flow {flow_id} trigger does not accept {event_type:?} events"
                )
            }
            Self::MissingTrigger { flow_id } => {
                write!(f, "flow {flow_id} has no trigger node")
            }
            Self::Delivery(e) => write!(f, "delivery failed: {e}"),
            Self::Store(e) => write!(f, "store operation failed: {e}"),
            Self::Queue(e) => write!(f, "queueing failed: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Delivery(e) => Some(e),
            Self::Store(e) => Some(e),
            Self::Queue(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DeliveryError> for EngineError {
    fn from(e: DeliveryError) -> Self {
        Self::Delivery(e)
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<QueueError> for EngineError {
    fn from(e: QueueError) -> Self {
        Self::Queue(e)
    }
}
