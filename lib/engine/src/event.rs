//! Inbound events from messaging platforms.

use crate::context::ExecutionContext;
use chatflow_core::AccountId;
use chatflow_flow::TriggerType;
use serde::{Deserialize, Serialize};

/// An inbound social-messaging event, normalized across platforms.
///
/// Webhook receivers translate raw platform payloads into this shape before
/// publishing; the engine never sees platform-specific formats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// The account the event belongs to.
    pub account_id: AccountId,
    /// Which kind of event this is, in trigger terms.
    pub trigger_type: TriggerType,
    /// Snapshot of the event payload.
    pub context: ExecutionContext,
}

impl InboundEvent {
    #[must_use]
    pub fn new(account_id: AccountId, trigger_type: TriggerType, context: ExecutionContext) -> Self {
        Self {
            account_id,
            trigger_type,
            context,
        }
    }
}
