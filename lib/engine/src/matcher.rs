//! Trigger matching.
//!
//! Maps an inbound event to the account's active flows whose entry trigger
//! accepts it, and starts a chain per match. Zero matches is the common
//! case, not an error.

use crate::error::EngineError;
use crate::event::InboundEvent;
use crate::queue::{Continuation, ContinuationQueue};
use crate::stores::FlowStore;
use chatflow_core::ChainId;
use chatflow_flow::Flow;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Matches inbound events to flows and starts chains.
pub struct TriggerMatcher {
    flow_store: Arc<dyn FlowStore>,
    queue: Arc<dyn ContinuationQueue>,
}

impl TriggerMatcher {
    #[must_use]
    pub fn new(flow_store: Arc<dyn FlowStore>, queue: Arc<dyn ContinuationQueue>) -> Self {
        Self { flow_store, queue }
    }

    /// Returns the account's active flows whose trigger accepts the event.
    ///
    /// # Errors
    ///
    /// Returns an error when the flow listing fails.
    pub async fn matching_flows(&self, event: &InboundEvent) -> Result<Vec<Flow>, EngineError> {
        let flows = self.flow_store.list_active(event.account_id).await?;
        Ok(flows
            .into_iter()
            .filter(|flow| Self::matches(flow, event))
            .collect())
    }

    fn matches(flow: &Flow, event: &InboundEvent) -> bool {
        let Some(trigger) = flow.trigger() else {
            return false;
        };
        if trigger.trigger_type != event.trigger_type {
            return false;
        }
        // A trigger with keywords additionally requires one of them in the
        // message text, case-insensitively.
        match &trigger.keywords {
            Some(keywords) if !keywords.is_empty() => {
                let text = event.context.message_text.to_lowercase();
                keywords
                    .iter()
                    .any(|keyword| text.contains(&keyword.to_lowercase()))
            }
            _ => true,
        }
    }

    /// Starts a chain for one matched flow.
    ///
    /// Increments `total_executions` and enqueues the trigger's first
    /// successor with zero delay. A trigger with no successors completes
    /// trivially; that is not a counted success.
    ///
    /// # Errors
    ///
    /// Returns an error when the flow has no trigger node, the trigger does
    /// not accept the event, or a store/queue operation fails.
    pub async fn start_flow(
        &self,
        flow: &Flow,
        event: &InboundEvent,
    ) -> Result<ChainId, EngineError> {
        let trigger = flow.trigger().ok_or(EngineError::MissingTrigger {
            flow_id: flow.id,
        })?;
        if trigger.trigger_type != event.trigger_type {
            return Err(EngineError::TriggerMismatch {
                flow_id: flow.id,
                event_type: event.trigger_type,
            });
        }

        self.flow_store.record_trigger(flow.id).await?;

        let chain_id = ChainId::new();
        let trigger_node = flow.trigger_node().ok_or(EngineError::MissingTrigger {
            flow_id: flow.id,
        })?;

        match flow
            .graph
            .successors(&trigger_node.id, None)
            .first()
            .map(|node| node.id.clone())
        {
            Some(first) => {
                let continuation = Continuation::new(
                    chain_id,
                    flow.account_id,
                    flow.id,
                    first,
                    event.context.clone(),
                );
                self.queue.enqueue(Duration::ZERO, continuation).await?;
                debug!(%chain_id, flow_id = %flow.id, "chain started");
            }
            None => {
                debug!(flow_id = %flow.id, "trigger has no successors, nothing to run");
            }
        }

        Ok(chain_id)
    }

    /// Handles one inbound event: starts a chain per matched flow.
    ///
    /// Each flow runs under its own error boundary; a failing flow gets its
    /// `failed_executions` bumped and never blocks sibling flows. Returns
    /// the number of chains started.
    ///
    /// # Errors
    ///
    /// Returns an error only when the initial flow listing fails.
    pub async fn handle_event(&self, event: &InboundEvent) -> Result<usize, EngineError> {
        let flows = self.matching_flows(event).await?;
        let mut started = 0;

        for flow in &flows {
            match self.start_flow(flow, event).await {
                Ok(_) => started += 1,
                Err(e) => {
                    warn!(flow_id = %flow.id, error = %e, "failed to start flow");
                    if let Err(store_err) = self.flow_store.record_failure(flow.id).await {
                        warn!(flow_id = %flow.id, error = %store_err, "failed to record failure");
                    }
                }
            }
        }

        Ok(started)
    }
}
