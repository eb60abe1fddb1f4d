//! Node executor.
//!
//! Executes one node of a chain, then either enqueues the next hop or
//! terminates. Every hop goes back through the continuation queue, so the
//! executor holds no in-process chain state.
//!
//! Outcome counter rules:
//! - A chain ending after an action increments `successful_executions`.
//! - A branching node with no edge for the taken branch is a silent dead
//!   end: no counter moves.
//! - A chain whose flow or node has disappeared is abandoned silently.
//! - An executor error surfaces through `run_step`, which increments
//!   `failed_executions` and logs.

use crate::clock::Clock;
use crate::condition;
use crate::context::ExecutionContext;
use crate::delivery::{
    AdminNotification, MessageSender, Notifier, OutboundMessage, WebhookCall, WebhookDispatcher,
};
use crate::error::EngineError;
use crate::queue::{Continuation, ContinuationQueue};
use crate::sentiment;
use crate::stores::{ContactStore, FlowStore};
use chatflow_flow::{ActionConfig, BranchHandle, Flow, NodeData};
use chrono::Timelike;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How a single step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The next node was enqueued with zero delay.
    Continued,
    /// The chain is parked behind a delay; the successor is enqueued.
    Suspended,
    /// The chain terminated after its last node.
    Completed,
    /// A branching node had no edge for the taken branch.
    DeadEnd,
    /// The flow or node no longer exists; the chain is dropped.
    Abandoned,
    /// The step errored; `failed_executions` was incremented.
    Failed,
}

/// Executes chain steps against the flow graph.
pub struct NodeExecutor {
    flow_store: Arc<dyn FlowStore>,
    contact_store: Arc<dyn ContactStore>,
    sender: Arc<dyn MessageSender>,
    webhooks: Arc<dyn WebhookDispatcher>,
    notifier: Arc<dyn Notifier>,
    queue: Arc<dyn ContinuationQueue>,
    clock: Arc<dyn Clock>,
}

impl NodeExecutor {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        flow_store: Arc<dyn FlowStore>,
        contact_store: Arc<dyn ContactStore>,
        sender: Arc<dyn MessageSender>,
        webhooks: Arc<dyn WebhookDispatcher>,
        notifier: Arc<dyn Notifier>,
        queue: Arc<dyn ContinuationQueue>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            flow_store,
            contact_store,
            sender,
            webhooks,
            notifier,
            queue,
            clock,
        }
    }

    /// Queue-facing entry point.
    ///
    /// Converts executor errors into a `failed_executions` increment plus a
    /// warning; it never propagates, so a poisoned step cannot take down
    /// the worker loop.
    pub async fn run_step(&self, continuation: Continuation) -> StepOutcome {
        let flow_id = continuation.flow_id;
        let chain_id = continuation.chain_id;
        match self.execute(continuation).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(%chain_id, %flow_id, error = %e, "chain step failed");
                if let Err(store_err) = self.flow_store.record_failure(flow_id).await {
                    warn!(%flow_id, error = %store_err, "failed to record failure");
                }
                StepOutcome::Failed
            }
        }
    }

    /// Executes the node the continuation points at.
    ///
    /// # Errors
    ///
    /// Returns an error on non-transient delivery failures, store failures,
    /// or queue failures. A vanished flow or node is not an error.
    pub async fn execute(&self, continuation: Continuation) -> Result<StepOutcome, EngineError> {
        let Some(flow) = self.flow_store.get(continuation.flow_id).await? else {
            debug!(flow_id = %continuation.flow_id, "flow gone, abandoning chain");
            return Ok(StepOutcome::Abandoned);
        };

        let Some(node) = flow.graph.get_node(&continuation.node_id) else {
            debug!(
                flow_id = %continuation.flow_id,
                node_id = %continuation.node_id,
                "node gone, abandoning chain"
            );
            return Ok(StepOutcome::Abandoned);
        };

        match node.data.clone() {
            // A trigger node carries no behavior; pass through to its
            // successors. Ending here is not a counted success.
            NodeData::Trigger(_) => self.continue_chain(&flow, &continuation, false).await,
            NodeData::Action(config) => self.execute_action(&flow, &continuation, &config).await,
        }
    }

    async fn execute_action(
        &self,
        flow: &Flow,
        continuation: &Continuation,
        config: &ActionConfig,
    ) -> Result<StepOutcome, EngineError> {
        debug!(
            chain_id = %continuation.chain_id,
            flow_id = %flow.id,
            node_id = %continuation.node_id,
            action = config.kind(),
            "executing node"
        );

        match config {
            ActionConfig::SendDm { message } => {
                self.deliver(continuation, message).await?;
                self.continue_chain(flow, continuation, true).await
            }
            ActionConfig::Delay { duration, unit } => {
                let delay = unit.duration(*duration);
                match flow
                    .graph
                    .successors(&continuation.node_id, None)
                    .first()
                    .map(|node| node.id.clone())
                {
                    Some(next) => {
                        self.queue
                            .enqueue(delay, continuation.advance_to(next))
                            .await?;
                        Ok(StepOutcome::Suspended)
                    }
                    None => self.complete(flow).await,
                }
            }
            ActionConfig::Condition {
                variable,
                operator,
                value,
            } => {
                let outcome =
                    condition::evaluate(*variable, *operator, value, &continuation.context);
                self.branch(flow, continuation, outcome).await
            }
            ActionConfig::TimeWindow {
                start_time,
                end_time,
            } => {
                let now = self.clock.now();
                let minutes = now.hour() * 60 + now.minute();
                let outcome = in_time_window(minutes, start_time, end_time);
                self.branch(flow, continuation, outcome).await
            }
            ActionConfig::Randomizer { percentage } => {
                let draw = rand::rng().random_range(0.0..100.0);
                self.branch(flow, continuation, draw < *percentage).await
            }
            ActionConfig::Sentiment { target_sentiment } => {
                let class = sentiment::classify(&continuation.context.message_text);
                self.branch(flow, continuation, class == *target_sentiment)
                    .await
            }
            ActionConfig::AddTag { tag } => {
                let contact = self
                    .contact_store
                    .find_by_platform_user(continuation.account_id, &continuation.context.sender_id)
                    .await?;
                match contact {
                    Some(contact) => self.contact_store.add_tag(contact.id, tag).await?,
                    None => {
                        debug!(
                            sender_id = %continuation.context.sender_id,
                            "no contact record, skipping tag"
                        );
                    }
                }
                self.continue_chain(flow, continuation, true).await
            }
            ActionConfig::CollectEmail { prompt } => {
                // Capture happens when the reply arrives as a later inbound
                // event; this node only asks.
                self.deliver(continuation, prompt).await?;
                self.continue_chain(flow, continuation, true).await
            }
            ActionConfig::Webhook { url, method, body } => {
                let call = WebhookCall {
                    url: url.clone(),
                    method: *method,
                    body: substitute_placeholders(body, &continuation.context),
                };
                self.webhooks.dispatch(call).await;
                self.continue_chain(flow, continuation, true).await
            }
            ActionConfig::Notify { email, message } => {
                self.notifier
                    .notify(AdminNotification {
                        account_id: continuation.account_id,
                        email: email.clone(),
                        message: message.clone(),
                    })
                    .await;
                self.continue_chain(flow, continuation, true).await
            }
        }
    }

    /// Sends a DM; transient failures are logged and swallowed so the
    /// chain keeps walking, a missing integration fails the step.
    async fn deliver(
        &self,
        continuation: &Continuation,
        text: &str,
    ) -> Result<(), EngineError> {
        let message = OutboundMessage {
            account_id: continuation.account_id,
            recipient_id: continuation.context.sender_id.clone(),
            channel_id: continuation.context.channel_id.clone(),
            text: text.to_string(),
        };

        match self.sender.send(message).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_transient() => {
                warn!(
                    chain_id = %continuation.chain_id,
                    error = %e,
                    "message delivery failed, continuing chain"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Enqueues the first unconditional successor, or terminates.
    async fn continue_chain(
        &self,
        flow: &Flow,
        continuation: &Continuation,
        count_success: bool,
    ) -> Result<StepOutcome, EngineError> {
        match flow
            .graph
            .successors(&continuation.node_id, None)
            .first()
            .map(|node| node.id.clone())
        {
            Some(next) => {
                self.queue
                    .enqueue(Duration::ZERO, continuation.advance_to(next))
                    .await?;
                Ok(StepOutcome::Continued)
            }
            None if count_success => self.complete(flow).await,
            None => Ok(StepOutcome::Completed),
        }
    }

    /// Enqueues the successor on the taken branch, or dead-ends.
    async fn branch(
        &self,
        flow: &Flow,
        continuation: &Continuation,
        outcome: bool,
    ) -> Result<StepOutcome, EngineError> {
        let handle = BranchHandle::from(outcome);
        match flow
            .graph
            .successors(&continuation.node_id, Some(handle))
            .first()
            .map(|node| node.id.clone())
        {
            Some(next) => {
                self.queue
                    .enqueue(Duration::ZERO, continuation.advance_to(next))
                    .await?;
                Ok(StepOutcome::Continued)
            }
            None => {
                debug!(
                    chain_id = %continuation.chain_id,
                    node_id = %continuation.node_id,
                    branch = %handle,
                    "no edge for taken branch, chain ends"
                );
                Ok(StepOutcome::DeadEnd)
            }
        }
    }

    async fn complete(&self, flow: &Flow) -> Result<StepOutcome, EngineError> {
        self.flow_store.record_success(flow.id).await?;
        Ok(StepOutcome::Completed)
    }
}

/// Substitutes context tokens into a webhook body template.
fn substitute_placeholders(template: &str, context: &ExecutionContext) -> String {
    template
        .replace("{{user_id}}", &context.sender_id)
        .replace("{{message}}", &context.message_text)
        .replace("{{name}}", context.sender_name.as_deref().unwrap_or(""))
}

/// Parses "HH:MM" into minutes past midnight.
fn parse_time_of_day(value: &str) -> Option<u32> {
    let (hours, minutes) = value.split_once(':')?;
    let hours: u32 = hours.parse().ok()?;
    let minutes: u32 = minutes.parse().ok()?;
    (hours < 24 && minutes < 60).then_some(hours * 60 + minutes)
}

/// Inclusive time-of-day window check; windows with start > end wrap
/// midnight. Malformed times evaluate false.
fn in_time_window(now_minutes: u32, start: &str, end: &str) -> bool {
    let (Some(start), Some(end)) = (parse_time_of_day(start), parse_time_of_day(end)) else {
        return false;
    };
    if start <= end {
        (start..=end).contains(&now_minutes)
    } else {
        now_minutes >= start || now_minutes <= end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{
        FixedClock, InMemoryContactStore, InMemoryFlowStore, RecordingDispatcher,
        RecordingNotifier, RecordingSender,
    };
    use crate::queue::InMemoryQueue;
    use crate::stores::Contact;
    use chatflow_core::{AccountId, ChainId};
    use chatflow_flow::{
        ConditionOperator, ConditionVariable, DelayUnit, Edge, FlowGraph, HttpMethod, Node,
        NodeId, SentimentClass, TriggerData, TriggerType,
    };
    use chrono::{TimeZone, Utc};

    struct Harness {
        flows: Arc<InMemoryFlowStore>,
        contacts: Arc<InMemoryContactStore>,
        sender: Arc<RecordingSender>,
        webhooks: Arc<RecordingDispatcher>,
        notifier: Arc<RecordingNotifier>,
        queue: Arc<InMemoryQueue>,
        executor: NodeExecutor,
    }

    impl Harness {
        fn new() -> Self {
            // Noon UTC, so default time windows in tests are unambiguous.
            let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap());
            Self::with_clock(clock)
        }

        fn with_clock(clock: FixedClock) -> Self {
            let flows = Arc::new(InMemoryFlowStore::new());
            let contacts = Arc::new(InMemoryContactStore::new());
            let sender = Arc::new(RecordingSender::new());
            let webhooks = Arc::new(RecordingDispatcher::new());
            let notifier = Arc::new(RecordingNotifier::new());
            let queue = Arc::new(InMemoryQueue::new());
            let executor = NodeExecutor::new(
                Arc::clone(&flows) as Arc<dyn FlowStore>,
                Arc::clone(&contacts) as Arc<dyn ContactStore>,
                Arc::clone(&sender) as Arc<dyn MessageSender>,
                Arc::clone(&webhooks) as Arc<dyn WebhookDispatcher>,
                Arc::clone(&notifier) as Arc<dyn Notifier>,
                Arc::clone(&queue) as Arc<dyn ContinuationQueue>,
                Arc::new(clock) as Arc<dyn Clock>,
            );
            Self {
                flows,
                contacts,
                sender,
                webhooks,
                notifier,
                queue,
                executor,
            }
        }

        fn continuation(&self, flow: &Flow, node: &str) -> Continuation {
            Continuation::new(
                ChainId::new(),
                flow.account_id,
                flow.id,
                NodeId::new(node),
                ExecutionContext::new("user-1", "chan-1", "hello"),
            )
        }

        /// Runs queued steps until the chain settles.
        async fn drain(&self) -> StepOutcome {
            let mut last = StepOutcome::Completed;
            while let Some((_, continuation)) = self.queue.pop() {
                last = self.executor.run_step(continuation).await;
            }
            last
        }
    }

    fn trigger(id: &str) -> Node {
        Node::trigger(id, TriggerData::new(TriggerType::InstagramDm))
    }

    fn dm(id: &str, message: &str) -> Node {
        Node::action(
            id,
            ActionConfig::SendDm {
                message: message.to_string(),
            },
        )
    }

    fn linear_flow(account_id: AccountId) -> Flow {
        let mut graph = FlowGraph::new();
        graph.add_node(trigger("entry")).unwrap();
        graph.add_node(dm("first", "Welcome!")).unwrap();
        graph.add_node(dm("second", "Here's a coupon")).unwrap();
        graph.add_edge(Edge::new("e1", "entry", "first")).unwrap();
        graph.add_edge(Edge::new("e2", "first", "second")).unwrap();
        let mut flow = Flow::new(account_id, "Welcome").with_graph(graph);
        flow.activate().unwrap();
        flow
    }

    #[tokio::test]
    async fn linear_chain_runs_to_completion() {
        let h = Harness::new();
        let flow = linear_flow(AccountId::new());
        h.flows.insert(flow.clone());

        let outcome = h
            .executor
            .run_step(h.continuation(&flow, "first"))
            .await;
        assert_eq!(outcome, StepOutcome::Continued);

        let last = h.drain().await;
        assert_eq!(last, StepOutcome::Completed);

        let sent = h.sender.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].text, "Welcome!");
        assert_eq!(sent[1].text, "Here's a coupon");

        let stats = h.flows.stats(flow.id).unwrap();
        assert_eq!(stats.successful_executions, 1);
        assert_eq!(stats.failed_executions, 0);
    }

    #[tokio::test]
    async fn missing_flow_abandons_silently() {
        let h = Harness::new();
        let flow = linear_flow(AccountId::new());
        // Never inserted into the store.
        let outcome = h
            .executor
            .execute(h.continuation(&flow, "first"))
            .await
            .unwrap();
        assert_eq!(outcome, StepOutcome::Abandoned);
    }

    #[tokio::test]
    async fn missing_node_abandons_silently() {
        let h = Harness::new();
        let flow = linear_flow(AccountId::new());
        h.flows.insert(flow.clone());

        let outcome = h
            .executor
            .execute(h.continuation(&flow, "deleted-node"))
            .await
            .unwrap();
        assert_eq!(outcome, StepOutcome::Abandoned);
        assert_eq!(h.flows.stats(flow.id).unwrap().failed_executions, 0);
    }

    #[tokio::test]
    async fn delay_suspends_and_requeues_successor() {
        let h = Harness::new();
        let mut graph = FlowGraph::new();
        graph.add_node(trigger("entry")).unwrap();
        graph
            .add_node(Node::action(
                "wait",
                ActionConfig::Delay {
                    duration: 2,
                    unit: DelayUnit::Hours,
                },
            ))
            .unwrap();
        graph.add_node(dm("followup", "Still there?")).unwrap();
        graph.add_edge(Edge::new("e1", "entry", "wait")).unwrap();
        graph.add_edge(Edge::new("e2", "wait", "followup")).unwrap();
        let mut flow = Flow::new(AccountId::new(), "Follow up").with_graph(graph);
        flow.activate().unwrap();
        h.flows.insert(flow.clone());

        let outcome = h
            .executor
            .run_step(h.continuation(&flow, "wait"))
            .await;
        assert_eq!(outcome, StepOutcome::Suspended);

        let (delay, next) = h.queue.pop().expect("successor queued");
        assert_eq!(delay, Duration::from_secs(2 * 60 * 60));
        assert_eq!(next.node_id, NodeId::new("followup"));

        // Suspension is not an outcome; no counter moved yet.
        let stats = h.flows.stats(flow.id).unwrap();
        assert_eq!(stats.successful_executions, 0);
        assert_eq!(stats.failed_executions, 0);
    }

    #[tokio::test]
    async fn delay_with_no_successor_completes() {
        let h = Harness::new();
        let mut graph = FlowGraph::new();
        graph.add_node(trigger("entry")).unwrap();
        graph
            .add_node(Node::action(
                "wait",
                ActionConfig::Delay {
                    duration: 5,
                    unit: DelayUnit::Minutes,
                },
            ))
            .unwrap();
        graph.add_edge(Edge::new("e1", "entry", "wait")).unwrap();
        let mut flow = Flow::new(AccountId::new(), "Dead delay").with_graph(graph);
        flow.activate().unwrap();
        h.flows.insert(flow.clone());

        let outcome = h.executor.run_step(h.continuation(&flow, "wait")).await;
        assert_eq!(outcome, StepOutcome::Completed);
        assert_eq!(h.flows.stats(flow.id).unwrap().successful_executions, 1);
    }

    fn condition_flow(account_id: AccountId, with_false_edge: bool) -> Flow {
        let mut graph = FlowGraph::new();
        graph.add_node(trigger("entry")).unwrap();
        graph
            .add_node(Node::action(
                "check",
                ActionConfig::Condition {
                    variable: ConditionVariable::MessageText,
                    operator: ConditionOperator::Contains,
                    value: "price".to_string(),
                },
            ))
            .unwrap();
        graph.add_node(dm("yes", "It's $10")).unwrap();
        graph.add_node(dm("no", "How can we help?")).unwrap();
        graph.add_edge(Edge::new("e1", "entry", "check")).unwrap();
        graph
            .add_edge(Edge::branch("e2", "check", "yes", BranchHandle::True))
            .unwrap();
        if with_false_edge {
            graph
                .add_edge(Edge::branch("e3", "check", "no", BranchHandle::False))
                .unwrap();
        }
        let mut flow = Flow::new(account_id, "Price check").with_graph(graph);
        flow.activate().unwrap();
        flow
    }

    #[tokio::test]
    async fn condition_takes_matching_branch() {
        let h = Harness::new();
        let flow = condition_flow(AccountId::new(), true);
        h.flows.insert(flow.clone());

        let mut continuation = h.continuation(&flow, "check");
        continuation.context.message_text = "What's the PRICE?".to_string();
        h.executor.run_step(continuation).await;
        h.drain().await;

        let sent = h.sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, "It's $10");
    }

    #[tokio::test]
    async fn missing_branch_edge_is_silent_dead_end() {
        let h = Harness::new();
        let flow = condition_flow(AccountId::new(), false);
        h.flows.insert(flow.clone());

        // "hello" does not contain "price", so the false branch is taken,
        // and there is no false edge.
        let outcome = h.executor.run_step(h.continuation(&flow, "check")).await;
        assert_eq!(outcome, StepOutcome::DeadEnd);
        assert!(h.queue.is_empty());

        let stats = h.flows.stats(flow.id).unwrap();
        assert_eq!(stats.successful_executions, 0);
        assert_eq!(stats.failed_executions, 0);
    }

    fn branch_only_flow(account_id: AccountId, config: ActionConfig) -> Flow {
        let mut graph = FlowGraph::new();
        graph.add_node(trigger("entry")).unwrap();
        graph.add_node(Node::action("gate", config)).unwrap();
        graph.add_node(dm("yes", "yes path")).unwrap();
        graph.add_node(dm("no", "no path")).unwrap();
        graph.add_edge(Edge::new("e1", "entry", "gate")).unwrap();
        graph
            .add_edge(Edge::branch("e2", "gate", "yes", BranchHandle::True))
            .unwrap();
        graph
            .add_edge(Edge::branch("e3", "gate", "no", BranchHandle::False))
            .unwrap();
        let mut flow = Flow::new(account_id, "Gate").with_graph(graph);
        flow.activate().unwrap();
        flow
    }

    #[tokio::test]
    async fn randomizer_extremes_are_deterministic() {
        let h = Harness::new();
        let always = branch_only_flow(
            AccountId::new(),
            ActionConfig::Randomizer { percentage: 100.0 },
        );
        h.flows.insert(always.clone());
        h.executor.run_step(h.continuation(&always, "gate")).await;
        h.drain().await;
        assert_eq!(h.sender.sent().last().unwrap().text, "yes path");

        let never = branch_only_flow(
            AccountId::new(),
            ActionConfig::Randomizer { percentage: 0.0 },
        );
        h.flows.insert(never.clone());
        h.executor.run_step(h.continuation(&never, "gate")).await;
        h.drain().await;
        // A draw in [0, 100) is never below 0.
        assert_eq!(h.sender.sent().last().unwrap().text, "no path");
    }

    #[tokio::test]
    async fn time_window_wraps_midnight() {
        // 23:30 is inside a 22:00-02:00 window.
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 10, 23, 30, 0).unwrap());
        let h = Harness::with_clock(clock);
        let flow = branch_only_flow(
            AccountId::new(),
            ActionConfig::TimeWindow {
                start_time: "22:00".to_string(),
                end_time: "02:00".to_string(),
            },
        );
        h.flows.insert(flow.clone());
        h.executor.run_step(h.continuation(&flow, "gate")).await;
        h.drain().await;
        assert_eq!(h.sender.sent().last().unwrap().text, "yes path");
    }

    #[tokio::test]
    async fn malformed_time_window_takes_false_branch() {
        let h = Harness::new();
        let flow = branch_only_flow(
            AccountId::new(),
            ActionConfig::TimeWindow {
                start_time: "9am".to_string(),
                end_time: "17:00".to_string(),
            },
        );
        h.flows.insert(flow.clone());
        h.executor.run_step(h.continuation(&flow, "gate")).await;
        h.drain().await;
        assert_eq!(h.sender.sent().last().unwrap().text, "no path");
    }

    #[tokio::test]
    async fn sentiment_branch_matches_target() {
        let h = Harness::new();
        let flow = branch_only_flow(
            AccountId::new(),
            ActionConfig::Sentiment {
                target_sentiment: SentimentClass::Negative,
            },
        );
        h.flows.insert(flow.clone());

        let mut continuation = h.continuation(&flow, "gate");
        continuation.context.message_text = "this is terrible, I want a refund".to_string();
        h.executor.run_step(continuation).await;
        h.drain().await;
        assert_eq!(h.sender.sent().last().unwrap().text, "yes path");
    }

    #[tokio::test]
    async fn add_tag_is_idempotent_and_skips_unknown_contacts() {
        let h = Harness::new();
        let account_id = AccountId::new();
        let mut graph = FlowGraph::new();
        graph.add_node(trigger("entry")).unwrap();
        graph
            .add_node(Node::action(
                "tag",
                ActionConfig::AddTag {
                    tag: "lead".to_string(),
                },
            ))
            .unwrap();
        graph.add_edge(Edge::new("e1", "entry", "tag")).unwrap();
        let mut flow = Flow::new(account_id, "Tagger").with_graph(graph);
        flow.activate().unwrap();
        h.flows.insert(flow.clone());

        // No contact record yet: skips silently and still completes.
        let outcome = h.executor.run_step(h.continuation(&flow, "tag")).await;
        assert_eq!(outcome, StepOutcome::Completed);

        let mut contact = Contact::new(account_id, "user-1");
        contact.tags.push("lead".to_string());
        let contact_id = contact.id;
        h.contacts.insert(contact);

        // Tag already present: no duplicate.
        h.executor.run_step(h.continuation(&flow, "tag")).await;
        let tags = h.contacts.get(contact_id).unwrap().tags;
        assert_eq!(tags, vec!["lead"]);
    }

    #[tokio::test]
    async fn webhook_substitutes_context_tokens() {
        let h = Harness::new();
        let mut graph = FlowGraph::new();
        graph.add_node(trigger("entry")).unwrap();
        graph
            .add_node(Node::action(
                "hook",
                ActionConfig::Webhook {
                    url: "https://example.com/hooks/new-lead".to_string(),
                    method: HttpMethod::Post,
                    body: r#"{"user":"{{user_id}}","text":"{{message}}","name":"{{name}}"}"#
                        .to_string(),
                },
            ))
            .unwrap();
        graph.add_edge(Edge::new("e1", "entry", "hook")).unwrap();
        let mut flow = Flow::new(AccountId::new(), "Hook").with_graph(graph);
        flow.activate().unwrap();
        h.flows.insert(flow.clone());

        let mut continuation = h.continuation(&flow, "hook");
        continuation.context.sender_name = Some("Sam".to_string());
        h.executor.run_step(continuation).await;

        let calls = h.webhooks.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, HttpMethod::Post);
        assert_eq!(
            calls[0].body,
            r#"{"user":"user-1","text":"hello","name":"Sam"}"#
        );
    }

    #[tokio::test]
    async fn notify_reaches_the_notifier() {
        let h = Harness::new();
        let mut graph = FlowGraph::new();
        graph.add_node(trigger("entry")).unwrap();
        graph
            .add_node(Node::action(
                "alert",
                ActionConfig::Notify {
                    email: "owner@example.com".to_string(),
                    message: "Hot lead waiting".to_string(),
                },
            ))
            .unwrap();
        graph.add_edge(Edge::new("e1", "entry", "alert")).unwrap();
        let mut flow = Flow::new(AccountId::new(), "Alert").with_graph(graph);
        flow.activate().unwrap();
        h.flows.insert(flow.clone());

        h.executor.run_step(h.continuation(&flow, "alert")).await;

        let notifications = h.notifier.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].email, "owner@example.com");
    }

    #[tokio::test]
    async fn missing_integration_fails_the_step() {
        let h = Harness::new();
        let flow = linear_flow(AccountId::new());
        h.flows.insert(flow.clone());
        h.sender
            .fail_with(crate::delivery::DeliveryError::NoActiveIntegration);

        let outcome = h.executor.run_step(h.continuation(&flow, "first")).await;
        assert_eq!(outcome, StepOutcome::Failed);
        assert!(h.queue.is_empty());

        let stats = h.flows.stats(flow.id).unwrap();
        assert_eq!(stats.failed_executions, 1);
        assert_eq!(stats.successful_executions, 0);
    }

    #[tokio::test]
    async fn transient_delivery_failure_continues_chain() {
        let h = Harness::new();
        let flow = linear_flow(AccountId::new());
        h.flows.insert(flow.clone());
        h.sender.fail_with(crate::delivery::DeliveryError::Unreachable {
            message: "timed out".to_string(),
        });

        h.executor.run_step(h.continuation(&flow, "first")).await;
        let last = h.drain().await;
        assert_eq!(last, StepOutcome::Completed);

        let stats = h.flows.stats(flow.id).unwrap();
        assert_eq!(stats.successful_executions, 1);
        assert_eq!(stats.failed_executions, 0);
    }

    #[tokio::test]
    async fn trigger_node_passes_through_without_success() {
        let h = Harness::new();
        let mut graph = FlowGraph::new();
        graph.add_node(trigger("entry")).unwrap();
        let mut flow = Flow::new(AccountId::new(), "Bare trigger");
        flow.graph = graph;
        flow.status = chatflow_flow::FlowStatus::Active;
        h.flows.insert(flow.clone());

        let outcome = h
            .executor
            .execute(h.continuation(&flow, "entry"))
            .await
            .unwrap();
        assert_eq!(outcome, StepOutcome::Completed);
        assert_eq!(h.flows.stats(flow.id).unwrap().successful_executions, 0);
    }

    #[tokio::test]
    async fn comment_event_runs_whole_chain_end_to_end() {
        let h = Harness::new();
        let account_id = AccountId::new();

        let mut graph = FlowGraph::new();
        graph
            .add_node(Node::trigger(
                "entry",
                TriggerData::new(TriggerType::InstagramComment),
            ))
            .unwrap();
        graph.add_node(dm("greet", "Hello!")).unwrap();
        graph.add_edge(Edge::new("e1", "entry", "greet")).unwrap();
        let mut flow = Flow::new(account_id, "Comment reply").with_graph(graph);
        flow.activate().unwrap();
        h.flows.insert(flow.clone());

        let matcher = crate::matcher::TriggerMatcher::new(
            Arc::clone(&h.flows) as Arc<dyn FlowStore>,
            Arc::clone(&h.queue) as Arc<dyn ContinuationQueue>,
        );
        let event = crate::event::InboundEvent::new(
            account_id,
            TriggerType::InstagramComment,
            ExecutionContext::new("user-1", "chan-1", "nice post!"),
        );

        let started = matcher.handle_event(&event).await.unwrap();
        assert_eq!(started, 1);
        h.drain().await;

        let sent = h.sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, "Hello!");

        let stats = h.flows.stats(flow.id).unwrap();
        assert_eq!(stats.total_executions, 1);
        assert_eq!(stats.successful_executions, 1);
        assert_eq!(stats.failed_executions, 0);
    }

    #[tokio::test]
    async fn pausing_a_flow_does_not_retract_scheduled_steps() {
        let h = Harness::new();
        let mut flow = linear_flow(AccountId::new());
        h.flows.insert(flow.clone());

        let continuation = h.continuation(&flow, "first");

        // Pause after the step was already queued.
        flow.pause();
        h.flows.insert(flow.clone());

        h.executor.run_step(continuation).await;
        h.drain().await;

        assert_eq!(h.sender.sent().len(), 2);
        assert_eq!(h.flows.stats(flow.id).unwrap().successful_executions, 1);
    }

    #[test]
    fn time_window_parsing() {
        assert!(in_time_window(12 * 60, "09:00", "17:00"));
        assert!(!in_time_window(8 * 60, "09:00", "17:00"));
        // Inclusive bounds.
        assert!(in_time_window(9 * 60, "09:00", "17:00"));
        assert!(in_time_window(17 * 60, "09:00", "17:00"));
        // Wrapping.
        assert!(in_time_window(1 * 60, "22:00", "02:00"));
        assert!(!in_time_window(12 * 60, "22:00", "02:00"));
        // Malformed.
        assert!(!in_time_window(12 * 60, "noon", "17:00"));
        assert!(!in_time_window(12 * 60, "25:00", "17:00"));
    }
}
