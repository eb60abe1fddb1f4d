//! Chain execution engine for the chatflow automation platform.
//!
//! An inbound event flows through the engine in two stages:
//!
//! 1. The [`matcher::TriggerMatcher`] finds the account's active flows
//!    whose trigger accepts the event and starts one chain per match.
//! 2. The [`executor::NodeExecutor`] walks the flow graph one node at a
//!    time; every hop goes back through the durable
//!    [`queue::ContinuationQueue`], so chains survive restarts and delays
//!    of days cost no resident state.
//!
//! Outbound effects (DMs, webhooks, notifications) go through the traits
//! in [`delivery`]; persistence goes through the traits in [`stores`].
//! Production wiring is NATS and Postgres, tests use [`memory`].

pub mod clock;
pub mod condition;
pub mod context;
pub mod delivery;
pub mod error;
pub mod event;
pub mod executor;
pub mod matcher;
pub mod memory;
pub mod nats;
pub mod queue;
pub mod sentiment;
pub mod stores;

pub use clock::{Clock, SystemClock};
pub use context::ExecutionContext;
pub use delivery::{
    AdminNotification, DeliveryError, HttpWebhookDispatcher, MessageSender, Notifier,
    OutboundMessage, WebhookCall, WebhookDispatcher,
};
pub use error::EngineError;
pub use event::InboundEvent;
pub use executor::{NodeExecutor, StepOutcome};
pub use matcher::TriggerMatcher;
pub use queue::{Continuation, ContinuationQueue, QueueError, ScheduledStep};
pub use stores::{Contact, ContactStore, FlowStore, StoreError};
