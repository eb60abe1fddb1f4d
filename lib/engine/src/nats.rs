//! NATS integration.
//!
//! - `NatsContinuationQueue`: JetStream work-queue stream of scheduled
//!   steps. JetStream has no delayed delivery, so each message carries a
//!   `not_before` timestamp and the consumer NAKs with the remaining delay
//!   until the step is due. Delivery is at-least-once.
//! - `NatsMessageSender`: request/reply to the delivery service that owns
//!   the platform credentials.
//! - `NatsNotifier`: fire-and-forget publish to the notification subject.
//! - Consumer loops for scheduled steps and inbound events.

use crate::delivery::{AdminNotification, DeliveryError, MessageSender, Notifier, OutboundMessage};
use crate::event::InboundEvent;
use crate::executor::NodeExecutor;
use crate::matcher::TriggerMatcher;
use crate::queue::{Continuation, ContinuationQueue, QueueError, ScheduledStep};
use async_nats::jetstream;
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Subject for scheduled chain steps.
const STEPS_SUBJECT: &str = "chatflow.steps";

/// Subject for normalized inbound events.
const EVENTS_SUBJECT: &str = "chatflow.events";

/// Request subject of the external delivery service.
const DELIVERY_SUBJECT: &str = "chatflow.delivery.send";

/// Subject for admin notifications.
const NOTIFY_SUBJECT: &str = "chatflow.notify";

/// Stream name for scheduled steps.
const STEPS_STREAM_NAME: &str = "CHATFLOW_STEPS";

/// Stream name for inbound events.
const EVENTS_STREAM_NAME: &str = "CHATFLOW_EVENTS";

/// Default timeout for delivery request/reply.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the NATS-backed engine plumbing.
#[derive(Debug, Clone)]
pub struct NatsConfig {
    /// NATS server URL.
    pub url: String,
    /// Stream name for steps (defaults to CHATFLOW_STEPS).
    pub steps_stream_name: Option<String>,
    /// Stream name for inbound events (defaults to CHATFLOW_EVENTS).
    pub events_stream_name: Option<String>,
    /// Delivery request timeout in seconds (defaults to 5).
    pub delivery_timeout_secs: Option<u64>,
}

impl NatsConfig {
    /// Creates a new config with the given NATS URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            steps_stream_name: None,
            events_stream_name: None,
            delivery_timeout_secs: None,
        }
    }

    fn steps_stream(&self) -> &str {
        self.steps_stream_name.as_deref().unwrap_or(STEPS_STREAM_NAME)
    }

    fn events_stream(&self) -> &str {
        self.events_stream_name
            .as_deref()
            .unwrap_or(EVENTS_STREAM_NAME)
    }

    fn delivery_timeout(&self) -> Duration {
        self.delivery_timeout_secs
            .map_or(DELIVERY_TIMEOUT, Duration::from_secs)
    }
}

/// Errors from NATS setup and consumption.
#[derive(Debug)]
pub enum NatsError {
    /// Connection or stream setup failed.
    ConnectionFailed { message: String },
    /// A consumer could not be created or read from.
    ConsumerFailed { message: String },
}

impl std::fmt::Display for NatsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionFailed { message } => write!(f, "NATS connection failed: {message}"),
            Self::ConsumerFailed { message } => write!(f, "NATS consumer failed: {message}"),
        }
    }
}

impl std::error::Error for NatsError {}

/// Shared NATS handles for the engine.
///
/// Connects once; the queue, sender, notifier, and consumer loops all share
/// the same client.
pub struct NatsEngine {
    client: async_nats::Client,
    jetstream: Arc<jetstream::Context>,
    config: NatsConfig,
}

impl NatsEngine {
    /// Connects to NATS and ensures the streams exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or stream setup fails.
    pub async fn connect(config: NatsConfig) -> Result<Self, NatsError> {
        let client = async_nats::connect(&config.url).await.map_err(|e| {
            NatsError::ConnectionFailed {
                message: e.to_string(),
            }
        })?;

        let jetstream = jetstream::new(client.clone());
        Self::ensure_streams(&jetstream, &config).await?;

        Ok(Self {
            client,
            jetstream: Arc::new(jetstream),
            config,
        })
    }

    async fn ensure_streams(
        jetstream: &jetstream::Context,
        config: &NatsConfig,
    ) -> Result<(), NatsError> {
        let steps_stream_config = jetstream::stream::Config {
            name: config.steps_stream().to_string(),
            subjects: vec![STEPS_SUBJECT.to_string()],
            storage: jetstream::stream::StorageType::File,
            retention: jetstream::stream::RetentionPolicy::WorkQueue,
            ..Default::default()
        };

        jetstream
            .get_or_create_stream(steps_stream_config)
            .await
            .map_err(|e| NatsError::ConnectionFailed {
                message: format!("failed to create steps stream: {e}"),
            })?;

        let events_stream_config = jetstream::stream::Config {
            name: config.events_stream().to_string(),
            subjects: vec![EVENTS_SUBJECT.to_string()],
            storage: jetstream::stream::StorageType::File,
            retention: jetstream::stream::RetentionPolicy::WorkQueue,
            ..Default::default()
        };

        jetstream
            .get_or_create_stream(events_stream_config)
            .await
            .map_err(|e| NatsError::ConnectionFailed {
                message: format!("failed to create events stream: {e}"),
            })?;

        Ok(())
    }

    /// Returns the continuation queue backed by the steps stream.
    #[must_use]
    pub fn continuation_queue(&self) -> NatsContinuationQueue {
        NatsContinuationQueue {
            jetstream: Arc::clone(&self.jetstream),
        }
    }

    /// Returns the message sender backed by the delivery service.
    #[must_use]
    pub fn message_sender(&self) -> NatsMessageSender {
        NatsMessageSender {
            client: self.client.clone(),
            timeout: self.config.delivery_timeout(),
        }
    }

    /// Returns the notifier backed by the notification subject.
    #[must_use]
    pub fn notifier(&self) -> NatsNotifier {
        NatsNotifier {
            client: self.client.clone(),
        }
    }

    /// Consumes scheduled steps forever, driving the executor.
    ///
    /// Steps whose `not_before` is still in the future are NAKed with the
    /// remaining delay. Undecodable messages are acked and dropped, with an
    /// error log; redelivering them cannot help.
    ///
    /// # Errors
    ///
    /// Returns an error if the consumer cannot be set up.
    pub async fn run_step_consumer(&self, executor: Arc<NodeExecutor>) -> Result<(), NatsError> {
        let stream = self
            .jetstream
            .get_stream(self.config.steps_stream())
            .await
            .map_err(|e| NatsError::ConsumerFailed {
                message: format!("failed to get steps stream: {e}"),
            })?;

        let consumer = stream
            .get_or_create_consumer(
                "step-worker",
                jetstream::consumer::pull::Config {
                    durable_name: Some("step-worker".to_string()),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| NatsError::ConsumerFailed {
                message: format!("failed to create step consumer: {e}"),
            })?;

        let mut messages = consumer
            .messages()
            .await
            .map_err(|e| NatsError::ConsumerFailed {
                message: format!("failed to read step messages: {e}"),
            })?;

        while let Some(message) = messages.next().await {
            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = %e, "step message receive failed");
                    continue;
                }
            };

            let step: ScheduledStep = match serde_json::from_slice(&message.payload) {
                Ok(step) => step,
                Err(e) => {
                    error!(error = %e, "undecodable scheduled step, dropping");
                    ack(&message).await;
                    continue;
                }
            };

            if let Some(remaining) = step.remaining_delay(Utc::now()) {
                debug!(
                    chain_id = %step.continuation.chain_id,
                    remaining_secs = remaining.as_secs(),
                    "step not due yet, redelivering later"
                );
                if let Err(e) = message
                    .ack_with(jetstream::AckKind::Nak(Some(remaining)))
                    .await
                {
                    warn!(error = %e, "failed to NAK step");
                }
                continue;
            }

            let outcome = executor.run_step(step.continuation).await;
            debug!(?outcome, "step executed");
            ack(&message).await;
        }

        Ok(())
    }

    /// Consumes inbound events forever, driving the trigger matcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the consumer cannot be set up.
    pub async fn run_event_consumer(&self, matcher: Arc<TriggerMatcher>) -> Result<(), NatsError> {
        let stream = self
            .jetstream
            .get_stream(self.config.events_stream())
            .await
            .map_err(|e| NatsError::ConsumerFailed {
                message: format!("failed to get events stream: {e}"),
            })?;

        let consumer = stream
            .get_or_create_consumer(
                "event-worker",
                jetstream::consumer::pull::Config {
                    durable_name: Some("event-worker".to_string()),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| NatsError::ConsumerFailed {
                message: format!("failed to create event consumer: {e}"),
            })?;

        let mut messages = consumer
            .messages()
            .await
            .map_err(|e| NatsError::ConsumerFailed {
                message: format!("failed to read event messages: {e}"),
            })?;

        while let Some(message) = messages.next().await {
            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = %e, "event message receive failed");
                    continue;
                }
            };

            let event: InboundEvent = match serde_json::from_slice(&message.payload) {
                Ok(event) => event,
                Err(e) => {
                    error!(error = %e, "undecodable inbound event, dropping");
                    ack(&message).await;
                    continue;
                }
            };

            match matcher.handle_event(&event).await {
                Ok(started) => {
                    debug!(account_id = %event.account_id, started, "event handled");
                }
                Err(e) => {
                    // Listing flows failed; redeliver rather than lose the
                    // event.
                    warn!(error = %e, "event handling failed, redelivering");
                    if let Err(nak_err) =
                        message.ack_with(jetstream::AckKind::Nak(None)).await
                    {
                        warn!(error = %nak_err, "failed to NAK event");
                    }
                    continue;
                }
            }

            ack(&message).await;
        }

        Ok(())
    }
}

async fn ack(message: &jetstream::Message) {
    if let Err(e) = message.ack().await {
        warn!(error = %e, "failed to ack message");
    }
}

/// Continuation queue backed by the steps stream.
pub struct NatsContinuationQueue {
    jetstream: Arc<jetstream::Context>,
}

#[async_trait]
impl ContinuationQueue for NatsContinuationQueue {
    async fn enqueue(&self, delay: Duration, continuation: Continuation) -> Result<(), QueueError> {
        let not_before = Utc::now()
            + chrono::Duration::from_std(delay).map_err(|e| QueueError::PublishFailed {
                message: format!("delay out of range: {e}"),
            })?;
        let step = ScheduledStep::new(not_before, continuation);
        let bytes = serde_json::to_vec(&step).map_err(|e| QueueError::PublishFailed {
            message: format!("failed to serialize step: {e}"),
        })?;

        self.jetstream
            .publish(STEPS_SUBJECT, bytes.into())
            .await
            .map_err(|e| QueueError::PublishFailed {
                message: e.to_string(),
            })?
            .await
            .map_err(|e| QueueError::PublishFailed {
                message: e.to_string(),
            })?;

        Ok(())
    }
}

/// Reply shape of the delivery service.
#[derive(Debug, Deserialize)]
struct DeliveryReceipt {
    status: DeliveryStatus,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum DeliveryStatus {
    Ok,
    NoIntegration,
    Rejected,
}

/// Message sender that forwards to the delivery service over request/reply.
pub struct NatsMessageSender {
    client: async_nats::Client,
    timeout: Duration,
}

#[async_trait]
impl MessageSender for NatsMessageSender {
    async fn send(&self, message: OutboundMessage) -> Result<(), DeliveryError> {
        let bytes = serde_json::to_vec(&message).map_err(|e| DeliveryError::Rejected {
            message: format!("failed to serialize message: {e}"),
        })?;

        let reply = tokio::time::timeout(
            self.timeout,
            self.client.request(DELIVERY_SUBJECT, bytes.into()),
        )
        .await
        .map_err(|_| DeliveryError::Unreachable {
            message: format!("no reply within {}s", self.timeout.as_secs()),
        })?
        .map_err(|e| DeliveryError::Unreachable {
            message: e.to_string(),
        })?;

        let receipt: DeliveryReceipt =
            serde_json::from_slice(&reply.payload).map_err(|e| DeliveryError::Rejected {
                message: format!("undecodable delivery receipt: {e}"),
            })?;

        match receipt.status {
            DeliveryStatus::Ok => Ok(()),
            DeliveryStatus::NoIntegration => Err(DeliveryError::NoActiveIntegration),
            DeliveryStatus::Rejected => Err(DeliveryError::Rejected {
                message: receipt.message.unwrap_or_default(),
            }),
        }
    }
}

/// Notifier that publishes to the notification subject.
pub struct NatsNotifier {
    client: async_nats::Client,
}

#[async_trait]
impl Notifier for NatsNotifier {
    async fn notify(&self, notification: AdminNotification) {
        let bytes = match serde_json::to_vec(&notification) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "failed to serialize notification");
                return;
            }
        };

        if let Err(e) = self.client.publish(NOTIFY_SUBJECT, bytes.into()).await {
            warn!(error = %e, "failed to publish notification");
        }
    }
}
