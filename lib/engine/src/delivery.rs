//! Outbound delivery contracts.
//!
//! Actual message delivery happens in a separate service that owns the
//! platform credentials; the engine talks to it through these traits. The
//! engine never retries a failed send.

use async_trait::async_trait;
use chatflow_core::AccountId;
use chatflow_flow::HttpMethod;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// A direct message to send on behalf of an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub account_id: AccountId,
    /// Platform user to address.
    pub recipient_id: String,
    /// Conversation or thread to reply into.
    pub channel_id: String,
    pub text: String,
}

/// Delivery failures, split by how the engine reacts.
///
/// `NoActiveIntegration` fails the step (the account cannot deliver at
/// all); `Rejected` and `Unreachable` are transient and are logged and
/// swallowed so the chain keeps walking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The account has no connected platform integration.
    NoActiveIntegration,
    /// The platform refused the message.
    Rejected { message: String },
    /// The delivery service did not answer.
    Unreachable { message: String },
}

impl DeliveryError {
    /// Whether the chain should keep walking after this failure.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::NoActiveIntegration)
    }
}

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoActiveIntegration => write!(f, "no active platform integration"),
            Self::Rejected { message } => write!(f, "delivery rejected: {message}"),
            Self::Unreachable { message } => write!(f, "delivery service unreachable: {message}"),
        }
    }
}

impl std::error::Error for DeliveryError {}

/// Sends direct messages through the delivery service.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, message: OutboundMessage) -> Result<(), DeliveryError>;
}

/// An outbound webhook call authored by a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookCall {
    pub url: String,
    pub method: HttpMethod,
    /// Request body after placeholder substitution.
    pub body: String,
}

/// Dispatches webhook calls fire-and-forget.
#[async_trait]
pub trait WebhookDispatcher: Send + Sync {
    /// Dispatches the call without waiting for the response. Failures are
    /// the dispatcher's to log; they never surface to the chain.
    async fn dispatch(&self, call: WebhookCall);
}

/// An alert for the account's human operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminNotification {
    pub account_id: AccountId,
    pub email: String,
    pub message: String,
}

/// Forwards admin notifications to the notification service.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: AdminNotification);
}

/// Webhook dispatcher backed by reqwest.
///
/// Spawns the HTTP call on the runtime so the executor never waits on a
/// third-party endpoint.
pub struct HttpWebhookDispatcher {
    client: Arc<reqwest::Client>,
}

impl HttpWebhookDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: Arc::new(reqwest::Client::new()),
        }
    }
}

impl Default for HttpWebhookDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookDispatcher for HttpWebhookDispatcher {
    async fn dispatch(&self, call: WebhookCall) {
        let client = Arc::clone(&self.client);
        tokio::spawn(async move {
            let method = match call.method {
                HttpMethod::Get => reqwest::Method::GET,
                HttpMethod::Post => reqwest::Method::POST,
                HttpMethod::Put => reqwest::Method::PUT,
                HttpMethod::Delete => reqwest::Method::DELETE,
            };

            let mut request = client.request(method, &call.url);
            if !call.body.is_empty() {
                request = request
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(call.body.clone());
            }

            match request.send().await {
                Ok(response) if !response.status().is_success() => {
                    warn!(url = %call.url, status = %response.status(), "webhook returned error status");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(url = %call.url, error = %e, "webhook dispatch failed");
                }
            }
        });
    }
}
