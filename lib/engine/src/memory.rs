//! In-memory implementations of the engine's boundary traits.
//!
//! Used by tests across the workspace to drive chains without Postgres,
//! NATS, or a delivery service. The recording doubles capture what the
//! executor asked them to do.

use crate::clock::Clock;
use crate::delivery::{
    AdminNotification, DeliveryError, MessageSender, Notifier, OutboundMessage, WebhookCall,
    WebhookDispatcher,
};
use crate::stores::{Contact, ContactStore, FlowStore, StoreError};
use async_trait::async_trait;
use chatflow_core::{AccountId, ContactId, FlowId};
use chatflow_flow::{Flow, FlowStats};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory flow store.
#[derive(Debug, Default)]
pub struct InMemoryFlowStore {
    flows: Mutex<HashMap<FlowId, Flow>>,
}

impl InMemoryFlowStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, flow: Flow) {
        self.flows.lock().expect("flows lock").insert(flow.id, flow);
    }

    pub fn remove(&self, flow_id: FlowId) {
        self.flows.lock().expect("flows lock").remove(&flow_id);
    }

    /// Current counters for a flow.
    pub fn stats(&self, flow_id: FlowId) -> Option<FlowStats> {
        self.flows
            .lock()
            .expect("flows lock")
            .get(&flow_id)
            .map(|flow| flow.stats)
    }

    fn update_stats(&self, flow_id: FlowId, update: impl FnOnce(&mut FlowStats)) {
        if let Some(flow) = self.flows.lock().expect("flows lock").get_mut(&flow_id) {
            update(&mut flow.stats);
        }
    }
}

#[async_trait]
impl FlowStore for InMemoryFlowStore {
    async fn get(&self, flow_id: FlowId) -> Result<Option<Flow>, StoreError> {
        Ok(self.flows.lock().expect("flows lock").get(&flow_id).cloned())
    }

    async fn list_active(&self, account_id: AccountId) -> Result<Vec<Flow>, StoreError> {
        Ok(self
            .flows
            .lock()
            .expect("flows lock")
            .values()
            .filter(|flow| flow.account_id == account_id && flow.is_active())
            .cloned()
            .collect())
    }

    async fn record_trigger(&self, flow_id: FlowId) -> Result<(), StoreError> {
        self.update_stats(flow_id, |stats| stats.total_executions += 1);
        Ok(())
    }

    async fn record_success(&self, flow_id: FlowId) -> Result<(), StoreError> {
        self.update_stats(flow_id, |stats| stats.successful_executions += 1);
        Ok(())
    }

    async fn record_failure(&self, flow_id: FlowId) -> Result<(), StoreError> {
        self.update_stats(flow_id, |stats| stats.failed_executions += 1);
        Ok(())
    }
}

/// In-memory contact store.
#[derive(Debug, Default)]
pub struct InMemoryContactStore {
    contacts: Mutex<HashMap<ContactId, Contact>>,
}

impl InMemoryContactStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, contact: Contact) {
        self.contacts
            .lock()
            .expect("contacts lock")
            .insert(contact.id, contact);
    }

    pub fn get(&self, contact_id: ContactId) -> Option<Contact> {
        self.contacts
            .lock()
            .expect("contacts lock")
            .get(&contact_id)
            .cloned()
    }
}

#[async_trait]
impl ContactStore for InMemoryContactStore {
    async fn find_by_platform_user(
        &self,
        account_id: AccountId,
        platform_user_id: &str,
    ) -> Result<Option<Contact>, StoreError> {
        Ok(self
            .contacts
            .lock()
            .expect("contacts lock")
            .values()
            .find(|contact| {
                contact.account_id == account_id && contact.platform_user_id == platform_user_id
            })
            .cloned())
    }

    async fn add_tag(&self, contact_id: ContactId, tag: &str) -> Result<(), StoreError> {
        let mut contacts = self.contacts.lock().expect("contacts lock");
        let contact = contacts
            .get_mut(&contact_id)
            .ok_or_else(|| StoreError::NotFound {
                what: format!("contact {contact_id}"),
            })?;
        if !contact.tags.iter().any(|t| t == tag) {
            contact.tags.push(tag.to_string());
            contact.updated_at = Utc::now();
        }
        Ok(())
    }
}

/// Message sender that records sends and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<OutboundMessage>>,
    failure: Mutex<Option<DeliveryError>>,
}

impl RecordingSender {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent send return this error.
    pub fn fail_with(&self, error: DeliveryError) {
        *self.failure.lock().expect("failure lock") = Some(error);
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().expect("sent lock").clone()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, message: OutboundMessage) -> Result<(), DeliveryError> {
        if let Some(error) = self.failure.lock().expect("failure lock").clone() {
            return Err(error);
        }
        self.sent.lock().expect("sent lock").push(message);
        Ok(())
    }
}

/// Webhook dispatcher that records calls instead of making them.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    calls: Mutex<Vec<WebhookCall>>,
}

impl RecordingDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<WebhookCall> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl WebhookDispatcher for RecordingDispatcher {
    async fn dispatch(&self, call: WebhookCall) {
        self.calls.lock().expect("calls lock").push(call);
    }
}

/// Notifier that records notifications.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<AdminNotification>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<AdminNotification> {
        self.notifications.lock().expect("notifications lock").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: AdminNotification) {
        self.notifications
            .lock()
            .expect("notifications lock")
            .push(notification);
    }
}

/// Clock pinned to a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    now: DateTime<Utc>,
}

impl FixedClock {
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }
}
