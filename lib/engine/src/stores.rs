//! Persistence contracts the engine depends on.
//!
//! The engine only needs a narrow slice of storage: flow lookup for the
//! executor, active-flow listing for the matcher, counter increments, and
//! contact tag updates. The Postgres implementations live in the store
//! crate; tests use the in-memory doubles from [`crate::memory`].

use async_trait::async_trait;
use chatflow_core::{AccountId, ContactId, FlowId};
use chatflow_flow::Flow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Errors from store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The referenced record does not exist.
    NotFound { what: String },
    /// The storage backend failed.
    Backend { message: String },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { what } => write!(f, "not found: {what}"),
            Self::Backend { message } => write!(f, "storage backend error: {message}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Flow persistence as seen by the engine.
#[async_trait]
pub trait FlowStore: Send + Sync {
    /// Loads a flow by id. `None` when it no longer exists.
    async fn get(&self, flow_id: FlowId) -> Result<Option<Flow>, StoreError>;

    /// Lists an account's active flows.
    async fn list_active(&self, account_id: AccountId) -> Result<Vec<Flow>, StoreError>;

    /// Increments `total_executions`.
    async fn record_trigger(&self, flow_id: FlowId) -> Result<(), StoreError>;

    /// Increments `successful_executions`.
    async fn record_success(&self, flow_id: FlowId) -> Result<(), StoreError>;

    /// Increments `failed_executions`.
    async fn record_failure(&self, flow_id: FlowId) -> Result<(), StoreError>;
}

/// A known platform user belonging to an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub account_id: AccountId,
    /// The user's id on the messaging platform.
    pub platform_user_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    /// Creates a new contact with no tags.
    #[must_use]
    pub fn new(account_id: AccountId, platform_user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ContactId::new(),
            account_id,
            platform_user_id: platform_user_id.into(),
            name: None,
            email: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Contact persistence as seen by the engine.
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Looks up a contact by account and platform user id.
    async fn find_by_platform_user(
        &self,
        account_id: AccountId,
        platform_user_id: &str,
    ) -> Result<Option<Contact>, StoreError>;

    /// Appends a tag to a contact. Idempotent: adding an existing tag is a
    /// no-op.
    async fn add_tag(&self, contact_id: ContactId, tag: &str) -> Result<(), StoreError>;
}
