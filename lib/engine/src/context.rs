//! Execution context carried through a chain.
//!
//! The context is a snapshot of the inbound event captured at trigger time.
//! It travels inside every continuation, so a chain resumed days later by a
//! delay node still sees the original message and sender.

use serde::{Deserialize, Serialize};

/// Snapshot of the inbound event driving a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Platform-scoped id of the message sender.
    pub sender_id: String,
    /// Display name of the sender, when the platform provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    /// Conversation or thread the reply should go to.
    pub channel_id: String,
    /// Text of the comment, DM, or message.
    pub message_text: String,
    /// Tags already attached to the contact at trigger time.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whether the sender follows the account, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_follower: Option<bool>,
    /// Sender's follower count, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follower_count: Option<u64>,
    /// The post a comment was left on, for comment triggers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
}

impl ExecutionContext {
    /// Creates a context with the required fields; optional platform
    /// metadata starts empty.
    #[must_use]
    pub fn new(
        sender_id: impl Into<String>,
        channel_id: impl Into<String>,
        message_text: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            sender_name: None,
            channel_id: channel_id.into(),
            message_text: message_text.into(),
            tags: Vec::new(),
            is_follower: None,
            follower_count: None,
            post_id: None,
        }
    }

    /// Sets the sender's display name.
    #[must_use]
    pub fn with_sender_name(mut self, name: impl Into<String>) -> Self {
        self.sender_name = Some(name.into());
        self
    }

    /// Sets follower metadata.
    #[must_use]
    pub fn with_follower_info(mut self, is_follower: bool, follower_count: u64) -> Self {
        self.is_follower = Some(is_follower);
        self.follower_count = Some(follower_count);
        self
    }

    /// Sets the post the event originated from.
    #[must_use]
    pub fn with_post_id(mut self, post_id: impl Into<String>) -> Self {
        self.post_id = Some(post_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_serde_omits_empty_optionals() {
        let ctx = ExecutionContext::new("user-1", "chan-1", "hello");
        let json = serde_json::to_value(&ctx).expect("serialize");
        assert!(json.get("sender_name").is_none());
        assert!(json.get("follower_count").is_none());
    }

    #[test]
    fn context_roundtrip() {
        let ctx = ExecutionContext::new("user-1", "chan-1", "what's the price?")
            .with_sender_name("Sam")
            .with_follower_info(true, 1200)
            .with_post_id("post-9");
        let json = serde_json::to_string(&ctx).expect("serialize");
        let parsed: ExecutionContext = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(ctx, parsed);
    }
}
