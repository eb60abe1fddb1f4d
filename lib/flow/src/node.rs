//! Flow node types and configurations.
//!
//! Nodes are the building blocks of flows. Each node has:
//! - An id unique within the flow (authored by the graph editor)
//! - A canvas position (presentational only, ignored by execution)
//! - A payload: either trigger data or an action configuration
//!
//! Action configurations form a sum type dispatched by exhaustive pattern
//! matching in the engine; each variant carries its own strongly typed
//! config rather than a free-form payload.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A node identifier, unique within a single flow.
///
/// Node ids are authored by the graph editor (e.g. `"node-3"`), so unlike
/// the platform's entity IDs they are opaque strings rather than ULIDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node id from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The platform event type that can start a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// A comment on one of the account's Instagram posts.
    InstagramComment,
    /// A direct message to the account's Instagram inbox.
    InstagramDm,
    /// The account was mentioned in an Instagram story.
    InstagramStoryMention,
    /// An inbound WhatsApp message.
    WhatsappMessage,
    /// A keyword match on any inbound message.
    Keyword,
}

/// Payload of a trigger (entry) node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerData {
    /// The event type this trigger reacts to.
    pub trigger_type: TriggerType,
    /// Optional keyword filters; when present, at least one keyword must
    /// occur (case-insensitively) in the event's message text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    /// Optional post scoping for comment triggers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
}

impl TriggerData {
    /// Creates trigger data for the given event type with no filters.
    #[must_use]
    pub fn new(trigger_type: TriggerType) -> Self {
        Self {
            trigger_type,
            keywords: None,
            post_id: None,
        }
    }

    /// Adds keyword filters.
    #[must_use]
    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = Some(keywords);
        self
    }
}

/// Time unit for delay actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayUnit {
    Minutes,
    Hours,
    Days,
}

impl DelayUnit {
    /// Converts an amount of this unit into a duration.
    #[must_use]
    pub fn duration(self, amount: u64) -> Duration {
        let seconds = match self {
            Self::Minutes => 60,
            Self::Hours => 60 * 60,
            Self::Days => 24 * 60 * 60,
        };
        Duration::from_secs(amount * seconds)
    }
}

/// Context variable a condition node can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionVariable {
    /// The inbound message text.
    MessageText,
    /// Membership in the sender's tag set.
    UserTag,
    /// The sender's follower count.
    FollowerCount,
    /// Whether the sender follows the account.
    IsFollower,
}

/// Comparison operator for condition nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    Contains,
    StartsWith,
    GreaterThan,
    LessThan,
}

/// Sentiment classes produced by the keyword classifier.
///
/// Priority order when multiple classes match: urgent > negative >
/// positive > neutral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentClass {
    Urgent,
    Negative,
    Positive,
    Neutral,
}

/// HTTP method for webhook actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    /// Returns the method as an HTTP verb string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

/// Configuration for an action node, varying by action type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action_type", rename_all = "snake_case")]
pub enum ActionConfig {
    /// Send a direct message back to the event's sender.
    SendDm {
        /// The message text to send.
        message: String,
    },
    /// Suspend the chain and resume at the successor after a delay.
    Delay {
        /// Amount of time in `unit`s.
        duration: u64,
        /// The time unit.
        unit: DelayUnit,
    },
    /// Branch on a context variable comparison.
    Condition {
        /// The context variable to test.
        variable: ConditionVariable,
        /// The comparison operator.
        operator: ConditionOperator,
        /// The value to compare against.
        value: String,
    },
    /// Branch on whether the current time-of-day falls inside a window.
    TimeWindow {
        /// Window start, "HH:MM".
        start_time: String,
        /// Window end, "HH:MM", inclusive.
        end_time: String,
    },
    /// Branch on a uniform random draw.
    Randomizer {
        /// True-branch probability in percent; a draw in [0, 100) below
        /// this value takes the true branch.
        percentage: f64,
    },
    /// Branch on the message's classified sentiment.
    Sentiment {
        /// The sentiment class the true branch requires.
        target_sentiment: SentimentClass,
    },
    /// Append a tag to the sender's contact record.
    AddTag {
        /// The tag to add (idempotent).
        tag: String,
    },
    /// Send an email-collection prompt; the reply arrives as a later event.
    CollectEmail {
        /// The prompt message to send.
        prompt: String,
    },
    /// Fire-and-forget HTTP call with token substitution in the body.
    Webhook {
        /// Target URL.
        url: String,
        /// HTTP method.
        method: HttpMethod,
        /// Request body template; `{{user_id}}`, `{{message}}` and
        /// `{{name}}` are substituted from the execution context.
        body: String,
    },
    /// Forward an admin-facing notification.
    Notify {
        /// Admin email address.
        email: String,
        /// Notification message.
        message: String,
    },
}

impl ActionConfig {
    /// Returns true for action kinds that select between true/false
    /// successor branches instead of continuing unconditionally.
    #[must_use]
    pub fn is_branching(&self) -> bool {
        matches!(
            self,
            Self::Condition { .. }
                | Self::TimeWindow { .. }
                | Self::Randomizer { .. }
                | Self::Sentiment { .. }
        )
    }

    /// Returns the action kind as a stable snake_case name.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SendDm { .. } => "send_dm",
            Self::Delay { .. } => "delay",
            Self::Condition { .. } => "condition",
            Self::TimeWindow { .. } => "time_window",
            Self::Randomizer { .. } => "randomizer",
            Self::Sentiment { .. } => "sentiment",
            Self::AddTag { .. } => "add_tag",
            Self::CollectEmail { .. } => "collect_email",
            Self::Webhook { .. } => "webhook",
            Self::Notify { .. } => "notify",
        }
    }
}

/// Canvas position of a node in the editor. Presentational only.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Payload of a node, varying by node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeData {
    /// Entry point reacting to a platform event.
    Trigger(TriggerData),
    /// Side-effecting or branching step.
    Action(ActionConfig),
}

impl NodeData {
    /// Returns true if this is a trigger payload.
    #[must_use]
    pub fn is_trigger(&self) -> bool {
        matches!(self, Self::Trigger(_))
    }

    /// Returns the trigger data, if this is a trigger payload.
    #[must_use]
    pub fn as_trigger(&self) -> Option<&TriggerData> {
        match self {
            Self::Trigger(data) => Some(data),
            Self::Action(_) => None,
        }
    }

    /// Returns the action config, if this is an action payload.
    #[must_use]
    pub fn as_action(&self) -> Option<&ActionConfig> {
        match self {
            Self::Action(config) => Some(config),
            Self::Trigger(_) => None,
        }
    }
}

/// A flow node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Identifier unique within the flow.
    pub id: NodeId,
    /// Canvas position (ignored by execution).
    #[serde(default)]
    pub position: Position,
    /// The node payload.
    pub data: NodeData,
}

impl Node {
    /// Creates a trigger node.
    #[must_use]
    pub fn trigger(id: impl Into<NodeId>, data: TriggerData) -> Self {
        Self {
            id: id.into(),
            position: Position::default(),
            data: NodeData::Trigger(data),
        }
    }

    /// Creates an action node.
    #[must_use]
    pub fn action(id: impl Into<NodeId>, config: ActionConfig) -> Self {
        Self {
            id: id.into(),
            position: Position::default(),
            data: NodeData::Action(config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_unit_durations() {
        assert_eq!(DelayUnit::Minutes.duration(2), Duration::from_secs(120));
        assert_eq!(DelayUnit::Hours.duration(1), Duration::from_secs(3600));
        assert_eq!(DelayUnit::Days.duration(1), Duration::from_secs(86_400));
    }

    #[test]
    fn branching_actions() {
        let condition = ActionConfig::Condition {
            variable: ConditionVariable::MessageText,
            operator: ConditionOperator::Contains,
            value: "price".to_string(),
        };
        assert!(condition.is_branching());

        let dm = ActionConfig::SendDm {
            message: "hi".to_string(),
        };
        assert!(!dm.is_branching());
    }

    #[test]
    fn action_serde_tagged_by_type() {
        let node = Node::action(
            "node-1",
            ActionConfig::SendDm {
                message: "Hello!".to_string(),
            },
        );

        let json = serde_json::to_value(&node).expect("serialize");
        assert_eq!(json["data"]["type"], "action");
        assert_eq!(json["data"]["action_type"], "send_dm");
        assert_eq!(json["data"]["message"], "Hello!");

        let parsed: Node = serde_json::from_value(json).expect("deserialize");
        assert_eq!(parsed, node);
    }

    #[test]
    fn trigger_serde_roundtrip() {
        let node = Node::trigger(
            "entry",
            TriggerData::new(TriggerType::InstagramComment)
                .with_keywords(vec!["promo".to_string()]),
        );

        let json = serde_json::to_string(&node).expect("serialize");
        let parsed: Node = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, node);
        assert!(parsed.data.is_trigger());
    }

    #[test]
    fn http_method_uppercase() {
        let json = serde_json::to_string(&HttpMethod::Post).expect("serialize");
        assert_eq!(json, "\"POST\"");
        assert_eq!(HttpMethod::Delete.as_str(), "DELETE");
    }
}
