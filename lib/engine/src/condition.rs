//! Condition evaluation.
//!
//! A condition node compares a variable from the execution context against
//! a user-authored value. Evaluation never fails: anything malformed or
//! missing simply evaluates to false and the chain takes the false branch.
//!
//! String comparisons are case-insensitive; users typing "Price" expect to
//! match "price". Numeric operators parse both sides as numbers and return
//! false when either side does not parse.

use crate::context::ExecutionContext;
use chatflow_flow::{ConditionOperator, ConditionVariable};

/// Evaluates a condition against the execution context.
#[must_use]
pub fn evaluate(
    variable: ConditionVariable,
    operator: ConditionOperator,
    value: &str,
    context: &ExecutionContext,
) -> bool {
    match variable {
        ConditionVariable::MessageText => {
            compare_text(&context.message_text, operator, value)
        }
        // A tag condition holds when any of the contact's tags matches.
        ConditionVariable::UserTag => context
            .tags
            .iter()
            .any(|tag| compare_text(tag, operator, value)),
        ConditionVariable::FollowerCount => {
            let Some(count) = context.follower_count else {
                return false;
            };
            compare_number(count as f64, operator, value)
        }
        ConditionVariable::IsFollower => {
            let Some(is_follower) = context.is_follower else {
                return false;
            };
            let subject = if is_follower { "true" } else { "false" };
            compare_text(subject, operator, value)
        }
    }
}

fn compare_text(subject: &str, operator: ConditionOperator, value: &str) -> bool {
    let subject = subject.to_lowercase();
    let value = value.to_lowercase();
    match operator {
        ConditionOperator::Equals => subject == value,
        ConditionOperator::Contains => subject.contains(&value),
        ConditionOperator::StartsWith => subject.starts_with(&value),
        ConditionOperator::GreaterThan | ConditionOperator::LessThan => {
            let Ok(lhs) = subject.trim().parse::<f64>() else {
                return false;
            };
            compare_number(lhs, operator, &value)
        }
    }
}

fn compare_number(subject: f64, operator: ConditionOperator, value: &str) -> bool {
    let Ok(rhs) = value.trim().parse::<f64>() else {
        return false;
    };
    match operator {
        ConditionOperator::Equals => subject == rhs,
        ConditionOperator::GreaterThan => subject > rhs,
        ConditionOperator::LessThan => subject < rhs,
        // Substring operators are meaningless for numbers.
        ConditionOperator::Contains | ConditionOperator::StartsWith => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_with_text(text: &str) -> ExecutionContext {
        ExecutionContext::new("user-1", "chan-1", text)
    }

    #[test]
    fn message_text_contains_is_case_insensitive() {
        let ctx = context_with_text("What's the PRICE of this?");
        assert!(evaluate(
            ConditionVariable::MessageText,
            ConditionOperator::Contains,
            "price",
            &ctx
        ));
        assert!(!evaluate(
            ConditionVariable::MessageText,
            ConditionOperator::Contains,
            "refund",
            &ctx
        ));
    }

    #[test]
    fn message_text_starts_with() {
        let ctx = context_with_text("Hello there");
        assert!(evaluate(
            ConditionVariable::MessageText,
            ConditionOperator::StartsWith,
            "hello",
            &ctx
        ));
    }

    #[test]
    fn user_tag_matches_any_tag() {
        let mut ctx = context_with_text("hi");
        ctx.tags = vec!["vip".to_string(), "lead".to_string()];
        assert!(evaluate(
            ConditionVariable::UserTag,
            ConditionOperator::Equals,
            "VIP",
            &ctx
        ));
        assert!(!evaluate(
            ConditionVariable::UserTag,
            ConditionOperator::Equals,
            "churned",
            &ctx
        ));
    }

    #[test]
    fn follower_count_numeric_comparison() {
        let ctx = context_with_text("hi").with_follower_info(true, 1500);
        assert!(evaluate(
            ConditionVariable::FollowerCount,
            ConditionOperator::GreaterThan,
            "1000",
            &ctx
        ));
        assert!(!evaluate(
            ConditionVariable::FollowerCount,
            ConditionOperator::LessThan,
            "1000",
            &ctx
        ));
    }

    #[test]
    fn follower_count_missing_is_false() {
        let ctx = context_with_text("hi");
        assert!(!evaluate(
            ConditionVariable::FollowerCount,
            ConditionOperator::GreaterThan,
            "0",
            &ctx
        ));
    }

    #[test]
    fn non_numeric_value_is_false() {
        let ctx = context_with_text("hi").with_follower_info(true, 10);
        assert!(!evaluate(
            ConditionVariable::FollowerCount,
            ConditionOperator::GreaterThan,
            "lots",
            &ctx
        ));
    }

    #[test]
    fn is_follower_compares_as_boolean_text() {
        let ctx = context_with_text("hi").with_follower_info(true, 10);
        assert!(evaluate(
            ConditionVariable::IsFollower,
            ConditionOperator::Equals,
            "true",
            &ctx
        ));
        assert!(!evaluate(
            ConditionVariable::IsFollower,
            ConditionOperator::Equals,
            "false",
            &ctx
        ));
    }
}
