//! Keyword-based sentiment classification.
//!
//! Classifies message text into one of four classes by scanning for
//! indicator keywords. Precedence when several classes match:
//! urgent, then negative, then positive. Anything else is neutral.

use chatflow_flow::SentimentClass;

const URGENT_KEYWORDS: &[&str] = &["urgent", "asap", "emergency", "immediately", "right now"];

const NEGATIVE_KEYWORDS: &[&str] = &[
    "angry",
    "terrible",
    "awful",
    "refund",
    "complaint",
    "disappointed",
    "worst",
    "hate",
    "broken",
];

const POSITIVE_KEYWORDS: &[&str] = &[
    "love",
    "great",
    "awesome",
    "thanks",
    "thank you",
    "amazing",
    "perfect",
    "excellent",
];

/// Classifies message text by keyword lookup.
#[must_use]
pub fn classify(text: &str) -> SentimentClass {
    let text = text.to_lowercase();

    if contains_any(&text, URGENT_KEYWORDS) {
        SentimentClass::Urgent
    } else if contains_any(&text, NEGATIVE_KEYWORDS) {
        SentimentClass::Negative
    } else if contains_any(&text, POSITIVE_KEYWORDS) {
        SentimentClass::Positive
    } else {
        SentimentClass::Neutral
    }
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| text.contains(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_urgent() {
        assert_eq!(classify("I need this fixed ASAP"), SentimentClass::Urgent);
    }

    #[test]
    fn classifies_negative() {
        assert_eq!(classify("I want a refund now"), SentimentClass::Negative);
    }

    #[test]
    fn classifies_positive() {
        assert_eq!(classify("Thanks, this is great!"), SentimentClass::Positive);
    }

    #[test]
    fn defaults_to_neutral() {
        assert_eq!(classify("when do you open tomorrow"), SentimentClass::Neutral);
    }

    #[test]
    fn urgent_wins_over_negative() {
        assert_eq!(
            classify("urgent: this is terrible"),
            SentimentClass::Urgent
        );
    }
}
