//! Shared types for the routing pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ── Priority ────────────────────────────────────────────────────────

/// Message priority as decided by the classifier.
///
/// Ordered most urgent first, so sorting ascending puts `Urgent` on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Urgent,
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Self::Urgent, Self::High, Self::Normal, Self::Low];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Urgent => "urgent",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }

    /// Lenient parse used on classifier output: anything unrecognized is `Normal`.
    pub fn coerce(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    /// Whether this priority warrants the mailbox "important" marker.
    pub const fn is_elevated(&self) -> bool {
        matches!(self, Self::Urgent | Self::High)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strict parse, used for configuration where unknown values are errors.
impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "urgent" => Ok(Self::Urgent),
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            "low" => Ok(Self::Low),
            other => Err(format!(
                "unknown priority '{other}' (expected urgent, high, normal or low)"
            )),
        }
    }
}

/// Lenient: any string is coerced, and null, numbers or other shapes become `Normal`.
impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
            Some(serde_json::Value::String(raw)) => Self::coerce(&raw),
            _ => Self::Normal,
        })
    }
}

// ── Classification ──────────────────────────────────────────────────

/// Structured output of the classifier for one message.
///
/// The first category is the primary one; it is the one credited in
/// category statistics and whose calendar policy decides reminders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub project_names: Vec<String>,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub action_items: Vec<String>,
    #[serde(default, alias = "spam")]
    pub is_spam: bool,
    #[serde(default, alias = "sales_pitch")]
    pub is_sales_pitch: bool,
    #[serde(default, alias = "alert")]
    pub is_alert: bool,
}

impl ClassificationResult {
    /// Primary category, if the classifier produced any.
    pub fn primary_category(&self) -> Option<&str> {
        self.categories.first().map(String::as_str)
    }

    /// Lowercase and trim category names, dropping empties and repeats.
    pub fn normalized(mut self) -> Self {
        let mut seen = Vec::with_capacity(self.categories.len());
        for category in self.categories.drain(..) {
            let name = category.trim().to_lowercase();
            if !name.is_empty() && !seen.contains(&name) {
                seen.push(name);
            }
        }
        self.categories = seen;
        self
    }
}

// ── Routing ─────────────────────────────────────────────────────────

/// One forward destination for a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTarget {
    pub address: String,
    pub priority: Priority,
}

impl RoutingTarget {
    pub fn new(address: impl Into<String>, priority: Priority) -> Self {
        Self {
            address: address.into(),
            priority,
        }
    }
}

// ── Messages ────────────────────────────────────────────────────────

/// Lightweight handle returned by `Mailbox::list_unread`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub id: String,
}

/// A fetched mailbox message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default = "default_sender")]
    pub sender: String,
    #[serde(default = "default_subject")]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    /// When the message was received, if the backend knows.
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
}

fn default_sender() -> String {
    "Unknown".to_string()
}

fn default_subject() -> String {
    "No Subject".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_strict_parse() {
        assert_eq!("URGENT".parse::<Priority>(), Ok(Priority::Urgent));
        assert_eq!(" low ".parse::<Priority>(), Ok(Priority::Low));
        assert!("important".parse::<Priority>().is_err());
    }

    #[test]
    fn priority_coerces_unknown_to_normal() {
        assert_eq!(Priority::coerce("critical"), Priority::Normal);
        assert_eq!(Priority::coerce(""), Priority::Normal);
        assert_eq!(Priority::coerce("High"), Priority::High);
    }

    #[test]
    fn priority_orders_urgent_first() {
        let mut all = vec![Priority::Low, Priority::Normal, Priority::Urgent, Priority::High];
        all.sort();
        assert_eq!(all, Priority::ALL.to_vec());
    }

    #[test]
    fn classification_deserializes_with_defaults() {
        let raw = r#"{"categories": ["Invoice"], "priority": "sky-high"}"#;
        let parsed: ClassificationResult = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.priority, Priority::Normal);
        assert!(parsed.action_items.is_empty());
        assert!(!parsed.is_spam);
    }

    #[test]
    fn non_string_priority_becomes_normal() {
        for raw in [
            r#"{"priority": null}"#,
            r#"{"priority": 2}"#,
            r#"{"priority": ["high"]}"#,
        ] {
            let parsed: ClassificationResult = serde_json::from_str(raw).unwrap();
            assert_eq!(parsed.priority, Priority::Normal, "{raw}");
        }
    }

    #[test]
    fn classification_accepts_short_flag_names() {
        let raw = r#"{"spam": true, "alert": true, "sales_pitch": true}"#;
        let parsed: ClassificationResult = serde_json::from_str(raw).unwrap();
        assert!(parsed.is_spam);
        assert!(parsed.is_alert);
        assert!(parsed.is_sales_pitch);
    }

    #[test]
    fn normalized_lowercases_and_dedups_categories() {
        let result = ClassificationResult {
            categories: vec!["Invoice".into(), " invoice ".into(), "".into(), "Work".into()],
            ..Default::default()
        }
        .normalized();
        assert_eq!(result.categories, vec!["invoice", "work"]);
        assert_eq!(result.primary_category(), Some("invoice"));
    }

    #[test]
    fn message_defaults_missing_headers() {
        let msg: Message = serde_json::from_str(r#"{"id": "m1"}"#).unwrap();
        assert_eq!(msg.sender, "Unknown");
        assert_eq!(msg.subject, "No Subject");
        assert!(msg.received_at.is_none());
    }
}
