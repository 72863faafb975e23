//! Reminder policy: whether a message gets a calendar reminder, and what
//! the reminder says. Transport lives in `crate::calendar`.

use tracing::debug;

use crate::pipeline::registry::CalendarPolicy;
use crate::pipeline::types::{ClassificationResult, Message, Priority};

/// Max body characters shown in a reminder description.
const BODY_PREVIEW_CHARS: usize = 500;

/// Placeholder when the classifier found nothing to do.
const NO_ACTION_ITEMS: &str = "No specific action items identified.";

/// Content of a reminder, independent of when it is scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderEnvelope {
    pub summary: String,
    pub description: String,
    /// Calendar color id (see [`color_id`]).
    pub color_id: String,
    /// Popup lead time before the event starts.
    pub reminder_minutes: u32,
    /// Event length, if the category overrides the global default.
    pub duration_minutes: Option<u32>,
}

/// Global reminder defaults, overridable per category.
#[derive(Debug, Clone)]
pub struct ReminderPolicy {
    default_advance_minutes: u32,
    default_color: String,
}

impl ReminderPolicy {
    pub fn new(default_advance_minutes: u32, default_color: impl Into<String>) -> Self {
        Self {
            default_advance_minutes,
            default_color: default_color.into(),
        }
    }

    /// Decide whether a reminder should be created.
    ///
    /// - `create_reminder == false` → never
    /// - empty allowlist → any priority
    /// - otherwise the priority must be on the allowlist
    pub fn should_create(
        &self,
        category: &str,
        priority: Priority,
        calendar_settings: &CalendarPolicy,
    ) -> bool {
        if !calendar_settings.create_reminder {
            debug!(category, "Calendar reminders disabled for category");
            return false;
        }
        if calendar_settings.priority_allowlist.is_empty() {
            return true;
        }
        let allowed = calendar_settings.priority_allowlist.contains(&priority);
        debug!(category, priority = %priority, allowed, "Checked reminder priority allowlist");
        allowed
    }

    /// Build the reminder content for a message in `category`.
    pub fn build_envelope(
        &self,
        category: &str,
        message: &Message,
        classification: &ClassificationResult,
        calendar_settings: &CalendarPolicy,
    ) -> ReminderEnvelope {
        let color = calendar_settings
            .color
            .as_deref()
            .unwrap_or(&self.default_color);
        ReminderEnvelope {
            summary: format!(
                "[{}] {} - Action Required",
                category.to_uppercase(),
                message.subject
            ),
            description: build_description(message, classification),
            color_id: color_id(color).to_string(),
            reminder_minutes: calendar_settings
                .reminder_advance_minutes
                .unwrap_or(self.default_advance_minutes),
            duration_minutes: calendar_settings.duration_minutes,
        }
    }
}

/// Deterministic reminder description for a message.
pub fn build_description(message: &Message, classification: &ClassificationResult) -> String {
    let mut out = String::with_capacity(512 + BODY_PREVIEW_CHARS);

    out.push_str("Email Details:\n");
    out.push_str(&format!("From: {}\n", message.sender));
    out.push_str(&format!("Subject: {}\n\n", message.subject));
    out.push_str(&format!(
        "Priority: {}\n\n",
        classification.priority.as_str().to_uppercase()
    ));

    out.push_str("Action Items Required:\n");
    if classification.action_items.is_empty() {
        out.push_str(NO_ACTION_ITEMS);
        out.push('\n');
    } else {
        push_bullets(&mut out, &classification.action_items);
    }

    if !classification.key_points.is_empty() {
        out.push_str("\nKey Points:\n");
        push_bullets(&mut out, &classification.key_points);
    }

    out.push_str("\nOriginal Email Preview:\n");
    out.push_str(&preview(&message.body, BODY_PREVIEW_CHARS));
    out
}

/// Map a color name to a Google Calendar color id. Unknown names are blue.
pub fn color_id(color: &str) -> &'static str {
    match color.trim().to_lowercase().as_str() {
        "red" => "11",
        "orange" => "6",
        "yellow" => "5",
        "green" => "10",
        "blue" => "1",
        "purple" => "3",
        _ => "1",
    }
}

fn push_bullets(out: &mut String, items: &[String]) {
    for item in items {
        out.push_str("• ");
        out.push_str(item);
        out.push('\n');
    }
}

/// First `max_chars` characters, with "..." when truncated.
fn preview(body: &str, max_chars: usize) -> String {
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
