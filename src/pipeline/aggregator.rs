//! Append-only bookkeeping for one run.
//!
//! Counting rules:
//! - `forwarded_count` counts individual successful forwards
//! - `actionable_count` counts messages with at least one successful action
//! - `category_stats[primary]` is bumped once per actionable message
//!
//! Records are only ever appended, so `finalize()` can be called any number
//! of times and returns the same summary.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::pipeline::types::Priority;

/// One successful forward of one message to one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForwardRecord {
    pub message_id: String,
    pub subject: String,
    pub sender: String,
    pub received_at: Option<DateTime<Utc>>,
    /// Classified categories, primary first.
    pub categories: Vec<String>,
    pub forwarded_to: String,
    pub priority: Priority,
    pub is_spam: bool,
    pub is_sales_pitch: bool,
    pub is_alert: bool,
    pub key_points: Vec<String>,
    pub action_items: Vec<String>,
}

/// One successfully created calendar reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarRecord {
    pub message_id: String,
    pub subject: String,
    /// Classified categories, primary first.
    pub categories: Vec<String>,
    /// Category whose calendar policy produced the reminder.
    pub category: String,
    pub priority: Priority,
    pub event_id: String,
    pub event_link: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Action items from an acted-upon message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionItemRecord {
    pub message_id: String,
    pub subject: String,
    pub sender: String,
    pub priority: Priority,
    pub items: Vec<String>,
}

/// Which step of message handling failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    List,
    Fetch,
    Forward,
    Label,
    MarkRead,
    Calendar,
}

impl FailureStage {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Fetch => "fetch",
            Self::Forward => "forward",
            Self::Label => "label",
            Self::MarkRead => "mark_read",
            Self::Calendar => "calendar",
        }
    }
}

/// A failed action. Failures never change counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub message_id: Option<String>,
    pub stage: FailureStage,
    pub detail: String,
}

/// Everything that happened in one run. Read-only input to reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub total_processed: usize,
    pub actionable_count: usize,
    pub forwarded_count: usize,
    pub spam_skipped: usize,
    pub category_stats: BTreeMap<String, usize>,
    pub forwarding_details: Vec<ForwardRecord>,
    pub calendar_events: Vec<CalendarRecord>,
    pub action_items: Vec<ActionItemRecord>,
    pub errors: Vec<ErrorRecord>,
}

impl RunSummary {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            total_processed: 0,
            actionable_count: 0,
            forwarded_count: 0,
            spam_skipped: 0,
            category_stats: BTreeMap::new(),
            forwarding_details: Vec::new(),
            calendar_events: Vec::new(),
            action_items: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Action item records ordered urgent → low, insertion order within a priority.
    pub fn action_items_by_priority(&self) -> Vec<&ActionItemRecord> {
        let mut items: Vec<&ActionItemRecord> = self.action_items.iter().collect();
        items.sort_by_key(|item| item.priority);
        items
    }
}

/// Mutable accumulator owned by exactly one run.
#[derive(Debug)]
pub struct RunAggregator {
    summary: RunSummary,
    acted_upon: HashSet<String>,
}

impl RunAggregator {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            summary: RunSummary::new(started_at),
            acted_upon: HashSet::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.summary.run_id
    }

    /// Count one message as seen.
    pub fn record_processed(&mut self) {
        self.summary.total_processed += 1;
    }

    /// Count one spam message that was not routed.
    pub fn record_spam_skipped(&mut self) {
        self.summary.spam_skipped += 1;
    }

    /// Record one successful forward.
    pub fn record_forward(&mut self, record: ForwardRecord) {
        self.summary.forwarded_count += 1;
        self.mark_acted_upon(&record.message_id, record.categories.first());
        self.summary.forwarding_details.push(record);
    }

    /// Record one successfully created calendar event.
    pub fn record_calendar_event(&mut self, record: CalendarRecord) {
        self.mark_acted_upon(&record.message_id, record.categories.first());
        self.summary.calendar_events.push(record);
    }

    /// Record the action items of a message. Empty records are ignored.
    pub fn record_action_items(&mut self, record: ActionItemRecord) {
        if record.items.is_empty() {
            return;
        }
        self.summary.action_items.push(record);
    }

    /// Record a failed action.
    pub fn record_error(&mut self, record: ErrorRecord) {
        self.summary.errors.push(record);
    }

    /// Whether a message has had at least one successful action this run.
    pub fn is_acted_upon(&self, message_id: &str) -> bool {
        self.acted_upon.contains(message_id)
    }

    /// Snapshot of the run so far.
    pub fn finalize(&self) -> RunSummary {
        self.summary.clone()
    }

    fn mark_acted_upon(&mut self, message_id: &str, primary_category: Option<&String>) {
        if !self.acted_upon.insert(message_id.to_string()) {
            return;
        }
        self.summary.actionable_count += 1;
        if let Some(category) = primary_category {
            *self.summary.category_stats.entry(category.clone()).or_insert(0) += 1;
        }
        debug!(
            message_id,
            category = primary_category.map(String::as_str).unwrap_or("none"),
            "Message acted upon"
        );
    }
}
