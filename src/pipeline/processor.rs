//! Drives one batch of unread messages through routing.
//!
//! Per message:
//! 1. Classifier → `ClassificationResult` (never fails, may be empty)
//! 2. Spam policy → skipped unless a `spam` category is enabled
//! 3. `TargetResolver` → forward to each target
//! 4. `ReminderPolicy` + `SlotScheduler` → calendar reminder
//! 5. Action items, labels, important flag, mark read
//!
//! Every transport failure is logged, recorded in the run's error log and
//! skipped; the run always yields a complete `RunSummary`.

use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, error, info, warn};

use crate::calendar::{Calendar, CalendarEvent, event_link};
use crate::channels::Mailbox;
use crate::pipeline::aggregator::{
    ActionItemRecord, CalendarRecord, ErrorRecord, FailureStage, ForwardRecord, RunAggregator,
    RunSummary,
};
use crate::pipeline::classifier::Classifier;
use crate::pipeline::registry::CategoryRegistry;
use crate::pipeline::reminder::ReminderPolicy;
use crate::pipeline::resolver::TargetResolver;
use crate::pipeline::slots::{SlotConfig, SlotScheduler};
use crate::pipeline::types::{ClassificationResult, Message};

/// Category that, when enabled, lets spam be routed like any other message.
const SPAM_CATEGORY: &str = "spam";

/// Category that always marks a message important.
const CRITICAL_CATEGORY: &str = "critical";

const SPAM_LABEL: &str = "Spam";
const SALES_PITCH_LABEL: &str = "Sales Pitch";
const ALERT_LABEL: &str = "Alert";

/// Source of the local wall-clock time used for slot allocation.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Current wall-clock time in the configured zone.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.tz).naive_local()
    }
}

/// A clock stuck at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Per-run settings that are not part of the category registry.
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    /// Upper bound on messages listed per run.
    pub max_messages: usize,
    pub slots: SlotConfig,
    /// Zone the slot window is evaluated in and events are tagged with.
    pub timezone: Tz,
    pub reminder_advance_minutes: u32,
    pub default_color: String,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            max_messages: 10,
            slots: SlotConfig::default(),
            timezone: Tz::UTC,
            reminder_advance_minutes: 45,
            default_color: "red".to_string(),
        }
    }
}

/// Routes unread messages. Stateless between runs: every `run_once` uses a
/// fresh scheduler and aggregator.
pub struct RunProcessor {
    mailbox: Arc<dyn Mailbox>,
    classifier: Arc<dyn Classifier>,
    calendar: Arc<dyn Calendar>,
    registry: Arc<CategoryRegistry>,
    resolver: TargetResolver,
    reminders: ReminderPolicy,
    settings: ProcessorSettings,
    clock: Arc<dyn Clock>,
}

/// Mutable state owned by exactly one run.
struct RunState {
    scheduler: SlotScheduler,
    aggregator: RunAggregator,
}

impl RunProcessor {
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        classifier: Arc<dyn Classifier>,
        calendar: Arc<dyn Calendar>,
        registry: Arc<CategoryRegistry>,
        settings: ProcessorSettings,
    ) -> Self {
        let reminders = ReminderPolicy::new(
            settings.reminder_advance_minutes,
            settings.default_color.clone(),
        );
        let clock = Arc::new(SystemClock::new(settings.timezone));
        Self {
            mailbox,
            classifier,
            calendar,
            resolver: TargetResolver::new(Arc::clone(&registry)),
            registry,
            reminders,
            settings,
            clock,
        }
    }

    /// Replace the wall clock (used by tests and dry runs).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Process one bounded batch of unread messages.
    pub async fn run_once(&self) -> RunSummary {
        let mut run = RunState {
            scheduler: SlotScheduler::new(self.settings.slots),
            aggregator: RunAggregator::new(Utc::now()),
        };
        let run_id = run.aggregator.run_id();

        info!(
            run_id = %run_id,
            mailbox = self.mailbox.name(),
            classifier = self.classifier.name(),
            max = self.settings.max_messages,
            "Starting routing run"
        );

        let refs = match self.mailbox.list_unread(self.settings.max_messages).await {
            Ok(refs) => refs,
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Failed to list unread messages");
                run.aggregator.record_error(ErrorRecord {
                    message_id: None,
                    stage: FailureStage::List,
                    detail: e.to_string(),
                });
                return run.aggregator.finalize();
            }
        };

        for message_ref in refs {
            self.process_message(&message_ref.id, &mut run).await;
        }

        let summary = run.aggregator.finalize();
        info!(
            run_id = %run_id,
            processed = summary.total_processed,
            actionable = summary.actionable_count,
            forwarded = summary.forwarded_count,
            events = summary.calendar_events.len(),
            spam_skipped = summary.spam_skipped,
            errors = summary.errors.len(),
            "Routing run complete"
        );
        summary
    }

    async fn process_message(&self, id: &str, run: &mut RunState) {
        run.aggregator.record_processed();

        let message = match self.mailbox.get(id).await {
            Ok(message) => message,
            Err(e) => {
                error!(id, error = %e, "Failed to fetch message");
                run.aggregator.record_error(ErrorRecord {
                    message_id: Some(id.to_string()),
                    stage: FailureStage::Fetch,
                    detail: e.to_string(),
                });
                return;
            }
        };

        let classification = self
            .classifier
            .classify(&message.subject, &message.sender, &message.body)
            .await
            .normalized();

        info!(
            id,
            subject = %message.subject,
            categories = ?classification.categories,
            priority = %classification.priority,
            "Classified message"
        );

        if classification.is_spam && !self.registry.is_enabled(SPAM_CATEGORY) {
            info!(id, subject = %message.subject, "Skipping spam message");
            run.aggregator.record_spam_skipped();
            self.finish_message(&message, &classification, run).await;
            return;
        }

        self.forward(&message, &classification, run).await;
        self.schedule_reminder(&message, &classification, run).await;

        if run.aggregator.is_acted_upon(&message.id) {
            run.aggregator.record_action_items(ActionItemRecord {
                message_id: message.id.clone(),
                subject: message.subject.clone(),
                sender: message.sender.clone(),
                priority: classification.priority,
                items: classification.action_items.clone(),
            });
        }

        self.finish_message(&message, &classification, run).await;
    }

    async fn forward(
        &self,
        message: &Message,
        classification: &ClassificationResult,
        run: &mut RunState,
    ) {
        let targets = self.resolver.resolve(classification);
        if targets.is_empty() {
            debug!(id = %message.id, "No forward targets for message");
            return;
        }

        for target in targets {
            match self.mailbox.forward(&message.id, &target.address).await {
                Ok(()) => {
                    info!(id = %message.id, to = %target.address, "Forwarded message");
                    run.aggregator.record_forward(ForwardRecord {
                        message_id: message.id.clone(),
                        subject: message.subject.clone(),
                        sender: message.sender.clone(),
                        received_at: message.received_at,
                        categories: classification.categories.clone(),
                        forwarded_to: target.address,
                        priority: target.priority,
                        is_spam: classification.is_spam,
                        is_sales_pitch: classification.is_sales_pitch,
                        is_alert: classification.is_alert,
                        key_points: classification.key_points.clone(),
                        action_items: classification.action_items.clone(),
                    });
                }
                Err(e) => {
                    warn!(id = %message.id, to = %target.address, error = %e, "Forward failed");
                    run.aggregator.record_error(ErrorRecord {
                        message_id: Some(message.id.clone()),
                        stage: FailureStage::Forward,
                        detail: e.to_string(),
                    });
                }
            }
        }
    }

    /// Create a reminder from the first enabled category's calendar policy.
    async fn schedule_reminder(
        &self,
        message: &Message,
        classification: &ClassificationResult,
        run: &mut RunState,
    ) {
        let Some(category) = classification
            .categories
            .iter()
            .find_map(|name| self.registry.get_enabled(name))
        else {
            return;
        };
        let policy = &category.calendar_settings;

        if !self
            .reminders
            .should_create(&category.name, classification.priority, policy)
        {
            return;
        }
        if policy.require_action_items && classification.action_items.is_empty() {
            debug!(id = %message.id, category = %category.name, "No action items, skipping reminder");
            return;
        }

        let envelope =
            self.reminders
                .build_envelope(&category.name, message, classification, policy);
        let duration = envelope
            .duration_minutes
            .unwrap_or(self.settings.slots.default_duration_minutes());
        // The slot is consumed even if creation fails below.
        let slot = run
            .scheduler
            .allocate_next_lasting(self.clock.now(), duration);

        let event = CalendarEvent {
            summary: envelope.summary,
            description: envelope.description,
            slot,
            color_id: envelope.color_id,
            reminder_minutes: envelope.reminder_minutes,
            timezone: self.settings.timezone.name().to_string(),
        };

        match self.calendar.create_event(&event).await {
            Ok(event_id) => {
                let link = event_link(&event_id);
                info!(
                    id = %message.id,
                    category = %category.name,
                    start = %slot.start,
                    link = %link,
                    "Created calendar reminder"
                );
                run.aggregator.record_calendar_event(CalendarRecord {
                    message_id: message.id.clone(),
                    subject: message.subject.clone(),
                    categories: classification.categories.clone(),
                    category: category.name.clone(),
                    priority: classification.priority,
                    event_id,
                    event_link: link,
                    start: slot.start,
                    end: slot.end,
                });
            }
            Err(e) => {
                warn!(id = %message.id, category = %category.name, error = %e, "Calendar event creation failed");
                run.aggregator.record_error(ErrorRecord {
                    message_id: Some(message.id.clone()),
                    stage: FailureStage::Calendar,
                    detail: e.to_string(),
                });
            }
        }
    }

    /// Label, flag and mark the message read.
    async fn finish_message(
        &self,
        message: &Message,
        classification: &ClassificationResult,
        run: &mut RunState,
    ) {
        for label in labels_for(&self.registry, classification) {
            if let Err(e) = self.mailbox.add_label(&message.id, &label).await {
                warn!(id = %message.id, label = %label, error = %e, "Failed to add label");
                run.aggregator.record_error(ErrorRecord {
                    message_id: Some(message.id.clone()),
                    stage: FailureStage::Label,
                    detail: e.to_string(),
                });
            }
        }

        if should_mark_important(classification)
            && let Err(e) = self.mailbox.mark_important(&message.id).await
        {
            warn!(id = %message.id, error = %e, "Failed to mark message important");
            run.aggregator.record_error(ErrorRecord {
                message_id: Some(message.id.clone()),
                stage: FailureStage::Label,
                detail: e.to_string(),
            });
        }

        if let Err(e) = self.mailbox.mark_read(&message.id).await {
            warn!(id = %message.id, error = %e, "Failed to mark message read");
            run.aggregator.record_error(ErrorRecord {
                message_id: Some(message.id.clone()),
                stage: FailureStage::MarkRead,
                detail: e.to_string(),
            });
        }
    }
}

/// Enabled categories, then the flag labels.
fn labels_for(registry: &CategoryRegistry, classification: &ClassificationResult) -> Vec<String> {
    let mut labels: Vec<String> = classification
        .categories
        .iter()
        .filter(|name| registry.is_enabled(name))
        .cloned()
        .collect();
    if classification.is_spam {
        labels.push(SPAM_LABEL.to_string());
    }
    if classification.is_sales_pitch {
        labels.push(SALES_PITCH_LABEL.to_string());
    }
    if classification.is_alert {
        labels.push(ALERT_LABEL.to_string());
    }
    labels
}

fn should_mark_important(classification: &ClassificationResult) -> bool {
    classification.priority.is_elevated()
        || classification.is_alert
        || classification
            .categories
            .iter()
            .any(|c| c == CRITICAL_CATEGORY)
}
