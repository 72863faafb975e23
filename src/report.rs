//! Plain-text rendering of a `RunSummary` and delivery sinks.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use tracing::info;

use crate::error::ReportError;
use crate::pipeline::aggregator::RunSummary;

const SEPARATOR_WIDTH: usize = 50;

/// Where a rendered report goes.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Sink name for logging (e.g. "smtp", "log").
    fn name(&self) -> &str;

    async fn deliver(&self, subject: &str, body: &str) -> Result<(), ReportError>;
}

/// Writes the report to the log instead of sending it.
#[derive(Debug, Default)]
pub struct LogReportSink;

#[async_trait]
impl ReportSink for LogReportSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, subject: &str, body: &str) -> Result<(), ReportError> {
        info!(subject, "Run report\n{body}");
        Ok(())
    }
}

/// Report email subject for a given day.
pub fn report_subject(date: NaiveDate) -> String {
    format!("Email Processing Report - {}", date.format("%Y-%m-%d"))
}

/// Render the run summary as plain text.
pub fn render_text(summary: &RunSummary, generated_at: NaiveDateTime) -> String {
    let mut lines: Vec<String> = Vec::new();

    lines.push("Email Processing Report".into());
    lines.push("=======================".into());
    lines.push(format!(
        "Generated on {}",
        generated_at.format("%Y-%m-%d %H:%M:%S")
    ));
    lines.push(format!("Run: {}", summary.run_id));
    lines.push(String::new());

    // ── Summary Statistics ──
    heading(&mut lines, "Summary Statistics");
    lines.push(format!("Total Emails Processed: {}", summary.total_processed));
    lines.push(format!("Actionable Emails: {}", summary.actionable_count));
    lines.push(format!(
        "Emails Successfully Forwarded: {}",
        summary.forwarded_count
    ));
    lines.push(format!(
        "Calendar Events Created: {}",
        summary.calendar_events.len()
    ));
    if summary.spam_skipped > 0 {
        lines.push(format!("Spam Skipped: {}", summary.spam_skipped));
    }
    lines.push(String::new());

    // ── Category Statistics ──
    if !summary.category_stats.is_empty() {
        heading(&mut lines, "Category Statistics");
        for (category, count) in &summary.category_stats {
            let noun = if *count == 1 { "email" } else { "emails" };
            lines.push(format!("{}: {count} {noun}", title_case(category)));
        }
        lines.push(String::new());
    }

    // ── Email Summary ──
    if !summary.forwarding_details.is_empty() {
        heading(&mut lines, "Email Summary");
        for detail in &summary.forwarding_details {
            lines.push(String::new());
            lines.push(format!("From: {}", detail.sender));
            lines.push(format!("Subject: {}", detail.subject));
            lines.push(format!("Priority: {}", detail.priority.as_str().to_uppercase()));
            lines.push(format!("Categories: {}", detail.categories.join(", ")));
            lines.push(format!("Forwarded To: {}", detail.forwarded_to));

            let mut flags = Vec::new();
            if detail.is_alert {
                flags.push("alert");
            }
            if detail.is_sales_pitch {
                flags.push("sales pitch");
            }
            if detail.is_spam {
                flags.push("spam");
            }
            if !flags.is_empty() {
                lines.push(format!("Flags: {}", flags.join(", ")));
            }

            if !detail.key_points.is_empty() {
                lines.push("Key Points:".into());
                lines.extend(detail.key_points.iter().map(|p| format!("  - {p}")));
            }
            if !detail.action_items.is_empty() {
                lines.push("Action Items:".into());
                lines.extend(detail.action_items.iter().map(|a| format!("  - {a}")));
            }
            lines.push("-".repeat(SEPARATOR_WIDTH));
        }
        lines.push(String::new());
    }

    // ── Calendar Events ──
    if !summary.calendar_events.is_empty() {
        heading(&mut lines, "Calendar Events");
        for event in &summary.calendar_events {
            lines.push(format!(
                "[{}] {}",
                event.category.to_uppercase(),
                event.subject
            ));
            lines.push(format!(
                "  When: {} - {}",
                event.start.format("%Y-%m-%d %H:%M"),
                event.end.format("%H:%M")
            ));
            lines.push(format!(
                "  Priority: {}",
                event.priority.as_str().to_uppercase()
            ));
            lines.push(format!("  Link: {}", event.event_link));
        }
        lines.push(String::new());
    }

    // ── Consolidated Action Items ──
    let action_items = summary.action_items_by_priority();
    if !action_items.is_empty() {
        heading(&mut lines, "Consolidated Action Items");
        lines.push("All action items across emails that require attention:".into());
        lines.push(String::new());
        for record in action_items {
            lines.push(format!("Priority: {}", record.priority.as_str().to_uppercase()));
            lines.push(format!("From: {}", record.sender));
            lines.push(format!("Subject: {}", record.subject));
            lines.push("Action Items:".into());
            lines.extend(record.items.iter().map(|item| format!("  - {item}")));
            lines.push(String::new());
            lines.push("-".repeat(SEPARATOR_WIDTH));
            lines.push(String::new());
        }
    }

    // ── Errors ──
    if !summary.errors.is_empty() {
        heading(&mut lines, "Errors");
        for err in &summary.errors {
            match &err.message_id {
                Some(id) => lines.push(format!("[{}] {id}: {}", err.stage.as_str(), err.detail)),
                None => lines.push(format!("[{}] {}", err.stage.as_str(), err.detail)),
            }
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

fn heading(lines: &mut Vec<String>, title: &str) {
    lines.push(title.to_string());
    lines.push("-".repeat(title.len()));
}

/// "sales pitch" → "Sales Pitch".
fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::pipeline::aggregator::{
        ActionItemRecord, ErrorRecord, FailureStage, ForwardRecord, RunAggregator,
    };
    use crate::pipeline::types::Priority;

    fn generated_at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_opt(18, 30, 0)
            .unwrap()
    }

    fn forward(id: &str, priority: Priority) -> ForwardRecord {
        ForwardRecord {
            message_id: id.into(),
            subject: format!("Subject {id}"),
            sender: "vendor@x.com".into(),
            received_at: None,
            categories: vec!["invoice".into()],
            forwarded_to: "finance@x.com".into(),
            priority,
            is_spam: false,
            is_sales_pitch: false,
            is_alert: true,
            key_points: vec!["Amount: $120".into()],
            action_items: vec!["Pay".into()],
        }
    }

    #[test]
    fn subject_uses_iso_date() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(report_subject(date), "Email Processing Report - 2026-03-07");
    }

    #[test]
    fn empty_run_has_only_statistics() {
        let summary = RunAggregator::new(Utc::now()).finalize();
        let text = render_text(&summary, generated_at());
        assert!(text.contains("Generated on 2026-10-19 18:30:00"));
        assert!(text.contains("Total Emails Processed: 0"));
        assert!(!text.contains("Category Statistics"));
        assert!(!text.contains("Email Summary"));
        assert!(!text.contains("Consolidated Action Items"));
        assert!(!text.contains("Errors"));
    }

    #[test]
    fn renders_forwards_and_categories() {
        let mut agg = RunAggregator::new(Utc::now());
        agg.record_processed();
        agg.record_forward(forward("m1", Priority::Urgent));
        let text = render_text(&agg.finalize(), generated_at());

        assert!(text.contains("Invoice: 1 email\n"));
        assert!(text.contains("Forwarded To: finance@x.com"));
        assert!(text.contains("Priority: URGENT"));
        assert!(text.contains("Flags: alert"));
        assert!(text.contains("  - Amount: $120"));
    }

    #[test]
    fn consolidated_action_items_ordered_by_priority() {
        let mut agg = RunAggregator::new(Utc::now());
        for (id, priority) in [("low", Priority::Low), ("urgent", Priority::Urgent)] {
            agg.record_action_items(ActionItemRecord {
                message_id: id.into(),
                subject: format!("Subject {id}"),
                sender: "s@x.com".into(),
                priority,
                items: vec![format!("handle {id}")],
            });
        }
        let text = render_text(&agg.finalize(), generated_at());
        let section = text.split("Consolidated Action Items").nth(1).unwrap();
        let urgent = section.find("handle urgent").unwrap();
        let low = section.find("handle low").unwrap();
        assert!(urgent < low);
    }

    #[test]
    fn renders_errors_with_stage() {
        let mut agg = RunAggregator::new(Utc::now());
        agg.record_error(ErrorRecord {
            message_id: Some("m9".into()),
            stage: FailureStage::Forward,
            detail: "recipient rejected".into(),
        });
        agg.record_error(ErrorRecord {
            message_id: None,
            stage: FailureStage::List,
            detail: "mailbox offline".into(),
        });
        let text = render_text(&agg.finalize(), generated_at());
        assert!(text.contains("[forward] m9: recipient rejected"));
        assert!(text.contains("[list] mailbox offline"));
    }

    #[test]
    fn title_cases_multiword_categories() {
        assert_eq!(title_case("sales pitch"), "Sales Pitch");
        assert_eq!(title_case("invoice"), "Invoice");
    }

    #[tokio::test]
    async fn log_sink_accepts_report() {
        assert!(LogReportSink.deliver("subject", "body").await.is_ok());
    }
}
