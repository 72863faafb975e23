//! Background router loop. Runs the processor on a timer and delivers a
//! report after each run that saw mail.
//!
//! Timer-based loop:
//! 1. `RunProcessor::run_once()` with a fresh scheduler and aggregator
//! 2. Render the `RunSummary` as text
//! 3. Hand it to the configured `ReportSink`

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Local;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::pipeline::aggregator::RunSummary;
use crate::pipeline::processor::RunProcessor;
use crate::report::{ReportSink, render_text, report_subject};

/// Default interval between runs.
pub const DEFAULT_RUN_INTERVAL_SECS: u64 = 60;

/// Whether a run with no messages still produces a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyRunReport {
    Send,
    Skip,
}

/// Run one batch and deliver its report. Delivery failures are logged only.
pub async fn run_and_report(
    processor: &RunProcessor,
    sink: &dyn ReportSink,
    empty: EmptyRunReport,
) -> RunSummary {
    let summary = processor.run_once().await;

    if summary.total_processed == 0 && empty == EmptyRunReport::Skip {
        debug!(run_id = %summary.run_id, "No messages processed, skipping report");
        return summary;
    }

    let now = Local::now();
    let subject = report_subject(now.date_naive());
    let body = render_text(&summary, now.naive_local());

    match sink.deliver(&subject, &body).await {
        Ok(()) => info!(run_id = %summary.run_id, sink = sink.name(), "Report delivered"),
        Err(e) => error!(run_id = %summary.run_id, sink = sink.name(), error = %e, "Failed to deliver report"),
    }

    summary
}

/// Spawn a background task that routes unread mail on a fixed interval.
///
/// Each tick is an independent run. Runs that saw no messages send no report.
///
/// Returns a `JoinHandle` and shutdown flag.
pub fn spawn_router_loop(
    processor: Arc<RunProcessor>,
    sink: Arc<dyn ReportSink>,
    interval: Duration,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!("Router loop started, running every {}s", interval.as_secs());

        let mut tick = tokio::time::interval(interval);

        // Run immediately on first tick
        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Router loop shutting down");
                return;
            }

            run_and_report(&processor, sink.as_ref(), EmptyRunReport::Skip).await;
        }
    });

    (handle, shutdown_flag)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;
    use crate::calendar::MemoryCalendar;
    use crate::channels::MemoryMailbox;
    use crate::error::ReportError;
    use crate::pipeline::classifier::KeywordClassifier;
    use crate::pipeline::processor::ProcessorSettings;
    use crate::pipeline::registry::CategoryRegistry;
    use crate::pipeline::types::Message;

    /// Sink that keeps every delivered report.
    #[derive(Default)]
    struct RecordingSink {
        reports: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl ReportSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        async fn deliver(&self, subject: &str, body: &str) -> Result<(), ReportError> {
            if self.fail {
                return Err(ReportError::Send("smtp down".into()));
            }
            self.reports
                .lock()
                .await
                .push((subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    fn processor(messages: Vec<Message>) -> RunProcessor {
        let registry = Arc::new(
            CategoryRegistry::from_json_str(
                r#"{"invoice": {"keywords": ["invoice"], "target_emails": ["finance@x.com"]}}"#,
            )
            .unwrap(),
        );
        RunProcessor::new(
            Arc::new(MemoryMailbox::new(messages)),
            Arc::new(KeywordClassifier::new(Arc::clone(&registry))),
            Arc::new(MemoryCalendar::new()),
            registry,
            ProcessorSettings::default(),
        )
    }

    fn invoice() -> Message {
        Message {
            id: "m1".into(),
            sender: "billing@vendor.com".into(),
            subject: "Invoice 42".into(),
            body: "Please pay".into(),
            received_at: None,
        }
    }

    #[tokio::test]
    async fn delivers_report_for_run() {
        let sink = RecordingSink::default();
        let summary = run_and_report(&processor(vec![invoice()]), &sink, EmptyRunReport::Skip).await;
        assert_eq!(summary.forwarded_count, 1);

        let reports = sink.reports.lock().await;
        assert_eq!(reports.len(), 1);
        assert!(reports[0].0.starts_with("Email Processing Report - "));
        assert!(reports[0].1.contains("Forwarded To: finance@x.com"));
    }

    #[tokio::test]
    async fn empty_run_report_policy() {
        let sink = RecordingSink::default();
        run_and_report(&processor(vec![]), &sink, EmptyRunReport::Skip).await;
        assert!(sink.reports.lock().await.is_empty());

        run_and_report(&processor(vec![]), &sink, EmptyRunReport::Send).await;
        assert_eq!(sink.reports.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn delivery_failure_does_not_lose_summary() {
        let sink = RecordingSink {
            fail: true,
            ..Default::default()
        };
        let summary = run_and_report(&processor(vec![invoice()]), &sink, EmptyRunReport::Send).await;
        assert_eq!(summary.total_processed, 1);
    }

    #[tokio::test]
    async fn loop_runs_and_shuts_down() {
        let sink = Arc::new(RecordingSink::default());
        let (handle, shutdown) = spawn_router_loop(
            Arc::new(processor(vec![invoice()])),
            Arc::clone(&sink) as Arc<dyn ReportSink>,
            Duration::from_millis(10),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.store(true, Ordering::Relaxed);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop did not stop")
            .unwrap();

        // Only the first run saw the message; later empty runs sent nothing.
        assert_eq!(sink.reports.lock().await.len(), 1);
    }
}
