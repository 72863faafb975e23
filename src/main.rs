use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use inbox_router::calendar::{Calendar, MemoryCalendar};
use inbox_router::channels::{Mailbox, MemoryMailbox, SmtpReportSink};
use inbox_router::config::RouterConfig;
use inbox_router::llm::create_client;
use inbox_router::pipeline::classifier::{Classifier, KeywordClassifier, LlmClassifier};
use inbox_router::pipeline::processor::RunProcessor;
use inbox_router::pipeline::registry::CategoryRegistry;
use inbox_router::pipeline::runner::{EmptyRunReport, run_and_report, spawn_router_loop};
use inbox_router::report::{LogReportSink, ReportSink};

const LOG_FILE_NAME: &str = "inbox-router.log";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = RouterConfig::from_env().context("invalid router configuration")?;
    let _log_guard = init_tracing(&config);

    eprintln!("📬 Inbox Router v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Categories: {}", config.categories_path.display());

    // ── Category registry ───────────────────────────────────────────
    let registry = Arc::new(
        CategoryRegistry::from_path(&config.categories_path)
            .context("invalid category registry")?,
    );
    eprintln!(
        "   Enabled categories: {}",
        registry
            .enabled()
            .map(|def| def.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    // ── Mailbox ─────────────────────────────────────────────────────
    let mailbox: Arc<dyn Mailbox> = match &config.spool_path {
        Some(path) => Arc::new(MemoryMailbox::from_json_file(path).context("invalid message spool")?),
        None => {
            tracing::warn!("ROUTER_SPOOL_PATH not set, starting with an empty mailbox");
            Arc::new(MemoryMailbox::default())
        }
    };

    // ── Classifier ──────────────────────────────────────────────────
    let classifier: Arc<dyn Classifier> = match &config.llm {
        Some(llm_config) => Arc::new(LlmClassifier::new(
            create_client(llm_config).context("failed to create LLM client")?,
            Arc::clone(&registry),
        )),
        None => {
            tracing::info!("OPENAI_API_KEY not set, using keyword classifier");
            Arc::new(KeywordClassifier::new(Arc::clone(&registry)))
        }
    };
    eprintln!("   Classifier: {}", classifier.name());

    // ── Calendar + report ───────────────────────────────────────────
    let calendar: Arc<dyn Calendar> = Arc::new(MemoryCalendar::new());
    let sink: Arc<dyn ReportSink> = match &config.smtp {
        Some(smtp) => {
            eprintln!("   Report: email to {}", smtp.to_address);
            Arc::new(SmtpReportSink::new(smtp.clone()))
        }
        None => {
            eprintln!("   Report: log");
            Arc::new(LogReportSink)
        }
    };

    let processor = Arc::new(RunProcessor::new(
        mailbox,
        classifier,
        calendar,
        registry,
        config.processor.clone(),
    ));

    if config.run_once {
        run_and_report(&processor, sink.as_ref(), EmptyRunReport::Send).await;
        return Ok(());
    }

    eprintln!("   Interval: {}s (Ctrl-C to stop)\n", config.run_interval.as_secs());
    let (handle, shutdown) = spawn_router_loop(processor, sink, config.run_interval);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown requested");
    shutdown.store(true, Ordering::Relaxed);
    handle.abort();
    let _ = handle.await;

    Ok(())
}

/// Console logging, plus a daily-rolling file when `ROUTER_LOG_DIR` is set.
fn init_tracing(config: &RouterConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer().with_target(false);

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(file)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .init();
            None
        }
    }
}
