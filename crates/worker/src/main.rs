//! Command-line draw.
//!
//! `xbuddy-worker <roster.json>` (or `ROSTER_PATH`) loads a roster, runs the
//! draw, prints the pairs as JSON and waits for the notifications to go out.
//! Ctrl-C abandons whatever is still queued.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use xbuddy_core::AssignmentEngine;
use xbuddy_events::{LogSender, MessageSender, NotificationDispatcher, ShutdownMode, SmtpSender};
use xbuddy_worker::{DrawWorkflow, InMemoryGroupStore, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xbuddy_worker=debug,xbuddy_events=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env();

    let roster_path: PathBuf = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("ROSTER_PATH").map(PathBuf::from))
        .context("usage: xbuddy-worker <roster.json> (or set ROSTER_PATH)")?;

    let group = xbuddy_worker::roster_file::load(&roster_path)
        .await
        .with_context(|| format!("loading roster {}", roster_path.display()))?;
    let group_id = group.id;

    let sender: Arc<dyn MessageSender> = match &config.email {
        Some(email) => Arc::new(SmtpSender::new(email).context("configuring SMTP")?),
        None => {
            tracing::warn!("SMTP_HOST is not set; notifications will only be logged");
            Arc::new(LogSender)
        }
    };

    let dispatcher = NotificationDispatcher::start(config.dispatcher.clone(), sender);

    let store = Arc::new(InMemoryGroupStore::new());
    store.insert(group).await;

    let workflow = DrawWorkflow::new(
        store,
        dispatcher.handle(),
        AssignmentEngine::new(config.draw_max_attempts),
        config.frontend_url.clone(),
    );

    let summary = match workflow.run_draw(group_id).await {
        Ok(summary) => summary,
        Err(e) => {
            dispatcher.shutdown(ShutdownMode::Drain).await;
            return Err(e).context("draw failed");
        }
    };

    println!("{}", serde_json::to_string_pretty(&summary.pairs)?);

    let queued = summary.notifications.report();
    tracing::info!(
        group = %summary.group_name,
        notifications = queued.total,
        "Waiting for notifications"
    );

    tokio::select! {
        report = summary.notifications.wait() => {
            tracing::info!(
                group = %summary.group_name,
                delivered = report.delivered,
                failed = report.failed,
                "Notifications finished"
            );
            dispatcher.shutdown(ShutdownMode::Drain).await;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted; abandoning pending notifications");
            dispatcher.shutdown(ShutdownMode::Abandon).await;
        }
    }

    Ok(())
}
