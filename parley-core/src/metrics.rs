// ABOUTME: Prometheus metrics for routing, dispatch and reminders.
// ABOUTME: Recording is always safe; nothing is exported until init_metrics installs a listener.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter with an HTTP listener on `listen`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(listen: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(listen)
        .install()
        .context("Failed to install Prometheus exporter")?;
    tracing::info!(listen = %listen, "Metrics exporter listening");
    Ok(())
}

pub fn record_message_posted(sender: &str) {
    let kind = match sender {
        "human" | "system" => sender.to_string(),
        _ => "agent".to_string(),
    };
    metrics::counter!("parley_messages_posted_total", "sender" => kind).increment(1);
}

pub fn record_message_rejected() {
    metrics::counter!("parley_messages_rejected_total").increment(1);
}

pub fn record_dispatch(agent: &str) {
    metrics::counter!("parley_dispatches_total", "agent" => agent.to_string()).increment(1);
}

pub fn record_dispatch_failure(agent: &str) {
    metrics::counter!("parley_dispatch_failures_total", "agent" => agent.to_string()).increment(1);
}

pub fn record_reminder_added(kind: &'static str) {
    metrics::counter!("parley_reminders_added_total", "kind" => kind).increment(1);
}

pub fn record_reminder_fired(kind: &'static str) {
    metrics::counter!("parley_reminders_fired_total", "kind" => kind).increment(1);
}

pub fn record_reminder_cancelled() {
    metrics::counter!("parley_reminders_cancelled_total").increment(1);
}

pub fn set_registered_agents(count: usize) {
    metrics::gauge!("parley_registered_agents").set(count as f64);
}

pub fn set_active_reminders(count: usize) {
    metrics::gauge!("parley_active_reminders").set(count as f64);
}

pub fn record_error(kind: &'static str) {
    metrics::counter!("parley_errors_total", "kind" => kind).increment(1);
}
