// ABOUTME: Prometheus metrics for sync passes, group membership changes, and the assistant
// ABOUTME: Metric name constants plus small recording helpers over the `metrics` facade

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

// Metric name constants to avoid typos across crates.

/// Reconciliation passes started (counter).
pub const SYNC_PASSES_TOTAL: &str = "sync_passes_total";
/// Events whose reconciliation failed (counter).
pub const SYNC_EVENT_FAILURES_TOTAL: &str = "sync_event_failures_total";
/// Members added to managed groups (counter).
pub const GROUP_MEMBERS_ADDED_TOTAL: &str = "group_members_added_total";
/// Members removed from managed groups (counter).
pub const GROUP_MEMBERS_REMOVED_TOTAL: &str = "group_members_removed_total";
/// Groups created (counter).
pub const GROUPS_CREATED_TOTAL: &str = "groups_created_total";
/// Groups currently managed in memory (gauge).
pub const MANAGED_GROUPS: &str = "managed_groups";
/// Wall time of a full reconciliation pass (histogram).
pub const SYNC_PASS_DURATION_SECONDS: &str = "sync_pass_duration_seconds";
/// Direct messages handled by the assistant (counter, labels: intent).
pub const ASSISTANT_MESSAGES_TOTAL: &str = "assistant_messages_total";
/// Collaborator calls that hit their deadline (counter, labels: call).
pub const COLLABORATOR_TIMEOUTS_TOTAL: &str = "collaborator_timeouts_total";

/// Install the Prometheus recorder with an HTTP listener on `port`.
///
/// Must be called from inside a tokio runtime, once, before any metrics are recorded.
pub fn init_metrics(port: u16) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    tracing::info!(%addr, "Prometheus metrics endpoint listening");
    Ok(())
}

pub fn record_sync_pass(duration: Duration) {
    ::metrics::counter!(SYNC_PASSES_TOTAL).increment(1);
    ::metrics::histogram!(SYNC_PASS_DURATION_SECONDS).record(duration.as_secs_f64());
}

pub fn record_event_failure() {
    ::metrics::counter!(SYNC_EVENT_FAILURES_TOTAL).increment(1);
}

pub fn record_members_added(count: usize) {
    ::metrics::counter!(GROUP_MEMBERS_ADDED_TOTAL).increment(count as u64);
}

pub fn record_members_removed(count: usize) {
    ::metrics::counter!(GROUP_MEMBERS_REMOVED_TOTAL).increment(count as u64);
}

pub fn record_group_created() {
    ::metrics::counter!(GROUPS_CREATED_TOTAL).increment(1);
}

pub fn set_managed_groups(count: usize) {
    ::metrics::gauge!(MANAGED_GROUPS).set(count as f64);
}

pub fn record_assistant_message(intent: &'static str) {
    ::metrics::counter!(ASSISTANT_MESSAGES_TOTAL, "intent" => intent).increment(1);
}

pub fn record_timeout(call: &'static str) {
    ::metrics::counter!(COLLABORATOR_TIMEOUTS_TOTAL, "call" => call).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_without_global_install() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = handle.render();
        assert!(output.is_empty() || output.contains('\n'));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_sync_pass(Duration::from_millis(5));
        record_members_added(3);
        record_assistant_message("recommend");
        record_timeout("send");
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            SYNC_PASSES_TOTAL,
            SYNC_EVENT_FAILURES_TOTAL,
            GROUP_MEMBERS_ADDED_TOTAL,
            GROUP_MEMBERS_REMOVED_TOTAL,
            GROUPS_CREATED_TOTAL,
            MANAGED_GROUPS,
            SYNC_PASS_DURATION_SECONDS,
            ASSISTANT_MESSAGES_TOTAL,
            COLLABORATOR_TIMEOUTS_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
