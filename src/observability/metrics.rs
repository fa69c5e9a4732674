//! Metrics collection and exposition.
//!
//! # Metrics
//! - `monarch_worker_launches_total` (counter): successful spawns
//! - `monarch_worker_launch_failures_total` (counter): failed spawns
//! - `monarch_worker_exits_total` (counter): worker exits by `kind` (deliberate, unsolicited)
//! - `monarch_worker_escalations_total` (counter): SIGKILLs after an ignored SIGTERM
//! - `monarch_supervisor_fatal_total` (counter): supervision stopped for good
//! - `monarch_supervisor_budget_remaining` (gauge): launch attempts left
//!
//! Recording is a no-op until a recorder is installed, so the supervisor
//! records unconditionally and the exporter stays optional.

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
///
/// Must run inside a tokio runtime; the HTTP listener is spawned onto it.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    register_metrics();
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

fn register_metrics() {
    describe_counter!("monarch_worker_launches_total", "Worker processes spawned");
    describe_counter!(
        "monarch_worker_launch_failures_total",
        "Worker spawn attempts that failed"
    );
    describe_counter!("monarch_worker_exits_total", "Worker exits by kind");
    describe_counter!(
        "monarch_worker_escalations_total",
        "Workers killed forcefully after ignoring SIGTERM"
    );
    describe_counter!(
        "monarch_supervisor_fatal_total",
        "Times supervision stopped on a fatal condition"
    );
    describe_gauge!(
        "monarch_supervisor_budget_remaining",
        "Launch attempts left before supervision stops"
    );
}

pub fn record_launch() {
    counter!("monarch_worker_launches_total").increment(1);
}

pub fn record_launch_failure() {
    counter!("monarch_worker_launch_failures_total").increment(1);
}

pub fn record_exit(deliberate: bool) {
    let kind = if deliberate { "deliberate" } else { "unsolicited" };
    counter!("monarch_worker_exits_total", "kind" => kind).increment(1);
}

pub fn record_escalation() {
    counter!("monarch_worker_escalations_total").increment(1);
}

pub fn record_fatal() {
    counter!("monarch_supervisor_fatal_total").increment(1);
}

pub fn record_budget(remaining: u32) {
    gauge!("monarch_supervisor_budget_remaining").set(f64::from(remaining));
}
