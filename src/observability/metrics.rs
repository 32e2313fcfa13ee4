//! Metrics collection and exposition.
//!
//! # Metrics
//! - `liveconf_fetch_total` (counter): fetches by location kind and outcome
//! - `liveconf_updates_total` (counter): snapshot replacements by loader
//! - `liveconf_parse_failures_total` (counter): rejected JSON payloads
//! - `liveconf_state_saves_total` (counter): state flushes by outcome

use ::metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Start the Prometheus exporter on `addr`. Needs a running Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_fetch(kind: &'static str, outcome: &'static str) {
    counter!("liveconf_fetch_total", "kind" => kind, "outcome" => outcome).increment(1);
}

pub fn record_update(loader: &'static str) {
    counter!("liveconf_updates_total", "loader" => loader).increment(1);
}

pub fn record_parse_failure() {
    counter!("liveconf_parse_failures_total").increment(1);
}

pub fn record_state_save(success: bool) {
    let outcome = if success { "ok" } else { "error" };
    counter!("liveconf_state_saves_total", "outcome" => outcome).increment(1);
}
