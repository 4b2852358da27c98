use anyhow::Context;
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus HTTP exporter on the given port.
/// After this call, any metrics recorded via the `metrics` crate
/// macros (counter!, gauge!) are automatically exported at /metrics.
/// Without an exporter the macros are no-ops.
pub fn init_metrics_server(port: u16) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("failed to start Prometheus metrics server")
}

// ── Source metrics ───────────────────────────────────────────────

/// `source` is one of cache, remote, stale, default.
pub fn record_rate_lookup(source: &'static str) {
    counter!("ticker_rate_lookups_total", "source" => source).increment(1);
}

pub fn record_rate(rate: f64) {
    gauge!("ticker_exchange_rate").set(rate);
}

/// `source` is one of primary, secondary, failed.
pub fn record_price_fetch(source: &'static str) {
    counter!("ticker_price_fetches_total", "source" => source).increment(1);
}

// ── Cycle metrics ────────────────────────────────────────────────

pub fn record_cycle(outcome: &'static str) {
    counter!("ticker_cycles_total", "outcome" => outcome).increment(1);
}

pub fn record_total_value(total: f64) {
    gauge!("ticker_total_value_local").set(total);
}
