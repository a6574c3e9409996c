// Metrics and observability module
// This file handles collection and reporting of venue call latency,
// venue failures and route selection outcomes for the aggregator
//
// Numan Thabit 2025 Nov

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

pub static VENUE_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "aggr_venue_quote_latency_seconds",
        "latency of venue quote calls",
        &["venue", "outcome"]
    )
    .unwrap()
});

pub static VENUE_ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "aggr_venue_errors_total",
        "venue quote failures by kind",
        &["venue", "kind"]
    )
    .unwrap()
});

pub static ROUTES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "aggr_routes_total",
        "quote requests by outcome",
        &["outcome"]
    )
    .unwrap()
});

pub static POOL_UPDATES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "aggr_pool_updates_total",
        "pool state updates seen by the in-memory price source",
        &["venue"]
    )
    .unwrap()
});

/// Render the default registry in the prometheus text format.
pub fn render() -> Result<String, prometheus::Error> {
    let families = prometheus::gather();
    let mut buf = Vec::new();
    TextEncoder::new().encode(&families, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
