//! Metrics definitions for the history service.
//!
//! This module defines all metrics used throughout the service.
//! Metrics are collected using the `metrics` crate and can be exported
//! to Prometheus via `metrics-exporter-prometheus`.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Instant;

/// Initialize all metric descriptions.
/// Call this once at startup before any metrics are recorded.
pub fn init_metrics() {
    describe_counter!(
        "history_pages_served_total",
        "Total number of history pages returned to clients"
    );
    describe_counter!(
        "history_empty_pages_total",
        "Total number of served pages that held no records"
    );
    describe_counter!(
        "history_gone_total",
        "Total number of requests rejected because they predate retained history"
    );
    describe_counter!(
        "history_rejected_requests_total",
        "Total number of requests rejected for malformed paging parameters"
    );
    describe_histogram!(
        "history_page_query_duration_seconds",
        "Time spent in storage serving one page, in seconds"
    );
    describe_gauge!(
        "history_latest_ledger",
        "Newest ledger sequence visible to queries"
    );
    describe_gauge!(
        "history_elder_ledger",
        "Oldest ledger sequence still retained"
    );
}

/// Record a served page.
///
/// # Arguments
/// * `resource` - The collection paged ("ledgers", "operations", ...)
/// * `rows` - Number of records on the page
pub fn record_page_served(resource: &'static str, rows: usize) {
    counter!("history_pages_served_total", "resource" => resource).increment(1);
    if rows == 0 {
        counter!("history_empty_pages_total", "resource" => resource).increment(1);
    }
}

/// Record a request refused because its cursor predates the window.
pub fn record_gone(resource: &'static str) {
    counter!("history_gone_total", "resource" => resource).increment(1);
}

/// Record a request refused for bad paging input.
///
/// # Arguments
/// * `resource` - The collection paged
/// * `code` - Stable error code ("malformed_cursor", "invalid_limit", ...)
pub fn record_rejected(resource: &'static str, code: &'static str) {
    counter!("history_rejected_requests_total", "resource" => resource, "code" => code)
        .increment(1);
}

/// Publish the retained window as gauges.
pub fn record_history_range(elder: u32, latest: u32) {
    gauge!("history_elder_ledger").set(f64::from(elder));
    gauge!("history_latest_ledger").set(f64::from(latest));
}

/// A timer that records page query duration when dropped.
pub struct QueryTimer {
    resource: &'static str,
    start: Instant,
}

impl QueryTimer {
    /// Start a new query timer.
    pub fn new(resource: &'static str) -> Self {
        Self {
            resource,
            start: Instant::now(),
        }
    }
}

impl Drop for QueryTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        histogram!("history_page_query_duration_seconds", "resource" => self.resource)
            .record(duration);
    }
}
