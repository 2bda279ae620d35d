// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{counter, describe_counter, describe_histogram, histogram};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
use crate::{counter, describe_counter, describe_histogram, histogram};

/// Registers descriptions for every metric the router emits. Call once at startup.
pub fn describe_metrics() {
    describe_counter!("router_route_queries_total", "best_paths calls.");
    describe_counter!(
        "router_route_misses_total",
        "best_paths calls that returned an empty path."
    );
    describe_histogram!(
        "router_search_duration_ms",
        "Wall time of one best-path search in milliseconds."
    );
    describe_counter!(
        "router_logs_applied_total",
        "Logs that changed at least one edge, by chain."
    );
    describe_counter!(
        "router_logs_skipped_total",
        "Logs ignored or rejected during dispatch, by chain and reason."
    );
    describe_counter!(
        "router_ingestion_retries_total",
        "Failed block-range fetches that were retried, by chain."
    );
    describe_counter!(
        "router_discovered_pools_total",
        "Pools found during discovery, by adapter."
    );
}

// --- Helper functions to update metrics ---

pub fn record_route_query(duration: std::time::Duration, found: bool) {
    counter!("router_route_queries_total", 1);
    if !found {
        counter!("router_route_misses_total", 1);
    }
    histogram!("router_search_duration_ms", duration.as_secs_f64() * 1000.0);
}

pub fn increment_logs_applied(chain: &str) {
    counter!("router_logs_applied_total", 1, "chain" => chain.to_string());
}

pub fn increment_logs_skipped(chain: &str, reason: &'static str) {
    counter!("router_logs_skipped_total", 1, "chain" => chain.to_string(), "reason" => reason);
}

pub fn increment_ingestion_retries(chain: &str) {
    counter!("router_ingestion_retries_total", 1, "chain" => chain.to_string());
}

pub fn increment_discovered_pools(adapter: &str, count: u64) {
    counter!("router_discovered_pools_total", count, "adapter" => adapter.to_string());
}
