//! Exporter self-instrumentation.
//!
//! These describe the exporter, not the appliances. They are recorded through
//! the `metrics` facade and are no-ops until a recorder is installed.

use crate::client::Resource;
use metrics::{counter, describe_counter, describe_histogram, histogram};

pub const TICKS: &str = "adguard_exporter_ticks_total";
pub const FETCH_DURATION: &str = "adguard_exporter_fetch_duration_seconds";
pub const FETCH_FAILURES: &str = "adguard_exporter_fetch_failures_total";

pub const FETCH_DURATION_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Register all exporter metrics with descriptions.
pub fn register_exporter_metrics() {
    describe_counter!(TICKS, "Scheduler ticks fired");
    describe_histogram!(FETCH_DURATION, "Time spent fetching one resource from an appliance (by resource)");
    describe_counter!(FETCH_FAILURES, "Failed resource fetches (by resource)");
}

pub fn record_tick() {
    counter!(TICKS).increment(1);
}

pub fn record_fetch(resource: Resource, duration_secs: f64) {
    histogram!(FETCH_DURATION, "resource" => resource.as_str()).record(duration_secs);
}

pub fn record_fetch_failure(resource: Resource) {
    counter!(FETCH_FAILURES, "resource" => resource.as_str()).increment(1);
}
