//! Introspection metrics for observability
//!
//! Enable with the `metrics` feature flag. Requires a `metrics` recorder
//! to be installed (e.g., via `metrics-exporter-prometheus`).
//!
//! ## Metrics Provided
//!
//! - `introspect_cache_lookups_total` - Claims cache lookups (labels: result = hit, miss, error)
//! - `introspect_requests_total` - Calls to the introspection endpoint (labels: outcome)
//! - `introspect_single_flight_total` - Coordinated calls (labels: role = leader, follower)
//! - `introspect_authenticate_total` - Authentication results (labels: outcome)
//! - `introspect_request_duration_seconds` - Histogram of introspection call latency
//!
//! ## Example
//!
//! ```rust
//! use bearer_introspect::init_introspection_metrics;
//!
//! // Initialize metric descriptions once at startup
//! init_introspection_metrics();
//! ```

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_histogram, histogram};

#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static INIT: Once = Once::new();

/// Initialize metric descriptions. Call once at startup.
///
/// Idempotent: only the first call registers the descriptions.
#[cfg(feature = "metrics")]
pub fn init_introspection_metrics() {
    INIT.call_once(|| {
        describe_counter!(
            "introspect_cache_lookups_total",
            "Claims cache lookups by result"
        );
        describe_counter!(
            "introspect_requests_total",
            "Calls to the introspection endpoint by outcome"
        );
        describe_counter!(
            "introspect_single_flight_total",
            "Coordinated introspections by role (leader started a flight, follower joined one)"
        );
        describe_counter!(
            "introspect_authenticate_total",
            "Authentication results by outcome"
        );
        describe_histogram!(
            "introspect_request_duration_seconds",
            "Introspection endpoint call duration in seconds"
        );
    });
}

/// Record a claims cache lookup (`hit`, `miss`, or `error`)
#[cfg(feature = "metrics")]
pub(crate) fn record_cache_lookup(result: &'static str) {
    counter!("introspect_cache_lookups_total", "result" => result).increment(1);
}

/// Record one introspection call and its duration
#[cfg(feature = "metrics")]
pub(crate) fn record_introspection(outcome: &'static str, duration_seconds: f64) {
    counter!("introspect_requests_total", "outcome" => outcome).increment(1);
    histogram!("introspect_request_duration_seconds").record(duration_seconds);
}

/// Record whether a coordinated call started a flight or joined one
#[cfg(feature = "metrics")]
pub(crate) fn record_single_flight(leader: bool) {
    let role = if leader { "leader" } else { "follower" };
    counter!("introspect_single_flight_total", "role" => role).increment(1);
}

/// Record an authentication result (`skipped`, `authenticated`, or `failed`)
#[cfg(feature = "metrics")]
pub(crate) fn record_authenticate(outcome: &'static str) {
    counter!("introspect_authenticate_total", "outcome" => outcome).increment(1);
}

// No-op versions when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
#[allow(missing_docs)]
pub fn init_introspection_metrics() {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_cache_lookup(_result: &'static str) {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_introspection(_outcome: &'static str, _duration_seconds: f64) {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_single_flight(_leader: bool) {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_authenticate(_outcome: &'static str) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_introspection_metrics();
        init_introspection_metrics();
    }

    #[test]
    fn test_record_functions_do_not_panic() {
        record_cache_lookup("hit");
        record_cache_lookup("miss");
        record_introspection("active", 0.012);
        record_single_flight(true);
        record_single_flight(false);
        record_authenticate("failed");
    }
}
