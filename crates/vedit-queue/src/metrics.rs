//! Transport metrics.

use metrics::counter;

/// Metric names as constants for consistency.
pub mod names {
    pub const EVENTS_EMITTED_TOTAL: &str = "vedit_events_emitted_total";
    pub const EVENTS_DROPPED_TOTAL: &str = "vedit_events_dropped_total";
    pub const EVENTS_HANDLED_TOTAL: &str = "vedit_events_handled_total";
    pub const EVENTS_MALFORMED_TOTAL: &str = "vedit_events_malformed_total";
}

/// Record an event accepted by a transport.
pub fn record_emitted(transport: &str) {
    let labels = [("transport", transport.to_string())];
    counter!(names::EVENTS_EMITTED_TOTAL, &labels).increment(1);
}

/// Record an event dropped because the in-process queue was full.
pub fn record_dropped() {
    counter!(names::EVENTS_DROPPED_TOTAL).increment(1);
}

/// Record the final outcome of handling one event.
pub fn record_handled(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::EVENTS_HANDLED_TOTAL, &labels).increment(1);
}

/// Record a broker record whose payload could not be decoded.
pub fn record_malformed() {
    counter!(names::EVENTS_MALFORMED_TOTAL).increment(1);
}
