//! Metric names recorded by flowkit components.
//!
//! Values go through the [`metrics`] facade, so they are dropped unless the application installs
//! a recorder.

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge};

/// Label for the combinator or component emitting a metric.
pub const COMPONENT_LABEL: &str = "component";

/// Label for error kind in metrics.
pub const ERROR_KIND_LABEL: &str = "error_kind";

// Stream metrics

/// Counter for stages that stopped because their cancellation signal fired.
pub const FLOWKIT_STREAM_CANCELLATIONS_TOTAL: &str = "flowkit_stream_cancellations_total";

/// Counter for values a splitter skipped because an output was full.
pub const FLOWKIT_SPLIT_DROPPED_TOTAL: &str = "flowkit_split_dropped_total";

// Synchronization metrics

/// Counter for barrier generations that completed.
pub const FLOWKIT_BARRIER_TRIPS_TOTAL: &str = "flowkit_barrier_trips_total";

/// Counter for single-flight calls that executed their work.
pub const FLOWKIT_SINGLE_FLIGHT_EXECUTIONS_TOTAL: &str = "flowkit_single_flight_executions_total";

/// Counter for single-flight calls that joined an execution already in flight.
pub const FLOWKIT_SINGLE_FLIGHT_SHARED_TOTAL: &str = "flowkit_single_flight_shared_total";

/// Counter for error group tasks that failed.
pub const FLOWKIT_ERROR_GROUP_FAILURES_TOTAL: &str = "flowkit_error_group_failures_total";

// Rate limiter metrics

/// Counter for calls admitted by a rate limiter.
pub const FLOWKIT_RATE_LIMITER_ADMITTED_TOTAL: &str = "flowkit_rate_limiter_admitted_total";

/// Counter for calls rejected by a rate limiter.
pub const FLOWKIT_RATE_LIMITER_REJECTED_TOTAL: &str = "flowkit_rate_limiter_rejected_total";

/// Gauge for the current fill level of a rate limiter bucket.
pub const FLOWKIT_RATE_LIMITER_LEVEL: &str = "flowkit_rate_limiter_level";

static REGISTER_METRICS: Once = Once::new();

/// Registers descriptions for every flowkit metric with the installed recorder.
///
/// Only the first call has an effect; call it after installing the recorder.
pub fn register_metrics() {
    REGISTER_METRICS.call_once(|| {
        describe_counter!(
            FLOWKIT_STREAM_CANCELLATIONS_TOTAL,
            Unit::Count,
            "Stream stages stopped by their cancellation signal."
        );
        describe_counter!(
            FLOWKIT_SPLIT_DROPPED_TOTAL,
            Unit::Count,
            "Values skipped by a splitter because an output was full."
        );
        describe_counter!(
            FLOWKIT_BARRIER_TRIPS_TOTAL,
            Unit::Count,
            "Barrier generations completed."
        );
        describe_counter!(
            FLOWKIT_SINGLE_FLIGHT_EXECUTIONS_TOTAL,
            Unit::Count,
            "Single-flight calls that executed their work."
        );
        describe_counter!(
            FLOWKIT_SINGLE_FLIGHT_SHARED_TOTAL,
            Unit::Count,
            "Single-flight calls that received a shared result."
        );
        describe_counter!(
            FLOWKIT_ERROR_GROUP_FAILURES_TOTAL,
            Unit::Count,
            "Error group tasks that returned an error or panicked."
        );
        describe_counter!(
            FLOWKIT_RATE_LIMITER_ADMITTED_TOTAL,
            Unit::Count,
            "Calls admitted by a rate limiter."
        );
        describe_counter!(
            FLOWKIT_RATE_LIMITER_REJECTED_TOTAL,
            Unit::Count,
            "Calls rejected by a rate limiter."
        );
        describe_gauge!(
            FLOWKIT_RATE_LIMITER_LEVEL,
            Unit::Count,
            "Current fill level of a rate limiter bucket."
        );
    });
}
