//! Tracing and metrics initialization shared by flowkit binaries and tests.

pub mod metrics;
pub mod tracing;
