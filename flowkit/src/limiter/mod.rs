//! Leaky-bucket rate limiting.
//!
//! [`RateLimiter`] owns a bucket and the background worker that drains it. Each
//! admitted call adds one drop to the bucket; the worker removes one drop every
//! `period / limit`. Calls are admitted while the bucket is below capacity. By default the bucket
//! holds one drop and admissions are at least one leak interval apart, so any window of one
//! `period` admits at most `limit` calls. An explicit capacity allows bursts on top of that.

mod bucket;
mod rate_limiter;
mod worker;

pub use bucket::LimiterState;
pub use rate_limiter::{RateLimiter, RateLimiterHandle};
