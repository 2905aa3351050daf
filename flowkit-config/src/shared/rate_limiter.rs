use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Configuration for the leaky-bucket rate limiter.
///
/// The limiter leaks one admission every `period_ms / limit` milliseconds. Without an explicit
/// `capacity` it holds a single drop and spaces admissions one leak interval apart, so no window
/// of one period sees more than `limit` admissions. Setting `capacity` opts into bursts of that
/// size, and a window may then see up to `capacity + limit` admissions.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RateLimiterConfig {
    /// Number of admissions per period.
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Length of the period in milliseconds.
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
    /// Burst size. Unset means no bursts.
    #[serde(default)]
    pub capacity: Option<u32>,
}

impl RateLimiterConfig {
    /// Default number of admissions per period.
    pub const DEFAULT_LIMIT: u32 = 10;

    /// Default period: one second.
    pub const DEFAULT_PERIOD_MS: u64 = 1_000;

    /// Shortest leak interval accepted, the resolution of the runtime's timer.
    pub const MIN_LEAK_INTERVAL: Duration = Duration::from_millis(1);

    /// Creates a configuration admitting `limit` calls per `period`.
    ///
    /// `period` is kept at millisecond precision and saturates at `u64::MAX` milliseconds.
    pub fn new(limit: u32, period: Duration) -> Self {
        Self {
            limit,
            period_ms: u64::try_from(period.as_millis()).unwrap_or(u64::MAX),
            capacity: None,
        }
    }

    /// Returns a copy that allows bursts of `capacity` calls.
    ///
    /// A burst lets a single period admit up to `capacity + limit` calls.
    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Returns the bucket size, 1 unless a burst was configured.
    pub fn capacity(&self) -> u32 {
        self.capacity.unwrap_or(1)
    }

    /// Returns the period as a [`Duration`].
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    /// Returns the interval between two leaks, `period / limit` rounded up to the nanosecond.
    ///
    /// Rounding up keeps `limit` leak intervals at least one period long. Returns
    /// [`Duration::ZERO`] when `limit` is zero; [`RateLimiterConfig::validate`] rejects that case.
    pub fn leak_interval(&self) -> Duration {
        if self.limit == 0 {
            return Duration::ZERO;
        }

        let nanos = self.period().as_nanos().div_ceil(u128::from(self.limit));
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Returns the minimum gap between two admissions.
    ///
    /// One leak interval without a burst, zero once a `capacity` is set.
    pub fn min_spacing(&self) -> Duration {
        match self.capacity {
            None => self.leak_interval(),
            Some(_) => Duration::ZERO,
        }
    }

    /// Validates rate limiter configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.limit == 0 {
            return Err(ValidationError::invalid(
                "rate_limiter.limit",
                "must be greater than 0",
            ));
        }

        if self.period_ms == 0 {
            return Err(ValidationError::invalid(
                "rate_limiter.period_ms",
                "must be greater than 0",
            ));
        }

        if self.leak_interval() < Self::MIN_LEAK_INTERVAL {
            return Err(ValidationError::invalid(
                "rate_limiter.limit",
                "must not exceed period_ms (at most one leak per millisecond)",
            ));
        }

        if self.capacity == Some(0) {
            return Err(ValidationError::invalid(
                "rate_limiter.capacity",
                "must be greater than 0 when set",
            ));
        }

        Ok(())
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            period_ms: default_period_ms(),
            capacity: None,
        }
    }
}

fn default_limit() -> u32 {
    RateLimiterConfig::DEFAULT_LIMIT
}

fn default_period_ms() -> u64 {
    RateLimiterConfig::DEFAULT_PERIOD_MS
}
