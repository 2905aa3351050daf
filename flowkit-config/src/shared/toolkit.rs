use serde::{Deserialize, Serialize};

use crate::Config;
use crate::shared::{ErrorGroupConfig, RateLimiterConfig, StreamConfig, ValidationError};

/// Top-level configuration consumed by applications built on the toolkit.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ToolkitConfig {
    /// Sizing for combinator outputs.
    #[serde(default)]
    pub stream: StreamConfig,
    /// Admission rate for rate-limited stages.
    #[serde(default)]
    pub rate_limiter: RateLimiterConfig,
    /// Fail-fast group settings.
    #[serde(default)]
    pub error_group: ErrorGroupConfig,
    /// Number of concurrent workers in bounded stages.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

impl ToolkitConfig {
    /// Default number of concurrent workers in bounded stages.
    pub const DEFAULT_MAX_WORKERS: usize = 4;

    /// Validates every nested section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.stream.validate()?;
        self.rate_limiter.validate()?;
        self.error_group.validate()?;

        if self.max_workers == 0 {
            return Err(ValidationError::invalid(
                "max_workers",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Default for ToolkitConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            rate_limiter: RateLimiterConfig::default(),
            error_group: ErrorGroupConfig::default(),
            max_workers: default_max_workers(),
        }
    }
}

impl Config for ToolkitConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        Self::validate(self)
    }
}

fn default_max_workers() -> usize {
    ToolkitConfig::DEFAULT_MAX_WORKERS
}
