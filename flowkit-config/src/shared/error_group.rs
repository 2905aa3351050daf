use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Configuration for fail-fast task groups.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ErrorGroupConfig {
    /// Maximum number of tasks running at the same time. Unbounded when unset.
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    /// Grace period, in milliseconds, that tasks still running after the first failure get
    /// before they are aborted. When unset, waiting blocks until every task exits on its own.
    #[serde(default)]
    pub abort_after_ms: Option<u64>,
}

impl ErrorGroupConfig {
    /// Returns the grace period as a [`Duration`], if configured.
    pub fn abort_after(&self) -> Option<Duration> {
        self.abort_after_ms.map(Duration::from_millis)
    }

    /// Validates error group configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_concurrency == Some(0) {
            return Err(ValidationError::invalid(
                "error_group.max_concurrency",
                "must be greater than 0 when set",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unbounded_without_grace() {
        let config: ErrorGroupConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ErrorGroupConfig::default());
        assert_eq!(config.abort_after(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config = ErrorGroupConfig {
            max_concurrency: Some(0),
            abort_after_ms: Some(10),
        };
        assert!(config.validate().is_err());
    }
}
