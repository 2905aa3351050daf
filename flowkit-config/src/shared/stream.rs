use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Channel sizing for stream combinators.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StreamConfig {
    /// Number of values a combinator output can buffer before the producer waits.
    #[serde(default = "default_stream_capacity")]
    pub capacity: usize,
}

impl StreamConfig {
    /// Default output capacity. One slot is the closest Tokio gets to an unbuffered channel.
    pub const DEFAULT_CAPACITY: usize = 1;

    /// Validates stream configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.capacity == 0 {
            return Err(ValidationError::invalid(
                "stream.capacity",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            capacity: default_stream_capacity(),
        }
    }
}

fn default_stream_capacity() -> usize {
    StreamConfig::DEFAULT_CAPACITY
}

/// How a splitter distributes input values across its outputs.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SplitMode {
    /// Value `i` goes to output `i mod n`.
    #[default]
    RoundRobin,
    /// Every value goes to every output.
    Broadcast,
}

/// What a splitter does when an output has no free capacity.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LagPolicy {
    /// Wait for the slow consumer. In broadcast mode this throttles every consumer to the
    /// slowest one.
    #[default]
    Block,
    /// Skip the value for the full output and move on.
    DropNewest,
}

/// Configuration for fan-out splitters.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SplitConfig {
    /// Number of outputs to create.
    pub outputs: usize,
    /// Distribution policy.
    #[serde(default)]
    pub mode: SplitMode,
    /// Capacity of each output.
    #[serde(default = "default_stream_capacity")]
    pub capacity: usize,
    /// Behavior when an output is full.
    #[serde(default)]
    pub lag_policy: LagPolicy,
}

impl SplitConfig {
    /// Creates a round-robin configuration with `outputs` outputs.
    pub fn round_robin(outputs: usize) -> Self {
        Self {
            outputs,
            mode: SplitMode::RoundRobin,
            capacity: StreamConfig::DEFAULT_CAPACITY,
            lag_policy: LagPolicy::Block,
        }
    }

    /// Creates a broadcast configuration with `outputs` outputs.
    pub fn broadcast(outputs: usize) -> Self {
        Self {
            mode: SplitMode::Broadcast,
            ..Self::round_robin(outputs)
        }
    }

    /// Returns a copy with the given per-output capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Returns a copy with the given lag policy.
    pub fn with_lag_policy(mut self, lag_policy: LagPolicy) -> Self {
        self.lag_policy = lag_policy;
        self
    }

    /// Validates splitter configuration settings.
    ///
    /// Zero outputs is allowed and yields no streams.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.capacity == 0 {
            return Err(ValidationError::invalid(
                "split.capacity",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}
