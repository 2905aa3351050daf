use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Lifecycle of a rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterState {
    /// The leak worker is running and calls may be admitted.
    Running,
    /// The limiter was shut down; every call is rejected.
    Stopped,
}

#[derive(Debug)]
struct BucketState {
    level: u32,
    lifecycle: LimiterState,
    last_admitted: Option<Instant>,
}

/// Fill level of a leaky bucket, shared by the limiter, its handles and the leak worker.
///
/// Two admissions are never closer than `spacing`, whatever the fill level.
#[derive(Debug)]
pub(crate) struct Bucket {
    capacity: u32,
    spacing: Duration,
    state: Mutex<BucketState>,
}

impl Bucket {
    pub(crate) fn new(capacity: u32, spacing: Duration) -> Self {
        Self {
            capacity,
            spacing,
            state: Mutex::new(BucketState {
                level: 0,
                lifecycle: LimiterState::Running,
                last_admitted: None,
            }),
        }
    }

    /// Adds a drop if the bucket is running, below capacity and past the spacing of the last
    /// admission.
    pub(crate) fn try_admit(&self) -> bool {
        let now = Instant::now();
        let mut state = self.lock();
        if state.lifecycle == LimiterState::Stopped || state.level >= self.capacity {
            return false;
        }

        if let Some(last_admitted) = state.last_admitted {
            if now.saturating_duration_since(last_admitted) < self.spacing {
                return false;
            }
        }

        state.level += 1;
        state.last_admitted = Some(now);
        true
    }

    /// Removes one drop and returns the new level.
    pub(crate) fn leak(&self) -> u32 {
        let mut state = self.lock();
        state.level = state.level.saturating_sub(1);
        state.level
    }

    pub(crate) fn stop(&self) {
        self.lock().lifecycle = LimiterState::Stopped;
    }

    pub(crate) fn state(&self) -> LimiterState {
        self.lock().lifecycle
    }

    pub(crate) fn level(&self) -> u32 {
        self.lock().level
    }

    pub(crate) fn capacity(&self) -> u32 {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
