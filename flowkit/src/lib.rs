//! Composable concurrency primitives over typed Tokio channels.
//!
//! - [`combinators`]: merge, split, bridge, race and cancellable forwarding of streams, plus the
//!   generator and mapping stages that feed and drain pipelines.
//! - [`sync`]: counting semaphore, cyclic barrier, single-flight, promises and the fail-fast
//!   error group.
//! - [`limiter`]: a leaky-bucket rate limiter driven by a background worker.
//! - [`concurrency`]: the signals, streams and timers everything else is built from.
//!
//! Components that spawn tasks must be used inside a Tokio runtime. Every long-lived task takes a
//! cancellation signal, so firing it (or dropping its sender) releases the task.

pub mod combinators;
pub mod concurrency;
pub mod error;
pub mod limiter;
mod macros;
pub mod metrics;
pub mod sync;
