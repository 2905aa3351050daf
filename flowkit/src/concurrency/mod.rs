//! Building blocks shared by every flowkit component.
//!
//! - [`signal`]: one-shot, idempotent cancellation signals.
//! - [`stream`]: single-producer typed channels with cancellable send and receive.
//! - [`timer`]: timer-backed signals and an arm-on-demand deadline.
//! - [`future`]: small future adapters used inside `tokio::select!`.
//!
//! Every blocking point in a cancellable stage races its cancellation signal with the
//! cancellation branch polled first, so a fired signal is never starved by ready data.

pub mod future;
pub mod signal;
pub mod stream;
pub mod timer;
