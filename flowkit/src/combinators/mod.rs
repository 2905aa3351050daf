//! Stream combinators.
//!
//! Every combinator takes a cancellation signal `done` as its first argument and spawns the
//! tasks that drive it, so it must be called inside a Tokio runtime. Each task owns the senders
//! of the streams it produces and drops them exactly once, after its last send. Every blocking
//! send or receive races `done` with the cancellation branch polled first, so a fired signal
//! stops the stage even when its consumer or producer is stalled.

use metrics::counter;
use tracing::debug;

use crate::metrics::{COMPONENT_LABEL, FLOWKIT_STREAM_CANCELLATIONS_TOTAL};

mod bridge;
mod generate;
mod map;
mod merge;
mod or_done;
mod race;
mod split;

pub use bridge::bridge;
pub use generate::{generate, repeat_with, take};
pub use map::{map, map_bounded};
pub use merge::{merge, merge_with_capacity};
pub use or_done::{or_done, take_until};
pub use race::or;
pub use split::{round_robin, split, tee};

/// Records that the stage named `component` stopped because its cancellation signal fired.
pub(crate) fn record_cancellation(component: &'static str) {
    counter!(FLOWKIT_STREAM_CANCELLATIONS_TOTAL, COMPONENT_LABEL => component).increment(1);
    debug!(component, "stream stage cancelled");
}
