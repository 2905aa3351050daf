//! Synchronization utilities.
//!
//! Unlike the stream combinators these do not spawn tasks of their own, except where noted:
//! [`Deferred::then`] spawns its continuation task and [`ErrorGroup`] owns the tasks it runs.

mod barrier;
mod error_group;
mod promise;
mod semaphore;
mod single_flight;

pub use barrier::{Barrier, BarrierWaitResult};
pub use error_group::ErrorGroup;
pub use promise::{Deferred, OnceDeferred, OncePromise, Promise, oneshot, promise};
pub use semaphore::{Permit, Semaphore};
pub use single_flight::SingleFlight;
