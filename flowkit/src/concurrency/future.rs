use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use pin_project_lite::pin_project;

use crate::error::{ErrorKind, FlowResult, panic_message};
use crate::flow_error;

pin_project! {
    /// Future adapter that gracefully handles optional inner futures.
    ///
    /// Resolves to the inner future output when provided and stays pending forever otherwise,
    /// which lets a `tokio::select!` branch exist conditionally.
    #[derive(Debug)]
    #[must_use = "futures do nothing unless polled"]
    pub struct OptionalFuture<F> {
        #[pin]
        inner: Option<F>,
    }
}

impl<F> OptionalFuture<F> {
    /// Creates a new [`OptionalFuture`] wrapping the given `inner` future.
    pub const fn new(inner: Option<F>) -> Self {
        Self { inner }
    }

    /// Returns `true` if an inner future is present.
    pub fn is_some(&self) -> bool {
        self.inner.is_some()
    }
}

impl<F> Future for OptionalFuture<F>
where
    F: Future,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();
        match this.inner.as_mut().as_pin_mut() {
            Some(inner) => inner.poll(cx),
            None => Poll::Pending,
        }
    }
}

/// Helper for constructing an [`OptionalFuture`] without naming the type.
#[inline]
pub fn optional_future<F>(inner: Option<F>) -> OptionalFuture<F> {
    OptionalFuture::new(inner)
}

/// Runs `future` to completion and converts a panic into [`ErrorKind::TaskPanicked`].
///
/// The panic message becomes the error detail.
pub async fn catch_panic<F, T>(future: F) -> FlowResult<T>
where
    F: Future<Output = FlowResult<T>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(flow_error!(
            ErrorKind::TaskPanicked,
            "Task panicked",
            panic_message(payload.as_ref())
        )),
    }
}
