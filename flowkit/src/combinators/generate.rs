use tracing::trace;

use crate::combinators::record_cancellation;
use crate::concurrency::signal::SignalRx;
use crate::concurrency::stream::{
    DEFAULT_STREAM_CAPACITY, RecvOutcome, SendOutcome, StreamRx, channel,
};

/// Emits the items of `items`, then closes.
pub fn generate<I>(done: &SignalRx, items: I) -> StreamRx<I::Item>
where
    I: IntoIterator,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
{
    let (tx, rx) = channel(DEFAULT_STREAM_CAPACITY);
    let done = done.clone();
    let items = items.into_iter();

    tokio::spawn(async move {
        let mut emitted = 0usize;

        for item in items {
            match tx.send_or_cancel(&done, item).await {
                SendOutcome::Sent => emitted += 1,
                SendOutcome::Cancelled(_) => {
                    record_cancellation("generate");
                    break;
                }
                SendOutcome::Closed(_) => break,
            }
        }

        trace!(emitted, "generator finished");
    });

    rx
}

/// Emits `f()` until `done` fires or the consumer goes away.
pub fn repeat_with<T, F>(done: &SignalRx, mut f: F) -> StreamRx<T>
where
    T: Send + 'static,
    F: FnMut() -> T + Send + 'static,
{
    let (tx, rx) = channel(DEFAULT_STREAM_CAPACITY);
    let done = done.clone();

    tokio::spawn(async move {
        loop {
            match tx.send_or_cancel(&done, f()).await {
                SendOutcome::Sent => {}
                SendOutcome::Cancelled(_) => {
                    record_cancellation("repeat");
                    break;
                }
                SendOutcome::Closed(_) => break,
            }
        }
    });

    rx
}

/// Forwards the first `count` values of `input`, then closes and releases `input`.
pub fn take<T>(done: &SignalRx, mut input: StreamRx<T>, count: usize) -> StreamRx<T>
where
    T: Send + 'static,
{
    let (tx, rx) = channel(DEFAULT_STREAM_CAPACITY);
    if count == 0 {
        return rx;
    }

    let done = done.clone();

    tokio::spawn(async move {
        for _ in 0..count {
            let item = match input.recv_or_cancel(&done).await {
                RecvOutcome::Item(item) => item,
                RecvOutcome::Cancelled => {
                    record_cancellation("take");
                    return;
                }
                RecvOutcome::Closed => return,
            };

            if let SendOutcome::Cancelled(_) | SendOutcome::Closed(_) =
                tx.send_or_cancel(&done, item).await
            {
                return;
            }
        }
    });

    rx
}
