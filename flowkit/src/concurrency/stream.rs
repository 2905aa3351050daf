//! Typed single-producer channels and cancellation-aware stream adapters.
//!
//! A stream is a bounded Tokio `mpsc` channel split into a [`StreamTx`] held by the producing
//! task and a [`StreamRx`] handed to the consumer. Only the producer can close a stream, by
//! dropping its sender after its last send; the receiving half exposes no way to close it.

use core::pin::Pin;
use core::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::{FutureExt, Stream, ready};
use pin_project_lite::pin_project;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

use crate::concurrency::signal::SignalRx;

/// Default stream capacity. One slot is the closest Tokio gets to an unbuffered channel.
pub const DEFAULT_STREAM_CAPACITY: usize = 1;

/// Outcome of [`StreamTx::send_or_cancel`].
#[derive(Debug, PartialEq, Eq)]
pub enum SendOutcome<T> {
    /// The value was delivered to the channel.
    Sent,
    /// The cancellation signal fired first; the value is handed back.
    Cancelled(T),
    /// The receiver is gone; the value is handed back.
    Closed(T),
}

/// Outcome of [`StreamRx::recv_or_cancel`].
#[derive(Debug, PartialEq, Eq)]
pub enum RecvOutcome<T> {
    /// A value was received.
    Item(T),
    /// The cancellation signal fired first.
    Cancelled,
    /// The stream is closed and drained.
    Closed,
}

/// Sending half of a stream, owned by the producing task.
#[derive(Debug)]
pub struct StreamTx<T> {
    tx: mpsc::Sender<T>,
}

// Manual impl: a derive would require `T: Clone`.
impl<T> Clone for StreamTx<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> StreamTx<T> {
    /// Sends `value`, waiting for capacity, unless `done` fires first.
    ///
    /// Cancellation is checked before the channel, so a fired signal wins even when capacity is
    /// available.
    pub async fn send_or_cancel(&self, done: &SignalRx, value: T) -> SendOutcome<T> {
        let permit = tokio::select! {
            biased;

            _ = done.fired() => return SendOutcome::Cancelled(value),
            permit = self.tx.reserve() => permit,
        };

        match permit {
            Ok(permit) => {
                permit.send(value);
                SendOutcome::Sent
            }
            Err(_) => SendOutcome::Closed(value),
        }
    }

    /// Sends `value`, waiting for capacity. Returns the value back if the receiver is gone.
    pub async fn send(&self, value: T) -> Result<(), T> {
        self.tx.send(value).await.map_err(|err| err.0)
    }

    /// Sends `value` only if capacity is available right now.
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        self.tx.try_send(value)
    }

    /// Returns `true` once the receiver has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Completes when the receiver has been dropped.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Receiving half of a stream.
///
/// Also a [`futures::Stream`], so the usual `StreamExt` adapters apply.
#[derive(Debug)]
pub struct StreamRx<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> StreamRx<T> {
    /// Receives the next value, or `None` once the stream is closed and drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Receives the next value unless `done` fires first.
    pub async fn recv_or_cancel(&mut self, done: &SignalRx) -> RecvOutcome<T> {
        tokio::select! {
            biased;

            _ = done.fired() => RecvOutcome::Cancelled,
            item = self.rx.recv() => match item {
                Some(item) => RecvOutcome::Item(item),
                None => RecvOutcome::Closed,
            },
        }
    }

    /// Receives a value only if one is buffered right now.
    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        self.rx.try_recv()
    }

    /// Returns `true` once the producer is gone and every buffered value was received.
    pub fn is_terminated(&self) -> bool {
        self.rx.is_closed() && self.rx.is_empty()
    }

    /// Returns the number of values buffered in the channel.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns `true` if no values are buffered.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Wraps this stream so that it ends as soon as `done` fires.
    pub fn take_until(self, done: SignalRx) -> TakeUntil<Self> {
        TakeUntil::new(self, done)
    }
}

impl<T> Stream for StreamRx<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

/// Creates a stream with room for `capacity` buffered values.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn channel<T>(capacity: usize) -> (StreamTx<T>, StreamRx<T>) {
    assert!(capacity > 0, "stream capacity must be greater than 0");

    let (tx, rx) = mpsc::channel(capacity);
    (StreamTx { tx }, StreamRx { rx })
}

pin_project! {
    /// A stream adapter that ends when a cancellation signal fires.
    ///
    /// The signal is checked before every poll of the inner stream, so buffered items are not
    /// drained after cancellation. Needs no task of its own.
    #[must_use = "streams do nothing unless polled"]
    pub struct TakeUntil<S> {
        #[pin]
        stream: S,
        done: BoxFuture<'static, ()>,
        finished: bool,
    }
}

impl<S> TakeUntil<S> {
    /// Creates a new [`TakeUntil`] wrapping `stream`.
    pub fn new(stream: S, done: SignalRx) -> Self {
        Self {
            stream,
            done: async move { done.fired().await }.boxed(),
            finished: false,
        }
    }
}

impl<S: Stream> Stream for TakeUntil<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        if *this.finished {
            return Poll::Ready(None);
        }

        if this.done.as_mut().poll(cx).is_ready() {
            *this.finished = true;
            return Poll::Ready(None);
        }

        match ready!(this.stream.poll_next(cx)) {
            Some(item) => Poll::Ready(Some(item)),
            None => {
                *this.finished = true;
                Poll::Ready(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;
    use tokio::time::timeout;

    use super::*;
    use crate::concurrency::signal::create_signal;

    #[tokio::test]
    async fn closing_the_sender_ends_the_stream() {
        let (tx, mut rx) = channel(2);
        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();
        drop(tx);

        assert_eq!(rx.recv().await, Some(1));
        assert!(!rx.is_terminated());
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, None);
        assert!(rx.is_terminated());
    }

    #[tokio::test]
    async fn send_prefers_cancellation() {
        let (done_tx, done) = create_signal();
        let (tx, mut rx) = channel(1);

        done_tx.fire();
        assert_eq!(tx.send_or_cancel(&done, 7).await, SendOutcome::Cancelled(7));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_send_is_cancelled() {
        let (done_tx, done) = create_signal();
        let (tx, _rx) = channel(1);
        tx.send(1).await.unwrap();

        let sender = tokio::spawn(async move { tx.send_or_cancel(&done, 2).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        done_tx.fire();

        assert_eq!(sender.await.unwrap(), SendOutcome::Cancelled(2));
    }

    #[tokio::test]
    async fn send_to_dropped_receiver_is_closed() {
        let (_done_tx, done) = create_signal();
        let (tx, rx) = channel(1);
        drop(rx);

        assert!(tx.is_closed());
        assert_eq!(tx.send_or_cancel(&done, 3).await, SendOutcome::Closed(3));
    }

    #[tokio::test]
    async fn recv_reports_every_outcome() {
        let (done_tx, done) = create_signal();
        let (tx, mut rx) = channel(1);

        tx.send(5).await.unwrap();
        assert_eq!(rx.recv_or_cancel(&done).await, RecvOutcome::Item(5));

        drop(tx);
        assert_eq!(rx.recv_or_cancel(&done).await, RecvOutcome::Closed);

        done_tx.fire();
        assert_eq!(rx.recv_or_cancel(&done).await, RecvOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn take_until_stops_without_draining() {
        let (done_tx, done) = create_signal();
        let (tx, rx) = channel(4);
        let mut stream = rx.take_until(done);

        tx.send(1).await.unwrap();
        assert_eq!(stream.next().await, Some(1));

        tx.send(2).await.unwrap();
        done_tx.fire();
        assert_eq!(stream.next().await, None);
        assert_eq!(stream.next().await, None);

        // The producer is still alive, but the adapter no longer waits on it.
        assert!(
            timeout(Duration::from_secs(1), stream.next())
                .await
                .is_ok()
        );
    }

    #[test]
    #[should_panic(expected = "stream capacity must be greater than 0")]
    fn zero_capacity_panics() {
        let _ = channel::<u8>(0);
    }
}
