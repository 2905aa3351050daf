use tracing::trace;

use crate::concurrency::future::optional_future;
use crate::concurrency::signal::{SignalRx, create_signal};

/// Most inputs a single racing task waits on directly.
const FAN_IN: usize = 3;

/// Returns a signal that fires as soon as any of `signals` fires.
///
/// No task is spawned for zero or one input: zero inputs give [`SignalRx::never`] and one input
/// is returned unchanged. Receivers that can never fire are ignored, and an input that already
/// fired is returned directly.
///
/// Otherwise one task waits on up to three inputs. Longer lists are folded: the task races its
/// first three inputs against `or` of the remaining ones plus its own output, so every task
/// selects over at most four branches and the tail tasks exit as soon as the result fires.
///
/// A task racing only its direct inputs also exits once every receiver of the result is dropped.
///
/// # Panics
///
/// Panics if called outside of a Tokio runtime with two or more live inputs.
pub fn or(signals: Vec<SignalRx>) -> SignalRx {
    let mut signals: Vec<SignalRx> = signals
        .into_iter()
        .filter(|signal| !signal.is_never())
        .collect();

    if let Some(fired) = signals.iter().find(|signal| signal.is_fired()) {
        return fired.clone();
    }

    if signals.len() <= 1 {
        return signals.pop().unwrap_or_else(SignalRx::never);
    }

    let (tx, rx) = create_signal();

    let rest = (signals.len() > FAN_IN).then(|| {
        let mut rest = signals.split_off(FAN_IN);
        rest.push(rx.clone());
        or(rest)
    });

    let mut direct = signals.into_iter();
    let first = direct.next();
    let second = direct.next();
    let third = direct.next();

    tokio::spawn(async move {
        tokio::select! {
            biased;

            _ = tx.closed() => {
                trace!("race abandoned before any input fired");
                return;
            }
            _ = optional_future(first.as_ref().map(SignalRx::fired)) => {}
            _ = optional_future(second.as_ref().map(SignalRx::fired)) => {}
            _ = optional_future(third.as_ref().map(SignalRx::fired)) => {}
            _ = optional_future(rest.as_ref().map(SignalRx::fired)) => {}
        }

        tx.fire();
    });

    rx
}
