use std::time::Duration;

use flowkit::combinators::{
    generate, map, map_bounded, merge, or, repeat_with, round_robin, take,
};
use flowkit::concurrency::signal::create_signal;
use flowkit::concurrency::timer::after;
use flowkit::error::ErrorKind;
use flowkit::sync::{ErrorGroup, Semaphore, promise};
use flowkit_telemetry::tracing::init_test_tracing;
use futures::StreamExt;
use tokio::time::{Instant, sleep};

use crate::common::{alive_tasks, wait_for_task_baseline};

#[tokio::test]
async fn unbranched_pipeline_preserves_order() {
    init_test_tracing();

    let (_done_tx, done) = create_signal();
    let squares = map(&done, generate(&done, 1..), |value: u64| async move {
        value * value
    });

    let values: Vec<_> = take(&done, squares, 5).collect().await;

    assert_eq!(values, vec![1, 4, 9, 16, 25]);
}

#[tokio::test(start_paused = true)]
async fn fan_out_and_fan_in_keep_every_value() {
    init_test_tracing();

    let baseline = alive_tasks();
    let (_done_tx, done) = create_signal();

    let workers = round_robin(&done, generate(&done, 0..60u64), 4)
        .into_iter()
        .map(|lane| {
            map_bounded(&done, lane, Semaphore::new(2), |value| async move {
                sleep(Duration::from_millis(value % 7)).await;
                value + 1
            })
        })
        .collect();

    let mut values: Vec<_> = merge(&done, workers).collect().await;
    values.sort_unstable();

    assert_eq!(values, (1..=60).collect::<Vec<_>>());
    wait_for_task_baseline(baseline).await;
}

#[tokio::test(start_paused = true)]
async fn timeout_cancels_slow_work() {
    init_test_tracing();

    let (promise, deferred) = promise::<u32>();
    let (work_done_tx, work_done) = create_signal();
    let timeout = or(vec![work_done, after(Duration::from_millis(100))]);

    let worker = tokio::spawn(async move {
        sleep(Duration::from_secs(5)).await;
        promise.set(1);
        work_done_tx.fire();
    });

    let start = Instant::now();
    let err = deferred.get_until(&timeout).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(start.elapsed() < Duration::from_secs(1));
    worker.abort();
}

#[tokio::test(start_paused = true)]
async fn error_group_tears_down_a_pipeline() {
    init_test_tracing();

    let baseline = alive_tasks();
    let mut group = ErrorGroup::new();
    let cancel = group.cancellation();

    let numbers = generate(&cancel, 0u32..);
    group.spawn(move |cancel| async move {
        let mut numbers = numbers.take_until(cancel);
        while let Some(value) = numbers.next().await {
            if value == 25 {
                flowkit::bail!(ErrorKind::InvalidState, "Unexpected value", value);
            }
        }
        Ok(())
    });

    let err = group.wait().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(err.detail(), Some("25"));
    wait_for_task_baseline(baseline).await;
}

#[tokio::test(start_paused = true)]
async fn dropping_a_bounded_map_output_releases_the_stage() {
    init_test_tracing();

    let baseline = alive_tasks();
    let (_done_tx, done) = create_signal();

    let mut output = map_bounded(
        &done,
        repeat_with(&done, || 3u64),
        Semaphore::new(2),
        |value| async move {
            sleep(Duration::from_millis(5)).await;
            value * 2
        },
    );

    for _ in 0..10 {
        assert_eq!(output.recv().await, Some(6));
    }
    assert!(alive_tasks() > baseline);

    // `done` never fires; the consumer simply walks away.
    drop(output);

    wait_for_task_baseline(baseline).await;
}
