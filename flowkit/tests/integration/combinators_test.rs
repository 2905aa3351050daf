use std::time::Duration;

use flowkit::combinators::{
    bridge, generate, merge, or, or_done, repeat_with, round_robin, split, tee,
};
use flowkit::concurrency::signal::create_signal;
use flowkit::concurrency::stream::channel;
use flowkit::concurrency::timer::after;
use flowkit_config::shared::{LagPolicy, SplitConfig};
use flowkit_telemetry::tracing::init_test_tracing;
use futures::StreamExt;
use futures::future::join_all;
use rand::Rng;
use tokio::time::Instant;

use crate::common::{alive_tasks, wait_for_task_baseline};

#[tokio::test(flavor = "multi_thread")]
async fn merge_delivers_the_union_of_its_inputs() {
    init_test_tracing();

    let (_done_tx, done) = create_signal();
    let lengths: Vec<u32> = {
        let mut rng = rand::thread_rng();
        (0..8).map(|_| rng.gen_range(0..50)).collect()
    };

    let mut expected = Vec::new();
    let mut inputs = Vec::new();
    for (stream, len) in (0u32..).zip(lengths) {
        let values: Vec<u32> = (0..len).map(|i| stream * 1_000 + i).collect();
        expected.extend(values.iter().copied());
        inputs.push(generate(&done, values));
    }

    let mut merged: Vec<u32> = merge(&done, inputs).collect().await;

    merged.sort_unstable();
    expected.sort_unstable();
    assert_eq!(merged, expected);
}

#[tokio::test]
async fn round_robin_sends_value_i_to_output_i_mod_n() {
    init_test_tracing();

    let (_done_tx, done) = create_signal();
    let outputs = round_robin(&done, generate(&done, 0..100usize), 7);

    let collected = join_all(outputs.into_iter().map(|output| output.collect::<Vec<_>>())).await;

    for (index, values) in collected.iter().enumerate() {
        assert!(!values.is_empty());
        assert!(values.iter().all(|value| value % 7 == index));
        assert!(values.windows(2).all(|pair| pair[0] < pair[1]));
    }
    assert_eq!(collected.iter().map(Vec::len).sum::<usize>(), 100);
}

#[tokio::test]
async fn tee_duplicates_every_value_in_order() {
    init_test_tracing();

    let (_done_tx, done) = create_signal();
    let words = vec!["alpha", "beta", "gamma", "delta"];
    let outputs = tee(&done, generate(&done, words.clone()), 3);

    let collected = join_all(outputs.into_iter().map(|output| output.collect::<Vec<_>>())).await;

    assert_eq!(collected.len(), 3);
    for values in collected {
        assert_eq!(values, words);
    }
}

#[tokio::test]
async fn broadcast_with_drop_newest_keeps_the_fast_consumer_moving() {
    init_test_tracing();

    let (_done_tx, done) = create_signal();
    let (tx, rx) = channel(1);
    let config = SplitConfig::broadcast(2).with_lag_policy(LagPolicy::DropNewest);
    let mut outputs = split(&done, rx, config);
    let slow = outputs.pop().unwrap();
    let mut fast = outputs.pop().unwrap();

    for value in 0..5 {
        tx.send(value).await.unwrap();
        assert_eq!(fast.recv().await, Some(value));
    }
    drop(tx);
    assert_eq!(fast.recv().await, None);

    // The slow consumer never read while the input was flowing.
    let slow_values: Vec<_> = slow.collect().await;
    assert_eq!(slow_values, vec![0]);
}

#[tokio::test(start_paused = true)]
async fn or_done_stops_promptly_and_releases_its_tasks() {
    init_test_tracing();

    let baseline = alive_tasks();
    let (done_tx, done) = create_signal();
    let mut forwarded = or_done(&done, repeat_with(&done, || 1u8));

    for _ in 0..10 {
        assert_eq!(forwarded.recv().await, Some(1));
    }
    assert!(alive_tasks() > baseline);

    let cancelled_at = Instant::now();
    done_tx.fire();
    while forwarded.recv().await.is_some() {}

    assert!(cancelled_at.elapsed() < Duration::from_millis(10));
    wait_for_task_baseline(baseline).await;
}

#[tokio::test(start_paused = true)]
async fn cancelling_a_pipeline_releases_every_stage() {
    init_test_tracing();

    let baseline = alive_tasks();
    let (done_tx, done) = create_signal();

    let (outer_tx, outer_rx) = channel(4);
    for _ in 0..3 {
        outer_tx
            .send(repeat_with(&done, || "tick"))
            .await
            .unwrap();
    }

    let bridged = bridge(&done, outer_rx);
    let branches = tee(&done, bridged, 2);
    let mut merged = merge(&done, branches);

    assert_eq!(merged.recv().await, Some("tick"));

    done_tx.fire();
    while merged.recv().await.is_some() {}

    // The outer sender is still held here; cancellation alone must release every stage.
    wait_for_task_baseline(baseline).await;
    drop(outer_tx);
}

#[tokio::test(start_paused = true)]
async fn or_fires_on_the_earliest_timer() {
    init_test_tracing();

    let start = Instant::now();
    let signals = [900, 300, 700, 500, 100, 800, 600]
        .into_iter()
        .map(|millis| after(Duration::from_millis(millis)))
        .collect();

    or(signals).fired().await;

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn or_tears_down_every_racing_task_once_it_fires() {
    init_test_tracing();

    for fired in [0, 6, 11] {
        let baseline = alive_tasks();
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..12).map(|_| create_signal()).unzip();

        let combined = or(receivers);
        assert!(alive_tasks() > baseline);

        senders[fired].fire();
        combined.fired().await;

        // The other senders stay alive, so only the fired result can release the tail.
        wait_for_task_baseline(baseline).await;
        assert!(!senders[(fired + 1) % 12].is_fired());
    }
}
