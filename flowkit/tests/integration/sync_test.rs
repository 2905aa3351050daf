use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use flowkit::bail;
use flowkit::error::ErrorKind;
use flowkit::sync::{Barrier, ErrorGroup, Semaphore, SingleFlight, promise};
use flowkit_telemetry::tracing::init_test_tracing;
use rand::Rng;
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep, timeout};

#[tokio::test(start_paused = true)]
async fn semaphore_never_exceeds_its_capacity() {
    init_test_tracing();

    let semaphore = Semaphore::new(4);
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let delays: Vec<u64> = {
        let mut rng = rand::thread_rng();
        (0..40).map(|_| rng.gen_range(1..20)).collect()
    };

    let mut tasks = JoinSet::new();
    for delay in delays {
        let semaphore = semaphore.clone();
        let running = running.clone();
        let peak = peak.clone();

        tasks.spawn(async move {
            let _permit = semaphore.acquire().await;
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            sleep(Duration::from_millis(delay)).await;
            running.fetch_sub(1, Ordering::SeqCst);
        });
    }

    while let Some(joined) = tasks.join_next().await {
        joined.unwrap();
    }

    assert_eq!(peak.load(Ordering::SeqCst), 4);
    assert_eq!(semaphore.available(), 4);
}

#[tokio::test(start_paused = true)]
async fn barrier_holds_every_party_until_the_phase_completes() {
    init_test_tracing();

    const PARTIES: usize = 5;

    let barrier = Arc::new(Barrier::new(PARTIES));
    let finished_phase_one = Arc::new(AtomicUsize::new(0));
    let finished_phase_two = Arc::new(AtomicUsize::new(0));

    let mut parties = JoinSet::new();
    for party in 0..PARTIES as u64 {
        let barrier = barrier.clone();
        let finished_phase_one = finished_phase_one.clone();
        let finished_phase_two = finished_phase_two.clone();

        parties.spawn(async move {
            sleep(Duration::from_millis(10 * party)).await;
            finished_phase_one.fetch_add(1, Ordering::SeqCst);

            let first = barrier.wait().await;
            // Nobody crosses before everyone arrived.
            assert_eq!(finished_phase_one.load(Ordering::SeqCst), PARTIES);

            sleep(Duration::from_millis(5 * (PARTIES as u64 - party))).await;
            finished_phase_two.fetch_add(1, Ordering::SeqCst);

            let second = barrier.wait().await;
            assert_eq!(finished_phase_two.load(Ordering::SeqCst), PARTIES);

            (first, second)
        });
    }

    let mut leaders = [0, 0];
    while let Some(joined) = parties.join_next().await {
        let (first, second) = joined.unwrap();
        assert_eq!(first.generation(), 0);
        assert_eq!(second.generation(), 1);
        leaders[0] += usize::from(first.is_leader());
        leaders[1] += usize::from(second.is_leader());
    }

    assert_eq!(leaders, [1, 1]);
    assert_eq!(barrier.generation(), 2);
}

#[tokio::test(start_paused = true)]
async fn single_flight_runs_overlapping_calls_once() {
    init_test_tracing();

    const CALLERS: usize = 16;

    let flights = SingleFlight::<&'static str, Arc<String>>::new();
    let executions = Arc::new(AtomicUsize::new(0));

    let mut callers = JoinSet::new();
    for _ in 0..CALLERS {
        let flights = flights.clone();
        let executions = executions.clone();

        callers.spawn(async move {
            flights
                .run("config", || async move {
                    executions.fetch_add(1, Ordering::SeqCst);
                    sleep(Duration::from_millis(50)).await;
                    Ok(Arc::new("loaded".to_string()))
                })
                .await
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = callers.join_next().await {
        results.push(joined.unwrap().unwrap());
    }

    assert_eq!(executions.load(Ordering::SeqCst), 1);
    assert_eq!(results.len(), CALLERS);
    // Every caller holds the very same value.
    assert!(results.iter().all(|value| Arc::ptr_eq(value, &results[0])));
    assert_eq!(flights.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn single_flight_shares_failures_verbatim() {
    init_test_tracing();

    let flights = SingleFlight::<u32, u32>::new();

    let leader = {
        let flights = flights.clone();
        tokio::spawn(async move {
            flights
                .run(7, || async {
                    sleep(Duration::from_millis(20)).await;
                    bail!(ErrorKind::TaskFailed, "Lookup failed", "key 7 is missing");
                })
                .await
        })
    };
    sleep(Duration::from_millis(1)).await;

    let follower = flights.run(7, || async { Ok(0) }).await.unwrap_err();
    let leader = leader.await.unwrap().unwrap_err();

    assert_eq!(follower.kind(), ErrorKind::TaskFailed);
    assert_eq!(follower.detail(), leader.detail());
}

#[tokio::test(start_paused = true)]
async fn deferred_blocks_until_the_promise_is_set() {
    init_test_tracing();

    let (promise, deferred) = promise::<String>();
    let readers: Vec<_> = (0..3)
        .map(|_| {
            let deferred = deferred.clone();
            tokio::spawn(async move { deferred.get().await })
        })
        .collect();

    assert!(
        timeout(Duration::from_millis(100), deferred.get())
            .await
            .is_err()
    );
    assert!(deferred.try_get().is_none());

    promise.set("v".to_string());

    for reader in readers {
        assert_eq!(reader.await.unwrap().unwrap(), "v");
    }
    assert_eq!(deferred.get().await.unwrap(), "v");
}

#[tokio::test(start_paused = true)]
async fn error_group_reports_the_failing_task_and_cancels_the_rest() {
    init_test_tracing();

    let mut group = ErrorGroup::new();
    let first_stopped_at = Arc::new(std::sync::Mutex::new(None));

    {
        let first_stopped_at = first_stopped_at.clone();
        group.spawn(move |cancel| async move {
            tokio::select! {
                _ = cancel.fired() => {}
                _ = sleep(Duration::from_secs(3600)) => {}
            }
            *first_stopped_at.lock().unwrap() = Some(Instant::now());
            Ok(())
        });
    }
    group.spawn(|_| async {
        sleep(Duration::from_millis(30)).await;
        bail!(ErrorKind::TaskFailed, "Second task failed");
    });

    let start = Instant::now();
    let err = group.wait().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TaskFailed);
    assert_eq!(err.description(), "Second task failed");

    let stopped_at = first_stopped_at.lock().unwrap().unwrap();
    assert!(stopped_at.duration_since(start) < Duration::from_millis(100));
}
