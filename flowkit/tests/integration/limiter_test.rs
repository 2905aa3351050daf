use std::time::Duration;

use flowkit::limiter::{LimiterState, RateLimiter};
use flowkit_config::shared::RateLimiterConfig;
use flowkit_telemetry::tracing::init_test_tracing;
use rand::Rng;
use tokio::time::{Instant, sleep};

use crate::common::{alive_tasks, wait_for_task_baseline};

#[tokio::test(start_paused = true)]
async fn admits_a_burst_then_one_call_per_leak_interval() {
    init_test_tracing();

    let baseline = alive_tasks();
    // Two calls per second leak one drop every 500ms.
    let config = RateLimiterConfig::new(2, Duration::from_secs(1)).with_capacity(3);
    let limiter = RateLimiter::start(config).unwrap();

    assert!(limiter.allow());
    assert!(limiter.allow());
    assert!(limiter.allow());
    assert!(!limiter.allow());
    assert_eq!(limiter.level(), 3);

    sleep(Duration::from_millis(499)).await;
    assert!(!limiter.allow());

    sleep(Duration::from_millis(2)).await;
    assert!(limiter.allow());
    assert!(!limiter.allow());

    sleep(Duration::from_millis(500)).await;
    assert!(limiter.allow());
    assert!(!limiter.allow());

    let handle = limiter.handle();
    limiter.shutdown().await.unwrap();

    assert_eq!(handle.state(), LimiterState::Stopped);
    assert!(!handle.allow());
    wait_for_task_baseline(baseline).await;
}

/// Counts, for every admission, the admissions inside the one-period window it opens.
fn busiest_window(admitted: &[Duration], period: Duration) -> usize {
    admitted
        .iter()
        .enumerate()
        .map(|(index, at)| {
            admitted[index..]
                .iter()
                .take_while(|other| **other - *at < period)
                .count()
        })
        .max()
        .unwrap_or(0)
}

#[tokio::test(start_paused = true)]
async fn no_period_admits_more_than_limit_by_default() {
    init_test_tracing();

    let config = RateLimiterConfig::new(4, Duration::from_secs(1));
    let limiter = RateLimiter::start(config.clone()).unwrap();
    let pauses: Vec<u64> = {
        let mut rng = rand::thread_rng();
        (0..20_000).map(|_| rng.gen_range(1..=5)).collect()
    };
    let start = Instant::now();

    let mut admitted = Vec::new();
    for pause in pauses {
        if start.elapsed() >= Duration::from_secs(10) {
            break;
        }
        if limiter.allow() {
            admitted.push(start.elapsed());
        }
        sleep(Duration::from_millis(pause)).await;
    }

    let busiest = busiest_window(&admitted, config.period());
    assert!(busiest <= config.limit as usize, "{busiest} calls admitted within one period");

    // The long-run rate tracks `limit` per period.
    assert!(admitted.len() >= 35, "only {} calls admitted", admitted.len());
    assert!(admitted.len() <= 40);

    limiter.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn tight_loop_within_one_period_gets_at_most_limit() {
    init_test_tracing();

    let limiter = RateLimiter::start(RateLimiterConfig::new(4, Duration::from_secs(1))).unwrap();
    let start = Instant::now();

    let mut admitted = 0;
    while start.elapsed() < Duration::from_millis(999) {
        if limiter.allow() {
            admitted += 1;
        }
        sleep(Duration::from_millis(1)).await;
    }

    assert!(admitted <= 4, "admitted {admitted} calls");
    limiter.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn explicit_burst_admits_at_most_capacity_plus_limit() {
    init_test_tracing();

    let config = RateLimiterConfig::new(5, Duration::from_secs(1)).with_capacity(4);
    let limiter = RateLimiter::start(config.clone()).unwrap();
    let start = Instant::now();

    let mut admitted = Vec::new();
    while start.elapsed() < Duration::from_secs(10) {
        if limiter.allow() {
            admitted.push(start.elapsed());
        }
        sleep(Duration::from_millis(7)).await;
    }

    let busiest = busiest_window(&admitted, config.period());
    assert!(busiest <= (config.capacity() + config.limit) as usize);
    assert!(busiest > config.limit as usize);

    assert!(admitted.len() >= 45);
    assert!(admitted.len() <= 4 + 50);

    limiter.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn handles_share_one_bucket() {
    init_test_tracing();

    let limiter = RateLimiter::start(RateLimiterConfig::new(1, Duration::from_secs(1))).unwrap();
    let handles: Vec<_> = (0..4).map(|_| limiter.handle()).collect();

    let admitted = handles.iter().filter(|handle| handle.allow()).count();

    assert_eq!(admitted, 1);
    assert_eq!(limiter.state(), LimiterState::Running);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_limiter_releases_its_worker() {
    init_test_tracing();

    let baseline = alive_tasks();
    let limiter = RateLimiter::start(RateLimiterConfig::default()).unwrap();
    let handle = limiter.handle();
    assert!(alive_tasks() > baseline);

    drop(limiter);

    assert_eq!(handle.state(), LimiterState::Stopped);
    wait_for_task_baseline(baseline).await;
}
