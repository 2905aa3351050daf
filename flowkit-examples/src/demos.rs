use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use flowkit::bail;
use flowkit::combinators::{generate, map_bounded, merge_with_capacity, or, split, tee as broadcast};
use flowkit::concurrency::signal::create_signal;
use flowkit::concurrency::timer::after;
use flowkit::error::{ErrorKind, FlowResult};
use flowkit::limiter::RateLimiter;
use flowkit::sync::{Barrier, ErrorGroup, Semaphore, SingleFlight, promise};
use flowkit_config::shared::{SplitConfig, ToolkitConfig};
use futures::StreamExt;
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep};
use tracing::{info, warn};

pub async fn pipeline(config: &ToolkitConfig, items: u64) -> FlowResult<()> {
    let (done_tx, done) = create_signal();
    let lanes = config.max_workers;
    let semaphore = Semaphore::new(config.max_workers);

    let split_config = SplitConfig::round_robin(lanes).with_capacity(config.stream.capacity);
    let workers = split(&done, generate(&done, 0..items), split_config)
        .into_iter()
        .map(|lane| {
            map_bounded(&done, lane, semaphore.clone(), |value| async move {
                sleep(Duration::from_millis(value % 5)).await;
                value * value
            })
        })
        .collect();

    let start = Instant::now();
    let (count, sum) = merge_with_capacity(&done, workers, config.stream.capacity)
        .fold((0u64, 0u64), |(count, sum), value| async move {
            (count + 1, sum + value)
        })
        .await;

    info!(lanes, count, sum, elapsed = ?start.elapsed(), "pipeline finished");
    done_tx.fire();

    Ok(())
}

pub async fn tee(consumers: usize, items: u32) -> FlowResult<()> {
    let (_done_tx, done) = create_signal();
    let outputs = broadcast(&done, generate(&done, 0..items), consumers);

    let mut readers = JoinSet::new();
    for (consumer, output) in outputs.into_iter().enumerate() {
        readers.spawn(async move {
            let values: Vec<u32> = output.collect().await;
            (consumer, values)
        });
    }

    while let Some(joined) = readers.join_next().await {
        let (consumer, values) = joined?;
        info!(consumer, received = values.len(), ?values, "consumer finished");
    }

    Ok(())
}

pub async fn rate_limit(config: &ToolkitConfig, seconds: u64) -> FlowResult<()> {
    let limiter = RateLimiter::start(config.rate_limiter.clone())?;
    let handle = limiter.handle();

    let start = Instant::now();
    let (mut admitted, mut rejected) = (0u64, 0u64);
    while start.elapsed() < Duration::from_secs(seconds) {
        if handle.allow() {
            admitted += 1;
        } else {
            rejected += 1;
        }

        sleep(Duration::from_millis(10)).await;
    }

    info!(
        admitted,
        rejected,
        limit = config.rate_limiter.limit,
        period_ms = config.rate_limiter.period_ms,
        "rate limiter run finished"
    );

    limiter.shutdown().await
}

pub async fn single_flight(callers: usize) -> FlowResult<()> {
    let flights = SingleFlight::<String, Arc<String>>::new();
    let executions = Arc::new(AtomicUsize::new(0));

    let mut tasks = JoinSet::new();
    for caller in 0..callers {
        let flights = flights.clone();
        let executions = executions.clone();

        tasks.spawn(async move {
            let value = flights
                .run("settings".to_string(), || async move {
                    executions.fetch_add(1, Ordering::SeqCst);
                    sleep(Duration::from_millis(100)).await;
                    Ok(Arc::new("loaded settings".to_string()))
                })
                .await?;

            info!(caller, %value, "lookup returned");
            Ok::<_, flowkit::error::FlowError>(())
        });
    }

    while let Some(joined) = tasks.join_next().await {
        joined??;
    }

    info!(
        callers,
        executions = executions.load(Ordering::SeqCst),
        "single-flight finished"
    );

    Ok(())
}

pub async fn error_group(config: &ToolkitConfig, tasks: usize) -> FlowResult<()> {
    let mut group = ErrorGroup::with_config(&config.error_group)?;

    for task in 0..tasks {
        let failing = task + 1 == tasks;

        group.spawn(move |cancel| async move {
            if failing {
                sleep(Duration::from_millis(50)).await;
                bail!(ErrorKind::TaskFailed, "Demo task failed", task);
            }

            cancel.fired().await;
            info!(task, "task observed cancellation");
            Ok(())
        });
    }

    match group.wait().await {
        Ok(()) => info!("every task succeeded"),
        Err(err) => warn!(error = %err, "group stopped on first error"),
    }

    Ok(())
}

pub async fn barrier(parties: usize) -> FlowResult<()> {
    let barrier = Arc::new(Barrier::new(parties));

    let mut tasks = JoinSet::new();
    for party in 0..parties {
        let barrier = barrier.clone();

        tasks.spawn(async move {
            for phase in 0..2u64 {
                sleep(Duration::from_millis(20 * (party as u64 + phase))).await;
                let result = barrier.wait().await;

                if result.is_leader() {
                    info!(party, generation = result.generation(), "phase completed");
                }
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        joined?;
    }

    Ok(())
}

pub async fn timeout(timeout_ms: u64, work_ms: u64) -> FlowResult<()> {
    let (promise, deferred) = promise::<u64>();
    let (work_done_tx, work_done) = create_signal();

    let worker = tokio::spawn(async move {
        sleep(Duration::from_millis(work_ms)).await;
        promise.set(work_ms);
        work_done_tx.fire();
    });

    let deadline = or(vec![work_done, after(Duration::from_millis(timeout_ms))]);
    match deferred.get_until(&deadline).await {
        Ok(value) => info!(value, "work finished before the deadline"),
        Err(err) if err.kind() == ErrorKind::Cancelled => {
            // The deadline and the work may fire together.
            match deferred.try_get() {
                Some(Ok(value)) => info!(value, "work finished at the deadline"),
                _ => warn!(timeout_ms, "work timed out"),
            }
        }
        Err(err) => return Err(err),
    }

    worker.abort();

    Ok(())
}
