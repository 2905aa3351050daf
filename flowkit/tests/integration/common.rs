use std::time::Duration;

use tokio::runtime::Handle;

/// Number of spawned tasks the current runtime is still running.
pub fn alive_tasks() -> usize {
    Handle::current().metrics().num_alive_tasks()
}

/// Lets the runtime settle until at most `baseline` tasks are alive.
///
/// Panics if spawned tasks are still alive after a generous amount of (possibly paused) time.
pub async fn wait_for_task_baseline(baseline: usize) {
    for _ in 0..1_000 {
        if alive_tasks() <= baseline {
            return;
        }

        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    panic!(
        "expected at most {baseline} alive tasks, found {}",
        alive_tasks()
    );
}
