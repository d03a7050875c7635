//! Task runner on a tokio `LocalSet`.

use qmux_core::{Task, TaskRunner, TimerHandle};
use std::time::Duration;
use tracing::trace;

/// Posts session tasks as local tokio tasks.
///
/// Tasks are `!Send`, so the runner must be used from inside a
/// [`tokio::task::LocalSet`]; posting from anywhere else panics.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTaskRunner;

impl TokioTaskRunner {
    /// Create a runner.
    pub fn new() -> Self {
        Self
    }
}

impl TaskRunner for TokioTaskRunner {
    fn post(&self, task: Task) {
        tokio::task::spawn_local(async move {
            task();
        });
    }

    fn post_delayed(&self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::new();
        let timer = handle.clone();
        tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            if timer.is_cancelled() {
                trace!(?delay, "timer cancelled");
                return;
            }
            task();
        });
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use tokio::task::LocalSet;

    #[tokio::test(start_paused = true)]
    async fn test_post_runs_on_later_turn() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let ran = Rc::new(Cell::new(false));
                let flag = Rc::clone(&ran);
                TokioTaskRunner::new().post(Box::new(move || flag.set(true)));
                assert!(!ran.get());

                tokio::task::yield_now().await;
                assert!(ran.get());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_task_honors_cancellation() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let runner = TokioTaskRunner::new();
                let fired = Rc::new(Cell::new(0));

                let count = Rc::clone(&fired);
                runner.post_delayed(
                    Duration::from_secs(1),
                    Box::new(move || count.set(count.get() + 1)),
                );
                let count = Rc::clone(&fired);
                let cancelled = runner.post_delayed(
                    Duration::from_secs(1),
                    Box::new(move || count.set(count.get() + 10)),
                );
                cancelled.cancel();

                tokio::time::sleep(Duration::from_millis(999)).await;
                assert_eq!(fired.get(), 0);
                tokio::time::sleep(Duration::from_millis(2)).await;
                assert_eq!(fired.get(), 1);
            })
            .await;
    }
}
