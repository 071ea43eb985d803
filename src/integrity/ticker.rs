//! Scheduler-agnostic periodic task runner.
//!
//! Cancelling a ticker only prevents the next tick; a tick already running is awaited to
//! completion so that no merge is left half-applied.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[async_trait]
pub trait TickTask: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// One unit of periodic work. Failures are handled inside; a tick never stops the ticker.
    async fn tick(&self);
}

pub struct Ticker {
    period: Duration,
    cancel: CancellationToken,
}

impl Ticker {
    pub fn new(period: Duration, cancel: CancellationToken) -> Self {
        Self { period, cancel }
    }

    pub fn spawn<T: TickTask>(self, task: Arc<T>) -> JoinHandle<()> {
        info!(task = task.name(), period_secs = self.period.as_secs(), "Starting ticker");

        tokio::spawn(async move {
            let mut timer = interval(self.period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break,
                    _ = timer.tick() => {}
                }

                debug!(task = task.name(), "Tick");
                task.tick().await;
            }

            info!(task = task.name(), "Ticker stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        ticks: AtomicUsize,
        finished: AtomicUsize,
    }

    #[async_trait]
    impl TickTask for Counter {
        fn name(&self) -> &'static str {
            "counter"
        }

        async fn tick(&self) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_lets_the_running_tick_finish() {
        let task = Arc::new(Counter {
            ticks: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        });
        let cancel = CancellationToken::new();
        let handle = Ticker::new(Duration::from_secs(1), cancel.clone()).spawn(task.clone());

        // first tick fires immediately and is now sleeping inside the task
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(task.ticks.load(Ordering::SeqCst), 1);
        assert_eq!(task.finished.load(Ordering::SeqCst), 1);
    }
}
