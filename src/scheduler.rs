use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::info;

/// Drives a periodic task with a single non-reentrant worker: `start`
/// launches one worker loop that never invokes the task again while a
/// previous invocation is still running, `stop` waits for the in-flight
/// tick (if any) to finish before returning. Both are idempotent.
pub struct Scheduler {
    interval: Duration,
    running: Arc<AtomicBool>,
    stop_notify: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            running: Arc::new(AtomicBool::new(false)),
            stop_notify: Arc::new(Notify::new()),
            handle: None,
        }
    }

    pub fn start<F, Fut>(&mut self, task: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            return; // already running
        }

        let interval = self.interval;
        let running = self.running.clone();
        let stop_notify = self.stop_notify.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately
            task().await;

            loop {
                tokio::select! {
                    _ = stop_notify.notified() => break,
                    _ = ticker.tick() => {
                        task().await;
                    }
                }
            }
            running.store(false, Ordering::SeqCst);
        });

        self.handle = Some(handle);
        info!(interval_secs = %interval.as_secs(), "scheduler started");
    }

    /// Waits for the in-flight tick to finish, then returns. Safe to call
    /// more than once or on a scheduler that was never started.
    pub async fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.stop_notify.notify_one();
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[tokio::test]
    async fn runs_at_least_once_and_stops_cleanly() {
        let counter = Arc::new(AtomicU64::new(0));
        let mut scheduler = Scheduler::new(Duration::from_millis(10));

        let counter_clone = counter.clone();
        scheduler.start(move || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.stop().await;

        assert!(counter.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let counter = Arc::new(AtomicU64::new(0));
        let mut scheduler = Scheduler::new(Duration::from_millis(500));

        let c1 = counter.clone();
        scheduler.start(move || {
            let c1 = c1.clone();
            async move { c1.fetch_add(1, Ordering::SeqCst); }
        });
        let c2 = counter.clone();
        scheduler.start(move || {
            let c2 = c2.clone();
            async move { c2.fetch_add(100, Ordering::SeqCst); }
        });

        scheduler.stop().await;
        // the second start() was a no-op, so only the first closure ever runs
        assert!(counter.load(Ordering::SeqCst) < 100);
    }
}
