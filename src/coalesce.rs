use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tokio::sync::broadcast;

/// Single-flight coalescing for concurrent cache misses on the same key.
/// The first caller to reach a key becomes its leader and does the real
/// work; followers subscribe to a broadcast channel and wait for the
/// leader's result instead of duplicating the upstream call. A follower
/// that waits past `timeout` (the leader stalled, or already finished and
/// was dropped before it could be woken) falls back to doing its own work
/// rather than waiting forever.
pub struct Coalescer<T: Clone + Send + 'static> {
    inflight: DashMap<String, broadcast::Sender<T>>,
    timeout: Duration,
}

impl<T: Clone + Send + 'static> Coalescer<T> {
    pub fn new(timeout: Duration) -> Self {
        Self {
            inflight: DashMap::new(),
            timeout,
        }
    }

    pub async fn run<F, Fut, E>(&self, key: &str, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let (sender, is_leader) = match self.inflight.entry(key.to_string()) {
            Entry::Occupied(e) => (e.get().clone(), false),
            Entry::Vacant(e) => {
                let (tx, _rx) = broadcast::channel(1);
                e.insert(tx.clone());
                (tx, true)
            }
        };

        if !is_leader {
            let mut rx = sender.subscribe();
            if let Ok(Ok(value)) = tokio::time::timeout(self.timeout, rx.recv()).await {
                return Ok(value);
            }
            return work().await;
        }

        let result = work().await;
        if let Ok(value) = &result {
            let _ = sender.send(value.clone());
        }
        self.inflight.remove(key);
        result
    }
}
