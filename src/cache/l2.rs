use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use tracing::warn;

use crate::error::{CacheErrorKind, RpcProxyError};

use super::envelope::{CacheEntry, Ttl};
use super::tier::CacheTier;

/// The Redis-compatible external tier. Connections are pooled by
/// `redis::aio::ConnectionManager` (auto-reconnecting, internally
/// multiplexed); every operation is wrapped in a deadline so a slow or
/// partitioned store degrades to a miss instead of stalling the request.
pub struct L2Cache {
    conn: redis::aio::ConnectionManager,
    deadline: Duration,
}

impl L2Cache {
    pub fn new(conn: redis::aio::ConnectionManager, deadline: Duration) -> Self {
        Self { conn, deadline }
    }

    async fn read_entry(&self, key: &str) -> Result<Option<CacheEntry>, RpcProxyError> {
        let mut conn = self.conn.clone();
        let fut = conn.get::<_, Option<Vec<u8>>>(key);
        let bytes = match tokio::time::timeout(self.deadline, fut).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                warn!(error = %e, key = %key, "l2 read failed");
                return Err(RpcProxyError::Cache(CacheErrorKind::Redis, e.to_string()));
            }
            Err(_) => {
                warn!(key = %key, "l2 read timed out");
                return Err(RpcProxyError::Cache(CacheErrorKind::Redis, "timeout".into()));
            }
        };
        match bytes {
            None => Ok(None),
            Some(bytes) => Ok(Some(CacheEntry::decode(&bytes)?)),
        }
    }

    async fn write_entry(&self, key: &str, entry: &CacheEntry) -> Result<(), RpcProxyError> {
        let remaining_secs = (entry.expires_at - Utc::now()).num_seconds().max(1) as u64;
        let bytes = entry.encode()?;
        let mut conn = self.conn.clone();
        let fut = conn.set_ex::<_, _, ()>(key, bytes, remaining_secs);
        match tokio::time::timeout(self.deadline, fut).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                warn!(error = %e, key = %key, "l2 write failed");
                Ok(())
            }
            Err(_) => {
                warn!(key = %key, "l2 write timed out");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl CacheTier for L2Cache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, RpcProxyError> {
        let now = Utc::now();
        match self.read_entry(key).await {
            Ok(entry) => Ok(entry.filter(|e| e.is_fresh(now))),
            Err(_) => Ok(None),
        }
    }

    async fn get_stale(&self, key: &str) -> Result<Option<CacheEntry>, RpcProxyError> {
        let now = Utc::now();
        match self.read_entry(key).await {
            Ok(entry) => Ok(entry.filter(|e| !e.is_expired(now))),
            Err(_) => Ok(None),
        }
    }

    async fn set(&self, key: &str, data: Vec<u8>, ttl: Ttl) -> Result<(), RpcProxyError> {
        self.set_entry(key, CacheEntry::new(data, ttl)).await
    }

    async fn delete(&self, key: &str) -> Result<(), RpcProxyError> {
        let mut conn = self.conn.clone();
        let fut = conn.del::<_, ()>(key);
        if let Ok(Err(e)) = tokio::time::timeout(self.deadline, fut).await {
            warn!(error = %e, key = %key, "l2 delete failed");
        }
        Ok(())
    }

    async fn set_entry(&self, key: &str, entry: CacheEntry) -> Result<(), RpcProxyError> {
        let existing = self.read_entry(key).await.ok().flatten();
        if CacheEntry::should_overwrite(existing.as_ref(), &entry) {
            self.write_entry(key, &entry).await?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "l2"
    }
}
