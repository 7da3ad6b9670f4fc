use async_trait::async_trait;

use crate::error::RpcProxyError;

use super::envelope::{CacheEntry, Ttl};

/// A single cache tier. Implementations absorb their own I/O failures into
/// `Ok(None)` for reads (a miss) — only truly exceptional conditions should
/// reach the caller as `Err`, and even those are expected to be logged and
/// counted rather than propagated to the client.
#[async_trait]
pub trait CacheTier: Send + Sync {
    /// Returns the entry only if it is still fresh.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, RpcProxyError>;
    /// Returns the entry if not yet expired, even if stale.
    async fn get_stale(&self, key: &str) -> Result<Option<CacheEntry>, RpcProxyError>;
    async fn set(&self, key: &str, data: Vec<u8>, ttl: Ttl) -> Result<(), RpcProxyError>;
    async fn delete(&self, key: &str) -> Result<(), RpcProxyError>;
    /// Writes a fully-formed entry (used for propagation, where the TTL to
    /// apply is the source entry's own remaining lifetime).
    async fn set_entry(&self, key: &str, entry: CacheEntry) -> Result<(), RpcProxyError>;

    fn name(&self) -> &'static str;
}

/// A tier that is always a miss and silently accepts writes. Used whenever
/// L3 (or, in principle, L2) is disabled by configuration — the MultiCache
/// composition stays correct regardless of which subset of tiers is no-op.
pub struct NoopTier {
    label: &'static str,
}

impl NoopTier {
    pub fn new(label: &'static str) -> Self {
        Self { label }
    }
}

#[async_trait]
impl CacheTier for NoopTier {
    async fn get(&self, _key: &str) -> Result<Option<CacheEntry>, RpcProxyError> {
        Ok(None)
    }

    async fn get_stale(&self, _key: &str) -> Result<Option<CacheEntry>, RpcProxyError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _data: Vec<u8>, _ttl: Ttl) -> Result<(), RpcProxyError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<(), RpcProxyError> {
        Ok(())
    }

    async fn set_entry(&self, _key: &str, _entry: CacheEntry) -> Result<(), RpcProxyError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        self.label
    }
}
