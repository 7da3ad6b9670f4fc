use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use moka::future::Cache;
use moka::Expiry;

use crate::error::RpcProxyError;

use super::envelope::{CacheEntry, Ttl};
use super::tier::CacheTier;

struct EntryExpiry;

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _current_time: Instant,
    ) -> Option<Duration> {
        // Keep the entry around through `expires_at`, not `stale_at` — the
        // stale-but-usable window must still be servable by `get_stale`.
        let remaining = (value.expires_at - Utc::now()).num_milliseconds().max(0);
        Some(Duration::from_millis(remaining as u64))
    }
}

/// In-process fixed-capacity tier. Capacity is a byte budget: the weigher
/// charges each entry its encoded data length, and moka evicts under its
/// default (approximated LRU/LFU, "TinyLFU"-adjacent) policy once the
/// budget is exceeded.
pub struct L1Cache {
    cache: Cache<String, CacheEntry>,
    capacity_bytes: u64,
}

impl L1Cache {
    pub fn new(capacity_bytes: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity_bytes)
            .weigher(|_key: &String, value: &CacheEntry| -> u32 {
                value.data.len().try_into().unwrap_or(u32::MAX)
            })
            .expire_after(EntryExpiry)
            .build();

        Self { cache, capacity_bytes }
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    pub fn used_bytes(&self) -> u64 {
        self.cache.weighted_size()
    }

    pub fn key_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl CacheTier for L1Cache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, RpcProxyError> {
        let now = Utc::now();
        Ok(self.cache.get(key).await.filter(|e| e.is_fresh(now)))
    }

    async fn get_stale(&self, key: &str) -> Result<Option<CacheEntry>, RpcProxyError> {
        let now = Utc::now();
        Ok(self.cache.get(key).await.filter(|e| !e.is_expired(now)))
    }

    async fn set(&self, key: &str, data: Vec<u8>, ttl: Ttl) -> Result<(), RpcProxyError> {
        self.set_entry(key, CacheEntry::new(data, ttl)).await
    }

    async fn delete(&self, key: &str) -> Result<(), RpcProxyError> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn set_entry(&self, key: &str, entry: CacheEntry) -> Result<(), RpcProxyError> {
        let existing = self.cache.get(key).await;
        if CacheEntry::should_overwrite(existing.as_ref(), &entry) {
            self.cache.insert(key.to_string(), entry).await;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "l1"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn miss_then_hit() {
        let l1 = L1Cache::new(1024 * 1024);
        assert!(l1.get("k").await.unwrap().is_none());
        l1.set("k", b"v".to_vec(), Ttl::new(60)).await.unwrap();
        assert!(l1.get("k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn shorter_ttl_write_does_not_truncate_longer_entry() {
        let l1 = L1Cache::new(1024 * 1024);
        l1.set("k", b"long".to_vec(), Ttl::new(600)).await.unwrap();
        l1.set("k", b"short".to_vec(), Ttl::new(5)).await.unwrap();
        let entry = l1.get("k").await.unwrap().unwrap();
        assert_eq!(entry.data, b"long".to_vec());
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let l1 = L1Cache::new(1024 * 1024);
        l1.set("k", b"v".to_vec(), Ttl::new(60)).await.unwrap();
        l1.delete("k").await.unwrap();
        assert!(l1.get("k").await.unwrap().is_none());
    }
}
