use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use crate::error::{CacheErrorKind, RpcProxyError};

use super::envelope::{CacheEntry, Ttl};
use super::tier::CacheTier;

/// L3's backing store is explicitly out of scope as a concrete technology —
/// it is "an opaque key→bytes store with TTL". This trait is the seam: any
/// implementation (object storage, a local directory, a second Redis
/// instance) plugs in here without the tier logic above changing.
#[async_trait]
pub trait OpaqueStore: Send + Sync {
    async fn get(&self, key: &str) -> std::io::Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, bytes: Vec<u8>) -> std::io::Result<()>;
    async fn delete(&self, key: &str) -> std::io::Result<()>;
}

/// A local-directory `OpaqueStore`: one file per key, written via a
/// temp-file-then-rename so a crash mid-write never leaves a half-written
/// entry observable to a reader.
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        use sha2::Digest;
        let mut hasher = sha2::Sha256::new();
        hasher.update(key.as_bytes());
        self.root.join(hex::encode(hasher.finalize()))
    }
}

#[async_trait]
impl OpaqueStore for DirectoryStore {
    async fn get(&self, key: &str) -> std::io::Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set(&self, key: &str, bytes: Vec<u8>) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.path_for(key);
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await
    }

    async fn delete(&self, key: &str) -> std::io::Result<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// L3 tier. When disabled (`store = None`) it behaves as a constant-miss
/// cache that silently accepts writes, same as any other no-op tier.
pub struct L3Cache {
    store: Option<Arc<dyn OpaqueStore>>,
}

impl L3Cache {
    pub fn new(store: Option<Arc<dyn OpaqueStore>>) -> Self {
        Self { store }
    }

    pub fn disabled() -> Self {
        Self { store: None }
    }

    async fn read_entry(&self, key: &str) -> Option<CacheEntry> {
        let store = self.store.as_ref()?;
        match store.get(key).await {
            Ok(Some(bytes)) => CacheEntry::decode(&bytes).ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, key = %key, "l3 read failed");
                None
            }
        }
    }
}

#[async_trait]
impl CacheTier for L3Cache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, RpcProxyError> {
        let now = Utc::now();
        Ok(self.read_entry(key).await.filter(|e| e.is_fresh(now)))
    }

    async fn get_stale(&self, key: &str) -> Result<Option<CacheEntry>, RpcProxyError> {
        let now = Utc::now();
        Ok(self.read_entry(key).await.filter(|e| !e.is_expired(now)))
    }

    async fn set(&self, key: &str, data: Vec<u8>, ttl: Ttl) -> Result<(), RpcProxyError> {
        self.set_entry(key, CacheEntry::new(data, ttl)).await
    }

    async fn delete(&self, key: &str) -> Result<(), RpcProxyError> {
        if let Some(store) = &self.store {
            if let Err(e) = store.delete(key).await {
                warn!(error = %e, key = %key, "l3 delete failed");
            }
        }
        Ok(())
    }

    async fn set_entry(&self, key: &str, entry: CacheEntry) -> Result<(), RpcProxyError> {
        let Some(store) = &self.store else { return Ok(()) };
        let existing = self.read_entry(key).await;
        if !CacheEntry::should_overwrite(existing.as_ref(), &entry) {
            return Ok(());
        }
        let bytes = entry.encode().map_err(|_| {
            RpcProxyError::Cache(CacheErrorKind::Encode, "l3 encode failed".into())
        })?;
        if let Err(e) = store.set(key, bytes).await {
            warn!(error = %e, key = %key, "l3 write failed");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "l3"
    }
}
