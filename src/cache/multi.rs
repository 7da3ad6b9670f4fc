use std::sync::Arc;

use chrono::Utc;
use tracing::trace;

use crate::error::RpcProxyError;

use super::envelope::{CacheEntry, Ttl};
use super::tier::CacheTier;

/// Which tier satisfied a read, for metrics tagging (`level=l1|l2|l3`) and
/// for deciding which lower tiers need propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitLevel {
    L1,
    L2,
    L3,
}

impl HitLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::L1 => "l1",
            Self::L2 => "l2",
            Self::L3 => "l3",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::L1 => 0,
            Self::L2 => 1,
            Self::L3 => 2,
        }
    }
}

pub struct Hit {
    pub entry: CacheEntry,
    pub level: HitLevel,
}

/// Composite read-through over the fixed-order tier list `[L1, L2, L3]`.
/// Reads are sequential (a miss at L1 must not pay the cost of querying L2
/// and L3 in parallel just to save a few milliseconds on a rare path);
/// writes are sequential too but partial-failure tolerant — the earliest
/// tier to succeed is enough for `set` to be considered successful.
pub struct MultiCache {
    tiers: [Arc<dyn CacheTier>; 3],
    propagate: bool,
}

impl MultiCache {
    pub fn new(l1: Arc<dyn CacheTier>, l2: Arc<dyn CacheTier>, l3: Arc<dyn CacheTier>, propagate: bool) -> Self {
        Self {
            tiers: [l1, l2, l3],
            propagate,
        }
    }

    pub async fn get(&self, key: &str) -> Option<Hit> {
        self.read(key, false).await
    }

    pub async fn get_stale(&self, key: &str) -> Option<Hit> {
        self.read(key, true).await
    }

    async fn read(&self, key: &str, allow_stale: bool) -> Option<Hit> {
        for (i, tier) in self.tiers.iter().enumerate() {
            let found = if allow_stale {
                tier.get_stale(key).await
            } else {
                tier.get(key).await
            };
            let entry = match found {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(_) => continue, // absorbed: tier errors are a miss
            };

            let level = match i {
                0 => HitLevel::L1,
                1 => HitLevel::L2,
                _ => HitLevel::L3,
            };
            trace!(key = %key, level = %level.as_str(), "cache hit");

            if i > 0 && self.propagate {
                self.propagate_up(key, &entry, level);
            }

            return Some(Hit { entry, level });
        }
        None
    }

    /// Best-effort, off the response path: spawns the write to every tier
    /// above the one that served it, using the entry's remaining TTL.
    /// Fire-and-forget — the caller never awaits this, so a slow or failing
    /// lower-priority tier can never add latency to the response.
    fn propagate_up(&self, key: &str, entry: &CacheEntry, level: HitLevel) {
        let now = Utc::now();
        let remaining = entry.remaining_ttl(now);
        let propagated = CacheEntry::new(entry.data.clone(), remaining);
        let key = key.to_string();
        let tiers: Vec<Arc<dyn CacheTier>> = self.tiers[..level.index()].to_vec();

        tokio::spawn(async move {
            for tier in &tiers {
                if let Err(e) = tier.set_entry(&key, propagated.clone()).await {
                    trace!(error = %e, tier = %tier.name(), "propagation write failed");
                }
            }
        });
    }

    pub async fn set(&self, key: &str, data: Vec<u8>, ttl: Ttl) -> Result<(), RpcProxyError> {
        let mut any_ok = false;
        let mut last_err = None;
        for tier in &self.tiers {
            match tier.set(key, data.clone(), ttl).await {
                Ok(()) => any_ok = true,
                Err(e) => last_err = Some(e),
            }
        }
        if any_ok {
            Ok(())
        } else {
            Err(last_err.unwrap_or(RpcProxyError::Cache(
                crate::error::CacheErrorKind::Encode,
                "all tiers failed".into(),
            )))
        }
    }

    pub async fn delete(&self, key: &str) -> Result<(), RpcProxyError> {
        for tier in &self.tiers {
            let _ = tier.delete(key).await;
        }
        Ok(())
    }
}
