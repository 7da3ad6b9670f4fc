use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CacheErrorKind, RpcProxyError};

/// `(fresh_duration, stale_duration)` in seconds. `stale_at = created_at +
/// fresh`; `expires_at = stale_at + stale`. A policy with no explicit stale
/// window may default `stale = fresh / 10`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Ttl {
    pub fresh_secs: u64,
    pub stale_secs: u64,
}

impl Ttl {
    pub fn new(fresh_secs: u64) -> Self {
        Self {
            fresh_secs,
            stale_secs: (fresh_secs / 10).max(1),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.fresh_secs == 0
    }
}

/// The binding format all three tiers agree on so `get_stale` and
/// cross-tier propagation work no matter which tier produced the entry.
/// `data` is the verbatim upstream response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub stale_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(data: Vec<u8>, ttl: Ttl) -> Self {
        let created_at = Utc::now();
        let stale_at = created_at + chrono::Duration::seconds(ttl.fresh_secs as i64);
        let expires_at = stale_at + chrono::Duration::seconds(ttl.stale_secs as i64);
        Self {
            data,
            created_at,
            stale_at,
            expires_at,
        }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.stale_at
    }

    pub fn is_stale_but_usable(&self, now: DateTime<Utc>) -> bool {
        self.stale_at <= now && now < self.expires_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// TTL covering the entry's *remaining* lifetime from `now`, used when
    /// propagating a hit from a lower tier up to higher ones.
    pub fn remaining_ttl(&self, now: DateTime<Utc>) -> Ttl {
        let fresh = (self.stale_at - now).num_seconds().max(0) as u64;
        let stale = (self.expires_at - self.stale_at.max(now)).num_seconds().max(0) as u64;
        Ttl {
            fresh_secs: fresh,
            stale_secs: stale,
        }
    }

    /// Whichever of `self` and `other` expires later wins — used so a write
    /// with a shorter TTL never truncates an existing fresher entry.
    pub fn should_overwrite(existing: Option<&CacheEntry>, candidate: &CacheEntry) -> bool {
        match existing {
            None => true,
            Some(existing) => candidate.expires_at >= existing.expires_at,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, RpcProxyError> {
        serde_json::to_vec(self).map_err(|e| RpcProxyError::Cache(CacheErrorKind::Encode, e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RpcProxyError> {
        serde_json::from_slice(bytes).map_err(|e| RpcProxyError::Cache(CacheErrorKind::Decode, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_created_le_stale_le_expires() {
        let entry = CacheEntry::new(b"data".to_vec(), Ttl::new(60));
        assert!(entry.created_at <= entry.stale_at);
        assert!(entry.stale_at <= entry.expires_at);
    }

    #[test]
    fn fresh_then_stale_then_expired() {
        let entry = CacheEntry::new(b"data".to_vec(), Ttl { fresh_secs: 10, stale_secs: 5 });
        assert!(entry.is_fresh(entry.created_at));
        assert!(!entry.is_stale_but_usable(entry.created_at));

        let mid_stale = entry.stale_at + chrono::Duration::seconds(1);
        assert!(!entry.is_fresh(mid_stale));
        assert!(entry.is_stale_but_usable(mid_stale));
        assert!(!entry.is_expired(mid_stale));

        let past_expiry = entry.expires_at + chrono::Duration::seconds(1);
        assert!(entry.is_expired(past_expiry));
    }

    #[test]
    fn overwrite_never_truncates_fresher_entry() {
        let long_lived = CacheEntry::new(b"long".to_vec(), Ttl::new(600));
        let short_lived = CacheEntry::new(b"short".to_vec(), Ttl::new(5));
        assert!(!CacheEntry::should_overwrite(Some(&long_lived), &short_lived));
        assert!(CacheEntry::should_overwrite(Some(&short_lived), &long_lived));
        assert!(CacheEntry::should_overwrite(None, &short_lived));
    }

    #[test]
    fn round_trips_through_encode_decode() {
        let entry = CacheEntry::new(b"{\"result\":\"0x1\"}".to_vec(), Ttl::new(30));
        let bytes = entry.encode().unwrap();
        let decoded = CacheEntry::decode(&bytes).unwrap();
        assert_eq!(decoded.data, entry.data);
        assert_eq!(decoded.expires_at, entry.expires_at);
    }
}
