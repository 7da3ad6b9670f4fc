use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::Provider;

/// Mapping `chain_id → ordered list of valid Providers`, plus the timestamp
/// of the cycle that produced it. Replacement is by pointer swap (see
/// `arc_swap::ArcSwap` in `Validator`); readers never observe a
/// half-updated snapshot because they capture the `Arc` once per request.
#[derive(Debug, Clone, Serialize)]
pub struct ValidProviderSnapshot {
    pub generated_at: DateTime<Utc>,
    pub by_chain_id: HashMap<u64, Vec<Provider>>,
}

impl ValidProviderSnapshot {
    pub fn empty() -> Self {
        Self {
            generated_at: Utc::now(),
            by_chain_id: HashMap::new(),
        }
    }

    /// Providers for `chain_id`, optionally filtered by `provider_type`
    /// while preserving their relative order.
    pub fn providers_for(&self, chain_id: u64, provider_type: Option<&str>) -> Vec<Provider> {
        let Some(providers) = self.by_chain_id.get(&chain_id) else {
            return Vec::new();
        };
        match provider_type {
            None => providers.clone(),
            Some(t) => providers
                .iter()
                .filter(|p| p.provider_type == t)
                .cloned()
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_chain_id.values().all(|v| v.is_empty())
    }
}
