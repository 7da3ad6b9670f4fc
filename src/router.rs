use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tracing::warn;

use crate::cache_service::{CacheOutcome, CacheService};
use crate::coalesce::Coalescer;
use crate::error::RpcProxyError;
use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use crate::upstream::{CallOutcome, UpstreamClient};
use crate::validator::ValidProviderSnapshot;

const COALESCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Ties the cache, the upstream client, and the validator's live snapshot
/// together for a single JSON-RPC call: cache first, then the current
/// valid-candidate list in order, retrying per the configured policy until
/// one succeeds or the list is exhausted. Concurrent misses on the same
/// cache key are coalesced so only one of them actually reaches upstream.
pub struct Router {
    cache: Arc<CacheService>,
    client: Arc<UpstreamClient>,
    snapshot: Arc<ArcSwap<ValidProviderSnapshot>>,
    coalescer: Coalescer<JsonRpcResponse>,
}

impl Router {
    pub fn new(
        cache: Arc<CacheService>,
        client: Arc<UpstreamClient>,
        snapshot: Arc<ArcSwap<ValidProviderSnapshot>>,
    ) -> Self {
        Self {
            cache,
            client,
            snapshot,
            coalescer: Coalescer::new(COALESCE_TIMEOUT),
        }
    }

    pub async fn handle(
        &self,
        chain: &str,
        network: &str,
        chain_id: u64,
        provider_type: Option<&str>,
        request: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, RpcProxyError> {
        match self.cache.get(chain, network, request).await? {
            CacheOutcome::Hit(response) => return Ok(response),
            CacheOutcome::Bypass => return self.fetch(chain, network, chain_id, provider_type, request).await,
            CacheOutcome::Miss => {}
        }

        match self.cache.key_for(chain, network, request) {
            Ok(key) => {
                self.coalescer
                    .run(&key, || self.fetch(chain, network, chain_id, provider_type, request))
                    .await
            }
            Err(_) => self.fetch(chain, network, chain_id, provider_type, request).await,
        }
    }

    async fn fetch(
        &self,
        chain: &str,
        network: &str,
        chain_id: u64,
        provider_type: Option<&str>,
        request: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, RpcProxyError> {
        let snapshot = self.snapshot.load();
        let providers = snapshot.providers_for(chain_id, provider_type);
        if providers.is_empty() {
            return Err(RpcProxyError::NoProviders);
        }

        let mut last_error = None;
        for provider in &providers {
            match self.client.call(provider, request).await {
                CallOutcome::Success(response) => {
                    if let Err(e) = self.cache.set(chain, network, request, &response).await {
                        warn!(error = %e, provider = %provider.name, "cache write failed after upstream success");
                    }
                    return Ok(response);
                }
                CallOutcome::Fatal(response) => return Ok(response),
                CallOutcome::Retryable(e) => {
                    warn!(provider = %provider.name, error = %e, "provider failed, trying next candidate");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(RpcProxyError::NoProviders))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::l1::L1Cache;
    use crate::cache::tier::NoopTier;
    use crate::cache::{CacheRules, MultiCache};
    use crate::model::{AuthMode, Provider};
    use std::collections::HashMap;
    use std::time::Duration;

    fn router_with_no_providers() -> Router {
        let cache = Arc::new(CacheService::new(
            CacheRules::empty(),
            Arc::new(MultiCache::new(
                Arc::new(L1Cache::new(1024 * 1024)),
                Arc::new(NoopTier::new("l2")),
                Arc::new(NoopTier::new("l3")),
                true,
            )),
        ));
        let client = Arc::new(UpstreamClient::new(Duration::from_millis(50), vec![], vec![]));
        let snapshot = Arc::new(ArcSwap::from_pointee(ValidProviderSnapshot::empty()));
        Router::new(cache, client, snapshot)
    }

    #[tokio::test]
    async fn empty_snapshot_yields_no_providers() {
        let router = router_with_no_providers();
        let request = JsonRpcRequest {
            jsonrpc: "2.0".into(),
            method: "eth_blockNumber".into(),
            params: serde_json::json!([]),
            id: serde_json::json!(1),
        };
        let result = router.handle("ethereum", "mainnet", 1, None, &request).await;
        assert!(matches!(result, Err(RpcProxyError::NoProviders)));
    }

    #[tokio::test]
    async fn exhausting_unreachable_candidates_surfaces_last_error() {
        let cache = Arc::new(CacheService::new(
            CacheRules::empty(),
            Arc::new(MultiCache::new(
                Arc::new(L1Cache::new(1024 * 1024)),
                Arc::new(NoopTier::new("l2")),
                Arc::new(NoopTier::new("l3")),
                true,
            )),
        ));
        let client = Arc::new(UpstreamClient::new(Duration::from_millis(50), vec![], vec![]));
        let mut by_chain_id = HashMap::new();
        by_chain_id.insert(
            1,
            vec![Provider {
                name: "dead".into(),
                provider_type: "primary".into(),
                base_url: "https://rpc.invalid.example".into(),
                auth: AuthMode::None,
                chain_id: 1,
            }],
        );
        let snapshot = Arc::new(ArcSwap::from_pointee(ValidProviderSnapshot {
            generated_at: chrono::Utc::now(),
            by_chain_id,
        }));
        let router = Router::new(cache, client, snapshot);

        let request = JsonRpcRequest {
            jsonrpc: "2.0".into(),
            method: "eth_blockNumber".into(),
            params: serde_json::json!([]),
            id: serde_json::json!(1),
        };
        let result = router.handle("ethereum", "mainnet", 1, None, &request).await;
        assert!(matches!(result, Err(RpcProxyError::UpstreamTransient(_))));
    }
}
