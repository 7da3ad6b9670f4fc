use std::sync::Arc;

use metrics::counter;

use crate::cache::{CacheClass, CacheRules, MultiCache, Ttl};
use crate::error::RpcProxyError;
use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse, KeyBuilder};

#[derive(Debug)]
pub enum CacheOutcome {
    /// Class is `none` or the resolved TTL is zero — never even attempted.
    Bypass,
    Hit(JsonRpcResponse),
    Miss,
}

#[derive(Debug, Clone, Copy)]
pub struct CacheInfo {
    pub class: CacheClass,
    pub ttl_seconds: u64,
}

/// The router's single entry point into the cache engine. Parses nothing
/// itself (callers hand it an already-parsed `JsonRpcRequest`) but owns key
/// construction, rule resolution, the hit-side id rewrite, and the refusal
/// rules around `set`.
pub struct CacheService {
    rules: CacheRules,
    cache: Arc<MultiCache>,
}

impl CacheService {
    pub fn new(rules: CacheRules, cache: Arc<MultiCache>) -> Self {
        Self { rules, cache }
    }

    fn resolve(&self, chain: &str, network: &str, method: &str) -> (CacheClass, Ttl) {
        let class = self.rules.class_for(method);
        let ttl = self.rules.ttl_for(chain, network, class);
        (class, ttl)
    }

    pub async fn get(
        &self,
        chain: &str,
        network: &str,
        request: &JsonRpcRequest,
    ) -> Result<CacheOutcome, RpcProxyError> {
        let (class, ttl) = self.resolve(chain, network, &request.method);
        if class == CacheClass::None || ttl.is_zero() {
            return Ok(CacheOutcome::Bypass);
        }

        let key = KeyBuilder::build(chain, network, request)?;

        match self.cache.get(&key).await {
            Some(hit) => {
                let mut response: JsonRpcResponse = serde_json::from_slice(&hit.entry.data)?;
                response.id = request.id.clone();
                counter!(
                    "cache_requests_total",
                    "result" => "hit",
                    "level" => hit.level.as_str(),
                    "class" => class.as_str(),
                    "chain" => format!("{chain}:{network}"),
                    "method" => request.method.clone(),
                )
                .increment(1);
                Ok(CacheOutcome::Hit(response))
            }
            None => {
                counter!(
                    "cache_requests_total",
                    "result" => "miss",
                    "level" => "none",
                    "class" => class.as_str(),
                    "chain" => format!("{chain}:{network}"),
                    "method" => request.method.clone(),
                )
                .increment(1);
                Ok(CacheOutcome::Miss)
            }
        }
    }

    pub async fn set(
        &self,
        chain: &str,
        network: &str,
        request: &JsonRpcRequest,
        response: &JsonRpcResponse,
    ) -> Result<(), RpcProxyError> {
        let (class, ttl) = self.resolve(chain, network, &request.method);
        if class == CacheClass::None || ttl.is_zero() {
            return Ok(());
        }
        if response.error.is_some() {
            return Ok(());
        }
        let is_null_result = matches!(response.result, Some(serde_json::Value::Null)) || response.result.is_none();
        if is_null_result && self.rules.skip_null_cache(&request.method) {
            return Ok(());
        }

        let key = KeyBuilder::build(chain, network, request)?;
        let data = serde_json::to_vec(response)?;
        self.cache.set(&key, data, ttl).await
    }

    /// Exposes the canonical cache key for a request, used by the router to
    /// scope in-flight request coalescing to exactly the requests that would
    /// actually share a cache entry.
    pub fn key_for(&self, chain: &str, network: &str, request: &JsonRpcRequest) -> Result<String, RpcProxyError> {
        KeyBuilder::build(chain, network, request)
    }

    pub fn get_cache_info(&self, chain: &str, network: &str, method: &str) -> CacheInfo {
        let (class, ttl) = self.resolve(chain, network, method);
        CacheInfo {
            class,
            ttl_seconds: ttl.fresh_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::l1::L1Cache;
    use crate::cache::tier::NoopTier;
    use crate::cache::policy::{CacheRulesFile, TtlRule};
    use std::collections::HashMap;

    fn service() -> CacheService {
        let file = CacheRulesFile {
            method_classes: HashMap::from([
                ("eth_sendRawTransaction".to_string(), CacheClass::None),
                ("eth_getBalance".to_string(), CacheClass::Short),
            ]),
            default_class: Some(CacheClass::Short),
            ttls: vec![TtlRule {
                chain: "ethereum".into(),
                network: "mainnet".into(),
                class: CacheClass::Short,
                fresh_secs: 30,
                stale_secs: Some(5),
            }],
            skip_null_cache_methods: vec!["eth_getTransactionReceipt".to_string()],
        };
        let rules = CacheRules::from_file(file);
        let cache = Arc::new(MultiCache::new(
            Arc::new(L1Cache::new(1024 * 1024)),
            Arc::new(NoopTier::new("l2")),
            Arc::new(NoopTier::new("l3")),
            true,
        ));
        CacheService::new(rules, cache)
    }

    fn req(method: &str, id: i64) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params: serde_json::json!([]),
            id: serde_json::json!(id),
        }
    }

    #[tokio::test]
    async fn none_class_bypasses() {
        let svc = service();
        let r = req("eth_sendRawTransaction", 1);
        let outcome = svc.get("ethereum", "mainnet", &r).await.unwrap();
        assert!(matches!(outcome, CacheOutcome::Bypass));
    }

    #[tokio::test]
    async fn set_then_get_rewrites_id() {
        let svc = service();
        let set_req = req("eth_getBalance", 1);
        let response = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            result: Some(serde_json::json!("0x10")),
            error: None,
            id: serde_json::json!(1),
        };
        svc.set("ethereum", "mainnet", &set_req, &response).await.unwrap();

        let get_req = req("eth_getBalance", 42);
        match svc.get("ethereum", "mainnet", &get_req).await.unwrap() {
            CacheOutcome::Hit(resp) => {
                assert_eq!(resp.id, serde_json::json!(42));
                assert_eq!(resp.result, Some(serde_json::json!("0x10")));
            }
            other => panic!("expected hit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_response_is_never_cached() {
        let svc = service();
        let r = req("eth_getBalance", 1);
        let response = JsonRpcResponse::error(serde_json::json!(1), -32000, "boom");
        svc.set("ethereum", "mainnet", &r, &response).await.unwrap();
        let outcome = svc.get("ethereum", "mainnet", &r).await.unwrap();
        assert!(matches!(outcome, CacheOutcome::Miss));
    }

    #[tokio::test]
    async fn null_result_on_skip_null_cache_method_is_refused() {
        let svc = service();
        let r = req("eth_getTransactionReceipt", 1);
        let response = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            result: Some(serde_json::Value::Null),
            error: None,
            id: serde_json::json!(1),
        };
        svc.set("ethereum", "mainnet", &r, &response).await.unwrap();
        let outcome = svc.get("ethereum", "mainnet", &r).await.unwrap();
        assert!(matches!(outcome, CacheOutcome::Miss));
    }
}
