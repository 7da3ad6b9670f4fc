use sha2::{Digest, Sha256};

use crate::error::RpcProxyError;

use super::request::JsonRpcRequest;

/// Canonicalizes a JSON-RPC request into a deterministic cache key of the
/// form `chain:network:method:jsonrpc:H`, where `H` is a SHA-256 digest
/// (hex-encoded) of the canonical JSON encoding of `params`. `serde_json`
/// serializes object keys in sorted order by default (no `preserve_order`
/// feature is enabled anywhere in this crate), so `to_string` already
/// produces a canonical encoding without a separate normalization pass.
pub struct KeyBuilder;

impl KeyBuilder {
    pub fn build(
        chain: &str,
        network: &str,
        request: &JsonRpcRequest,
    ) -> Result<String, RpcProxyError> {
        if chain.is_empty() {
            return Err(RpcProxyError::BadRequest("empty chain".into()));
        }
        if network.is_empty() {
            return Err(RpcProxyError::BadRequest("empty network".into()));
        }
        if request.method.is_empty() {
            return Err(RpcProxyError::BadRequest("empty method".into()));
        }

        let canonical = serde_json::to_string(&request.params)
            .map_err(|e| RpcProxyError::BadRequest(format!("unserializable params: {e}")))?;

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let digest = hex::encode(hasher.finalize());

        Ok(format!(
            "{chain}:{network}:{}:{}:{digest}",
            request.method, request.jsonrpc
        ))
    }

    /// Batch form: fails as a whole if any request fails to key.
    pub fn build_batch(
        chain: &str,
        network: &str,
        requests: &[&JsonRpcRequest],
    ) -> Result<Vec<String>, RpcProxyError> {
        requests
            .iter()
            .map(|r| Self::build(chain, network, r))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(id: i64, params: serde_json::Value) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".into(),
            method: "eth_getBlockByNumber".into(),
            params,
            id: serde_json::json!(id),
        }
    }

    #[test]
    fn key_ignores_id() {
        let a = req(1, serde_json::json!(["0x1", true]));
        let b = req(999, serde_json::json!(["0x1", true]));
        let ka = KeyBuilder::build("ethereum", "mainnet", &a).unwrap();
        let kb = KeyBuilder::build("ethereum", "mainnet", &b).unwrap();
        assert_eq!(ka, kb);
    }

    #[test]
    fn key_differs_on_params() {
        let a = req(1, serde_json::json!(["0x1", true]));
        let b = req(1, serde_json::json!(["0x2", true]));
        let ka = KeyBuilder::build("ethereum", "mainnet", &a).unwrap();
        let kb = KeyBuilder::build("ethereum", "mainnet", &b).unwrap();
        assert_ne!(ka, kb);
    }

    #[test]
    fn key_insensitive_to_object_key_order() {
        let a = req(1, serde_json::json!({"blockHash": "0xabc", "fromBlock": "0x1"}));
        let b = req(1, serde_json::json!({"fromBlock": "0x1", "blockHash": "0xabc"}));
        let ka = KeyBuilder::build("ethereum", "mainnet", &a).unwrap();
        let kb = KeyBuilder::build("ethereum", "mainnet", &b).unwrap();
        assert_eq!(ka, kb);
    }

    #[test]
    fn empty_method_is_bad_request() {
        let mut r = req(1, serde_json::json!([]));
        r.method = String::new();
        assert!(matches!(
            KeyBuilder::build("ethereum", "mainnet", &r),
            Err(RpcProxyError::BadRequest(_))
        ));
    }

    #[test]
    fn batch_keys_preserve_order_and_length() {
        let a = req(1, serde_json::json!(["0x1", true]));
        let b = req(2, serde_json::json!(["0x2", true]));
        let keys = KeyBuilder::build_batch("ethereum", "mainnet", &[&a, &b]).unwrap();
        assert_eq!(keys.len(), 2);
        assert_ne!(keys[0], keys[1]);
    }
}
