use std::collections::HashSet;
use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::error::RpcProxyError;
use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use crate::model::{AuthMode, Provider};

/// Outcome of a single provider call, already classified against the
/// configured retry rules. `Fatal` carries a well-formed JSON-RPC error
/// response that should go straight back to the client rather than advance
/// to the next candidate.
pub enum CallOutcome {
    Success(JsonRpcResponse),
    Fatal(JsonRpcResponse),
    Retryable(RpcProxyError),
}

/// The HTTP client used by the router to reach candidate providers.
/// Retry classification is entirely configuration-driven: neither the HTTP
/// status set nor the JSON-RPC error code set is hard-coded here.
pub struct UpstreamClient {
    http: Client,
    timeout: Duration,
    retry_http_statuses: HashSet<u16>,
    retry_rpc_codes: HashSet<i64>,
}

impl UpstreamClient {
    pub fn new(timeout: Duration, retry_http_statuses: Vec<u16>, retry_rpc_codes: Vec<i64>) -> Self {
        Self {
            http: Client::builder()
                .pool_max_idle_per_host(20)
                .build()
                .expect("failed to build upstream HTTP client"),
            timeout,
            retry_http_statuses: retry_http_statuses.into_iter().collect(),
            retry_rpc_codes: retry_rpc_codes.into_iter().collect(),
        }
    }

    pub async fn call(&self, provider: &Provider, request: &JsonRpcRequest) -> CallOutcome {
        let mut builder = self
            .http
            .post(provider.request_url())
            .header("content-type", "application/json")
            .json(request);

        if let AuthMode::Basic { login, password } = &provider.auth {
            builder = builder.basic_auth(login, Some(password));
        }

        let sent = tokio::time::timeout(self.timeout, builder.send()).await;
        let response = match sent {
            Err(_) => {
                return CallOutcome::Retryable(RpcProxyError::UpstreamTransient(format!(
                    "{} timed out",
                    provider.name
                )));
            }
            Ok(Err(e)) => {
                return CallOutcome::Retryable(RpcProxyError::UpstreamTransient(format!(
                    "{}: {e}",
                    provider.name
                )));
            }
            Ok(Ok(r)) => r,
        };

        let status = response.status();
        if self.retry_http_statuses.contains(&status.as_u16()) {
            debug!(provider = %provider.name, status = %status, "retryable HTTP status");
            return CallOutcome::Retryable(RpcProxyError::UpstreamTransient(format!(
                "{}: HTTP {status}",
                provider.name
            )));
        }

        let text = match response.text().await {
            Ok(t) => t,
            Err(e) => {
                return CallOutcome::Retryable(RpcProxyError::UpstreamTransient(format!(
                    "{}: {e}",
                    provider.name
                )));
            }
        };

        let parsed: JsonRpcResponse = match serde_json::from_str(&text) {
            Ok(r) => r,
            Err(e) => {
                return CallOutcome::Retryable(RpcProxyError::UpstreamTransient(format!(
                    "{}: invalid JSON-RPC response: {e}",
                    provider.name
                )));
            }
        };

        if !status.is_success() {
            return CallOutcome::Retryable(RpcProxyError::UpstreamTransient(format!(
                "{}: HTTP {status}",
                provider.name
            )));
        }

        if let Some(err) = &parsed.error {
            if self.retry_rpc_codes.contains(&err.code) {
                debug!(provider = %provider.name, code = %err.code, "retryable JSON-RPC error code");
                return CallOutcome::Retryable(RpcProxyError::UpstreamTransient(format!(
                    "{}: rpc code {}",
                    provider.name, err.code
                )));
            }
            return CallOutcome::Fatal(parsed);
        }

        CallOutcome::Success(parsed)
    }
}
