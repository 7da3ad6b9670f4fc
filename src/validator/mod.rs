pub mod snapshot;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::error::RpcProxyError;
use crate::jsonrpc::JsonRpcResponse;
use crate::model::{ChainBinding, Provider};

pub use snapshot::ValidProviderSnapshot;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MethodTest {
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(rename = "maxDifference", deserialize_with = "deserialize_decimal_string")]
    pub max_difference: f64,
    #[serde(rename = "skipChains", default)]
    pub skip_chains: Vec<u64>,
}

fn deserialize_decimal_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(f64),
    }
    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s.parse::<f64>().map_err(serde::de::Error::custom),
        StringOrNumber::Number(n) => Ok(n),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateOutcome {
    pub provider: String,
    pub failing_methods: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub chains: Vec<ChainCycleReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainCycleReport {
    pub chain: String,
    pub network: String,
    pub chain_id: u64,
    pub valid: Vec<String>,
    pub invalid: Vec<CandidateOutcome>,
    pub unknown_methods: Vec<String>,
}

/// Executes one `(provider, method, params)` call against the wire. Kept as
/// a seam so tests can substitute a fake runner instead of making real HTTP
/// calls.
#[async_trait]
pub trait ProbeRunner: Send + Sync {
    async fn call(
        &self,
        provider: &Provider,
        method: &str,
        params: &serde_json::Value,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, RpcProxyError>;
}

pub struct HttpProbeRunner {
    client: reqwest::Client,
}

impl HttpProbeRunner {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .build()
                .expect("failed to build validator HTTP client"),
        }
    }
}

impl Default for HttpProbeRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProbeRunner for HttpProbeRunner {
    async fn call(
        &self,
        provider: &Provider,
        method: &str,
        params: &serde_json::Value,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, RpcProxyError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1,
        });

        let resp = tokio::time::timeout(
            timeout,
            self.client
                .post(provider.request_url())
                .header("content-type", "application/json")
                .json(&body)
                .send(),
        )
        .await
        .map_err(|_| RpcProxyError::UpstreamTransient("validator probe timed out".into()))?
        .map_err(|e| RpcProxyError::UpstreamTransient(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(RpcProxyError::UpstreamTransient(format!("HTTP {}", resp.status())));
        }

        let text = resp
            .text()
            .await
            .map_err(|e| RpcProxyError::UpstreamTransient(e.to_string()))?;
        let parsed: JsonRpcResponse = serde_json::from_str(&text)
            .map_err(|e| RpcProxyError::UpstreamTransient(format!("invalid JSON-RPC response: {e}")))?;
        Ok(parsed)
    }
}

/// Default comparison policy: absolute numeric difference within a
/// per-method bound.
fn default_compare(reference: f64, candidate: f64, max_difference: f64) -> bool {
    (reference - candidate).abs() <= max_difference
}

pub struct Validator {
    bindings: Vec<ChainBinding>,
    method_tests: Vec<MethodTest>,
    call_timeout: Duration,
    runner: Arc<dyn ProbeRunner>,
    snapshot: Arc<ArcSwap<ValidProviderSnapshot>>,
    output_path: Option<PathBuf>,
}

impl Validator {
    pub fn new(
        bindings: Vec<ChainBinding>,
        method_tests: Vec<MethodTest>,
        call_timeout: Duration,
        runner: Arc<dyn ProbeRunner>,
        output_path: Option<PathBuf>,
    ) -> Self {
        let initial = Self::seed_snapshot(&bindings);
        Self {
            bindings,
            method_tests,
            call_timeout,
            runner,
            snapshot: Arc::new(ArcSwap::from_pointee(initial)),
            output_path,
        }
    }

    /// Before the first validation cycle completes, `/providers` and the
    /// router fall back to the default configuration — every configured
    /// candidate, unfiltered — rather than an empty snapshot.
    fn seed_snapshot(bindings: &[ChainBinding]) -> ValidProviderSnapshot {
        let mut by_chain_id = std::collections::HashMap::new();
        for binding in bindings {
            by_chain_id.insert(binding.chain_id, binding.candidates.clone());
        }
        ValidProviderSnapshot {
            generated_at: chrono::Utc::now(),
            by_chain_id,
        }
    }

    pub fn snapshot_handle(&self) -> Arc<ArcSwap<ValidProviderSnapshot>> {
        self.snapshot.clone()
    }

    pub fn load(&self) -> arc_swap::Guard<Arc<ValidProviderSnapshot>> {
        self.snapshot.load()
    }

    /// One full validation pass. All provider×method calls within the cycle
    /// run concurrently; the scheduler is responsible for guaranteeing only
    /// one cycle is ever in flight.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut chain_reports = Vec::new();
        let mut by_chain_id = std::collections::HashMap::new();

        for binding in &self.bindings {
            let Some(reference) = &binding.reference else {
                continue;
            };

            let tests: Vec<&MethodTest> = self
                .method_tests
                .iter()
                .filter(|t| !t.skip_chains.contains(&binding.chain_id))
                .collect();

            let reference_results = self.call_all(reference, &tests).await;

            let mut unknown_methods = Vec::new();
            let mut reference_values = std::collections::HashMap::new();
            for test in &tests {
                match reference_results.get(&test.method) {
                    Some(Ok(resp)) => match resp.numeric_result() {
                        Some(v) => {
                            reference_values.insert(test.method.clone(), v);
                        }
                        None => unknown_methods.push(test.method.clone()),
                    },
                    _ => unknown_methods.push(test.method.clone()),
                }
            }

            let mut valid = Vec::new();
            let mut invalid = Vec::new();
            let mut valid_providers = Vec::new();

            for candidate in &binding.candidates {
                let candidate_results = self.call_all(candidate, &tests).await;
                let mut failing = Vec::new();

                for test in &tests {
                    if unknown_methods.contains(&test.method) {
                        continue; // no evidence of wrongness possible
                    }
                    let Some(reference_value) = reference_values.get(&test.method) else {
                        continue;
                    };
                    let passes = match candidate_results.get(&test.method) {
                        Some(Ok(resp)) => match resp.numeric_result() {
                            Some(candidate_value) => {
                                default_compare(*reference_value, candidate_value, test.max_difference)
                            }
                            None => false,
                        },
                        _ => false,
                    };
                    if !passes {
                        failing.push(test.method.clone());
                    }
                }

                if failing.is_empty() {
                    valid.push(candidate.name.clone());
                    valid_providers.push(candidate.clone());
                } else {
                    invalid.push(CandidateOutcome {
                        provider: candidate.name.clone(),
                        failing_methods: failing,
                    });
                }
            }

            by_chain_id.insert(binding.chain_id, valid_providers);

            chain_reports.push(ChainCycleReport {
                chain: binding.chain.clone(),
                network: binding.network.clone(),
                chain_id: binding.chain_id,
                valid,
                invalid,
                unknown_methods,
            });
        }

        let report = CycleReport {
            generated_at: chrono::Utc::now(),
            chains: chain_reports,
        };

        let new_snapshot = ValidProviderSnapshot {
            generated_at: report.generated_at,
            by_chain_id,
        };
        self.snapshot.store(Arc::new(new_snapshot.clone()));

        if let Err(e) = self.persist(&new_snapshot).await {
            warn!(error = %e, "failed to persist validator snapshot artifact");
        }

        info!(
            chains = report.chains.len(),
            "validation cycle complete"
        );
        report
    }

    async fn call_all(
        &self,
        provider: &Provider,
        tests: &[&MethodTest],
    ) -> std::collections::HashMap<String, Result<JsonRpcResponse, RpcProxyError>> {
        let mut set: JoinSet<(String, Result<JsonRpcResponse, RpcProxyError>)> = JoinSet::new();
        for test in tests {
            let runner = self.runner.clone();
            let provider = provider.clone();
            let method = test.method.clone();
            let params = test.params.clone();
            let timeout = self.call_timeout;
            set.spawn(async move {
                let result = runner.call(&provider, &method, &params, timeout).await;
                (method, result)
            });
        }

        let mut results = std::collections::HashMap::new();
        while let Some(joined) = set.join_next().await {
            if let Ok((method, result)) = joined {
                results.insert(method, result);
            }
        }
        results
    }

    async fn persist(&self, snapshot: &ValidProviderSnapshot) -> std::io::Result<()> {
        let Some(path) = &self.output_path else { return Ok(()) };

        if snapshot.is_empty() {
            match tokio::fs::remove_file(path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e),
            }
        } else {
            let bytes = serde_json::to_vec_pretty(snapshot).unwrap_or_default();
            let tmp = path.with_extension("tmp");
            tokio::fs::write(&tmp, &bytes).await?;
            tokio::fs::rename(&tmp, path).await
        }
    }
}
