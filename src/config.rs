use std::collections::HashMap;
use std::path::PathBuf;

use clap::Parser;

use crate::error::RpcProxyError;
use crate::model::{ChainBinding, ChainProvidersFile, ReferenceProvidersFile};
use crate::validator::MethodTest;
use crate::cache::CacheRulesFile;

#[derive(Parser, Debug, Clone)]
#[command(name = "rpcproxy", about = "Ethereum JSON-RPC reverse proxy")]
pub struct Config {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value = "9000")]
    pub port: u16,

    /// Optional JSON file supplying fallback values for any of the other
    /// *_PATH / *_FILE env vars that were left unset. Applied before clap
    /// parses the rest of the environment (see `load_env_overrides`).
    #[arg(long, env = "CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// JSON file: `{chains: [{name, network, chainId, providers: [...]}]}`.
    #[arg(long, env = "DEFAULT_PROVIDERS_PATH", default_value = "config/providers.json")]
    pub default_providers_path: PathBuf,

    /// JSON file: `{chains: [{name, network, chainId, provider: {...}}]}`.
    #[arg(long, env = "REFERENCE_PROVIDERS_PATH", default_value = "config/reference-providers.json")]
    pub reference_providers_path: PathBuf,

    /// JSON file: `[{method, params, maxDifference, skipChains?}, ...]`.
    #[arg(long, env = "CACHE_CONFIG_FILE", default_value = "config/method-tests.json")]
    pub method_tests_path: PathBuf,

    /// YAML file with the per-method cache-class table and per-(chain,
    /// network,class) TTLs.
    #[arg(long, env = "CACHE_RULES_FILE", default_value = "config/cache-rules.yaml")]
    pub cache_rules_path: PathBuf,

    /// Unix socket path for the L2 store, taking precedence over KEYDB_URL
    /// when set (a socket-form connection to the same Redis-compatible
    /// service).
    #[arg(long, env = "CACHE_SOCKET_PATH")]
    pub cache_socket_path: Option<PathBuf>,

    /// Redis-compatible connection URL for the L2 tier.
    #[arg(long, env = "KEYDB_URL")]
    pub keydb_url: Option<String>,

    /// Fallback file containing the KEYDB_URL value, consulted when
    /// `KEYDB_URL` itself is unset.
    #[arg(long, env = "CACHE_KEYDB_URL_FILE")]
    pub keydb_url_file: Option<PathBuf>,

    /// HMAC/JWT signing secret for the puzzle issuer and token verifier.
    #[arg(long, env = "JWT_SECRET", default_value = "change-me-in-production")]
    pub jwt_secret: String,

    /// Leading-zero-hex-character count a solved puzzle's Argon2id hash
    /// must satisfy.
    #[arg(long, env = "PUZZLE_DIFFICULTY", default_value = "4")]
    pub puzzle_difficulty: u32,

    /// How long a puzzle remains solvable.
    #[arg(long, env = "PUZZLE_TTL_SECONDS", default_value = "120")]
    pub puzzle_ttl_seconds: i64,

    /// Minted JWT lifetime.
    #[arg(long, env = "TOKEN_EXPIRY_MINUTES", default_value = "60")]
    pub token_expiry_minutes: i64,

    /// Per-token request cap enforced by the quota counter.
    #[arg(long, env = "REQUESTS_PER_TOKEN", default_value = "1000")]
    pub requests_per_token: u64,

    /// L1 in-process cache byte budget.
    #[arg(long, env = "RPCPROXY_CACHE_MAX_BYTES", default_value = "67108864")]
    pub cache_max_bytes: u64,

    /// Directory backing the optional L3 tier; unset disables L3.
    #[arg(long, env = "RPCPROXY_L3_DIR")]
    pub l3_dir: Option<PathBuf>,

    /// Per-tier, per-operation deadline for the L2 store.
    #[arg(long, env = "RPCPROXY_CACHE_DEADLINE_MS", default_value = "200")]
    pub cache_deadline_ms: u64,

    /// Validation cycle interval.
    #[arg(long, env = "RPCPROXY_VALIDATION_INTERVAL_SECS", default_value = "60")]
    pub validation_interval_secs: u64,

    /// Per-call timeout used by the validator.
    #[arg(long, env = "RPCPROXY_VALIDATION_CALL_TIMEOUT_SECS", default_value = "5")]
    pub validation_call_timeout_secs: u64,

    /// Where the validator writes its diagnostic snapshot artifact.
    #[arg(long, env = "RPCPROXY_SNAPSHOT_PATH", default_value = "data/valid-providers.json")]
    pub snapshot_path: PathBuf,

    /// Per-provider upstream request timeout for the router.
    #[arg(long, env = "RPCPROXY_REQUEST_TIMEOUT_SECS", default_value = "10")]
    pub request_timeout_secs: u64,

    /// JSON-RPC error codes that trigger a retry against the next provider,
    /// rather than being returned to the client (treated as configuration,
    /// not a hard-coded magic list).
    #[arg(
        long,
        env = "RPCPROXY_RETRY_RPC_CODES",
        value_delimiter = ',',
        default_value = "-32005,-33000,-33300,-33400"
    )]
    pub retry_rpc_codes: Vec<i64>,

    /// HTTP status codes that trigger a retry against the next provider.
    #[arg(
        long,
        env = "RPCPROXY_RETRY_HTTP_STATUSES",
        value_delimiter = ',',
        default_value = "401,402,403,429,500,501,502,503,504,505"
    )]
    pub retry_http_statuses: Vec<u16>,

    /// Verbose, human-readable logging for every request, cache hit/miss,
    /// provider selection, and validation cycle.
    #[arg(short, long, env = "RPCPROXY_VERBOSE", default_value = "false")]
    pub verbose: bool,
}

impl Config {
    /// Applies `CONFIG_FILE` overrides (if any) to the process environment
    /// and then runs clap's normal env+default resolution. Values already
    /// present in the environment are never touched by the config file —
    /// the file only fills in gaps.
    pub fn load() -> Result<Self, RpcProxyError> {
        if let Ok(path) = std::env::var("CONFIG_FILE") {
            apply_config_file_overrides(&path)?;
        }
        Ok(Self::parse())
    }

    pub fn resolved_keydb_url(&self) -> Result<String, RpcProxyError> {
        if let Some(url) = &self.keydb_url {
            return Ok(url.clone());
        }
        if let Some(path) = &self.keydb_url_file {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| RpcProxyError::Config(format!("reading {}: {e}", path.display())))?;
            return Ok(contents.trim().to_string());
        }
        Ok("redis://127.0.0.1:6379".to_string())
    }
}

fn apply_config_file_overrides(path: &str) -> Result<(), RpcProxyError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| RpcProxyError::Config(format!("reading config file {path}: {e}")))?;
    let overrides: HashMap<String, String> = serde_json::from_str(&contents)
        .map_err(|e| RpcProxyError::Config(format!("parsing config file {path}: {e}")))?;

    for (key, value) in overrides {
        if std::env::var(&key).is_err() {
            // SAFETY: single-threaded startup path, before any other code
            // reads process env vars concurrently.
            unsafe { std::env::set_var(key, value) };
        }
    }
    Ok(())
}

pub fn load_chain_bindings(
    default_providers_path: &PathBuf,
    reference_providers_path: &PathBuf,
) -> Result<Vec<ChainBinding>, RpcProxyError> {
    let default_contents = std::fs::read_to_string(default_providers_path).map_err(|e| {
        RpcProxyError::Config(format!("reading {}: {e}", default_providers_path.display()))
    })?;
    let default_file: ChainProvidersFile = serde_json::from_str(&default_contents)
        .map_err(|e| RpcProxyError::Config(format!("parsing providers file: {e}")))?;

    let mut references: HashMap<u64, crate::model::Provider> = HashMap::new();
    if let Ok(reference_contents) = std::fs::read_to_string(reference_providers_path) {
        let reference_file: ReferenceProvidersFile = serde_json::from_str(&reference_contents)
            .map_err(|e| RpcProxyError::Config(format!("parsing reference providers file: {e}")))?;
        for entry in reference_file.chains {
            references.insert(entry.chain_id, entry.provider);
        }
    }

    let bindings = default_file
        .chains
        .into_iter()
        .map(|entry| ChainBinding {
            chain: entry.name.to_lowercase(),
            network: entry.network.to_lowercase(),
            chain_id: entry.chain_id,
            reference: references.get(&entry.chain_id).cloned(),
            candidates: entry.providers,
        })
        .collect();

    Ok(bindings)
}

pub fn load_method_tests(path: &PathBuf) -> Result<Vec<MethodTest>, RpcProxyError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| RpcProxyError::Config(format!("reading {}: {e}", path.display())))?;
    serde_json::from_str(&contents).map_err(|e| RpcProxyError::Config(format!("parsing method tests: {e}")))
}

pub fn load_cache_rules(path: &PathBuf) -> Result<CacheRulesFile, RpcProxyError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| RpcProxyError::Config(format!("reading {}: {e}", path.display())))?;
    serde_yaml::from_str(&contents).map_err(|e| RpcProxyError::Config(format!("parsing cache rules: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_keydb_url_falls_back_to_default() {
        let config = Config {
            port: 9000,
            config_file: None,
            default_providers_path: "x".into(),
            reference_providers_path: "x".into(),
            method_tests_path: "x".into(),
            cache_rules_path: "x".into(),
            cache_socket_path: None,
            keydb_url: None,
            keydb_url_file: None,
            jwt_secret: "s".into(),
            puzzle_difficulty: 4,
            puzzle_ttl_seconds: 120,
            token_expiry_minutes: 60,
            requests_per_token: 1000,
            cache_max_bytes: 1024,
            l3_dir: None,
            cache_deadline_ms: 200,
            validation_interval_secs: 60,
            validation_call_timeout_secs: 5,
            snapshot_path: "x".into(),
            request_timeout_secs: 10,
            retry_rpc_codes: vec![],
            retry_http_statuses: vec![],
            verbose: false,
        };
        assert_eq!(config.resolved_keydb_url().unwrap(), "redis://127.0.0.1:6379");
    }
}
