use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router as AxumRouter;
use tracing::{info, warn};

use rpcproxy::auth::{Argon2Params, PuzzleIssuer, TokenVerifier};
use rpcproxy::cache::l1::L1Cache;
use rpcproxy::cache::l2::L2Cache;
use rpcproxy::cache::l3::DirectoryStore;
use rpcproxy::cache::{CacheRules, L3Cache, MultiCache};
use rpcproxy::cache_service::CacheService;
use rpcproxy::config::{self, Config};
use rpcproxy::handler::{self, AppState};
use rpcproxy::router::Router;
use rpcproxy::scheduler::Scheduler;
use rpcproxy::upstream::UpstreamClient;
use rpcproxy::validator::{HttpProbeRunner, Validator};

#[tokio::main]
async fn main() {
    let config = Config::load().expect("failed to load configuration");

    let log_level = if config.verbose { "debug,hyper=info,reqwest=info" } else { "warn,rpcproxy=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .json()
        .init();

    info!(port = %config.port, verbose = config.verbose, "starting rpcproxy");

    let metrics_handle = rpcproxy::metrics::install().expect("failed to install metrics recorder");

    let bindings = config::load_chain_bindings(&config.default_providers_path, &config.reference_providers_path)
        .expect("failed to load provider bindings");
    let method_tests = config::load_method_tests(&config.method_tests_path).unwrap_or_else(|e| {
        warn!(error = %e, "no method tests loaded, validator will treat all methods as unknown");
        Vec::new()
    });
    let cache_rules_file = config::load_cache_rules(&config.cache_rules_path).unwrap_or_else(|e| {
        warn!(error = %e, "no cache rules file loaded, using built-in defaults");
        rpcproxy::cache::CacheRulesFile {
            method_classes: HashMap::new(),
            default_class: None,
            ttls: Vec::new(),
            skip_null_cache_methods: Vec::new(),
        }
    });

    let mut chain_ids = HashMap::new();
    for binding in &bindings {
        chain_ids.insert((binding.chain.clone(), binding.network.clone()), binding.chain_id);
    }

    let l1 = Arc::new(L1Cache::new(config.cache_max_bytes));

    let redis_url = config.resolved_keydb_url().expect("failed to resolve KEYDB_URL");
    let redis_client = redis::Client::open(redis_url.as_str()).expect("invalid KEYDB_URL");
    let conn_manager = redis::aio::ConnectionManager::new(redis_client)
        .await
        .expect("failed to connect to L2 store");
    let l2 = Arc::new(L2Cache::new(conn_manager, Duration::from_millis(config.cache_deadline_ms)));

    let l3: Arc<L3Cache> = match &config.l3_dir {
        Some(dir) => Arc::new(L3Cache::new(Some(Arc::new(DirectoryStore::new(dir.clone()))))),
        None => Arc::new(L3Cache::disabled()),
    };

    let multi_cache = Arc::new(MultiCache::new(l1, l2, l3, true));
    let cache_rules = CacheRules::from_file(cache_rules_file);
    let cache_service = Arc::new(CacheService::new(cache_rules, multi_cache));

    let puzzle_issuer = Arc::new(PuzzleIssuer::new(config.jwt_secret.clone().into_bytes(), Argon2Params::default()));
    let token_verifier = Arc::new(TokenVerifier::new(config.jwt_secret.clone().into_bytes()));

    let validator = Arc::new(Validator::new(
        bindings,
        method_tests,
        Duration::from_secs(config.validation_call_timeout_secs),
        Arc::new(HttpProbeRunner::new()),
        Some(config.snapshot_path.clone()),
    ));
    let snapshot = validator.snapshot_handle();

    let upstream_client = Arc::new(UpstreamClient::new(
        Duration::from_secs(config.request_timeout_secs),
        config.retry_http_statuses.clone(),
        config.retry_rpc_codes.clone(),
    ));

    let router = Arc::new(Router::new(cache_service, upstream_client, snapshot.clone()));

    let mut scheduler = Scheduler::new(Duration::from_secs(config.validation_interval_secs));
    let validator_for_cycle = validator.clone();
    scheduler.start(move || {
        let validator = validator_for_cycle.clone();
        async move {
            validator.run_cycle().await;
        }
    });

    let state = AppState {
        router,
        puzzle_issuer,
        token_verifier,
        snapshot,
        chain_ids: Arc::new(chain_ids),
        metrics_handle,
        puzzle_difficulty: config.puzzle_difficulty,
        puzzle_ttl_seconds: config.puzzle_ttl_seconds,
        token_expiry_minutes: config.token_expiry_minutes,
        requests_per_token: config.requests_per_token,
    };

    let app = AxumRouter::new()
        .route("/health", get(handler::status::health_handler))
        .route("/providers", get(handler::status::providers_handler))
        .route("/metrics", get(handler::status::metrics_handler))
        .route("/auth/puzzle", get(handler::auth::puzzle_handler))
        .route("/auth/solve", post(handler::auth::solve_handler))
        .route("/{chain}/{network}", post(handler::rpc::rpc_handler))
        .route("/{chain}/{network}/{type}", post(handler::rpc::rpc_handler_typed))
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.expect("failed to bind");

    info!(addr = %addr, "rpcproxy listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    scheduler.stop().await;
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    info!("shutdown signal received");
}
