pub mod auth;
pub mod rpc;
pub mod status;

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::auth::{PuzzleIssuer, TokenVerifier};
use crate::router::Router;
use crate::validator::ValidProviderSnapshot;

#[derive(Clone)]
pub struct AppState {
    pub router: Arc<Router>,
    pub puzzle_issuer: Arc<PuzzleIssuer>,
    pub token_verifier: Arc<TokenVerifier>,
    pub snapshot: Arc<ArcSwap<ValidProviderSnapshot>>,
    /// `(chain, network) -> chain_id`, built once at startup from the
    /// loaded provider bindings.
    pub chain_ids: Arc<HashMap<(String, String), u64>>,
    pub metrics_handle: PrometheusHandle,
    pub puzzle_difficulty: u32,
    pub puzzle_ttl_seconds: i64,
    pub token_expiry_minutes: i64,
    pub requests_per_token: u64,
}
