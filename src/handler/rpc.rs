use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use tracing::{error, warn};

use crate::auth::extract_token;
use crate::error::RpcProxyError;
use crate::jsonrpc::{JsonRpcBody, JsonRpcRequest, JsonRpcResponse};

use super::AppState;

pub async fn rpc_handler(
    state: State<AppState>,
    Path((chain, network)): Path<(String, String)>,
    headers: HeaderMap,
    query: RawQuery,
    body: String,
) -> impl IntoResponse {
    dispatch(state, chain, network, None, headers, query, body).await
}

pub async fn rpc_handler_typed(
    state: State<AppState>,
    Path((chain, network, provider_type)): Path<(String, String, String)>,
    headers: HeaderMap,
    query: RawQuery,
    body: String,
) -> impl IntoResponse {
    dispatch(state, chain, network, Some(provider_type), headers, query, body).await
}

async fn dispatch(
    State(state): State<AppState>,
    chain: String,
    network: String,
    provider_type: Option<String>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: String,
) -> axum::response::Response {
    let query = query.unwrap_or_default();
    let Some((token, _from_query)) = extract_token(&headers, &query) else {
        warn!("rejected request with no token");
        return (
            StatusCode::UNAUTHORIZED,
            Json(JsonRpcResponse::error(serde_json::Value::Null, -32000, "missing token")),
        )
            .into_response();
    };

    let claims = match state.token_verifier.verify(&token) {
        Ok(claims) => claims,
        Err(RpcProxyError::AuthFailure(reason)) => {
            warn!(reason = %reason, "rejected request with invalid token");
            return (
                StatusCode::UNAUTHORIZED,
                Json(JsonRpcResponse::error(serde_json::Value::Null, -32000, "invalid token")),
            )
                .into_response();
        }
        Err(_) => unreachable!("verify only returns AuthFailure"),
    };

    let quota = match state.token_verifier.check_and_increment(&claims) {
        Ok(quota) => quota,
        Err(RpcProxyError::QuotaExceeded) => {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(JsonRpcResponse::error(serde_json::Value::Null, -32000, "quota exceeded")),
            )
                .into_response();
        }
        Err(_) => unreachable!("check_and_increment only returns QuotaExceeded"),
    };

    let Some(&chain_id) = state.chain_ids.get(&(chain.to_lowercase(), network.to_lowercase())) else {
        return (
            StatusCode::NOT_FOUND,
            Json(JsonRpcResponse::error(serde_json::Value::Null, -32000, "unknown chain/network")),
        )
            .into_response();
    };

    let parsed: JsonRpcBody = match serde_json::from_str(&body) {
        Ok(p) => p,
        Err(_) => {
            return (StatusCode::BAD_REQUEST, Json(JsonRpcResponse::parse_error())).into_response();
        }
    };

    let mut response = match parsed {
        JsonRpcBody::Single(request) => {
            let (status, resp) = handle_one(&state, &chain, &network, chain_id, provider_type.as_deref(), request).await;
            (status, Json(serde_json::to_value(resp).unwrap())).into_response()
        }
        JsonRpcBody::Batch(requests) => {
            let mut statuses = Vec::with_capacity(requests.len());
            let mut responses = Vec::with_capacity(requests.len());
            for request in requests {
                let (status, resp) = handle_one(&state, &chain, &network, chain_id, provider_type.as_deref(), request).await;
                statuses.push(status);
                responses.push(resp);
            }
            // A batch is only reported as exhausted if every call in it hit
            // exhaustion; any item that got a real answer makes it a 200.
            let overall = if !statuses.is_empty() && statuses.iter().all(|s| *s == StatusCode::BAD_GATEWAY) {
                StatusCode::BAD_GATEWAY
            } else {
                StatusCode::OK
            };
            (overall, Json(serde_json::to_value(responses).unwrap())).into_response()
        }
    };

    let response_headers = response.headers_mut();
    if let Ok(limit) = quota.limit.to_string().parse() {
        response_headers.insert("x-ratelimit-limit", limit);
    }
    if let Ok(remaining) = quota.remaining.to_string().parse() {
        response_headers.insert("x-ratelimit-remaining", remaining);
    }
    response
}

async fn handle_one(
    state: &AppState,
    chain: &str,
    network: &str,
    chain_id: u64,
    provider_type: Option<&str>,
    request: JsonRpcRequest,
) -> (StatusCode, JsonRpcResponse) {
    if !request.is_valid() {
        return (StatusCode::OK, JsonRpcResponse::invalid_request(request.id));
    }

    match state
        .router
        .handle(chain, network, chain_id, provider_type, &request)
        .await
    {
        Ok(response) => (StatusCode::OK, response),
        Err(RpcProxyError::NoProviders) | Err(RpcProxyError::UpstreamTransient(_)) => {
            (StatusCode::BAD_GATEWAY, JsonRpcResponse::bad_gateway(request.id))
        }
        Err(e) => {
            error!(method = %request.method, error = %e, "request failed");
            (StatusCode::OK, JsonRpcResponse::internal_error(request.id))
        }
    }
}
