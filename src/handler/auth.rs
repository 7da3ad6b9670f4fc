use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use tracing::warn;

use crate::auth::puzzle::ValidationOutcome;
use crate::auth::Solution;

use super::AppState;

/// GET /auth/puzzle — issues a fresh proof-of-work puzzle.
pub async fn puzzle_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state
        .puzzle_issuer
        .generate(state.puzzle_difficulty, chrono::Duration::seconds(state.puzzle_ttl_seconds))
    {
        Ok(puzzle) => (StatusCode::OK, Json(serde_json::to_value(puzzle).unwrap())),
        Err(e) => {
            warn!(error = %e, "failed to generate puzzle");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "puzzle generation failed" })),
            )
        }
    }
}

/// POST /auth/solve — validates a submitted solution and, if correct, mints
/// a rate-limited JWT.
pub async fn solve_handler(State(state): State<AppState>, Json(solution): Json<Solution>) -> impl IntoResponse {
    match state.puzzle_issuer.validate(&solution) {
        ValidationOutcome::Valid => {}
        ValidationOutcome::HmacMismatch => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": "solution does not match the issued puzzle" })),
            );
        }
        ValidationOutcome::Rejected => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "invalid or expired solution" })),
            );
        }
    }

    match state.puzzle_issuer.mint(
        &solution,
        chrono::Duration::minutes(state.token_expiry_minutes),
        state.requests_per_token,
    ) {
        Ok(minted) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "token": minted.token,
                "expiresAt": minted.expires_at,
                "requestLimit": minted.request_limit,
            })),
        ),
        Err(e) => {
            warn!(error = %e, "failed to mint token");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "token minting failed" })),
            )
        }
    }
}
