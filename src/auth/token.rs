use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::http::HeaderMap;
use dashmap::DashMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::RpcProxyError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub request_limit: u64,
}

pub struct QuotaCheck {
    pub limit: u64,
    pub remaining: u64,
}

/// Verifies JWTs minted by `PuzzleIssuer` and enforces the per-token request
/// quota. The quota map is a sharded concurrent map (`dashmap`) rather than
/// a single global mutex, so verification on the hot path doesn't serialize
/// unrelated tokens against each other.
pub struct TokenVerifier {
    secret: Vec<u8>,
    quotas: DashMap<String, Arc<AtomicU64>>,
}

impl TokenVerifier {
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret,
            quotas: DashMap::new(),
        }
    }

    pub fn verify(&self, token: &str) -> Result<TokenClaims, RpcProxyError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = true;

        let data = decode::<TokenClaims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map_err(|e| RpcProxyError::AuthFailure(e.to_string()))?;
        Ok(data.claims)
    }

    /// Atomically checks the counter against `request_limit` and increments
    /// it only if the request is admitted — a strict check-then-increment
    /// on the same atomic cell, never a separate read followed by a write.
    pub fn check_and_increment(&self, claims: &TokenClaims) -> Result<QuotaCheck, RpcProxyError> {
        let counter = self
            .quotas
            .entry(claims.sub.clone())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone();

        let mut current = counter.load(Ordering::SeqCst);
        loop {
            if current >= claims.request_limit {
                return Err(RpcProxyError::QuotaExceeded);
            }
            match counter.compare_exchange_weak(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    return Ok(QuotaCheck {
                        limit: claims.request_limit,
                        remaining: claims.request_limit - (current + 1),
                    });
                }
                Err(observed) => current = observed,
            }
        }
    }
}

/// Header wins over query parameter; `token`, `jwt` and `access_token` are
/// all accepted query keys. Returns the raw token plus whether it came from
/// the query string (callers must then strip all query parameters before
/// forwarding upstream).
pub fn extract_token(headers: &HeaderMap, query: &str) -> Option<(String, bool)> {
    if let Some(value) = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some((value.to_string(), false));
    }

    for key in ["token", "jwt", "access_token"] {
        if let Some(value) = url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
        {
            return Some((value, true));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(limit: u64) -> TokenClaims {
        TokenClaims {
            sub: "abc".into(),
            iat: 0,
            exp: 0,
            request_limit: limit,
        }
    }

    #[test]
    fn quota_admits_up_to_limit_then_rejects() {
        let verifier = TokenVerifier::new(b"secret".to_vec());
        let c = claims(2);
        assert!(verifier.check_and_increment(&c).is_ok());
        assert!(verifier.check_and_increment(&c).is_ok());
        assert!(matches!(
            verifier.check_and_increment(&c),
            Err(RpcProxyError::QuotaExceeded)
        ));
    }

    #[test]
    fn remaining_counts_down() {
        let verifier = TokenVerifier::new(b"secret".to_vec());
        let c = claims(3);
        let first = verifier.check_and_increment(&c).unwrap();
        assert_eq!(first.remaining, 2);
        let second = verifier.check_and_increment(&c).unwrap();
        assert_eq!(second.remaining, 1);
    }

    #[test]
    fn header_token_wins_over_query() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer header-token".parse().unwrap());
        let (token, from_query) = extract_token(&headers, "token=query-token").unwrap();
        assert_eq!(token, "header-token");
        assert!(!from_query);
    }

    #[test]
    fn query_token_is_accepted_when_no_header() {
        let headers = HeaderMap::new();
        let (token, from_query) = extract_token(&headers, "access_token=qtoken&foo=bar").unwrap();
        assert_eq!(token, "qtoken");
        assert!(from_query);
    }

    #[test]
    fn multi_byte_percent_encoding_decodes_correctly() {
        let headers = HeaderMap::new();
        let (token, _) = extract_token(&headers, "token=caf%C3%A9").unwrap();
        assert_eq!(token, "café");
    }
}
