use argon2::password_hash::rand_core::{OsRng, RngCore};
use argon2::{Algorithm, Argon2, Params, Version};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::RpcProxyError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Argon2Params {
    pub memory_kb: u32,
    pub time: u32,
    pub threads: u32,
    pub key_len: usize,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            memory_kb: 19_456,
            time: 2,
            threads: 1,
            key_len: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Puzzle {
    pub challenge: String,
    pub salt: String,
    pub difficulty: u32,
    pub argon2_params: Argon2Params,
    pub expires_at: DateTime<Utc>,
    pub hmac: String,
}

/// Submitted by the client. `difficulty` is carried here (not just on the
/// server-issued `Puzzle`) because puzzles are stateless server-side — the
/// HMAC is the only memory of what was issued, so the binding check in
/// step 1 of `validate` needs every bound field present in the submission
/// to recompute and compare it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    pub challenge: String,
    pub salt: String,
    pub difficulty: u32,
    pub nonce: u64,
    pub argon_hash: String,
    pub hmac: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenClaims {
    sub: String,
    iat: i64,
    exp: i64,
    request_limit: u64,
}

pub struct MintedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub request_limit: u64,
}

/// Outcome of `PuzzleIssuer::validate`. `HmacMismatch` means the submitted
/// fields don't match what was actually issued — a tampered or fabricated
/// solution, not merely a wrong or late one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    HmacMismatch,
    Rejected,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

fn puzzle_hmac_input(challenge: &str, salt: &str, difficulty: u32, expires_at: DateTime<Utc>) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(challenge.as_bytes());
    buf.extend_from_slice(salt.as_bytes());
    buf.extend_from_slice(difficulty.to_string().as_bytes());
    buf.extend_from_slice(expires_at.to_rfc3339().as_bytes());
    buf
}

fn compute_hmac(secret: &[u8], input: &[u8]) -> Result<String, RpcProxyError> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| RpcProxyError::Config(format!("invalid HMAC secret: {e}")))?;
    mac.update(input);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time byte comparison, avoided pulling in `subtle` for a single
/// call site.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

pub struct PuzzleIssuer {
    secret: Vec<u8>,
    argon2_params: Argon2Params,
}

impl PuzzleIssuer {
    pub fn new(secret: Vec<u8>, argon2_params: Argon2Params) -> Self {
        Self { secret, argon2_params }
    }

    pub fn generate(&self, difficulty: u32, ttl: chrono::Duration) -> Result<Puzzle, RpcProxyError> {
        let mut challenge_bytes = [0u8; 16];
        let mut salt_bytes = [0u8; 16];
        OsRng.fill_bytes(&mut challenge_bytes);
        OsRng.fill_bytes(&mut salt_bytes);

        let challenge = hex::encode(challenge_bytes);
        let salt = hex::encode(salt_bytes);
        let expires_at = Utc::now() + ttl;

        let hmac = compute_hmac(
            &self.secret,
            &puzzle_hmac_input(&challenge, &salt, difficulty, expires_at),
        )?;

        Ok(Puzzle {
            challenge,
            salt,
            difficulty,
            argon2_params: self.argon2_params,
            expires_at,
            hmac,
        })
    }

    /// Strict, ordered, short-circuiting validation. Exactly one Argon2id
    /// evaluation is performed regardless of which earlier check would have
    /// failed, since the HMAC and expiry checks are cheap and run first.
    ///
    /// The HMAC check is reported separately from everything after it: a
    /// mismatch there means the submitted fields don't match what the
    /// server actually issued (tampering), which callers treat as a client
    /// error rather than an authentication failure.
    pub fn validate(&self, solution: &Solution) -> ValidationOutcome {
        let expected_hmac = match compute_hmac(
            &self.secret,
            &puzzle_hmac_input(&solution.challenge, &solution.salt, solution.difficulty, solution.expires_at),
        ) {
            Ok(h) => h,
            Err(_) => return ValidationOutcome::HmacMismatch,
        };
        let hmac_ok = match (hex::decode(&expected_hmac), hex::decode(&solution.hmac)) {
            (Ok(expected_bytes), Ok(got_bytes)) => constant_time_eq(&expected_bytes, &got_bytes),
            _ => false,
        };
        if !hmac_ok {
            return ValidationOutcome::HmacMismatch;
        }

        if Utc::now() >= solution.expires_at {
            return ValidationOutcome::Rejected;
        }

        let Ok(challenge_bytes) = hex::decode(&solution.challenge) else { return ValidationOutcome::Rejected };
        let Ok(salt_bytes) = hex::decode(&solution.salt) else { return ValidationOutcome::Rejected };

        let mut password = Vec::with_capacity(challenge_bytes.len() + salt_bytes.len() + 8);
        password.extend_from_slice(&challenge_bytes);
        password.extend_from_slice(&salt_bytes);
        password.extend_from_slice(&solution.nonce.to_be_bytes());

        let params = match Params::new(
            self.argon2_params.memory_kb,
            self.argon2_params.time,
            self.argon2_params.threads,
            Some(self.argon2_params.key_len),
        ) {
            Ok(p) => p,
            Err(_) => return ValidationOutcome::Rejected,
        };
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut output = vec![0u8; self.argon2_params.key_len];
        if argon2.hash_password_into(&password, &salt_bytes, &mut output).is_err() {
            return ValidationOutcome::Rejected;
        }
        let computed_hash = hex::encode(&output);

        if computed_hash != solution.argon_hash {
            return ValidationOutcome::Rejected;
        }

        let zeros: String = std::iter::repeat('0').take(solution.difficulty as usize).collect();
        if computed_hash.starts_with(&zeros) {
            ValidationOutcome::Valid
        } else {
            ValidationOutcome::Rejected
        }
    }

    pub fn mint(&self, solution: &Solution, token_ttl: chrono::Duration, request_limit: u64) -> Result<MintedToken, RpcProxyError> {
        let now = Utc::now();
        let expires_at = now + token_ttl;
        let claims = TokenClaims {
            sub: solution.challenge.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            request_limit,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|e| RpcProxyError::AuthFailure(format!("mint failed: {e}")))?;

        Ok(MintedToken {
            token,
            expires_at,
            request_limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> PuzzleIssuer {
        PuzzleIssuer::new(b"test-secret".to_vec(), Argon2Params {
            memory_kb: 8,
            time: 1,
            threads: 1,
            key_len: 32,
        })
    }

    fn solve(issuer: &PuzzleIssuer, puzzle: &Puzzle) -> Solution {
        let challenge_bytes = hex::decode(&puzzle.challenge).unwrap();
        let salt_bytes = hex::decode(&puzzle.salt).unwrap();

        let params = Params::new(
            issuer.argon2_params.memory_kb,
            issuer.argon2_params.time,
            issuer.argon2_params.threads,
            Some(issuer.argon2_params.key_len),
        ).unwrap();
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut nonce = 0u64;
        loop {
            let mut password = Vec::new();
            password.extend_from_slice(&challenge_bytes);
            password.extend_from_slice(&salt_bytes);
            password.extend_from_slice(&nonce.to_be_bytes());
            let mut output = vec![0u8; issuer.argon2_params.key_len];
            argon2.hash_password_into(&password, &salt_bytes, &mut output).unwrap();
            let hash = hex::encode(&output);
            if puzzle.difficulty == 0 || hash.starts_with("0") {
                return Solution {
                    challenge: puzzle.challenge.clone(),
                    salt: puzzle.salt.clone(),
                    difficulty: puzzle.difficulty,
                    nonce,
                    argon_hash: hash,
                    hmac: puzzle.hmac.clone(),
                    expires_at: puzzle.expires_at,
                };
            }
            nonce += 1;
            if nonce > 10_000 {
                panic!("no solution found in bounded search (test puzzle difficulty too high)");
            }
        }
    }

    #[test]
    fn valid_solution_passes() {
        let issuer = issuer();
        let puzzle = issuer.generate(1, chrono::Duration::seconds(60)).unwrap();
        let solution = solve(&issuer, &puzzle);
        assert_eq!(issuer.validate(&solution), ValidationOutcome::Valid);
    }

    #[test]
    fn tampered_difficulty_fails_hmac_check() {
        let issuer = issuer();
        let puzzle = issuer.generate(2, chrono::Duration::seconds(60)).unwrap();
        let mut solution = solve(&issuer, &puzzle);
        solution.difficulty = 1;
        assert_eq!(issuer.validate(&solution), ValidationOutcome::HmacMismatch);
    }

    #[test]
    fn expired_puzzle_fails() {
        let issuer = issuer();
        let puzzle = issuer.generate(0, chrono::Duration::seconds(-1)).unwrap();
        let solution = solve(&issuer, &puzzle);
        assert_eq!(issuer.validate(&solution), ValidationOutcome::Rejected);
    }

    #[test]
    fn wrong_argon_hash_fails() {
        let issuer = issuer();
        let puzzle = issuer.generate(0, chrono::Duration::seconds(60)).unwrap();
        let mut solution = solve(&issuer, &puzzle);
        solution.argon_hash = "00".repeat(32);
        assert_eq!(issuer.validate(&solution), ValidationOutcome::Rejected);
    }
}
