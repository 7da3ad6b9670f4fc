pub mod puzzle;
pub mod token;

pub use puzzle::{Argon2Params, MintedToken, Puzzle, PuzzleIssuer, Solution};
pub use token::{extract_token, QuotaCheck, TokenClaims, TokenVerifier};
