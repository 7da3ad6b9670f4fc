use std::fmt;

/// The error taxonomy shared across the cache, auth, validator and router
/// subsystems. Cache-tier errors are absorbed by their callers (converted to
/// a miss plus a counted metric) rather than propagated as a hard failure;
/// every other variant maps to an HTTP status at the handler boundary.
#[derive(Debug)]
pub enum RpcProxyError {
    /// Malformed JSON-RPC, missing fields, empty method/chain/network.
    BadRequest(String),
    /// Missing/invalid/expired token, HMAC mismatch.
    AuthFailure(String),
    /// Per-token request quota exhausted.
    QuotaExceeded,
    /// A cache tier failed; always absorbed into a miss by the caller.
    Cache(CacheErrorKind, String),
    /// Upstream failure that should advance to the next candidate provider.
    UpstreamTransient(String),
    /// Upstream failure (or well-formed JSON-RPC error) returned to the client as-is.
    UpstreamPermanent(String),
    /// The valid-provider snapshot had nothing left after filtering.
    NoProviders,
    /// Fatal at load time: bad config file, unreadable path, invalid schema.
    Config(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheErrorKind {
    Encode,
    Decode,
    Upstream,
    Redis,
}

impl fmt::Display for CacheErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode => write!(f, "encode"),
            Self::Decode => write!(f, "decode"),
            Self::Upstream => write!(f, "upstream"),
            Self::Redis => write!(f, "redis"),
        }
    }
}

impl fmt::Display for RpcProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest(e) => write!(f, "bad request: {e}"),
            Self::AuthFailure(e) => write!(f, "auth failure: {e}"),
            Self::QuotaExceeded => write!(f, "quota exceeded"),
            Self::Cache(kind, e) => write!(f, "cache error ({kind}): {e}"),
            Self::UpstreamTransient(e) => write!(f, "upstream transient: {e}"),
            Self::UpstreamPermanent(e) => write!(f, "upstream permanent: {e}"),
            Self::NoProviders => write!(f, "no valid providers"),
            Self::Config(e) => write!(f, "config error: {e}"),
        }
    }
}

impl std::error::Error for RpcProxyError {}

impl From<serde_json::Error> for RpcProxyError {
    fn from(e: serde_json::Error) -> Self {
        Self::Cache(CacheErrorKind::Decode, e.to_string())
    }
}
