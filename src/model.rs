use serde::{Deserialize, Serialize};

/// How a provider expects credentials on its base URL. `Token` is appended
/// as a path segment (`base_url/<token>`); `Basic` carries login/password
/// for HTTP basic auth on the outbound call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthMode {
    None,
    Basic { login: String, password: String },
    Token { token: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
    #[serde(rename = "type")]
    pub provider_type: String,
    pub base_url: String,
    #[serde(default = "default_auth_mode")]
    pub auth: AuthMode,
    pub chain_id: u64,
}

fn default_auth_mode() -> AuthMode {
    AuthMode::None
}

impl Provider {
    /// Resolves the concrete URL the outbound request is sent to, folding
    /// in url-path-segment token auth. Basic auth is applied at the HTTP
    /// client layer, not the URL.
    pub fn request_url(&self) -> String {
        match &self.auth {
            AuthMode::Token { token } => format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                token
            ),
            _ => self.base_url.clone(),
        }
    }
}

/// `(chain_name, network_name, chain_id)` plus the ordered candidate list
/// and the distinguished reference provider for that chain. Names are
/// normalized to lowercase at load time.
#[derive(Debug, Clone)]
pub struct ChainBinding {
    pub chain: String,
    pub network: String,
    pub chain_id: u64,
    pub candidates: Vec<Provider>,
    pub reference: Option<Provider>,
}

impl ChainBinding {
    pub fn key(&self) -> (String, String) {
        (self.chain.clone(), self.network.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainProvidersFile {
    pub chains: Vec<ChainEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainEntry {
    pub name: String,
    pub network: String,
    #[serde(rename = "chainId")]
    pub chain_id: u64,
    pub providers: Vec<Provider>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceProvidersFile {
    pub chains: Vec<ReferenceChainEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceChainEntry {
    pub name: String,
    pub network: String,
    #[serde(rename = "chainId")]
    pub chain_id: u64,
    pub provider: Provider,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_auth_appends_path_segment() {
        let p = Provider {
            name: "a".into(),
            provider_type: "primary".into(),
            base_url: "https://rpc.example.com".into(),
            auth: AuthMode::Token { token: "abc123".into() },
            chain_id: 1,
        };
        assert_eq!(p.request_url(), "https://rpc.example.com/abc123");
    }

    #[test]
    fn no_auth_uses_base_url_verbatim() {
        let p = Provider {
            name: "a".into(),
            provider_type: "primary".into(),
            base_url: "https://rpc.example.com".into(),
            auth: AuthMode::None,
            chain_id: 1,
        };
        assert_eq!(p.request_url(), "https://rpc.example.com");
    }
}
