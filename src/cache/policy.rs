use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::envelope::Ttl;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheClass {
    Permanent,
    Short,
    Minimal,
    /// Never cache.
    None,
}

impl CacheClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Permanent => "permanent",
            Self::Short => "short",
            Self::Minimal => "minimal",
            Self::None => "none",
        }
    }
}

/// The on-disk (YAML) shape of the cache rules file: a per-method class
/// table, a per-(chain,network,class) TTL table, and the skip-null-cache
/// method set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRulesFile {
    #[serde(default)]
    pub method_classes: HashMap<String, CacheClass>,
    #[serde(default)]
    pub default_class: Option<CacheClass>,
    #[serde(default)]
    pub ttls: Vec<TtlRule>,
    #[serde(default)]
    pub skip_null_cache_methods: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlRule {
    pub chain: String,
    pub network: String,
    pub class: CacheClass,
    pub fresh_secs: u64,
    #[serde(default)]
    pub stale_secs: Option<u64>,
}

/// The pure classifier: given a method, yields a `CacheClass`; given
/// `(chain, network, class)`, yields a `TTL`. Never touches the network.
pub struct CacheRules {
    method_classes: HashMap<String, CacheClass>,
    default_class: CacheClass,
    ttls: HashMap<(String, String, CacheClass), Ttl>,
    skip_null_cache: std::collections::HashSet<String>,
}

impl CacheRules {
    pub fn from_file(file: CacheRulesFile) -> Self {
        let mut ttls = HashMap::new();
        for rule in file.ttls {
            let ttl = match rule.stale_secs {
                Some(stale) => Ttl {
                    fresh_secs: rule.fresh_secs,
                    stale_secs: stale,
                },
                None => Ttl::new(rule.fresh_secs),
            };
            ttls.insert((rule.chain, rule.network, rule.class), ttl);
        }

        Self {
            method_classes: file.method_classes,
            default_class: file.default_class.unwrap_or(CacheClass::Short),
            ttls,
            skip_null_cache: file.skip_null_cache_methods.into_iter().collect(),
        }
    }

    pub fn empty() -> Self {
        Self {
            method_classes: HashMap::new(),
            default_class: CacheClass::Short,
            ttls: HashMap::new(),
            skip_null_cache: std::collections::HashSet::new(),
        }
    }

    pub fn class_for(&self, method: &str) -> CacheClass {
        self.method_classes
            .get(method)
            .copied()
            .unwrap_or(self.default_class)
    }

    pub fn ttl_for(&self, chain: &str, network: &str, class: CacheClass) -> Ttl {
        self.ttls
            .get(&(chain.to_string(), network.to_string(), class))
            .copied()
            .unwrap_or(match class {
                CacheClass::Permanent => Ttl::new(3600),
                CacheClass::Short => Ttl::new(2),
                CacheClass::Minimal => Ttl::new(1),
                CacheClass::None => Ttl { fresh_secs: 0, stale_secs: 0 },
            })
    }

    pub fn skip_null_cache(&self, method: &str) -> bool {
        self.skip_null_cache.contains(method)
    }
}
